//! Error types for the DDQ answer engine
//!
//! Provides:
//! - Distinct error types for different failure modes
//! - Machine-readable error codes for caller handling
//! - Transient/permanent classification driving the retry policy

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,
    BatchTooLarge,

    // Precondition errors (2xxx)
    CredentialMissing,
    EmptyCorpus,

    // Resource errors (4xxx)
    NotFound,
    DocumentNotFound,
    QuestionNotFound,
    AnswerNotFound,
    JobNotFound,

    // Conflict errors (5xxx)
    Conflict,
    ConcurrencyConflict,
    InvalidTransition,
    Canceled,

    // External service errors (8xxx)
    ProviderError,
    ProviderTimeout,

    // Internal errors (9xxx)
    StorageError,
    InternalError,
    ConfigurationError,
    SerializationError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,
            ErrorCode::BatchTooLarge => 1003,

            // Preconditions (2xxx)
            ErrorCode::CredentialMissing => 2001,
            ErrorCode::EmptyCorpus => 2002,

            // Resources (4xxx)
            ErrorCode::NotFound => 4001,
            ErrorCode::DocumentNotFound => 4002,
            ErrorCode::QuestionNotFound => 4003,
            ErrorCode::AnswerNotFound => 4004,
            ErrorCode::JobNotFound => 4005,

            // Conflicts (5xxx)
            ErrorCode::Conflict => 5001,
            ErrorCode::ConcurrencyConflict => 5002,
            ErrorCode::InvalidTransition => 5003,
            ErrorCode::Canceled => 5004,

            // External (8xxx)
            ErrorCode::ProviderError => 8001,
            ErrorCode::ProviderTimeout => 8002,

            // Internal (9xxx)
            ErrorCode::StorageError => 9001,
            ErrorCode::InternalError => 9002,
            ErrorCode::ConfigurationError => 9003,
            ErrorCode::SerializationError => 9004,
        }
    }
}

/// Engine error types
#[derive(Error, Debug)]
pub enum EngineError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    #[error("Batch of {size} texts exceeds provider limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    // Precondition failures
    #[error("Provider credential not configured for tenant {tenant_id}")]
    CredentialMissing { tenant_id: uuid::Uuid },

    /// No chunks are indexed for the namespace. A distinct non-fatal
    /// outcome: callers present "no documents indexed" instead of failing.
    #[error("No indexed content for namespace {namespace}")]
    EmptyCorpus { namespace: String },

    // Resource errors
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound { resource_type: String, id: String },

    #[error("Job not found: {id}")]
    JobNotFound { id: String },

    // Conflict errors
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// A generation job for the same question is already queued or running.
    #[error("Generation already in flight for question {question_id}")]
    ConcurrencyConflict { question_id: uuid::Uuid },

    #[error("Invalid review transition: {action} from {from}")]
    InvalidTransition { action: String, from: String },

    /// A queued or in-flight job was canceled by the caller.
    #[error("Job {job_id} canceled")]
    Canceled { job_id: uuid::Uuid },

    // External service errors
    #[error("Provider error: {message}")]
    Provider { message: String },

    #[error("Provider timed out after {timeout_ms}ms")]
    ProviderTimeout { timeout_ms: u64 },

    // Internal errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Validation { .. } => ErrorCode::ValidationError,
            EngineError::MissingField { .. } => ErrorCode::MissingField,
            EngineError::BatchTooLarge { .. } => ErrorCode::BatchTooLarge,
            EngineError::CredentialMissing { .. } => ErrorCode::CredentialMissing,
            EngineError::EmptyCorpus { .. } => ErrorCode::EmptyCorpus,
            EngineError::NotFound { resource_type, .. } => match resource_type.as_str() {
                "document" => ErrorCode::DocumentNotFound,
                "question" => ErrorCode::QuestionNotFound,
                "answer" => ErrorCode::AnswerNotFound,
                _ => ErrorCode::NotFound,
            },
            EngineError::JobNotFound { .. } => ErrorCode::JobNotFound,
            EngineError::Conflict { .. } => ErrorCode::Conflict,
            EngineError::ConcurrencyConflict { .. } => ErrorCode::ConcurrencyConflict,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::Canceled { .. } => ErrorCode::Canceled,
            EngineError::Provider { .. } => ErrorCode::ProviderError,
            EngineError::ProviderTimeout { .. } => ErrorCode::ProviderTimeout,
            EngineError::Storage { .. } => ErrorCode::StorageError,
            EngineError::Internal { .. } => ErrorCode::InternalError,
            EngineError::Configuration { .. } => ErrorCode::ConfigurationError,
            EngineError::Serialization(_) => ErrorCode::SerializationError,
            EngineError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a bounded retry with backoff may resolve this error.
    ///
    /// Only provider-side failures qualify; validation and precondition
    /// failures must surface immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::Provider { .. } | EngineError::ProviderTimeout { .. }
        )
    }

    /// Convenience constructor for not-found resources
    pub fn not_found(resource_type: &str, id: impl std::fmt::Display) -> Self {
        EngineError::NotFound {
            resource_type: resource_type.to_string(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for validation failures
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation {
            message: message.into(),
            field: None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EngineError::ProviderTimeout { timeout_ms: 0 }
        } else {
            EngineError::Provider {
                message: err.to_string(),
            }
        }
    }
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(err: validator::ValidationErrors) -> Self {
        EngineError::Validation {
            message: err.to_string(),
            field: err.field_errors().keys().next().map(|k| k.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = EngineError::not_found("question", "abc");
        assert_eq!(err.code(), ErrorCode::QuestionNotFound);
        assert_eq!(err.code().as_code(), 4003);
    }

    #[test]
    fn test_transient_classification() {
        let provider = EngineError::Provider {
            message: "rate limited".into(),
        };
        assert!(provider.is_transient());

        let validation = EngineError::validation("empty batch");
        assert!(!validation.is_transient());

        let credential = EngineError::CredentialMissing {
            tenant_id: uuid::Uuid::nil(),
        };
        assert!(!credential.is_transient());
    }

    #[test]
    fn test_concurrency_conflict_code() {
        let err = EngineError::ConcurrencyConflict {
            question_id: uuid::Uuid::nil(),
        };
        assert_eq!(err.code(), ErrorCode::ConcurrencyConflict);
    }
}
