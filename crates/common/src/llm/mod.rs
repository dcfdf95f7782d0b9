//! Chat-model provider abstraction
//!
//! One interface for the answer-generating model and the secondary judge
//! models used by the confidence scorer. Like the embedding client, this
//! layer carries no retry policy; callers classify and retry.

use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Trait for chat completion calls
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one system + user exchange and return the assistant text
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// OpenAI-compatible chat completion client
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl OpenAiChatModel {
    pub fn new(
        api_key: String,
        endpoint: String,
        model: String,
        temperature: f32,
        max_tokens: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Configuration {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
            temperature,
            max_tokens,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider {
                message: format!("chat API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse =
            response.json().await.map_err(|e| EngineError::Provider {
                message: format!("failed to parse chat response: {}", e),
            })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| EngineError::Provider {
                message: "empty chat response".to_string(),
            })
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

type Responder = dyn Fn(&str, &str) -> Result<String> + Send + Sync;

/// Scriptable mock chat model for tests.
///
/// The responder closure receives the system and user prompts, so tests can
/// answer generation and judge calls differently without depending on call
/// order.
pub struct MockChatModel {
    responder: Box<Responder>,
}

impl MockChatModel {
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
        }
    }

    /// Always return the same text
    pub fn always(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::with_responder(move |_, _| Ok(text.clone()))
    }

    /// Always fail with a provider error
    pub fn failing(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::with_responder(move |_, _| {
            Err(EngineError::Provider {
                message: message.clone(),
            })
        })
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        (self.responder)(system, user)
    }

    fn model_name(&self) -> &str {
        "mock-chat"
    }
}
