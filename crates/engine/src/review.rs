//! Answer review state machine
//!
//! Governs the answer lifecycle (`draft -> pending_review -> approved /
//! rejected / edited`) and produces exactly one immutable version snapshot
//! per transition. An edited answer is reviewable again; approved and
//! rejected are terminal.
//!
//! Versioning: `Answer.version` always equals the snapshot count plus one.
//! Each transition appends a snapshot numbered with the pre-transition
//! version and bumps the answer by exactly one, so the sequence is gapless
//! from 1.
//!
//! Rejecting marks the question rejected; it never deletes it. Deleting a
//! question is a separate explicit cascade operation on the engine.

use chrono::Utc;
use ddq_common::errors::{EngineError, Result};
use ddq_common::models::{
    AnswerRecord, AnswerStatus, AnswerVersionRecord, ChangeType, QuestionStatus,
};
use uuid::Uuid;

/// A reviewer action against the current answer
#[derive(Debug, Clone)]
pub enum ReviewAction {
    Approve {
        reviewer: Option<Uuid>,
        notes: Option<String>,
    },
    Reject {
        reviewer: Option<Uuid>,
        notes: Option<String>,
    },
    Edit {
        new_text: String,
        reviewer: Option<Uuid>,
        notes: Option<String>,
    },
}

impl ReviewAction {
    fn name(&self) -> &'static str {
        match self {
            ReviewAction::Approve { .. } => "approve",
            ReviewAction::Reject { .. } => "reject",
            ReviewAction::Edit { .. } => "edit",
        }
    }
}

/// Result of applying a review action
#[derive(Debug, Clone)]
pub struct ReviewOutcome {
    /// Answer after the transition, `version` already bumped
    pub answer: AnswerRecord,
    /// The single snapshot this transition produced
    pub version: AnswerVersionRecord,
    /// Question status implied by the transition
    pub question_status: QuestionStatus,
}

/// Pure transition logic; persistence happens at the engine
pub struct ReviewStateMachine;

impl ReviewStateMachine {
    /// Apply a review action to the current answer.
    ///
    /// Editing never re-runs generation or re-scores confidence; the stored
    /// scores remain those of the last AI generation.
    pub fn apply(current: &AnswerRecord, action: ReviewAction) -> Result<ReviewOutcome> {
        let from = current.status;

        let (new_status, question_status) = match &action {
            ReviewAction::Approve { .. } => {
                if !from.is_reviewable() {
                    return Err(Self::invalid(&action, from));
                }
                (AnswerStatus::Approved, QuestionStatus::Approved)
            }
            ReviewAction::Reject { .. } => {
                if !from.is_reviewable() {
                    return Err(Self::invalid(&action, from));
                }
                (AnswerStatus::Rejected, QuestionStatus::Rejected)
            }
            ReviewAction::Edit { new_text, .. } => {
                if from.is_terminal() {
                    return Err(Self::invalid(&action, from));
                }
                if new_text.trim().is_empty() {
                    return Err(EngineError::validation("edited answer text is empty"));
                }
                (AnswerStatus::Edited, QuestionStatus::Review)
            }
        };

        let mut answer = current.clone();
        answer.status = new_status;
        answer.updated_at = Utc::now();

        let (change_type, changed_by, change_reason, diff) = match action {
            ReviewAction::Approve { reviewer, notes } => {
                answer.reviewed_by = reviewer;
                answer.review_notes = notes.clone();
                (ChangeType::Approve, reviewer, notes, None)
            }
            ReviewAction::Reject { reviewer, notes } => {
                answer.reviewed_by = reviewer;
                answer.review_notes = notes.clone();
                (ChangeType::Reject, reviewer, notes, None)
            }
            ReviewAction::Edit {
                new_text,
                reviewer,
                notes,
            } => {
                let diff = line_diff(&current.text, &new_text);
                answer.text = new_text;
                answer.is_ai_generated = false;
                answer.reviewed_by = reviewer;
                answer.review_notes = notes.clone();
                let reason = notes.unwrap_or_else(|| "Manual edit".to_string());
                (ChangeType::Edit, reviewer, Some(reason), Some(diff))
            }
        };

        let version = AnswerVersionRecord {
            id: Uuid::new_v4(),
            answer_id: answer.id,
            version_number: current.version,
            content_snapshot: answer.text.clone(),
            diff_from_previous: diff,
            change_type,
            changed_by,
            change_reason,
            created_at: Utc::now(),
        };

        answer.version = current.version + 1;

        Ok(ReviewOutcome {
            answer,
            version,
            question_status,
        })
    }

    /// Snapshot produced when a fresh AI generation replaces the current
    /// answer text (the answer row is reused; history captures the change).
    pub fn regeneration_snapshot(current: &AnswerRecord, new_text: &str) -> AnswerVersionRecord {
        AnswerVersionRecord {
            id: Uuid::new_v4(),
            answer_id: current.id,
            version_number: current.version,
            content_snapshot: new_text.to_string(),
            diff_from_previous: Some(line_diff(&current.text, new_text)),
            change_type: ChangeType::Regenerate,
            changed_by: None,
            change_reason: Some("Regenerated answer".to_string()),
            created_at: Utc::now(),
        }
    }

    fn invalid(action: &ReviewAction, from: AnswerStatus) -> EngineError {
        EngineError::InvalidTransition {
            action: action.name().to_string(),
            from: from.as_str().to_string(),
        }
    }
}

/// Line-based diff between two texts, rendered with `-`/`+`/space prefixes.
///
/// Small inputs only; the LCS table is quadratic in line count.
pub fn line_diff(old: &str, new: &str) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    // LCS lengths
    let mut table = vec![vec![0usize; new_lines.len() + 1]; old_lines.len() + 1];
    for i in (0..old_lines.len()).rev() {
        for j in (0..new_lines.len()).rev() {
            table[i][j] = if old_lines[i] == new_lines[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old_lines.len() && j < new_lines.len() {
        if old_lines[i] == new_lines[j] {
            out.push(format!("  {}", old_lines[i]));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            out.push(format!("- {}", old_lines[i]));
            i += 1;
        } else {
            out.push(format!("+ {}", new_lines[j]));
            j += 1;
        }
    }
    for line in &old_lines[i..] {
        out.push(format!("- {}", line));
    }
    for line in &new_lines[j..] {
        out.push(format!("+ {}", line));
    }

    out.join("\n")
}
