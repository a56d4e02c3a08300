use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome classification of a completed command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResultStatus {
    Success,
    Failure,
    Timeout,
}

/// The outcome of exactly one command. `command_id` must match the command
/// that produced it; a result with no matching command is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub command_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub status: ResultStatus,
    /// Human-readable outcome: a summary line on success, the error text
    /// on failure.
    pub detail: String,
}

impl TaskResult {
    /// Result for the given command, stamped with the completion time.
    pub fn for_command(command_id: Uuid, status: ResultStatus, detail: impl Into<String>) -> Self {
        Self {
            command_id,
            completed_at: Utc::now(),
            status,
            detail: detail.into(),
        }
    }
}
