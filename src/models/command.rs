use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of the command occupying the shared command slot.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CommandStatus {
    /// Written by the producer, not yet picked up.
    Pending,
    /// A worker has started executing it.
    Claimed,
}

/// Opaque instruction data carried by a command: a task identifier plus
/// whatever parameters the task runner understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandPayload {
    pub task: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CommandPayload {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            params: serde_json::Value::Null,
        }
    }
}

/// One requested unit of work. At most one command exists in the store at
/// any time (single-flight); the `id` correlates it with its result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub payload: CommandPayload,
    pub status: CommandStatus,
    /// Stamped when a worker claims the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
}

impl Command {
    /// Fresh pending command stamped with a new id and the current time.
    pub fn pending(payload: CommandPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            issued_at: Utc::now(),
            payload,
            status: CommandStatus::Pending,
            claimed_at: None,
        }
    }

    /// Claimed copy of this command, stamped with the claim time. The
    /// worker re-writes the slot with this before starting execution.
    pub fn claimed(&self) -> Self {
        Self {
            status: CommandStatus::Claimed,
            claimed_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}
