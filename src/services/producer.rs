use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::models::command::{Command, CommandPayload};
use crate::models::result::TaskResult;
use crate::services::lifecycle::{self, with_backoff, RetryPolicy};
use crate::services::store::{self, QueueStore, Slot, StoreError};

/// Handle returned by `submit`, used to poll for the matching result.
#[derive(Debug, Clone, Copy)]
pub struct CommandHandle {
    pub id: Uuid,
}

/// Read-only view of both slots, for status queries.
#[derive(Debug, Serialize)]
pub struct QueueSnapshot {
    pub command: Option<Command>,
    pub result: Option<TaskResult>,
}

/// Producer side of the relay: runs in the network-unrestricted
/// environment, writes commands into the shared store, and polls for the
/// matching result. Single-flight is enforced here — a new command is
/// refused while a non-stale one is outstanding, because the store itself
/// offers no locking.
pub struct CommandProducer<S: QueueStore> {
    store: Arc<S>,
    result_poll_interval: Duration,
    staleness_threshold: Duration,
    retry: RetryPolicy,
}

impl<S: QueueStore> CommandProducer<S> {
    pub fn new(store: Arc<S>, config: &RelayConfig) -> Self {
        Self {
            store,
            result_poll_interval: config.result_poll_interval(),
            staleness_threshold: config.staleness_threshold(),
            retry: config.retry_policy(),
        }
    }

    /// Write a fresh pending command into the command slot.
    ///
    /// Refused with `Busy` while a command is already outstanding, unless
    /// that command has gone stale — then it is considered abandoned and
    /// overwritten.
    pub async fn submit(&self, payload: CommandPayload) -> Result<CommandHandle, SubmitError> {
        if let Some(existing) = self.read_command().await? {
            if !lifecycle::is_stale(existing.issued_at, self.staleness_threshold) {
                let age_secs = lifecycle::age(existing.issued_at).as_secs();
                tracing::info!(
                    command_id = %existing.id,
                    age_secs,
                    "submission rejected, command already outstanding"
                );
                metrics::counter!("relay_submit_busy_total").increment(1);
                return Err(SubmitError::Busy { age_secs });
            }
            tracing::warn!(
                command_id = %existing.id,
                "overwriting stale outstanding command"
            );
        }

        let command = Command::pending(payload);
        let record = store::encode(&command)?;
        with_backoff(&self.retry, || self.store.put(Slot::Command, &record)).await?;

        tracing::info!(command_id = %command.id, task = %command.payload.task, "command submitted");
        metrics::counter!("relay_commands_submitted_total").increment(1);

        Ok(CommandHandle { id: command.id })
    }

    /// Poll the result slot until a result matching the handle appears or
    /// the timeout elapses.
    ///
    /// A matching result is deleted from the slot (acknowledgement) before
    /// it is returned. On timeout both slots are left untouched: the worker
    /// may still be executing, and a late result stays collectible by a
    /// later call.
    pub async fn await_result(
        &self,
        handle: &CommandHandle,
        timeout: Duration,
    ) -> Result<TaskResult, AwaitError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match self.read_result().await? {
                Some(result) if result.command_id == handle.id => {
                    with_backoff(&self.retry, || self.store.delete(Slot::Result)).await?;
                    tracing::info!(
                        command_id = %result.command_id,
                        status = %result.status,
                        "result received"
                    );
                    metrics::counter!("relay_results_received_total").increment(1);
                    return Ok(result);
                }
                Some(result) => {
                    // Leftover from an unrelated cycle. Ignore it, and clear
                    // it once it goes stale so it cannot wedge the slot.
                    if lifecycle::is_stale(result.completed_at, self.staleness_threshold) {
                        tracing::warn!(
                            command_id = %result.command_id,
                            "discarding stale orphaned result"
                        );
                        with_backoff(&self.retry, || self.store.delete(Slot::Result)).await?;
                    } else {
                        tracing::debug!(
                            command_id = %result.command_id,
                            expected = %handle.id,
                            "ignoring result for a different command"
                        );
                    }
                }
                None => {}
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                tracing::warn!(command_id = %handle.id, "timed out waiting for result");
                metrics::counter!("relay_result_timeouts_total").increment(1);
                return Err(AwaitError::Timeout(handle.id));
            }
            tokio::time::sleep(self.result_poll_interval.min(deadline - now)).await;
        }
    }

    /// Read-only peek at the current state of both slots.
    pub async fn peek(&self) -> Result<QueueSnapshot, StoreError> {
        Ok(QueueSnapshot {
            command: self.read_command().await?,
            result: self.read_result().await?,
        })
    }

    async fn read_command(&self) -> Result<Option<Command>, StoreError> {
        let bytes = with_backoff(&self.retry, || self.store.get(Slot::Command)).await?;
        bytes.map(|b| store::decode(&b)).transpose()
    }

    async fn read_result(&self) -> Result<Option<TaskResult>, StoreError> {
        let bytes = with_backoff(&self.retry, || self.store.get(Slot::Result)).await?;
        bytes.map(|b| store::decode(&b)).transpose()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// A command is already outstanding and not yet stale.
    #[error("a command is already outstanding ({age_secs}s old)")]
    Busy { age_secs: u64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, thiserror::Error)]
pub enum AwaitError {
    /// No matching result appeared within the wait window. The command is
    /// left in place for possible late completion.
    #[error("no result for command {0} within the wait window")]
    Timeout(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),
}
