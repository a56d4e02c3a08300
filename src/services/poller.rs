use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::RelayConfig;
use crate::models::command::{Command, CommandStatus};
use crate::models::result::{ResultStatus, TaskResult};
use crate::services::lifecycle::{self, with_backoff, RetryPolicy};
use crate::services::runner::TaskRunner;
use crate::services::store::{self, QueueStore, Slot, StoreError};

/// Worker side of the relay: runs inside the restricted environment and
/// polls the command slot on a timer, since nothing outside can reach in.
/// A found command is claimed, handed to the task runner, and answered
/// with a result record before the command is deleted.
pub struct WorkerPoller<S: QueueStore, R: TaskRunner> {
    store: Arc<S>,
    runner: R,
    poll_interval: Duration,
    staleness_threshold: Duration,
    claim_timeout: Duration,
    retry: RetryPolicy,
}

impl<S: QueueStore, R: TaskRunner> WorkerPoller<S, R> {
    pub fn new(store: Arc<S>, runner: R, config: &RelayConfig) -> Self {
        Self {
            store,
            runner,
            poll_interval: config.poll_interval(),
            staleness_threshold: config.staleness_threshold(),
            claim_timeout: config.claim_timeout(),
            retry: config.retry_policy(),
        }
    }

    /// Free-running poll loop. Checks the shutdown channel at every
    /// iteration boundary so it never blocks a full interval past a stop
    /// request.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            poll_interval_secs = self.poll_interval.as_secs(),
            "worker poller started"
        );

        loop {
            match self.poll_once().await {
                Ok(true) => tracing::debug!("command handled, waiting for next poll"),
                Ok(false) => tracing::trace!("no pending command"),
                Err(e) => {
                    tracing::error!(error = %e, "poll cycle failed, will retry next interval");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => {
                    tracing::info!("shutdown signal received, stopping poller");
                    return;
                }
            }
        }
    }

    /// One poll cycle. Returns `Ok(true)` if a command was handled (run,
    /// reclaimed, or dropped as stale) this cycle.
    pub async fn poll_once(&self) -> Result<bool, PollerError> {
        let Some(command) = self.read_command().await? else {
            return Ok(false);
        };

        match command.status {
            CommandStatus::Claimed => {
                let claimed_at = command.claimed_at.unwrap_or(command.issued_at);
                if !lifecycle::is_stale(claimed_at, self.claim_timeout) {
                    // Another poller instance is working on it.
                    tracing::debug!(command_id = %command.id, "command already claimed, skipping");
                    return Ok(false);
                }
                // The claiming poller died without writing a result. Demote
                // the claim and run it again; duplicate execution is the
                // accepted cost of never hanging the producer.
                tracing::warn!(
                    command_id = %command.id,
                    "reclaiming command whose claim expired"
                );
                metrics::counter!("relay_commands_reclaimed_total").increment(1);
            }
            CommandStatus::Pending => {
                if lifecycle::is_stale(command.issued_at, self.staleness_threshold) {
                    // The producer gave up on this long ago; nobody would
                    // collect the result. Reclaim the slot.
                    tracing::warn!(command_id = %command.id, "dropping stale pending command");
                    with_backoff(&self.retry, || self.store.delete(Slot::Command)).await?;
                    return Ok(true);
                }
            }
        }

        self.execute(command).await?;
        Ok(true)
    }

    /// Claim the command, run it, write the result, delete the command.
    async fn execute(&self, command: Command) -> Result<(), PollerError> {
        // Claim before executing. Best effort only: the store has no
        // compare-and-swap, so a second poller overlapping within one poll
        // interval can still observe the pending record.
        let claimed = command.claimed();
        let record = store::encode(&claimed)?;
        with_backoff(&self.retry, || self.store.put(Slot::Command, &record)).await?;

        tracing::info!(
            command_id = %claimed.id,
            task = %claimed.payload.task,
            "claimed command, starting task"
        );
        metrics::counter!("relay_commands_claimed_total").increment(1);

        let started = std::time::Instant::now();
        let result = match self.runner.run_task(&claimed.payload).await {
            Ok(outcome) => {
                let status = if outcome.success {
                    ResultStatus::Success
                } else {
                    ResultStatus::Failure
                };
                TaskResult::for_command(claimed.id, status, outcome.detail)
            }
            // A runner error must still produce a result record; a claimed
            // command with no eventual result is a silent hang on the
            // producer side.
            Err(e) => {
                tracing::error!(command_id = %claimed.id, error = %e, "task runner failed");
                TaskResult::for_command(claimed.id, ResultStatus::Failure, e.to_string())
            }
        };
        metrics::histogram!("relay_task_duration_seconds").record(started.elapsed().as_secs_f64());
        if result.status == ResultStatus::Failure {
            metrics::counter!("relay_tasks_failed_total").increment(1);
        }

        // Result write precedes command delete. A crash between the two
        // leaves both records, which the next cycle resolves by id; losing
        // the request silently is the one outcome the protocol forbids.
        let record = store::encode(&result)?;
        with_backoff(&self.retry, || self.store.put(Slot::Result, &record)).await?;
        with_backoff(&self.retry, || self.store.delete(Slot::Command)).await?;

        tracing::info!(
            command_id = %result.command_id,
            status = %result.status,
            duration_secs = started.elapsed().as_secs_f64(),
            "result written, command slot cleared"
        );

        Ok(())
    }

    async fn read_command(&self) -> Result<Option<Command>, StoreError> {
        let bytes = with_backoff(&self.retry, || self.store.get(Slot::Command)).await?;
        bytes.map(|b| store::decode(&b)).transpose()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}
