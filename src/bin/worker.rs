use command_relay::{
    config::RelayConfig,
    services::{poller::WorkerPoller, runner::ProcessTaskRunner, store::S3QueueStore},
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting command-relay worker");

    // Load configuration
    let config = RelayConfig::from_env().expect("Failed to load configuration");

    let task_command = config
        .task_command
        .clone()
        .expect("TASK_COMMAND must be set for the worker");

    // Register worker metrics
    metrics::describe_counter!(
        "relay_commands_claimed_total",
        "Commands claimed for execution"
    );
    metrics::describe_counter!(
        "relay_commands_reclaimed_total",
        "Commands re-claimed after an expired claim"
    );
    metrics::describe_counter!("relay_tasks_failed_total", "Task executions that failed");
    metrics::describe_histogram!(
        "relay_task_duration_seconds",
        "Wall-clock time spent running a task"
    );

    // Initialize the shared queue store
    tracing::info!("Connecting to queue store");
    let store = S3QueueStore::new(
        &config.queue_bucket,
        &config.queue_endpoint,
        &config.queue_access_key,
        &config.queue_secret_key,
        &config.queue_prefix,
    )
    .expect("Failed to initialize queue store");

    let runner = ProcessTaskRunner::new(task_command);
    let poller = WorkerPoller::new(Arc::new(store), runner, &config);

    // Ctrl-C requests a stop; the poller checks the channel every cycle.
    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, requesting shutdown");
            let _ = shutdown_tx.send(());
        }
    });

    tracing::info!("Worker ready, starting poll loop");
    poller.run(shutdown_rx).await;

    tracing::info!("Worker stopped");
}
