mod app_state;
mod config;
mod models;
mod routes;
mod services;

use axum::{routing::get, routing::post, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use app_state::AppState;
use config::RelayConfig;
use services::{producer::CommandProducer, store::S3QueueStore};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = RelayConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing command-relay server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "relay_commands_submitted_total",
        "Total commands written into the queue"
    );
    metrics::describe_counter!(
        "relay_submit_busy_total",
        "Submissions rejected because a command was already outstanding"
    );
    metrics::describe_counter!(
        "relay_results_received_total",
        "Results collected and acknowledged by the producer"
    );
    metrics::describe_counter!(
        "relay_result_timeouts_total",
        "Result waits that expired before a matching result appeared"
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

    let producer = CommandProducer::new(Arc::new(store), &config);
    let state = AppState::new(producer, config.clone());

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/invoke", post(routes::invoke::invoke))
        .route("/status", get(routes::invoke::queue_status))
        .with_state(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting command-relay on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
