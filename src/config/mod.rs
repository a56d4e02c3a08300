use std::time::Duration;

use serde::Deserialize;

use crate::services::lifecycle::RetryPolicy;

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Only used by the
    /// producer-side server.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// S3-compatible bucket holding the command/result slots
    pub queue_bucket: String,

    /// Endpoint URL of the S3-compatible store
    pub queue_endpoint: String,

    /// Access key for the store
    pub queue_access_key: String,

    /// Secret key for the store
    pub queue_secret_key: String,

    /// Key prefix namespacing the two slots within the bucket
    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    /// How often the worker polls the command slot, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How often the producer polls the result slot while waiting, in seconds
    #[serde(default = "default_result_poll_interval_secs")]
    pub result_poll_interval_secs: u64,

    /// How long the producer waits for a result before reporting timeout,
    /// in seconds
    #[serde(default = "default_result_wait_timeout_secs")]
    pub result_wait_timeout_secs: u64,

    /// Age past which an outstanding command or orphaned result is
    /// considered abandoned, in seconds
    #[serde(default = "default_staleness_threshold_secs")]
    pub staleness_threshold_secs: u64,

    /// Age past which a claim with no result is considered dead and the
    /// command reclaimable, in seconds
    #[serde(default = "default_claim_timeout_secs")]
    pub claim_timeout_secs: u64,

    /// Retry limit for transient store failures
    #[serde(default = "default_store_max_retries")]
    pub store_max_retries: u32,

    /// Base delay for store retry backoff, in milliseconds
    #[serde(default = "default_store_retry_base_ms")]
    pub store_retry_base_ms: u64,

    /// Task submitted by /invoke when the request names none
    #[serde(default = "default_task")]
    pub default_task: String,

    /// Local program the worker runs per command. Required by the worker
    /// binary only.
    #[serde(default)]
    pub task_command: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_queue_prefix() -> String {
    "relay-queue".to_string()
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_result_poll_interval_secs() -> u64 {
    10
}

fn default_result_wait_timeout_secs() -> u64 {
    300
}

fn default_staleness_threshold_secs() -> u64 {
    600
}

// Roughly three missed worker poll cycles.
fn default_claim_timeout_secs() -> u64 {
    90
}

fn default_store_max_retries() -> u32 {
    3
}

fn default_store_retry_base_ms() -> u64 {
    500
}

fn default_task() -> String {
    "run_automation".to_string()
}

impl RelayConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn result_poll_interval(&self) -> Duration {
        Duration::from_secs(self.result_poll_interval_secs)
    }

    pub fn result_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.result_wait_timeout_secs)
    }

    pub fn staleness_threshold(&self) -> Duration {
        Duration::from_secs(self.staleness_threshold_secs)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.store_max_retries,
            Duration::from_millis(self.store_retry_base_ms),
        )
    }
}
