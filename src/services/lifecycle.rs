//! Correlation and lifecycle helpers shared by both sides of the relay:
//! staleness checks and bounded retry for transient store failures.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::services::store::StoreError;

/// Age of a record timestamp. Clock skew between the two sides can make a
/// freshly written record appear to come from the future; clamp to zero.
pub fn age(stamped_at: DateTime<Utc>) -> Duration {
    (Utc::now() - stamped_at).to_std().unwrap_or_default()
}

/// A record older than the threshold is abandoned and eligible for
/// override or cleanup.
pub fn is_stale(stamped_at: DateTime<Utc>, threshold: Duration) -> bool {
    age(stamped_at) >= threshold
}

/// Bounded exponential backoff for transient store I/O.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }
}

/// Run a store operation, retrying transient failures with exponential
/// backoff up to the policy's limit. The last error is returned once the
/// retries are exhausted.
pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_retries => {
                attempt += 1;
                let delay = policy.base_delay * 2u32.saturating_pow(attempt - 1);
                tracing::warn!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "store operation failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
