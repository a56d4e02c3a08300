use std::sync::Arc;

use crate::config::RelayConfig;
use crate::services::producer::CommandProducer;
use crate::services::store::S3QueueStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub producer: Arc<CommandProducer<S3QueueStore>>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(producer: CommandProducer<S3QueueStore>, config: RelayConfig) -> Self {
        Self {
            producer: Arc::new(producer),
            config: Arc::new(config),
        }
    }
}
