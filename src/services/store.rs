use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Named logical slots within the shared mailbox namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Command,
    Result,
}

impl Slot {
    pub fn name(self) -> &'static str {
        match self {
            Slot::Command => "command",
            Slot::Result => "result",
        }
    }
}

/// Shared remote key/value surface — the only channel between producer and
/// worker. The store offers no compare-and-swap and no locking, and reads
/// are only eventually consistent with prior writes; every higher-level
/// guarantee is built from identifiers and timestamps in the records.
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn put(&self, slot: Slot, record: &[u8]) -> Result<(), StoreError>;

    /// A missing record reads as `None`, never as an error.
    async fn get(&self, slot: Slot) -> Result<Option<Vec<u8>>, StoreError>;

    /// Deleting an already-empty slot is a no-op.
    async fn delete(&self, slot: Slot) -> Result<(), StoreError>;
}

/// Serialize a record for the wire.
pub fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(StoreError::Serialize)
}

/// Parse a record read from a slot.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::Serialize)
}

/// Queue store backed by an S3-compatible object bucket. Each slot is one
/// JSON object under the configured key prefix.
pub struct S3QueueStore {
    bucket: Box<Bucket>,
    prefix: String,
}

impl S3QueueStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        prefix: &str,
    ) -> Result<Self, StoreError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StoreError::Config(e.to_string()))?;

        Ok(Self {
            bucket,
            prefix: prefix.trim_end_matches('/').to_string(),
        })
    }

    fn key(&self, slot: Slot) -> String {
        format!("{}/{}.json", self.prefix, slot.name())
    }
}

#[async_trait]
impl QueueStore for S3QueueStore {
    async fn put(&self, slot: Slot, record: &[u8]) -> Result<(), StoreError> {
        self.bucket
            .put_object_with_content_type(self.key(slot), record, "application/json")
            .await
            .map_err(StoreError::S3)?;
        Ok(())
    }

    async fn get(&self, slot: Slot) -> Result<Option<Vec<u8>>, StoreError> {
        match self.bucket.get_object(self.key(slot)).await {
            Ok(response) => Ok(Some(response.to_vec())),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(None),
            Err(e) => Err(StoreError::S3(e)),
        }
    }

    async fn delete(&self, slot: Slot) -> Result<(), StoreError> {
        match self.bucket.delete_object(self.key(slot)).await {
            Ok(_) => Ok(()),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(StoreError::S3(e)),
        }
    }
}

/// In-memory queue store for tests and local development.
#[derive(Default)]
pub struct MemoryQueueStore {
    slots: Mutex<HashMap<Slot, Vec<u8>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn put(&self, slot: Slot, record: &[u8]) -> Result<(), StoreError> {
        self.slots
            .lock()
            .expect("slot map poisoned")
            .insert(slot, record.to_vec());
        Ok(())
    }

    async fn get(&self, slot: Slot) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.slots.lock().expect("slot map poisoned").get(&slot).cloned())
    }

    async fn delete(&self, slot: Slot) -> Result<(), StoreError> {
        self.slots.lock().expect("slot map poisoned").remove(&slot);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("store configuration error: {0}")]
    Config(String),

    #[error("record serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
