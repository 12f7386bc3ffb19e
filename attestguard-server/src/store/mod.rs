//! Device record storage
//!
//! Records are keyed by the hardware key id. Writes are compare-and-swap on
//! the record version, so of two requests that read the same record only one
//! can write it, whether or not either moves the assertion counter.
//!
//! If `DATABASE_URL` is not set, falls back to in-memory storage (useful for
//! development, but records are lost on restart).

mod memory;
mod postgres;

pub use memory::MemoryDeviceStore;
pub use postgres::PostgresDeviceStore;

use std::sync::Arc;

use async_trait::async_trait;
use attestguard_core::DeviceRecord;

use crate::config::Config;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The record changed between read and write
    #[error("Version conflict for key {key_id}: expected {expected:?}")]
    VersionConflict {
        key_id: String,
        expected: Option<u64>,
    },
}

/// A record to write, guarded by the version observed when it was read.
///
/// `expected_version = None` means the key had no record and the write
/// must create it.
#[derive(Debug, Clone)]
pub struct DeviceUpdate {
    pub record: DeviceRecord,
    pub expected_version: Option<u64>,
}

impl DeviceUpdate {
    /// Build the update for `record`, guarded by the state it was derived from.
    pub fn new(record: DeviceRecord, previous: Option<&DeviceRecord>) -> Self {
        Self {
            record,
            expected_version: previous.map(|r| r.version),
        }
    }

    fn conflict(&self) -> StoreError {
        StoreError::VersionConflict {
            key_id: self.record.key_id.clone(),
            expected: self.expected_version,
        }
    }
}

#[async_trait]
pub trait DeviceRecordStore: Send + Sync {
    async fn get(&self, key_id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Write the record if the stored version still equals `expected_version`.
    async fn upsert(&self, update: DeviceUpdate) -> Result<DeviceRecord, StoreError>;

    async fn check_health(&self) -> Result<(), StoreError>;

    /// Whether records survive a restart
    fn is_persistent(&self) -> bool;
}

/// Create the store described by `config`.
///
/// Uses PostgreSQL if a database URL is configured, otherwise falls back to memory.
pub async fn connect(config: &Config) -> Result<Arc<dyn DeviceRecordStore>, StoreError> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Using PostgreSQL device record storage");
            let store = PostgresDeviceStore::new(url, config.database_max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Ok(Arc::new(MemoryDeviceStore::new()))
        }
    }
}
