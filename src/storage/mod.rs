// Storage backend abstraction
// Client-local key-value persistence for device identity, the session registry and per-user sessions

pub mod file;
pub mod memory;

use crate::config::StorageConfig;
use async_trait::async_trait;
use std::sync::Arc;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Key-value store holding serialized text values.
///
/// Each call is a single-key read or write; there is no multi-key transaction.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Storage errors
#[derive(Debug, Clone)]
pub enum StorageError {
    ConnectionError(String),
    SerializationError(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            StorageError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Factory function to create a store based on configuration
pub fn create_store(config: &StorageConfig) -> Arc<dyn KeyValueStore> {
    match config {
        StorageConfig::Memory => Arc::new(MemoryStore::new()),
        StorageConfig::File { path } => Arc::new(FileStore::new(path)),
    }
}
