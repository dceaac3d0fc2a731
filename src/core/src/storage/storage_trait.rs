//! Storage Trait
//!
//! This module defines the `ObjectStore` trait, the interface of the durable
//! storage collaborator the capture pipeline hands finished captures to.
//!
//! Implementors are responsible for:
//! - Persisting an object under a flat key
//! - Retrieving a previously persisted object
//! - Listing persisted objects by key prefix
//!
//! All methods return a `Result` to handle potential storage errors.

use crate::error_handling::types::StorageError;

pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` under `key`, replacing any previous object.
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;

    /// Retrieves the object stored under `key`.
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Lists the keys of persisted captures starting with `prefix`, sorted.
    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Rejects keys that could escape a flat namespace.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    if key.is_empty()
        || key.contains('/')
        || key.contains('\\')
        || key.starts_with('.')
        || key.contains("..")
    {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
