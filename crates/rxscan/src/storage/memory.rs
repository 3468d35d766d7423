use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::error::StorageError;
use crate::storage::{validate_key, BlobStore};

/// In-process blob store for tests and single-process deployments.
///
/// Keys registered with [`MemoryBlobStore::fail_writes_to`] reject `put`,
/// which lets callers exercise storage failures.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    failing_suffixes: RwLock<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future `put` to a key ending in `suffix` fail.
    pub fn fail_writes_to(&self, suffix: impl Into<String>) {
        if let Ok(mut suffixes) = self.failing_suffixes.write() {
            suffixes.insert(suffix.into());
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.blobs
            .read()
            .map(|blobs| blobs.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.blobs.read().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        validate_key(key)?;

        let failing = self
            .failing_suffixes
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .iter()
            .any(|suffix| key.ends_with(suffix.as_str()));
        if failing {
            return Err(StorageError::WriteBlob {
                path: key.into(),
                source: std::io::Error::other("write rejected"),
            });
        }

        self.blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        validate_key(key)?;
        self.blobs
            .read()
            .map_err(|_| StorageError::LockPoisoned)?
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::BlobNotFound(key.to_string()))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        self.blobs
            .write()
            .map_err(|_| StorageError::LockPoisoned)?
            .remove(key);
        Ok(())
    }
}
