pub mod filesystem;
pub mod memory;

pub use filesystem::FileBlobStore;
pub use memory::MemoryBlobStore;

use crate::error::StorageError;
use crate::prescription::OwnerId;
use crate::sanitize::hash_owner;

/// Opaque byte storage addressed by relative keys.
///
/// `put` overwrites an existing blob under the same key. Deleting a missing
/// blob succeeds.
pub trait BlobStore: Send + Sync {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError>;
    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Rejects keys that could escape the store root.
pub fn validate_key(key: &str) -> Result<(), StorageError> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    if key.is_empty() {
        return Err(invalid("key is empty"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(invalid("key must be relative"));
    }
    if key.contains('\0') {
        return Err(invalid("key contains a NUL byte"));
    }
    if key
        .split(['/', '\\'])
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(invalid("key contains an empty or relative segment"));
    }
    Ok(())
}

/// Keys of one image's raw and derived blobs. Derived keys are stable, so a
/// reprocess overwrites the previous artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageKeys {
    pub original: String,
    pub compressed: String,
    pub enhanced: String,
}

impl ImageKeys {
    pub fn new(owner: &OwnerId, job_id: &str, image_id: &str, media_type: &str) -> Self {
        let prefix = format!(
            "prescriptions/{}/{}/{}",
            hash_owner(owner.as_str()),
            job_id,
            image_id
        );
        Self::from_original(format!("{}/original.{}", prefix, extension_for(media_type)))
    }

    /// Rebuilds the derived keys next to an already stored original.
    pub fn from_original(original: impl Into<String>) -> Self {
        let original = original.into();
        let dir = match original.rfind('/') {
            Some(pos) => &original[..pos + 1],
            None => "",
        };
        Self {
            compressed: format!("{}compressed.jpg", dir),
            enhanced: format!("{}enhanced.jpg", dir),
            original,
        }
    }
}

/// File extension used for a stored blob of `media_type`.
pub fn extension_for(media_type: &str) -> &'static str {
    match media_type {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "application/pdf" => "pdf",
        other => mime_guess::get_mime_extensions_str(other)
            .and_then(|exts| exts.first().copied())
            .unwrap_or("bin"),
    }
}
