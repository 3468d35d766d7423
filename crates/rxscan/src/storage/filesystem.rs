use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::StorageError;
use crate::storage::{validate_key, BlobStore};

/// Blob store rooted at a local directory. Keys map to relative paths.
pub struct FileBlobStore {
    root: PathBuf,
}

impl FileBlobStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        if !path.exists() {
            std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        Ok(())
    }

    /// Writes `content` to a uniquely named sibling file, then renames it
    /// over `path`. Readers see either the old or the new blob, never a
    /// partial one.
    fn write_replacing(&self, path: &Path, content: &[u8]) -> Result<(), StorageError> {
        let dir = path.parent().unwrap_or(&self.root);
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("blob");
        let tmp_path = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        let write_err = |e: std::io::Error| StorageError::WriteBlob {
            path: path.to_path_buf(),
            source: e,
        };

        let result = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .and_then(|mut file| {
                file.write_all(content)?;
                file.sync_all()
            })
            .and_then(|_| std::fs::rename(&tmp_path, path));

        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(write_err(e));
        }
        Ok(())
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent)?;
        }
        self.write_replacing(&path, bytes)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.path_for(key)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlobNotFound(key.to_string())
            } else {
                StorageError::ReadBlob { path, source: e }
            }
        })
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::DeleteBlob { path, source: e }),
        }
    }
}
