use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use log::{debug, error, info};
use uuid::Uuid;

use crate::error_handling::types::StorageError;
use crate::storage::storage_trait::{validate_key, ObjectStore};

/// Directory-backed object store: one file per key under `base_path`.
pub struct FileObjectStore {
    base_path: PathBuf,
}

impl FileObjectStore {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, StorageError> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path).map_err(|e| {
            error!("Failed to create store dir {}: {}", base_path.display(), e);
            StorageError::ConnectionFailed
        })?;
        info!("FileObjectStore initialized at {}", base_path.display());
        Ok(Self { base_path })
    }

    /// Construct a store using env var NETSNIFF_STORE_DIR if set, otherwise `./captures`.
    pub fn new_default() -> Result<Self, StorageError> {
        if let Ok(dir) = std::env::var("NETSNIFF_STORE_DIR") {
            info!("Using FileObjectStore from NETSNIFF_STORE_DIR: {}", dir);
            return Self::new(PathBuf::from(dir));
        }
        let cwd = std::env::current_dir().map_err(|e| {
            error!("Failed to get current dir: {}", e);
            StorageError::ConnectionFailed
        })?;
        Self::new(cwd.join("captures"))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

impl ObjectStore for FileObjectStore {
    fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        let tmp = self.base_path.join(format!(".{}.{}.tmp", key, Uuid::new_v4()));
        let written = File::create(&tmp)
            .and_then(|mut f| {
                f.write_all(bytes)?;
                f.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = written {
            error!("Failed to store object {}: {}", path.display(), e);
            let _ = fs::remove_file(&tmp);
            return Err(StorageError::WriteFailed);
        }
        debug!("Stored {} byte(s) as {}", bytes.len(), path.display());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        if !path.is_file() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        let mut buf = Vec::new();
        File::open(&path)
            .and_then(|mut f| f.read_to_end(&mut buf))
            .map_err(|e| {
                error!("Read failed {}: {}", path.display(), e);
                StorageError::ReadFailed
            })?;
        Ok(buf)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| {
            error!("Failed to read store dir {}: {}", self.base_path.display(), e);
            StorageError::ReadFailed
        })?;
        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                error!("Dir entry error: {}", e);
                StorageError::ReadFailed
            })?;
            if !entry.path().is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) && name.ends_with(".csv") && !name.starts_with('.') {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
