//! Durable key-value storage for opaque binary values.
//!
//! The session keeps its whole database image under a single key, but the
//! [`BlobStore`] seam takes arbitrary keys. [`FsBlobStore`] keeps one file
//! per key in a data directory; [`MemoryBlobStore`] is process-local and is
//! meant for tests and previews.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use directories::ProjectDirs;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

const WRITE_CHECK_FILE: &str = ".write-check";
const TEMP_SUFFIX: &str = ".tmp";

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Value stored under `key`, `None` if nothing was ever stored.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &[u8]) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Filesystem
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    base_path: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `base_path`, creating the directory if needed.
    ///
    /// The directory is tested with a throwaway write so that an unusable
    /// location fails here rather than on the first checkpoint.
    pub async fn open(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path)
            .await
            .map_err(|e| unavailable("create", &base_path, e))?;

        let check = base_path.join(WRITE_CHECK_FILE);
        fs::write(&check, b"check")
            .await
            .map_err(|e| unavailable("write to", &base_path, e))?;
        fs::remove_file(&check)
            .await
            .map_err(|e| unavailable("clean up", &base_path, e))?;

        info!(path = %base_path.display(), "blob store opened");

        Ok(Self { base_path })
    }

    /// Platform data directory for the application:
    /// - Linux:   `~/.local/share/cvmatch`
    /// - macOS:   `~/Library/Application Support/com.cvmatch.cvmatch`
    /// - Windows: `{FOLDERID_RoamingAppData}\cvmatch\cvmatch\data`
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("com", "cvmatch", "cvmatch")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                StoreError::BlobStoreUnavailable(
                    "could not determine application data directory".to_string(),
                )
            })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Keys map straight to file names inside the base directory. Accepts
    /// ASCII letters, digits, `_`, `-` and `.`, and refuses names the store
    /// uses for itself.
    pub fn validate_key(key: &str) -> Result<()> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && key != "."
            && !key.contains("..")
            && !key.ends_with(TEMP_SUFFIX)
            && key != WRITE_CHECK_FILE;
        if !valid {
            return Err(StoreError::InvalidInput(format!("invalid blob key: {key:?}")));
        }
        Ok(())
    }

    fn key_path(&self, key: &str) -> Result<PathBuf> {
        Self::validate_key(key)?;
        Ok(self.base_path.join(key))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.key_path(key)?;

        match fs::read(&path).await {
            Ok(data) => {
                debug!(key, size = data.len(), "read blob");
                Ok(Some(data))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable("read", &path, e)),
        }
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let path = self.key_path(key)?;
        let tmp = self.base_path.join(format!("{key}{TEMP_SUFFIX}"));

        let mut file = fs::File::create(&tmp)
            .await
            .map_err(|e| unavailable("create", &tmp, e))?;
        file.write_all(value)
            .await
            .map_err(|e| unavailable("write", &tmp, e))?;
        // Data must be on disk before the rename makes it the live image.
        file.sync_all()
            .await
            .map_err(|e| unavailable("sync", &tmp, e))?;
        drop(file);
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| unavailable("replace", &path, e))?;

        debug!(key, size = value.len(), "stored blob");
        Ok(())
    }
}

fn unavailable(action: &str, path: &Path, err: std::io::Error) -> StoreError {
    StoreError::BlobStoreUnavailable(format!(
        "failed to {action} '{}': {err}",
        path.display()
    ))
}

// ---------------------------------------------------------------------------
// Memory
// ---------------------------------------------------------------------------

/// In-process store. Clones share the same map, so a clone outlives the
/// session that wrote to it.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::BlobStoreUnavailable(format!("lock poisoned: {e}")))?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| StoreError::BlobStoreUnavailable(format!("lock poisoned: {e}")))?;
        entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
