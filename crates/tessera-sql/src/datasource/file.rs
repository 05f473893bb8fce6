//! Cache entries kept as files in a directory, so they outlive the process.
//!
//! Each key maps to one file named by the hex encoding of the key. A
//! publish writes a private temporary file and then hard-links it into
//! place, which fails if the entry already exists, so readers only ever see
//! a complete file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{CacheHandle, CacheProvider};
use crate::error::{ExecResult, ExecutionError};

static NEXT_TEMP_ID: AtomicU64 = AtomicU64::new(0);

/// Cache entries stored under a directory.
#[derive(Debug, Clone)]
pub struct FileCacheProvider {
    dir: PathBuf,
}

impl FileCacheProvider {
    /// Opens (creating if needed) a cache rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> ExecResult<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(ExecutionError::external)?;
        Ok(Self { dir })
    }

    /// Returns the cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry(&self, key: &str) -> FileCacheEntry {
        let name: String = key.bytes().map(|b| format!("{:02x}", b)).collect();
        FileCacheEntry {
            path: self.dir.join(format!("{}.ndjson", name)),
        }
    }
}

#[async_trait]
impl CacheProvider for FileCacheProvider {
    async fn exists(&self, key: &str) -> ExecResult<bool> {
        self.entry(key).is_complete().await
    }

    async fn get_file_stream(&self, path: &str) -> ExecResult<Arc<dyn CacheHandle>> {
        let entry: Arc<dyn CacheHandle> = Arc::new(self.entry(path));
        Ok(entry)
    }

    async fn remove(&self, key: &str) -> ExecResult<()> {
        match tokio::fs::remove_file(&self.entry(key).path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(ExecutionError::external(e)),
            _ => Ok(()),
        }
    }
}

/// One file-backed cache entry.
#[derive(Debug, Clone)]
pub struct FileCacheEntry {
    path: PathBuf,
}

impl FileCacheEntry {
    /// Returns the entry's file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let id = NEXT_TEMP_ID.fetch_add(1, Ordering::Relaxed);
        self.path
            .with_extension(format!("{}-{}.tmp", std::process::id(), id))
    }
}

#[async_trait]
impl CacheHandle for FileCacheEntry {
    async fn contents(&self) -> ExecResult<Vec<u8>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(ExecutionError::external(e)),
        }
    }

    async fn is_complete(&self) -> ExecResult<bool> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(ExecutionError::external)
    }

    async fn publish(&self, bytes: Vec<u8>) -> ExecResult<bool> {
        if self.is_complete().await? {
            return Ok(false);
        }
        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(ExecutionError::external)?;
        let linked = tokio::fs::hard_link(&temp, &self.path).await;
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            tracing::warn!(path = %temp.display(), error = %e, "failed to remove temporary cache file");
        }
        match linked {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), bytes = bytes.len(), "published cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(ExecutionError::external(e)),
        }
    }
}
