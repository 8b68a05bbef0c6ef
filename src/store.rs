//! Key-value document storage for persisted harvest state.
//!
//! The ledger and catalog only see opaque byte documents addressed by key; how
//! those documents reach the disk lives here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

/// Durable storage for named documents.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Load a document. Returns `Ok(None)` if it has never been written.
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace a document with new contents.
    async fn save(&self, key: &str, contents: &[u8]) -> Result<()>;
}

/// Stores each document as a file in a single directory.
///
/// Writes go to a sibling temp file that is renamed over the target, so a crash
/// mid-write leaves the previous version intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

#[async_trait]
impl StateStore for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Document not found");
                Ok(None)
            }
            Err(e) => Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn save(&self, key: &str, contents: &[u8]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create data directory: {}", self.dir.display()))?;

        let path = self.path_for(key);
        let tmp = self.dir.join(format!(".{key}.tmp"));
        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}
