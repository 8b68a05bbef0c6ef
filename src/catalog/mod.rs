//! Persisted, sequence-ordered list of accepted downloads.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::CATALOG_DOCUMENT;
use crate::dedup::Fingerprint;
use crate::store::StateStore;

pub mod cleanup;

pub use cleanup::{cleanup, cleanup_all, reset_history, CleanupError};

/// One accepted image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(rename = "stt")]
    pub sequence: u64,
    pub title: String,
    #[serde(rename = "local_image_path")]
    pub local_path: String,
    #[serde(rename = "hash")]
    pub fingerprint: Fingerprint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downloaded_at: Option<DateTime<Utc>>,
}

impl CatalogRecord {
    #[must_use]
    pub fn path(&self) -> &Path {
        Path::new(&self.local_path)
    }
}

/// Reader and single writer of the catalog document.
pub struct Catalog {
    store: Arc<dyn StateStore>,
}

impl Catalog {
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Load every record. An unreadable or malformed document reads as empty.
    pub async fn load(&self) -> Vec<CatalogRecord> {
        let bytes = match self.store.load(CATALOG_DOCUMENT).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!("Catalog unreadable, treating as empty: {e:#}");
                return Vec::new();
            }
        };

        match serde_json::from_slice::<Vec<CatalogRecord>>(&bytes) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Catalog document is malformed, treating as empty");
                Vec::new()
            }
        }
    }

    /// Merge new records into the catalog and rewrite it sorted by sequence.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be written.
    pub async fn append(&self, records: Vec<CatalogRecord>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let added = records.len();
        let mut all = self.load().await;
        all.extend(records);
        all.sort_by_key(|r| r.sequence);
        self.write(&all).await?;

        debug!(added, total = all.len(), "Catalog updated");
        Ok(())
    }

    /// Record stored at `path`, matched after making both sides absolute.
    pub async fn find_by_path(&self, path: &Path) -> Option<CatalogRecord> {
        let wanted = absolute_path(path);
        self.load()
            .await
            .into_iter()
            .find(|r| absolute_path(r.path()) == wanted)
    }

    /// Drop the record stored at `path`, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be written.
    pub async fn remove_by_path(&self, path: &Path) -> Result<Option<CatalogRecord>> {
        let wanted = absolute_path(path);
        let mut all = self.load().await;
        let Some(index) = all.iter().position(|r| absolute_path(r.path()) == wanted) else {
            return Ok(None);
        };
        let removed = all.remove(index);
        self.write(&all).await?;
        Ok(Some(removed))
    }

    /// Empty the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be written.
    pub async fn clear(&self) -> Result<()> {
        self.write(&[]).await
    }

    async fn write(&self, records: &[CatalogRecord]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(records).context("Failed to serialize catalog")?;
        self.store
            .save(CATALOG_DOCUMENT, &bytes)
            .await
            .context("Failed to persist catalog")
    }
}

/// `path` resolved against the working directory, without touching the disk.
///
/// Falls back to the path as given if the working directory is unavailable.
#[must_use]
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
