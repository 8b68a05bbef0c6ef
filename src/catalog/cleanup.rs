//! Removal of stored images together with their catalog and ledger entries.
//!
//! Steps always run in the same order: catalog record, ledger fingerprint, file.
//! A failure after the first step leaves the three out of sync and is reported
//! as a partial cleanup naming what was already removed.

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use super::{Catalog, CatalogRecord};
use crate::dedup::Ledger;

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("no catalog record for {}", .0.display())]
    NotCataloged(PathBuf),
    #[error("failed to update catalog, nothing was removed")]
    Catalog {
        #[source]
        source: anyhow::Error,
    },
    #[error("catalog record {} removed but ledger still holds its fingerprint", .record.sequence)]
    LedgerPartial {
        record: CatalogRecord,
        #[source]
        source: anyhow::Error,
    },
    #[error("metadata for {} removed but the file could not be deleted", .record.local_path)]
    FilePartial {
        record: CatalogRecord,
        #[source]
        source: std::io::Error,
    },
}

impl CleanupError {
    /// Whether persisted state was left inconsistent.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        matches!(self, Self::LedgerPartial { .. } | Self::FilePartial { .. })
    }
}

/// Delete the image stored at `path` and forget it.
///
/// A file that is already gone counts as deleted.
///
/// # Errors
///
/// See [`CleanupError`]; partial failures are never swallowed.
pub async fn cleanup(
    catalog: &Catalog,
    ledger: &Ledger,
    path: &Path,
) -> Result<CatalogRecord, CleanupError> {
    let record = catalog
        .remove_by_path(path)
        .await
        .map_err(|source| CleanupError::Catalog { source })?
        .ok_or_else(|| CleanupError::NotCataloged(path.to_path_buf()))?;

    if let Err(source) = ledger.remove(&record.fingerprint).await {
        return Err(CleanupError::LedgerPartial { record, source });
    }

    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %path.display(), "Image file was already missing");
        }
        Err(source) => return Err(CleanupError::FilePartial { record, source }),
    }

    info!(
        sequence = record.sequence,
        path = %path.display(),
        "Removed image"
    );
    Ok(record)
}

/// Clean up every cataloged image, stopping at the first failure.
///
/// Returns the number of images removed.
///
/// # Errors
///
/// Returns the first [`CleanupError`] encountered.
pub async fn cleanup_all(catalog: &Catalog, ledger: &Ledger) -> Result<usize, CleanupError> {
    let records = catalog.load().await;
    let mut removed = 0;
    for record in records {
        cleanup(catalog, ledger, record.path()).await?;
        removed += 1;
    }
    Ok(removed)
}

/// Forget all history without touching stored files.
///
/// Empties the catalog and the ledger's fingerprint set. The sequence counter
/// is kept, so later downloads never reuse a number already on disk.
///
/// # Errors
///
/// Returns an error if either document cannot be written.
pub async fn reset_history(catalog: &Catalog, ledger: &Ledger) -> Result<()> {
    catalog.clear().await?;
    ledger.reset().await?;
    info!("History reset");
    Ok(())
}
