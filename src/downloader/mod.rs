//! Bounded concurrent image downloader with content deduplication.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use futures_util::{stream, StreamExt};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::CatalogRecord;
use crate::constants::HARVEST_USER_AGENT;
use crate::dedup::{Fingerprint, Ledger};
use crate::walker::Candidate;

pub mod filename;

pub use filename::{choose_extension, image_file_name, sanitize_title};

/// Default number of fetches in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A batch stopped by a storage failure.
///
/// Images accepted before the failure are fully stored and registered, so
/// they are handed back for cataloging.
#[derive(Debug, Error)]
#[error("download batch failed after accepting {} images", .accepted.len())]
pub struct BatchError {
    pub accepted: Vec<CatalogRecord>,
    #[source]
    pub source: anyhow::Error,
}

/// Fetches candidates, keeps only content the ledger has never seen, and
/// writes accepted bytes into the pictures directory.
pub struct Downloader {
    client: Client,
    ledger: Arc<Ledger>,
    pictures_dir: PathBuf,
    concurrency: usize,
    timeout: Duration,
}

impl Downloader {
    /// Create a downloader with its own pooled HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the pictures
    /// directory cannot be made absolute.
    pub fn new(
        ledger: Arc<Ledger>,
        pictures_dir: impl Into<PathBuf>,
        concurrency: usize,
        timeout: Duration,
    ) -> Result<Self> {
        let concurrency = concurrency.max(1);
        let client = Client::builder()
            .user_agent(HARVEST_USER_AGENT)
            .pool_max_idle_per_host(concurrency)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Failed to build HTTP client")?;

        let pictures_dir = pictures_dir.into();
        let pictures_dir = std::path::absolute(&pictures_dir).with_context(|| {
            format!("Failed to resolve pictures directory: {}", pictures_dir.display())
        })?;

        Ok(Self {
            client,
            ledger,
            pictures_dir,
            concurrency,
            timeout,
        })
    }

    #[must_use]
    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Download every candidate, returning records for the accepted ones.
    ///
    /// Records come back in completion order, not input order. Failed fetches
    /// and duplicates are dropped without failing the batch.
    ///
    /// # Errors
    ///
    /// Returns a [`BatchError`] if the pictures directory cannot be created,
    /// the ledger cannot be persisted, or an accepted image cannot be written.
    /// Candidates not yet started are skipped after the first such failure;
    /// downloads already in flight run to completion and their records are
    /// kept in the error.
    pub async fn download_all(
        &self,
        candidates: Vec<Candidate>,
    ) -> Result<Vec<CatalogRecord>, BatchError> {
        if let Err(e) = tokio::fs::create_dir_all(&self.pictures_dir).await {
            return Err(BatchError {
                accepted: Vec::new(),
                source: anyhow::Error::new(e).context(format!(
                    "Failed to create pictures directory: {}",
                    self.pictures_dir.display()
                )),
            });
        }

        let total = candidates.len();
        let aborted = AtomicBool::new(false);
        let mut pending = stream::iter(candidates)
            .map(|candidate| {
                let aborted = &aborted;
                async move {
                    if aborted.load(Ordering::SeqCst) {
                        return Ok(None);
                    }
                    let outcome = self.download_one(candidate).await;
                    if outcome.is_err() {
                        aborted.store(true, Ordering::SeqCst);
                    }
                    outcome
                }
            })
            .buffer_unordered(self.concurrency);

        let mut records = Vec::new();
        let mut failure = None;
        while let Some(outcome) = pending.next().await {
            match outcome {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) if failure.is_none() => failure = Some(e),
                Err(e) => warn!("Additional download failure: {e:#}"),
            }
        }

        if let Some(source) = failure {
            error!(accepted = records.len(), "Download batch aborted: {source:#}");
            return Err(BatchError {
                accepted: records,
                source,
            });
        }

        info!(
            candidates = total,
            accepted = records.len(),
            skipped = total - records.len(),
            "Download batch finished"
        );
        Ok(records)
    }

    async fn download_one(&self, candidate: Candidate) -> Result<Option<CatalogRecord>> {
        let Some((bytes, content_type)) = self.fetch(&candidate).await else {
            return Ok(None);
        };

        let fingerprint = Fingerprint::of(&bytes);
        let Some(sequence) = self.ledger.try_register(&fingerprint).await? else {
            debug!(url = %candidate.url, fingerprint = %fingerprint, "Duplicate content, skipping");
            return Ok(None);
        };

        let extension = choose_extension(&candidate.url, content_type.as_deref());
        let path = self
            .pictures_dir
            .join(image_file_name(sequence, &candidate.title, &extension));

        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            if let Err(rollback) = self.ledger.remove(&fingerprint).await {
                error!(
                    fingerprint = %fingerprint,
                    "Failed to unregister fingerprint after write failure: {rollback:#}"
                );
            }
            return Err(anyhow::Error::new(e))
                .with_context(|| format!("Failed to write image: {}", path.display()));
        }

        debug!(sequence, path = %path.display(), size = bytes.len(), "Saved image");

        Ok(Some(CatalogRecord {
            sequence,
            title: candidate.title,
            local_path: path.to_string_lossy().into_owned(),
            fingerprint,
            source_url: Some(candidate.url),
            downloaded_at: Some(Utc::now()),
        }))
    }

    /// Fetch a candidate's bytes. Any failure is logged and yields `None`.
    async fn fetch(&self, candidate: &Candidate) -> Option<(Vec<u8>, Option<String>)> {
        let response = match self
            .client
            .get(&candidate.url)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url = %candidate.url, error = %e, "Fetch failed");
                return None;
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            debug!(url = %candidate.url, status = %status, "Fetch returned non-200 status");
            return None;
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match response.bytes().await {
            Ok(body) => Some((body.to_vec(), content_type)),
            Err(e) => {
                debug!(url = %candidate.url, error = %e, "Failed to read response body");
                None
            }
        }
    }
}
