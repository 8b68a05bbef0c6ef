//! One harvest run: crawl, download, catalog.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::catalog::{self, Catalog, CatalogRecord, CleanupError};
use crate::config::Config;
use crate::dedup::Ledger;
use crate::downloader::{BatchError, Downloader};
use crate::progress::{CancelFn, ProgressSink};
use crate::store::{JsonFileStore, StateStore};
use crate::walker::{ChromiumDriver, PageDriver, PageRange, PageWalker, WalkState};

/// What a run did.
#[derive(Debug, Clone)]
pub struct HarvestSummary {
    /// Candidates the walker produced.
    pub candidates: usize,
    /// Newly accepted images, sorted by sequence.
    pub accepted: Vec<CatalogRecord>,
    /// Last page the browser reached.
    pub last_page: u32,
    /// Whether the walk ran to completion or was stopped.
    pub final_state: WalkState,
}

/// Owns the ledger and catalog for one data directory.
pub struct Harvester {
    config: Config,
    ledger: Arc<Ledger>,
    catalog: Catalog,
}

impl Harvester {
    /// Harvester storing its documents under `config.data_dir`.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let store: Arc<dyn StateStore> = Arc::new(JsonFileStore::new(&config.data_dir));
        Self::with_store(config, store)
    }

    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn StateStore>) -> Self {
        Self {
            ledger: Arc::new(Ledger::new(Arc::clone(&store))),
            catalog: Catalog::new(store),
            config,
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Crawl `range` in a fresh browser and store every new image.
    ///
    /// # Errors
    ///
    /// Returns an error if the browser cannot start, the gallery cannot be
    /// loaded, or storage fails.
    pub async fn run(
        &self,
        range: PageRange,
        cancel: &CancelFn<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<HarvestSummary> {
        let driver = ChromiumDriver::launch(self.config.chromium_options())
            .await
            .context("Failed to start browser")?;
        self.run_with_driver(driver, range, cancel, progress).await
    }

    /// Same as [`Harvester::run`] with a caller-supplied page driver.
    ///
    /// The driver is closed once the walk ends, before downloads start.
    ///
    /// # Errors
    ///
    /// Returns an error if the gallery cannot be loaded or storage fails.
    /// Images stored before a storage failure are still cataloged.
    pub async fn run_with_driver<D: PageDriver>(
        &self,
        driver: D,
        range: PageRange,
        cancel: &CancelFn<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<HarvestSummary> {
        let mut walker = PageWalker::new(driver, self.config.walker_options())?;
        let walked = walker.walk(range, cancel, progress).await;
        let final_state = walker.state();
        let last_page = walker.current_page();

        let mut driver = walker.into_driver();
        if let Err(e) = driver.close().await {
            warn!("Failed to close browser session: {e:#}");
        }

        let candidates = walked?;
        let total = candidates.len();
        if candidates.is_empty() {
            info!("No candidates found");
            return Ok(HarvestSummary {
                candidates: 0,
                accepted: Vec::new(),
                last_page,
                final_state,
            });
        }

        progress.notify(last_page, &format!("Downloading {total} images"));
        let downloader = Downloader::new(
            Arc::clone(&self.ledger),
            &self.config.pictures_dir,
            self.config.max_concurrent_downloads,
            self.config.download_timeout,
        )?;
        let mut accepted = match downloader.download_all(candidates).await {
            Ok(accepted) => accepted,
            Err(BatchError {
                mut accepted,
                source,
            }) => {
                // Stored and registered images must reach the catalog.
                accepted.sort_by_key(|r| r.sequence);
                if let Err(e) = self.catalog.append(accepted).await {
                    error!("Failed to catalog images accepted before the failure: {e:#}");
                }
                return Err(source.context("Download batch failed"));
            }
        };
        accepted.sort_by_key(|r| r.sequence);

        if accepted.is_empty() {
            info!("No new images, everything was already downloaded");
        } else {
            self.catalog
                .append(accepted.clone())
                .await
                .context("Failed to update catalog")?;
        }

        progress.notify(last_page, &format!("Saved {} new images", accepted.len()));
        info!(
            candidates = total,
            accepted = accepted.len(),
            last_sequence = self.ledger.last_sequence().await,
            "Harvest finished"
        );

        Ok(HarvestSummary {
            candidates: total,
            accepted,
            last_page,
            final_state,
        })
    }

    /// Delete one stored image and forget it.
    ///
    /// # Errors
    ///
    /// See [`CleanupError`].
    pub async fn cleanup(&self, path: &Path) -> Result<CatalogRecord, CleanupError> {
        catalog::cleanup(&self.catalog, &self.ledger, path).await
    }

    /// Delete every cataloged image.
    ///
    /// # Errors
    ///
    /// See [`CleanupError`].
    pub async fn cleanup_all(&self) -> Result<usize, CleanupError> {
        catalog::cleanup_all(&self.catalog, &self.ledger).await
    }

    /// Forget history, keeping files and the sequence counter.
    ///
    /// # Errors
    ///
    /// Returns an error if either document cannot be written.
    pub async fn reset_history(&self) -> Result<()> {
        catalog::reset_history(&self.catalog, &self.ledger).await
    }
}
