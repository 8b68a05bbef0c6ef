//! Page-range traversal of the gallery through a browser session.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::progress::{CancelFn, ProgressSink};

pub mod chromium;
pub mod driver;
pub mod extract;
pub mod pagination;

pub use chromium::{ChromiumDriver, ChromiumOptions};
pub use driver::{NextControl, PageDriver};
pub use pagination::Advance;
pub use extract::{ExtractOptions, ExtractedImage, Extractor};

/// An image reference found while crawling, not yet downloaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Candidate {
    /// Position within this crawl session, starting at 1.
    pub ordinal: u64,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageRangeError {
    #[error("start page must be at least 1")]
    StartBelowOne,
    #[error("start page {start} is after end page {end}")]
    StartAfterEnd { start: u32, end: u32 },
}

/// Inclusive, 1-based range of gallery pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    start: u32,
    end: u32,
}

impl PageRange {
    /// # Errors
    ///
    /// Returns an error unless `1 <= start <= end`.
    pub fn new(start: u32, end: u32) -> Result<Self, PageRangeError> {
        if start < 1 {
            return Err(PageRangeError::StartBelowOne);
        }
        if start > end {
            return Err(PageRangeError::StartAfterEnd { start, end });
        }
        Ok(Self { start, end })
    }

    #[must_use]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> u32 {
        self.end
    }
}

/// Where the walker is in its traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    NotStarted,
    SkippingToStart,
    Crawling,
    Done,
    Stopping,
}

#[derive(Debug, Clone)]
pub struct WalkerOptions {
    pub target_url: String,
    /// Pause after every page transition.
    pub page_wait: Duration,
    pub scroll_attempts: u32,
    pub scroll_settle: Duration,
    pub extract: ExtractOptions,
}

/// Drives one browser session across a range of gallery pages.
pub struct PageWalker<D> {
    driver: D,
    extractor: Extractor,
    base_url: Url,
    options: WalkerOptions,
    state: WalkState,
    current_page: u32,
}

impl<D: PageDriver> PageWalker<D> {
    /// # Errors
    ///
    /// Returns an error if the target URL or a configured selector is invalid.
    pub fn new(driver: D, options: WalkerOptions) -> Result<Self> {
        let base_url = Url::parse(&options.target_url)
            .with_context(|| format!("Invalid target URL: {}", options.target_url))?;
        let extractor = Extractor::new(options.extract.clone())?;
        Ok(Self {
            driver,
            extractor,
            base_url,
            options,
            state: WalkState::NotStarted,
            current_page: 0,
        })
    }

    #[must_use]
    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Page the browser is currently showing; 0 before the gallery is opened.
    #[must_use]
    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    #[must_use]
    pub fn into_driver(self) -> D {
        self.driver
    }

    /// Collect candidates from every page in `range`.
    ///
    /// Stops early, returning what completed pages produced, when `cancel`
    /// reports true at a page boundary or pagination runs out. Cancelling or
    /// running out of pages before `range.start()` yields no candidates.
    /// Images a scrolling gallery still shows from skipped pages are never
    /// emitted; a paginated gallery's start page is extracted in full.
    ///
    /// # Errors
    ///
    /// Returns an error only if the gallery cannot be opened.
    pub async fn walk(
        &mut self,
        range: PageRange,
        cancel: &CancelFn<'_>,
        progress: &dyn ProgressSink,
    ) -> Result<Vec<Candidate>> {
        self.state = WalkState::NotStarted;
        self.current_page = 0;

        let target = self.options.target_url.clone();
        info!(url = %target, start = range.start(), end = range.end(), "Opening gallery");
        self.driver
            .open(&target)
            .await
            .with_context(|| format!("Failed to load gallery: {target}"))?;
        self.current_page = 1;

        let mut seen_urls = HashSet::new();

        if range.start() > 1 {
            self.state = WalkState::SkippingToStart;
            while self.current_page < range.start() {
                if cancel() {
                    info!(page = self.current_page, "Stop requested while skipping to start page");
                    self.state = WalkState::Stopping;
                    return Ok(Vec::new());
                }
                let shown = self.scan().await;
                let advance = self.advance().await;
                if advance == Advance::Scrolled {
                    // Scrolled batches stay in the DOM; keep them out of range.
                    seen_urls.extend(shown.into_iter().map(|image| image.url));
                }
                if advance == Advance::Exhausted {
                    warn!(
                        page = self.current_page,
                        start = range.start(),
                        "Gallery ended before the start page"
                    );
                    progress.notify(self.current_page, "Gallery ended before the start page");
                    self.state = WalkState::Done;
                    return Ok(Vec::new());
                }
                self.current_page += 1;
                progress.notify(self.current_page, "Skipping to start page");
                self.pace().await;
            }
        }

        self.state = WalkState::Crawling;
        let mut candidates = Vec::new();
        let mut next_ordinal = 1;

        loop {
            if cancel() {
                info!(
                    page = self.current_page,
                    collected = candidates.len(),
                    "Stop requested, returning completed pages"
                );
                self.state = WalkState::Stopping;
                return Ok(candidates);
            }

            let page_candidates = self.extract_page(&mut seen_urls, &mut next_ordinal).await;
            info!(page = self.current_page, found = page_candidates.len(), "Page crawled");
            progress.notify(
                self.current_page,
                &format!("Found {} images", page_candidates.len()),
            );
            candidates.extend(page_candidates);

            if self.current_page >= range.end() {
                break;
            }
            if self.advance().await == Advance::Exhausted {
                info!(page = self.current_page, "No further pages");
                break;
            }
            self.current_page += 1;
            self.pace().await;
        }

        self.state = WalkState::Done;
        info!(total = candidates.len(), "Crawl finished");
        Ok(candidates)
    }

    /// Extract the current page, skipping URLs already emitted this session.
    async fn extract_page(
        &mut self,
        seen_urls: &mut HashSet<String>,
        next_ordinal: &mut u64,
    ) -> Vec<Candidate> {
        self.scan()
            .await
            .into_iter()
            .filter(|image| seen_urls.insert(image.url.clone()))
            .map(|image| {
                let candidate = image.into_candidate(*next_ordinal);
                *next_ordinal += 1;
                candidate
            })
            .collect()
    }

    /// Images in the current DOM. Read failures yield an empty page.
    async fn scan(&mut self) -> Vec<ExtractedImage> {
        let html = match self.driver.rendered_html().await {
            Ok(html) => html,
            Err(e) => {
                warn!(page = self.current_page, "Failed to read page content: {e:#}");
                return Vec::new();
            }
        };

        let page_url = match self.driver.current_url().await {
            Ok(url) => Url::parse(&url).unwrap_or_else(|_| self.base_url.clone()),
            Err(e) => {
                debug!("Falling back to target URL as base: {e:#}");
                self.base_url.clone()
            }
        };

        self.extractor.extract(&html, &page_url)
    }

    /// Pagination advance; driver failures count as the end of the gallery.
    async fn advance(&mut self) -> Advance {
        match pagination::advance(
            &mut self.driver,
            self.options.scroll_attempts,
            self.options.scroll_settle,
        )
        .await
        {
            Ok(advance) => advance,
            Err(e) => {
                warn!(page = self.current_page, "Pagination failed: {e:#}");
                Advance::Exhausted
            }
        }
    }

    async fn pace(&self) {
        if !self.options.page_wait.is_zero() {
            tokio::time::sleep(self.options.page_wait).await;
        }
    }
}
