//! Two-tier pagination: explicit next control first, infinite scroll second.

use std::time::Duration;

use anyhow::Result;
use tracing::{debug, warn};

use super::driver::{NextControl, PageDriver};

/// How the gallery moved to its next page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The next control replaced the page content.
    Paged,
    /// Scrolling appended content; earlier items are still in the DOM.
    Scrolled,
    /// No further content is reachable.
    Exhausted,
}

/// Try to bring the next batch of gallery content into view.
///
/// # Errors
///
/// Returns an error if the driver fails while probing the page.
pub async fn advance<D>(driver: &mut D, scroll_attempts: u32, settle: Duration) -> Result<Advance>
where
    D: PageDriver + ?Sized,
{
    match driver.activate_next().await? {
        NextControl::Advanced => Ok(Advance::Paged),
        NextControl::Disabled => {
            debug!("Next control is disabled");
            Ok(Advance::Exhausted)
        }
        NextControl::Stalled => {
            warn!("Next control clicked but the page did not change");
            Ok(Advance::Exhausted)
        }
        NextControl::Missing => {
            if scroll_for_more(driver, scroll_attempts, settle).await? {
                Ok(Advance::Scrolled)
            } else {
                Ok(Advance::Exhausted)
            }
        }
    }
}

/// Scroll to the bottom until the document grows, at most `attempts` times.
async fn scroll_for_more<D>(driver: &mut D, attempts: u32, settle: Duration) -> Result<bool>
where
    D: PageDriver + ?Sized,
{
    let before = driver.content_extent().await?;

    for attempt in 1..=attempts {
        let bottom = driver.content_extent().await?;
        driver.scroll_to(bottom).await?;
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }

        let after = driver.content_extent().await?;
        if after > before {
            debug!(attempt, before, after, "Scrolling loaded more content");
            return Ok(true);
        }
    }

    debug!(attempts, extent = before, "Scrolling loaded nothing new");
    Ok(false)
}
