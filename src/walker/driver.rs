use anyhow::Result;
use async_trait::async_trait;

/// Outcome of trying to activate the gallery's "next page" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    /// Control clicked and the page content changed.
    Advanced,
    /// Control present but disabled: last page.
    Disabled,
    /// No control on the page.
    Missing,
    /// Control clicked but the content never changed.
    Stalled,
}

/// A single browser tab the page walker can steer.
///
/// Implementations are not shared; the walker owns its driver for the whole
/// session.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to `url` and wait until the page has settled.
    async fn open(&mut self, url: &str) -> Result<()>;

    /// URL of the current document, used to resolve relative sources.
    async fn current_url(&mut self) -> Result<String>;

    /// Serialized DOM as currently rendered.
    async fn rendered_html(&mut self) -> Result<String>;

    /// Find and click the explicit next-page control, if any.
    async fn activate_next(&mut self) -> Result<NextControl>;

    /// Current scrollable height of the document in pixels.
    async fn content_extent(&mut self) -> Result<u64>;

    /// Scroll the viewport to a vertical offset.
    async fn scroll_to(&mut self, offset: u64) -> Result<()>;

    /// Release the browser session.
    async fn close(&mut self) -> Result<()>;
}
