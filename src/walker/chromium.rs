//! [`PageDriver`] backed by a headless Chrome/Chromium through the DevTools protocol.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures_util::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::driver::{NextControl, PageDriver};
use crate::constants::HARVEST_USER_AGENT;

/// Default viewport width in pixels.
pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1280;

/// Default viewport height in pixels.
pub const DEFAULT_VIEWPORT_HEIGHT: u32 = 1600;

/// How often the page is polled while waiting for content to change.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Extra time given to the page to finish rendering after a transition.
const RENDER_SETTLE: Duration = Duration::from_millis(500);

/// Browser session configuration.
#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub headless: bool,
    /// Path to Chrome/Chromium executable (None for auto-detection).
    pub chrome_path: Option<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub page_load_timeout: Duration,
    /// How long to wait for the gallery to re-render after clicking "next".
    pub content_change_timeout: Duration,
    pub next_button_selector: String,
    pub card_selector: String,
}

/// One browser with a single tab.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    options: ChromiumOptions,
}

impl ChromiumDriver {
    /// Launch the browser and open a blank tab.
    ///
    /// # Errors
    ///
    /// Returns an error if no usable browser can be started.
    pub async fn launch(options: ChromiumOptions) -> Result<Self> {
        info!(headless = options.headless, "Launching browser");

        let mut config_builder = BrowserConfig::builder()
            .window_size(options.viewport_width, options.viewport_height)
            .request_timeout(options.page_load_timeout)
            .no_sandbox()
            .disable_default_args()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--mute-audio")
            .arg(format!("--user-agent={HARVEST_USER_AGENT}"));

        if options.headless {
            config_builder = config_builder.arg("--headless=new");
        } else {
            config_builder = config_builder.with_head();
        }

        if let Some(ref chrome_path) = options.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .context("Failed to launch browser")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("Failed to open browser tab")?;

        Ok(Self {
            browser,
            page,
            handler,
            options,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, expression: String) -> Result<T> {
        self.page
            .evaluate_expression(expression)
            .await
            .context("Script evaluation failed")?
            .into_value()
            .context("Unexpected script result")
    }

    /// Text identifying what the gallery currently shows.
    async fn content_signature(&self) -> Result<String> {
        let card = js_string(&self.options.card_selector);
        self.eval(format!(
            "(function() {{ \
                const card = document.querySelector({card}); \
                if (card) return card.innerText; \
                return document.body ? String(document.body.innerHTML.length) : ''; \
            }})()"
        ))
        .await
    }

    /// Poll until at least one card is present or the timeout passes.
    async fn wait_for_cards(&self) -> Result<bool> {
        let card = js_string(&self.options.card_selector);
        let deadline = Instant::now() + self.options.content_change_timeout;
        loop {
            let present: bool = self
                .eval(format!("document.querySelector({card}) !== null"))
                .await?;
            if present {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn open(&mut self, url: &str) -> Result<()> {
        tokio::time::timeout(self.options.page_load_timeout, async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        })
        .await
        .with_context(|| format!("Timed out loading {url}"))?
        .with_context(|| format!("Failed to load {url}"))?;

        if !self.wait_for_cards().await? {
            warn!(
                selector = %self.options.card_selector,
                "No gallery cards appeared after loading"
            );
        }
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        self.page
            .url()
            .await
            .context("Failed to read page URL")?
            .context("Page has no URL")
    }

    async fn rendered_html(&mut self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn activate_next(&mut self) -> Result<NextControl> {
        let before = self.content_signature().await?;
        let selector = js_string(&self.options.next_button_selector);
        let outcome: String = self
            .eval(format!(
                "(function() {{ \
                    const marker = document.querySelector({selector}); \
                    if (!marker) return 'missing'; \
                    const control = marker.closest('button, a') || marker; \
                    if (control.disabled || control.hasAttribute('disabled') \
                        || control.getAttribute('aria-disabled') === 'true' \
                        || control.classList.contains('disabled')) return 'disabled'; \
                    control.click(); \
                    return 'clicked'; \
                }})()"
            ))
            .await?;

        match outcome.as_str() {
            "missing" => return Ok(NextControl::Missing),
            "disabled" => return Ok(NextControl::Disabled),
            _ => {}
        }

        let deadline = Instant::now() + self.options.content_change_timeout;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if self.content_signature().await? != before {
                tokio::time::sleep(RENDER_SETTLE).await;
                return Ok(NextControl::Advanced);
            }
            if Instant::now() >= deadline {
                return Ok(NextControl::Stalled);
            }
        }
    }

    async fn content_extent(&mut self) -> Result<u64> {
        let height: f64 = self
            .eval(
                "Math.max(document.body ? document.body.scrollHeight : 0, \
                 document.documentElement.scrollHeight)"
                    .to_string(),
            )
            .await?;
        Ok(height.max(0.0) as u64)
    }

    async fn scroll_to(&mut self, offset: u64) -> Result<()> {
        self.page
            .evaluate_expression(format!("window.scrollTo(0, {offset})"))
            .await
            .context("Failed to scroll")?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.browser.close().await {
            error!("Failed to close browser: {e}");
        }
        if let Err(e) = self.browser.wait().await {
            debug!("Failed to reap browser process: {e}");
        }
        self.handler.abort();
        info!("Browser shutdown complete");
        Ok(())
    }
}

/// Quote a value as a JavaScript string literal.
fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
