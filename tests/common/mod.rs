//! In-memory gallery driven through the `PageDriver` seam.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use gallery_harvester::walker::{NextControl, PageDriver};

/// One image shown on a gallery page.
#[derive(Debug, Clone)]
pub struct Card {
    pub title: Option<String>,
    pub url: String,
}

impl Card {
    pub fn new(title: &str, url: impl Into<String>) -> Self {
        Self {
            title: Some(title.to_string()),
            url: url.into(),
        }
    }

    pub fn untitled(url: impl Into<String>) -> Self {
        Self {
            title: None,
            url: url.into(),
        }
    }
}

/// `count` titled cards for `page`, served from `base`.
pub fn page_cards(base: &str, page: usize, count: usize) -> Vec<Card> {
    (1..=count)
        .map(|i| Card::new(&format!("Page {page} #{i}"), format!("{base}/p{page}/{i}.jpg")))
        .collect()
}

fn render(cards: &[Card]) -> String {
    let mut html = String::from("<html><body><main>");
    for card in cards {
        html.push_str("<div class=\"card\">");
        html.push_str(&format!("<img data-src=\"{}\" src=\"data:image/gif;base64,R0l\">", card.url));
        if let Some(title) = &card.title {
            html.push_str(&format!("<h3 class=\"title\">{title}</h3>"));
        }
        html.push_str("</div>");
    }
    html.push_str("</main></body></html>");
    html
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A next button swaps the page content.
    Paginated,
    /// No next button; scrolling to the bottom appends the next batch.
    InfiniteScroll,
}

pub struct SyntheticGallery {
    pages: Vec<Vec<Card>>,
    mode: Mode,
    /// What the next control reports once the last page is shown.
    last_page_control: NextControl,
    shown: usize,
    fail_open: bool,
    closed: Arc<AtomicBool>,
}

impl SyntheticGallery {
    pub fn paginated(pages: Vec<Vec<Card>>) -> Self {
        Self::new(pages, Mode::Paginated)
    }

    pub fn infinite_scroll(batches: Vec<Vec<Card>>) -> Self {
        Self::new(batches, Mode::InfiniteScroll)
    }

    fn new(pages: Vec<Vec<Card>>, mode: Mode) -> Self {
        Self {
            pages,
            mode,
            last_page_control: NextControl::Disabled,
            shown: 0,
            fail_open: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_last_page_control(mut self, control: NextControl) -> Self {
        self.last_page_control = control;
        self
    }

    pub fn failing_to_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Flag set once the session is closed.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn has_more(&self) -> bool {
        self.shown + 1 < self.pages.len()
    }
}

#[async_trait]
impl PageDriver for SyntheticGallery {
    async fn open(&mut self, url: &str) -> Result<()> {
        if self.fail_open {
            bail!("connection refused: {url}");
        }
        self.shown = 0;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(format!("http://gallery.test/?page={}", self.shown + 1))
    }

    async fn rendered_html(&mut self) -> Result<String> {
        Ok(match self.mode {
            Mode::Paginated => render(&self.pages[self.shown]),
            Mode::InfiniteScroll => render(&self.pages[..=self.shown].concat()),
        })
    }

    async fn activate_next(&mut self) -> Result<NextControl> {
        match self.mode {
            Mode::InfiniteScroll => Ok(NextControl::Missing),
            Mode::Paginated if self.has_more() => {
                self.shown += 1;
                Ok(NextControl::Advanced)
            }
            Mode::Paginated => Ok(self.last_page_control),
        }
    }

    async fn content_extent(&mut self) -> Result<u64> {
        Ok((self.shown as u64 + 1) * 1000)
    }

    async fn scroll_to(&mut self, _offset: u64) -> Result<()> {
        if self.mode == Mode::InfiniteScroll && self.has_more() {
            self.shown += 1;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
