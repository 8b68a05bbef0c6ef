//! Candidate image extraction from a rendered gallery page.
//!
//! Sources are probed through an ordered list of attributes because lazy
//! loaders park the real URL in different places (`data-src`, `data-original`,
//! `srcset`, ...) while `src` often holds a placeholder.

use std::collections::HashSet;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Element;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use super::Candidate;

/// Attribute probe order used when none is configured.
pub const DEFAULT_SOURCE_ATTRIBUTES: &[&str] = &[
    "data-src",
    "data-original",
    "data-lazy-src",
    "data-lazy",
    "src",
    "data-srcset",
    "srcset",
];

/// URLs that are almost never gallery content.
static JUNK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(favicon|sprite|icons?[/._-]|logo|avatar|emoji|spacer|blank\.gif|pixel\.gif|1x1|tracker|tracking|beacon|analytics|doubleclick|googlesyndication|/ads?/|adserver|banner-ad|placeholder|loading\.gif)",
    )
    .expect("junk pattern is a valid regex")
});

/// Heuristics applied while scanning a page.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Attribute names probed in order for the image source.
    pub source_attributes: Vec<String>,
    /// Declared `width`/`height` below this many pixels marks an image as junk.
    pub min_dimension: u32,
    /// Element wrapping one gallery item.
    pub card_selector: String,
    /// Title element inside a card.
    pub title_selector: String,
    /// URL pattern for icons, trackers and ads.
    pub junk_pattern: Regex,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            source_attributes: DEFAULT_SOURCE_ATTRIBUTES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            min_dimension: 50,
            card_selector: "div.card".to_string(),
            title_selector: "h3.title".to_string(),
            junk_pattern: JUNK_PATTERN.clone(),
        }
    }
}

/// An image found on a page, before it is given an ordinal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedImage {
    pub url: String,
    pub title: Option<String>,
}

impl ExtractedImage {
    /// Turn into a candidate, synthesizing a title if the page had none.
    #[must_use]
    pub fn into_candidate(self, ordinal: u64) -> Candidate {
        Candidate {
            ordinal,
            title: self.title.unwrap_or_else(|| placeholder_title(ordinal)),
            url: self.url,
        }
    }
}

#[must_use]
pub fn placeholder_title(ordinal: u64) -> String {
    format!("image_{ordinal}")
}

/// Compiled form of [`ExtractOptions`].
#[derive(Debug, Clone)]
pub struct Extractor {
    options: ExtractOptions,
    image: Selector,
    card: Selector,
    title: Selector,
}

impl Extractor {
    /// Compile the configured selectors.
    ///
    /// # Errors
    ///
    /// Returns an error if a selector is not valid CSS.
    pub fn new(options: ExtractOptions) -> Result<Self> {
        Ok(Self {
            image: parse_selector("img")?,
            card: parse_selector(&options.card_selector)?,
            title: parse_selector(&options.title_selector)?,
            options,
        })
    }

    /// Scan `html` for gallery images, in document order, unique by URL.
    #[must_use]
    pub fn extract(&self, html: &str, page_url: &Url) -> Vec<ExtractedImage> {
        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut images = Vec::new();

        for img in document.select(&self.image) {
            let Some(raw) = resolve_source(img.value(), &self.options.source_attributes) else {
                continue;
            };
            let Some(url) = normalize_source(page_url, raw) else {
                continue;
            };
            if self.options.junk_pattern.is_match(url.as_str())
                || is_too_small(img.value(), self.options.min_dimension)
            {
                continue;
            }
            if !seen.insert(url.to_string()) {
                continue;
            }

            images.push(ExtractedImage {
                url: url.into(),
                title: self.title_for(img),
            });
        }

        images
    }

    /// Card title, else `alt`, else the `title` attribute.
    fn title_for(&self, img: ElementRef<'_>) -> Option<String> {
        let card_title = img
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|el| self.card.matches(el))
            .and_then(|card| card.select(&self.title).next())
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty());

        card_title.or_else(|| {
            ["alt", "title"]
                .iter()
                .filter_map(|name| img.value().attr(name))
                .map(collapse_whitespace)
                .find(|t| !t.is_empty())
        })
    }
}

fn parse_selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("Invalid CSS selector {css:?}: {e:?}"))
}

/// First usable value among the probed attributes.
fn resolve_source<'a>(element: &'a Element, attributes: &[String]) -> Option<&'a str> {
    for name in attributes {
        let Some(value) = element.attr(name) else {
            continue;
        };
        let value = if name.ends_with("srcset") {
            first_srcset_url(value)
        } else {
            Some(value.trim())
        };
        if let Some(value) = value {
            if !value.is_empty() && !value.starts_with("data:") {
                return Some(value);
            }
        }
    }
    None
}

fn first_srcset_url(srcset: &str) -> Option<&str> {
    srcset.split(',').next()?.split_whitespace().next()
}

/// Resolve a source against the page URL, keeping only http(s).
fn normalize_source(page_url: &Url, raw: &str) -> Option<Url> {
    let mut url = page_url.join(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}

fn is_too_small(element: &Element, min_dimension: u32) -> bool {
    ["width", "height"]
        .iter()
        .filter_map(|name| element.attr(name))
        .filter_map(parse_dimension)
        .any(|px| px < min_dimension)
}

fn parse_dimension(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    let number = raw.strip_suffix("px").unwrap_or(raw).trim();
    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value >= 0.0).then(|| value as u32)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
