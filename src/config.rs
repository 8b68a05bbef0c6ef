use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::walker::chromium::{DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH};
use crate::walker::extract::{ExtractOptions, DEFAULT_SOURCE_ATTRIBUTES};
use crate::walker::{ChromiumOptions, WalkerOptions};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Target gallery
    pub target_url: String,
    pub next_button_selector: String,
    pub card_selector: String,
    pub title_selector: String,
    pub source_attributes: Vec<String>,
    pub min_image_dimension: u32,

    // Browser
    pub headless: bool,
    pub chrome_path: Option<String>,
    pub page_load_timeout: Duration,
    pub page_wait: Duration,
    pub scroll_attempts: u32,
    pub scroll_settle: Duration,
    pub content_change_timeout: Duration,

    // Storage
    pub data_dir: PathBuf,
    pub pictures_dir: PathBuf,

    // Downloads
    pub max_concurrent_downloads: usize,
    pub download_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Target gallery
            target_url: env_or_default("TARGET_URL", "https://buavl.net/"),
            next_button_selector: env_or_default("NEXT_BUTTON_SELECTOR", "i.fas.fa-chevron-right"),
            card_selector: env_or_default("CARD_SELECTOR", "div.card"),
            title_selector: env_or_default("TITLE_SELECTOR", "h3.title"),
            source_attributes: optional_env("SOURCE_ATTRIBUTES").map_or_else(
                || DEFAULT_SOURCE_ATTRIBUTES.iter().map(|s| (*s).to_string()).collect(),
                |raw| parse_list(&raw),
            ),
            min_image_dimension: parse_env_u32("MIN_IMAGE_DIMENSION", 50)?,

            // Browser
            headless: parse_env_bool("HEADLESS", true)?,
            chrome_path: optional_env("CHROME_PATH"),
            page_load_timeout: Duration::from_secs(parse_env_u64("PAGE_LOAD_TIMEOUT_SECS", 60)?),
            page_wait: Duration::from_millis(parse_env_u64("PAGE_WAIT_MS", 2000)?),
            scroll_attempts: parse_env_u32("SCROLL_ATTEMPTS", 3)?,
            scroll_settle: Duration::from_millis(parse_env_u64("SCROLL_SETTLE_MS", 1500)?),
            content_change_timeout: Duration::from_millis(parse_env_u64(
                "CONTENT_CHANGE_TIMEOUT_MS",
                8000,
            )?),

            // Storage
            data_dir: PathBuf::from(env_or_default("DATA_DIR", "./data")),
            pictures_dir: PathBuf::from(env_or_default("PICTURES_DIR", "./picturedownload")),

            // Downloads
            max_concurrent_downloads: parse_env_usize("MAX_CONCURRENT_DOWNLOADS", 5)?,
            download_timeout: Duration::from_secs(parse_env_u64("DOWNLOAD_TIMEOUT_SECS", 30)?),
        })
    }

    /// Settings for tests: no pacing delays, local directories.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            target_url: "http://gallery.test/".to_string(),
            next_button_selector: "i.fas.fa-chevron-right".to_string(),
            card_selector: "div.card".to_string(),
            title_selector: "h3.title".to_string(),
            source_attributes: DEFAULT_SOURCE_ATTRIBUTES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            min_image_dimension: 50,
            headless: true,
            chrome_path: None,
            page_load_timeout: Duration::from_secs(5),
            page_wait: Duration::ZERO,
            scroll_attempts: 2,
            scroll_settle: Duration::ZERO,
            content_change_timeout: Duration::from_millis(500),
            data_dir: PathBuf::from("./data"),
            pictures_dir: PathBuf::from("./picturedownload"),
            max_concurrent_downloads: 5,
            download_timeout: Duration::from_secs(5),
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_downloads == 0 {
            return Err(invalid("MAX_CONCURRENT_DOWNLOADS", "must be at least 1"));
        }
        if self.scroll_attempts == 0 {
            return Err(invalid("SCROLL_ATTEMPTS", "must be at least 1"));
        }
        if url::Url::parse(&self.target_url).is_err() {
            return Err(invalid("TARGET_URL", "must be an absolute URL"));
        }
        for (name, value) in [
            ("NEXT_BUTTON_SELECTOR", &self.next_button_selector),
            ("CARD_SELECTOR", &self.card_selector),
            ("TITLE_SELECTOR", &self.title_selector),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(name, "cannot be empty"));
            }
        }
        if self.source_attributes.is_empty() {
            return Err(invalid("SOURCE_ATTRIBUTES", "must list at least one attribute"));
        }
        Ok(())
    }

    /// Extraction heuristics for the page walker.
    #[must_use]
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            source_attributes: self.source_attributes.clone(),
            min_dimension: self.min_image_dimension,
            card_selector: self.card_selector.clone(),
            title_selector: self.title_selector.clone(),
            ..ExtractOptions::default()
        }
    }

    /// Browser session settings.
    #[must_use]
    pub fn chromium_options(&self) -> ChromiumOptions {
        ChromiumOptions {
            headless: self.headless,
            chrome_path: self.chrome_path.clone(),
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            viewport_height: DEFAULT_VIEWPORT_HEIGHT,
            page_load_timeout: self.page_load_timeout,
            content_change_timeout: self.content_change_timeout,
            next_button_selector: self.next_button_selector.clone(),
            card_selector: self.card_selector.clone(),
        }
    }

    #[must_use]
    pub fn walker_options(&self) -> WalkerOptions {
        WalkerOptions {
            target_url: self.target_url.clone(),
            page_wait: self.page_wait,
            scroll_attempts: self.scroll_attempts,
            scroll_settle: self.scroll_settle,
            extract: self.extract_options(),
        }
    }
}

fn invalid(name: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        name: name.to_string(),
        message: message.to_string(),
    }
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}
