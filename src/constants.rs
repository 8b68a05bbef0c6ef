//! Shared constants used across the crate.

/// User agent sent by both the browser session and the image downloader.
pub const HARVEST_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// File name of the ledger document inside the data directory.
pub const LEDGER_DOCUMENT: &str = "state.json";

/// File name of the catalog document inside the data directory.
pub const CATALOG_DOCUMENT: &str = "data.json";
