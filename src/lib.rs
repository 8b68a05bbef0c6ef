//! Gallery harvester library.
//!
//! Walks a paginated image gallery in a headless browser, downloads the images
//! it finds, and keeps only content that was never seen before. A ledger of
//! content fingerprints and a catalog of stored images persist across runs.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod dedup;
pub mod downloader;
pub mod harvest;
pub mod progress;
pub mod store;
pub mod walker;

pub use harvest::{HarvestSummary, Harvester};
