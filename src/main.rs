use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gallery_harvester::catalog::CleanupError;
use gallery_harvester::config::Config;
use gallery_harvester::progress::LogProgress;
use gallery_harvester::walker::PageRange;
use gallery_harvester::Harvester;

/// Exit code when cleanup left the catalog, ledger and files out of sync.
const EXIT_PARTIAL_CLEANUP: i32 = 2;

/// Exit code for a second interrupt.
const EXIT_INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(
    name = "gallery-harvester",
    version,
    about = "Harvest new images from a paginated web gallery"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl a range of gallery pages and download unseen images
    Crawl {
        /// First page to collect from (1-based)
        #[arg(long, env = "START_PAGE", default_value_t = 1)]
        start: u32,

        /// Last page to collect from, inclusive
        #[arg(long, env = "END_PAGE", default_value_t = 1)]
        end: u32,
    },
    /// Delete stored images and forget them
    Cleanup {
        /// Image files to remove
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        paths: Vec<PathBuf>,

        /// Remove every cataloged image
        #[arg(long)]
        all: bool,
    },
    /// Forget download history, keeping files on disk
    Reset,
    /// Print the catalog
    List,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        let partial = e
            .downcast_ref::<CleanupError>()
            .is_some_and(CleanupError::is_partial);
        std::process::exit(if partial { EXIT_PARTIAL_CLEANUP } else { 1 });
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_tracing()?;

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        target_url = %config.target_url,
        data_dir = %config.data_dir.display(),
        pictures_dir = %config.pictures_dir.display(),
        "Configuration loaded"
    );

    let harvester = Harvester::new(config);

    match cli.command {
        Command::Crawl { start, end } => crawl(&harvester, start, end).await,
        Command::Cleanup { paths, all } => cleanup(&harvester, &paths, all).await,
        Command::Reset => {
            harvester
                .reset_history()
                .await
                .context("Failed to reset history")?;
            info!("Catalog and fingerprints cleared; files and sequence counter kept");
            Ok(())
        }
        Command::List => {
            list(&harvester).await;
            Ok(())
        }
    }
}

async fn crawl(harvester: &Harvester, start: u32, end: u32) -> Result<()> {
    let range = PageRange::new(start, end).context("Invalid page range")?;

    let stop = Arc::new(AtomicBool::new(false));
    let listener = tokio::spawn(interrupt_listener(Arc::clone(&stop)));
    let cancel = move || stop.load(Ordering::SeqCst);

    let result = harvester.run(range, &cancel, &LogProgress).await;
    listener.abort();

    let summary = result?;
    info!(
        candidates = summary.candidates,
        accepted = summary.accepted.len(),
        last_page = summary.last_page,
        state = ?summary.final_state,
        "Crawl complete"
    );
    for record in &summary.accepted {
        println!("{:>5}  {}", record.sequence, record.local_path);
    }
    Ok(())
}

/// First Ctrl-C requests a cooperative stop; a second one exits immediately.
async fn interrupt_listener(stop: Arc<AtomicBool>) {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("Failed to install Ctrl+C handler");
        return;
    }
    stop.store(true, Ordering::SeqCst);
    warn!("Stop requested, finishing the current page. Press Ctrl+C again to abort.");

    if tokio::signal::ctrl_c().await.is_ok() {
        error!("Aborted");
        std::process::exit(EXIT_INTERRUPTED);
    }
}

async fn cleanup(harvester: &Harvester, paths: &[PathBuf], all: bool) -> Result<()> {
    if all {
        let removed = harvester.cleanup_all().await?;
        info!(removed, "Removed all cataloged images");
        return Ok(());
    }

    let mut missing = 0;
    for path in paths {
        match harvester.cleanup(path).await {
            Ok(record) => println!("removed {:>5}  {}", record.sequence, record.local_path),
            Err(CleanupError::NotCataloged(path)) => {
                warn!(path = %path.display(), "Not in catalog, skipping");
                missing += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    if missing == paths.len() {
        anyhow::bail!("None of the given paths are cataloged");
    }
    Ok(())
}

async fn list(harvester: &Harvester) {
    let records = harvester.catalog().load().await;
    if records.is_empty() {
        println!("Catalog is empty");
        return;
    }
    for record in &records {
        println!(
            "{:>5}  {:<64}  {}  {}",
            record.sequence,
            record.local_path,
            record.fingerprint.as_str().get(..12).unwrap_or_default(),
            record.title
        );
    }
    println!(
        "{} images, last sequence {}",
        records.len(),
        harvester.ledger().last_sequence().await
    );
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,gallery_harvester=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
