//! Cleanup and history reset across catalog, ledger and image files.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use gallery_harvester::catalog::{self, Catalog, CatalogRecord, CleanupError};
use gallery_harvester::constants::LEDGER_DOCUMENT;
use gallery_harvester::dedup::{Fingerprint, Ledger};
use gallery_harvester::store::{JsonFileStore, StateStore};
use tempfile::TempDir;

/// File store whose ledger writes can be made to fail.
struct FlakyStore {
    inner: JsonFileStore,
    fail_ledger_writes: AtomicBool,
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, contents: &[u8]) -> Result<()> {
        if key == LEDGER_DOCUMENT && self.fail_ledger_writes.load(Ordering::SeqCst) {
            bail!("disk full");
        }
        self.inner.save(key, contents).await
    }
}

struct Fixture {
    dir: TempDir,
    store: Arc<FlakyStore>,
    catalog: Catalog,
    ledger: Ledger,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(FlakyStore {
            inner: JsonFileStore::new(dir.path().join("data")),
            fail_ledger_writes: AtomicBool::new(false),
        });
        let shared: Arc<dyn StateStore> = store.clone();
        Self {
            catalog: Catalog::new(Arc::clone(&shared)),
            ledger: Ledger::new(shared),
            store,
            dir,
        }
    }

    /// Store an image the way a harvest run would.
    async fn seed(&self, title: &str, bytes: &[u8]) -> CatalogRecord {
        let fingerprint = Fingerprint::of(bytes);
        let sequence = self.ledger.register(&fingerprint).await.unwrap();
        let pictures = self.dir.path().join("pictures");
        std::fs::create_dir_all(&pictures).unwrap();
        let path = pictures.join(format!("{sequence:03}_{title}.jpg"));
        std::fs::write(&path, bytes).unwrap();

        let record = CatalogRecord {
            sequence,
            title: title.to_string(),
            local_path: path.to_string_lossy().into_owned(),
            fingerprint,
            source_url: Some(format!("https://cdn.gallery.test/{title}.jpg")),
            downloaded_at: Some(Utc::now()),
        };
        self.catalog.append(vec![record.clone()]).await.unwrap();
        record
    }

    /// Ledger as a fresh process would read it.
    fn reopened_ledger(&self) -> Ledger {
        let store: Arc<dyn StateStore> = self.store.clone();
        Ledger::new(store)
    }
}

fn path_of(record: &CatalogRecord) -> PathBuf {
    PathBuf::from(&record.local_path)
}

#[tokio::test]
async fn test_cleanup_removes_record_fingerprint_and_file() {
    let fixture = Fixture::new();
    let keep = fixture.seed("keep", b"keep bytes").await;
    let gone = fixture.seed("gone", b"gone bytes").await;

    let removed = catalog::cleanup(&fixture.catalog, &fixture.ledger, &path_of(&gone))
        .await
        .unwrap();

    assert_eq!(removed, gone);
    assert!(!path_of(&gone).exists());
    assert!(fixture.catalog.find_by_path(&path_of(&gone)).await.is_none());
    assert!(!fixture.ledger.contains(&gone.fingerprint).await);

    let reopened = fixture.reopened_ledger();
    assert!(!reopened.contains(&gone.fingerprint).await);
    assert!(reopened.contains(&keep.fingerprint).await);
    assert!(path_of(&keep).exists());
    assert_eq!(fixture.catalog.load().await, vec![keep]);
}

#[tokio::test]
async fn test_cleaned_image_is_accepted_again_with_new_sequence() {
    let fixture = Fixture::new();
    let first = fixture.seed("photo", b"photo bytes").await;
    catalog::cleanup(&fixture.catalog, &fixture.ledger, &path_of(&first))
        .await
        .unwrap();

    let again = fixture
        .ledger
        .try_register(&Fingerprint::of(b"photo bytes"))
        .await
        .unwrap();

    assert_eq!(again, Some(first.sequence + 1));
}

#[tokio::test]
async fn test_ledger_failure_is_reported_as_partial() {
    let fixture = Fixture::new();
    let record = fixture.seed("stuck", b"stuck bytes").await;
    fixture.store.fail_ledger_writes.store(true, Ordering::SeqCst);

    let err = catalog::cleanup(&fixture.catalog, &fixture.ledger, &path_of(&record))
        .await
        .unwrap_err();

    assert!(err.is_partial());
    assert!(matches!(err, CleanupError::LedgerPartial { ref record, .. } if record.title == "stuck"));
    // Catalog step already happened; ledger and file are untouched.
    assert!(fixture.catalog.load().await.is_empty());
    assert!(fixture.ledger.contains(&record.fingerprint).await);
    assert!(path_of(&record).exists());
}

#[tokio::test]
async fn test_uncataloged_path_changes_nothing() {
    let fixture = Fixture::new();
    let record = fixture.seed("real", b"real bytes").await;

    let err = catalog::cleanup(
        &fixture.catalog,
        &fixture.ledger,
        Path::new("/nowhere/999_ghost.jpg"),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, CleanupError::NotCataloged(_)));
    assert!(!err.is_partial());
    assert_eq!(fixture.catalog.load().await.len(), 1);
    assert!(fixture.ledger.contains(&record.fingerprint).await);
}

#[tokio::test]
async fn test_already_missing_file_counts_as_removed() {
    let fixture = Fixture::new();
    let record = fixture.seed("vanished", b"vanished bytes").await;
    std::fs::remove_file(path_of(&record)).unwrap();

    catalog::cleanup(&fixture.catalog, &fixture.ledger, &path_of(&record))
        .await
        .unwrap();

    assert!(fixture.catalog.load().await.is_empty());
    assert!(fixture.ledger.is_empty().await);
}

#[tokio::test]
async fn test_cleanup_all_empties_everything_but_the_counter() {
    let fixture = Fixture::new();
    let mut records = Vec::new();
    for (title, bytes) in [("a", b"aaa"), ("b", b"bbb"), ("c", b"ccc")] {
        records.push(fixture.seed(title, bytes).await);
    }

    let removed = catalog::cleanup_all(&fixture.catalog, &fixture.ledger)
        .await
        .unwrap();

    assert_eq!(removed, 3);
    assert!(fixture.catalog.load().await.is_empty());
    assert!(fixture.ledger.is_empty().await);
    assert!(records.iter().all(|r| !path_of(r).exists()));
    assert_eq!(fixture.reopened_ledger().last_sequence().await, 3);
}

#[tokio::test]
async fn test_reset_history_keeps_files_and_counter() {
    let fixture = Fixture::new();
    let first = fixture.seed("one", b"one").await;
    let second = fixture.seed("two", b"two").await;

    catalog::reset_history(&fixture.catalog, &fixture.ledger)
        .await
        .unwrap();

    assert!(fixture.catalog.load().await.is_empty());
    assert!(fixture.ledger.is_empty().await);
    assert!(path_of(&first).exists());
    assert!(path_of(&second).exists());

    let reopened = fixture.reopened_ledger();
    assert_eq!(reopened.last_sequence().await, 2);
    assert_eq!(
        reopened.try_register(&first.fingerprint).await.unwrap(),
        Some(3)
    );
}

#[tokio::test]
async fn test_cleanup_matches_relative_record_by_absolute_path() {
    let fixture = Fixture::new();
    let pictures = tempfile::Builder::new()
        .prefix("cleanup-relative")
        .tempdir_in(".")
        .unwrap();
    let relative = Path::new(".")
        .join(pictures.path().file_name().unwrap())
        .join("001_relative.jpg");
    std::fs::write(&relative, b"relative bytes").unwrap();
    let fingerprint = Fingerprint::of(b"relative bytes");
    let sequence = fixture.ledger.register(&fingerprint).await.unwrap();
    let record = CatalogRecord {
        sequence,
        title: "relative".to_string(),
        local_path: relative.to_string_lossy().into_owned(),
        fingerprint,
        source_url: None,
        downloaded_at: None,
    };
    fixture.catalog.append(vec![record.clone()]).await.unwrap();

    let absolute = std::path::absolute(&relative).unwrap();
    let removed = catalog::cleanup(&fixture.catalog, &fixture.ledger, &absolute)
        .await
        .unwrap();

    assert_eq!(removed, record);
    assert!(!relative.exists());
    assert!(fixture.catalog.load().await.is_empty());
    assert!(!fixture.ledger.contains(&record.fingerprint).await);
}
