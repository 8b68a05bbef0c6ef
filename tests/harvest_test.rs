//! End-to-end harvest runs: synthetic gallery, mock image host, real documents.

mod common;

use std::sync::atomic::Ordering;

use common::{Card, SyntheticGallery};
use gallery_harvester::config::Config;
use gallery_harvester::progress::never_cancel;
use gallery_harvester::walker::{PageRange, WalkState};
use gallery_harvester::Harvester;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn harvester(dir: &TempDir) -> Harvester {
    Harvester::new(Config {
        data_dir: dir.path().join("data"),
        pictures_dir: dir.path().join("pictures"),
        ..Config::for_testing()
    })
}

async fn serve(server: &MockServer, route: &str, body: &[u8]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(body.to_vec())
                .insert_header("content-type", "image/jpeg"),
        )
        .mount(server)
        .await;
}

/// Two pages; the second repeats the first page's sunset under another URL.
async fn gallery(server: &MockServer) -> SyntheticGallery {
    serve(server, "/p1/sunset.jpg", b"sunset").await;
    serve(server, "/p1/forest.jpg", b"forest").await;
    serve(server, "/p2/sunset-copy.jpg", b"sunset").await;
    serve(server, "/p2/river.jpg", b"river").await;

    let base = server.uri();
    SyntheticGallery::paginated(vec![
        vec![
            Card::new("Sunset", format!("{base}/p1/sunset.jpg")),
            Card::new("Forest", format!("{base}/p1/forest.jpg")),
        ],
        vec![
            Card::new("Sunset again", format!("{base}/p2/sunset-copy.jpg")),
            Card::new("River", format!("{base}/p2/river.jpg")),
        ],
    ])
}

fn quiet(_page: u32, _status: &str) {}

#[tokio::test]
async fn test_harvest_stores_each_picture_once() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let harvester = harvester(&dir);
    let driver = gallery(&server).await;
    let closed = driver.closed_flag();

    let summary = harvester
        .run_with_driver(driver, PageRange::new(1, 2).unwrap(), &never_cancel, &quiet)
        .await
        .unwrap();

    assert!(closed.load(Ordering::SeqCst));
    assert_eq!(summary.candidates, 4);
    assert_eq!(summary.accepted.len(), 3);
    assert_eq!(summary.final_state, WalkState::Done);
    assert_eq!(summary.last_page, 2);

    let catalog = harvester.catalog().load().await;
    let sequences: Vec<u64> = catalog.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
    let mut titles: Vec<&str> = catalog.iter().map(|r| r.title.as_str()).collect();
    titles.sort_unstable();
    assert!(titles == ["Forest", "River", "Sunset"] || titles == ["Forest", "River", "Sunset again"]);

    assert_eq!(harvester.ledger().len().await, 3);
    assert_eq!(harvester.ledger().last_sequence().await, 3);
    for record in &catalog {
        assert!(record.path().exists(), "{} missing", record.local_path);
    }
}

#[tokio::test]
async fn test_second_harvest_finds_nothing_new() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let range = PageRange::new(1, 2).unwrap();

    let first = harvester(&dir)
        .run_with_driver(gallery(&server).await, range, &never_cancel, &quiet)
        .await
        .unwrap();
    assert_eq!(first.accepted.len(), 3);

    // New process over the same data directory.
    let harvester = harvester(&dir);
    let second = harvester
        .run_with_driver(gallery(&server).await, range, &never_cancel, &quiet)
        .await
        .unwrap();

    assert_eq!(second.candidates, 4);
    assert!(second.accepted.is_empty());
    assert_eq!(harvester.catalog().load().await.len(), 3);
    assert_eq!(harvester.ledger().last_sequence().await, 3);
}

#[tokio::test]
async fn test_cleanup_then_reharvest_gets_fresh_sequence() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let harvester = harvester(&dir);
    let range = PageRange::new(1, 1).unwrap();

    let summary = harvester
        .run_with_driver(gallery(&server).await, range, &never_cancel, &quiet)
        .await
        .unwrap();
    let forest = summary
        .accepted
        .iter()
        .find(|r| r.title == "Forest")
        .cloned()
        .unwrap();

    harvester.cleanup(forest.path()).await.unwrap();
    assert!(!forest.path().exists());

    let again = harvester
        .run_with_driver(gallery(&server).await, range, &never_cancel, &quiet)
        .await
        .unwrap();

    assert_eq!(again.accepted.len(), 1);
    assert_eq!(again.accepted[0].title, "Forest");
    assert_eq!(again.accepted[0].sequence, 3);
    let sequences: Vec<u64> = harvester
        .catalog()
        .load()
        .await
        .iter()
        .map(|r| r.sequence)
        .collect();
    assert_eq!(sequences.len(), 2);
    assert!(sequences.contains(&3));
}

#[tokio::test]
async fn test_unreachable_gallery_fails_and_closes_browser() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let driver = gallery(&server).await.failing_to_open();
    let closed = driver.closed_flag();

    let result = harvester(&dir)
        .run_with_driver(driver, PageRange::new(1, 1).unwrap(), &never_cancel, &quiet)
        .await;

    assert!(result.is_err());
    assert!(closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_reset_history_allows_everything_again() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let harvester = harvester(&dir);
    let range = PageRange::new(1, 2).unwrap();

    harvester
        .run_with_driver(gallery(&server).await, range, &never_cancel, &quiet)
        .await
        .unwrap();
    harvester.reset_history().await.unwrap();

    let summary = harvester
        .run_with_driver(gallery(&server).await, range, &never_cancel, &quiet)
        .await
        .unwrap();

    let sequences: Vec<u64> = summary.accepted.iter().map(|r| r.sequence).collect();
    assert_eq!(sequences, vec![4, 5, 6]);
}

#[tokio::test]
async fn test_storage_failure_still_catalogs_earlier_images() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let harvester = Harvester::new(Config {
        data_dir: dir.path().join("data"),
        pictures_dir: dir.path().join("pictures"),
        max_concurrent_downloads: 1,
        ..Config::for_testing()
    });
    // Blocks the file for the second accepted image.
    std::fs::create_dir_all(dir.path().join("pictures/002_Forest.jpg")).unwrap();

    let result = harvester
        .run_with_driver(
            gallery(&server).await,
            PageRange::new(1, 1).unwrap(),
            &never_cancel,
            &quiet,
        )
        .await;

    assert!(result.is_err());
    let catalog = harvester.catalog().load().await;
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog[0].title, "Sunset");
    assert_eq!(catalog[0].sequence, 1);
    assert!(catalog[0].path().exists());
    assert_eq!(harvester.ledger().len().await, 1);
    assert_eq!(harvester.ledger().last_sequence().await, 2);
}
