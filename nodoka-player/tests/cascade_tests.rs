//! Progress cascade and proxy cache behaviour across the public API

mod helpers;

use helpers::TestLibrary;
use nodoka_common::db::AudiobookFileRecord;
use nodoka_player::{ProxyCache, SidecarStore};
use serde_json::{Map, Value};
use std::sync::Arc;

const ONE: &str = "/books/Book/1.mp3";
const TWO: &str = "/books/Book/2.mp3";

fn file_record(n: usize) -> AudiobookFileRecord {
    AudiobookFileRecord {
        id: n as i64,
        audiobook_id: 1,
        name: format!("{}.mp3", n),
        full_path: format!("/books/Many/{}.mp3", n),
        position: n as i32,
    }
}

/// The sidecar document for `key` as it is on disk
fn stored_fields(lib: &TestLibrary, key: &str) -> Map<String, Value> {
    let path = lib.cache.store().compute_location(key);
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[tokio::test]
async fn test_file_completeness_follows_saved_time() {
    let lib = TestLibrary::new().await;
    let audiobook = lib.add_audiobook("Book", &[ONE]).await;
    let files = audiobook.files(&lib.db, &lib.cache).await.unwrap();

    files[0].set_media_duration(600_000);
    files[0].save_current_time(150_000);
    assert_eq!(files[0].completeness(), 25);

    files[0].save_current_time(300_000);
    assert_eq!(files[0].completeness(), 50);
    assert_eq!(audiobook.completeness(), 50);
    assert_eq!(audiobook.current_time(), 300_000);

    let stored = stored_fields(&lib, ONE);
    assert_eq!(stored["completeness"], Value::from(50));
    assert!(stored["completeness"].is_i64());
    assert!(stored["duration"].is_i64());
}

#[tokio::test]
async fn test_aggregate_sums_children() {
    let lib = TestLibrary::new().await;
    let audiobook = lib.add_audiobook("Book", &[ONE, TWO]).await;
    let files = audiobook.files(&lib.db, &lib.cache).await.unwrap();

    files[0].set_media_duration(600_000);
    assert_eq!(audiobook.total_duration(), 600_000);
    assert!(!audiobook.all_children_scanned());

    files[1].set_media_duration(600_000);
    assert_eq!(audiobook.total_duration(), 1_200_000);
    assert!(audiobook.all_children_scanned());

    files[0].save_current_time(600_000);
    files[1].save_current_time(300_000);
    // (600000 + 300000) / 1200000
    assert_eq!(audiobook.completeness(), 75);

    // Recomputing without changes is stable
    audiobook.on_duration_changed();
    audiobook.on_completeness_changed();
    audiobook.handle_scan_finished();
    assert_eq!(audiobook.total_duration(), 1_200_000);
    assert_eq!(audiobook.completeness(), 75);
}

#[tokio::test]
async fn test_progress_without_durations_keeps_aggregate() {
    let lib = TestLibrary::new().await;
    let audiobook = lib.add_audiobook("Book", &[ONE, TWO]).await;
    let files = audiobook.files(&lib.db, &lib.cache).await.unwrap();

    files[0].save_current_time(10_000);

    assert_eq!(files[0].current_time(), Some(10_000));
    assert_eq!(files[0].completeness(), 0);
    assert_eq!(audiobook.total_duration(), 0);
    assert_eq!(audiobook.completeness(), 0);
}

#[tokio::test]
async fn test_reset_read_status_clears_progress() {
    let lib = TestLibrary::new().await;
    let audiobook = lib.add_audiobook("Book", &[ONE, TWO]).await;
    let files = audiobook.files(&lib.db, &lib.cache).await.unwrap();
    files[0].set_media_duration(1000);
    files[1].set_media_duration(1000);
    files[0].save_current_time(1000);
    files[1].save_current_time(500);
    assert_eq!(audiobook.completeness(), 75);

    audiobook.reset_read_status(&lib.db, &lib.cache).await.unwrap();

    assert!(files.iter().all(|f| f.current_time().is_none()));
    assert!(files.iter().all(|f| f.completeness() == 0));
    assert_eq!(audiobook.completeness(), 0);
    // Durations survive a reset
    assert_eq!(audiobook.total_duration(), 2000);
}

#[tokio::test]
async fn test_progress_survives_restart() {
    let lib = TestLibrary::new().await;
    let audiobook = lib.add_audiobook("Book", &[ONE, TWO]).await;
    let files = audiobook.files(&lib.db, &lib.cache).await.unwrap();
    files[0].set_media_duration(4000);
    files[1].set_media_duration(4000);
    files[0].save_current_time(2000);

    // Fresh registry over the same sidecar folder
    let store = SidecarStore::open(lib.dir.path().join("sidecar")).unwrap();
    let cache = Arc::new(ProxyCache::new(store, 1000));
    let reloaded = cache.load_audiobook(&lib.db, audiobook.id()).await.unwrap();
    assert!(!Arc::ptr_eq(&reloaded, &audiobook));

    let files = reloaded.files(&lib.db, &cache).await.unwrap();
    assert_eq!(files[0].media_duration(), 4000);
    assert_eq!(files[0].current_time(), Some(2000));
    assert_eq!(files[0].completeness(), 50);
    assert_eq!(reloaded.total_duration(), 8000);
    assert_eq!(reloaded.completeness(), 25);
}

#[tokio::test]
async fn test_ceiling_clears_cache_before_insert() {
    let lib = TestLibrary::with_capacity(1000).await;

    let first = lib.cache.file(file_record(1));
    for n in 2..=1000 {
        lib.cache.file(file_record(n));
    }
    assert_eq!(lib.cache.file_count(), 1000);
    assert!(Arc::ptr_eq(&first, &lib.cache.file(file_record(1))));

    lib.cache.file(file_record(1001));
    assert_eq!(lib.cache.file_count(), 1);
    assert!(lib.cache.peek_file(&file_record(1).full_path).is_none());

    let rebuilt = lib.cache.file(file_record(1));
    assert!(!Arc::ptr_eq(&first, &rebuilt));
    assert_eq!(lib.cache.file_count(), 2);
}

#[tokio::test]
async fn test_cleared_proxy_no_longer_feeds_its_audiobook() {
    let lib = TestLibrary::new().await;
    let audiobook = lib.add_audiobook("Book", &[ONE]).await;
    let files = audiobook.files(&lib.db, &lib.cache).await.unwrap();
    files[0].set_media_duration(4000);
    assert_eq!(audiobook.total_duration(), 4000);

    lib.cache.clear();
    files[0].set_media_duration(9000);
    assert_eq!(audiobook.total_duration(), 4000);

    // An explicit recompute still sees the new value
    audiobook.on_duration_changed();
    assert_eq!(audiobook.total_duration(), 9000);
}

#[tokio::test]
async fn test_proxies_across_a_clear_share_their_document() {
    let lib = TestLibrary::with_capacity(1).await;
    let audiobook = lib.add_audiobook("Book", &[ONE]).await;
    let held = Arc::clone(&audiobook.files(&lib.db, &lib.cache).await.unwrap()[0]);

    // Push the held proxy out, then look the same path up again
    lib.cache.file(file_record(1));
    let fresh = lib.cache.load_file(&lib.db, ONE).await.unwrap();
    assert!(!Arc::ptr_eq(&held, &fresh));

    fresh.set_media_duration(600_000);
    fresh.save_current_time(150_000);
    held.set_as_complete();

    assert_eq!(held.media_duration(), 600_000);
    assert_eq!(held.current_time(), Some(150_000));
    assert_eq!(fresh.completeness(), 100);

    let stored = stored_fields(&lib, ONE);
    assert_eq!(stored["duration"], Value::from(600_000));
    assert_eq!(stored["currentTime"], Value::from(150_000));
    assert_eq!(stored["completeness"], Value::from(100));
}
