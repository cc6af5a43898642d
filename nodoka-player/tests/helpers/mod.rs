//! Shared fixtures for nodoka-player integration tests
//!
//! - `fake_backend`: scripted [`MediaBackend`] that records every call
//! - `audio_generator`: WAV files for the real headless backend
//! - library setup on an in-memory database with a temp sidecar folder

#![allow(dead_code)]

pub mod audio_generator;
pub mod fake_backend;

pub use audio_generator::generate_silent_wav;
pub use fake_backend::{BackendCall, FakeBackend};

use nodoka_common::db::{create_tables, NewAudiobook};
use nodoka_player::db::library;
use nodoka_player::{AudiobookProxy, PlayerNotification, ProxyCache, ScanEvent, SidecarStore};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Upper bound for anything a test waits on
pub const WAIT: Duration = Duration::from_secs(5);

/// In-memory library plus a sidecar store in a temp folder
pub struct TestLibrary {
    pub db: Pool<Sqlite>,
    pub cache: Arc<ProxyCache>,
    pub dir: TempDir,
}

impl TestLibrary {
    pub async fn new() -> Self {
        Self::with_capacity(1000).await
    }

    pub async fn with_capacity(capacity: usize) -> Self {
        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory database");
        create_tables(&db).await.expect("schema");

        let dir = tempfile::tempdir().expect("temp dir");
        let store = SidecarStore::open(dir.path().join("sidecar")).expect("sidecar store");
        let cache = Arc::new(ProxyCache::new(store, capacity));

        Self { db, cache, dir }
    }

    /// Register an audiobook under `/books/<name>` with the given file paths
    pub async fn add_audiobook(&self, name: &str, paths: &[&str]) -> Arc<AudiobookProxy> {
        let book = NewAudiobook {
            directory: "/books".to_string(),
            name: name.to_string(),
            full_path: format!("/books/{}", name),
            default_order: 0,
        };
        let id = library::register_audiobook(&self.db, &book, paths)
            .await
            .expect("register audiobook");
        self.cache
            .load_audiobook(&self.db, id)
            .await
            .expect("load audiobook")
    }
}

/// Wait for the first notification matching `predicate`
pub async fn wait_for_notification<F>(
    rx: &mut broadcast::Receiver<PlayerNotification>,
    mut predicate: F,
) -> PlayerNotification
where
    F: FnMut(&PlayerNotification) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(notification) if predicate(&notification) => return notification,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("player dropped"),
            }
        }
    })
    .await
    .expect("timed out waiting for player notification")
}

/// Collect scan events up to and including `Drained`
pub async fn collect_until_drained(rx: &mut broadcast::Receiver<ScanEvent>) -> Vec<ScanEvent> {
    tokio::time::timeout(WAIT, async {
        let mut events = Vec::new();
        loop {
            match rx.recv().await {
                Ok(ScanEvent::Drained) => {
                    events.push(ScanEvent::Drained);
                    return events;
                }
                Ok(event) => events.push(event),
                Err(e) => panic!("scan events lost: {}", e),
            }
        }
    })
    .await
    .expect("timed out waiting for scan queue to drain")
}

/// Poll `condition` until it holds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never became true");
}
