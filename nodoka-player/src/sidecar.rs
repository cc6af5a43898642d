//! Content-addressed sidecar store
//!
//! Playback fields that change on every position tick (current time,
//! completeness) and fields that are expensive to recompute (duration,
//! checksum) are kept out of the library database. Each logical key maps to
//! one small JSON document whose location is derived from the SHA-1 of the
//! key, laid out like git loose objects:
//!
//! ```text
//! <root>/<first two hex digits>/<remaining 38 hex digits>
//! ```
//!
//! Documents are independent. Writes to different keys never contend, and
//! there are no multi-key transactions. The store hands out one shared
//! [`SidecarDocument`] per key while any holder is alive, so every writer to
//! a key goes through the same in-memory copy and its mutex.

use crate::error::{Error, Result};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::Write;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, warn};

/// Field names used inside sidecar documents
pub mod fields {
    /// Media duration in milliseconds (int64)
    pub const DURATION: &str = "duration";
    /// Last persisted playback position in milliseconds (int64)
    pub const CURRENT_TIME: &str = "currentTime";
    /// Progress percentage, 0-100
    pub const COMPLETENESS: &str = "completeness";
    /// Hex SHA-1 of the media file contents
    pub const CHECKSUM: &str = "checkSum";
}

/// Root handle of the sidecar store
#[derive(Debug, Clone)]
pub struct SidecarStore {
    root: PathBuf,
    /// Documents some proxy still holds, by key
    open_documents: Arc<Mutex<HashMap<String, Weak<SidecarDocument>>>>,
}

impl SidecarStore {
    /// Open the store rooted at `root`, creating the folder if needed.
    ///
    /// Fails if the folder cannot be created or written to. Once the store
    /// is open, individual write failures are logged and dropped instead.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        std::fs::create_dir_all(&root).map_err(|e| {
            Error::Config(format!(
                "Cannot create sidecar folder {}: {}",
                root.display(),
                e
            ))
        })?;

        let probe = root.join(".write-probe");
        std::fs::write(&probe, b"")
            .and_then(|()| std::fs::remove_file(&probe))
            .map_err(|e| {
                Error::Config(format!(
                    "Sidecar folder {} is not writable: {}",
                    root.display(),
                    e
                ))
            })?;

        debug!("Sidecar store opened at {}", root.display());
        Ok(Self {
            root,
            open_documents: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the document for `key`
    pub fn compute_location(&self, key: &str) -> PathBuf {
        compute_location(&self.root, key)
    }

    /// Shared handle for `key`, loaded from disk when nobody holds one
    pub fn document(&self, key: &str) -> Arc<SidecarDocument> {
        let mut open = self
            .open_documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(document) = open.get(key).and_then(Weak::upgrade) {
            return document;
        }

        open.retain(|_, handle| handle.strong_count() > 0);
        let document = Arc::new(SidecarDocument::load(key, self.compute_location(key)));
        open.insert(key.to_string(), Arc::downgrade(&document));
        document
    }

    /// Read one field straight from disk
    pub fn get(&self, key: &str, field: &str) -> Option<Value> {
        self.document(key).get(field)
    }

    /// Write one field and flush it to disk
    pub fn set(&self, key: &str, field: &str, value: impl Into<Value>) {
        self.document(key).set(field, value);
    }
}

/// Hash `key` with SHA-1 and split the hex digest into shard and file name
pub fn compute_location(root: &Path, key: &str) -> PathBuf {
    let hex = format!("{:x}", Sha1::digest(key.as_bytes()));
    let (prefix, suffix) = hex.split_at(2);
    root.join(prefix).join(suffix)
}

/// One key's document, cached in memory and written through on every change
#[derive(Debug)]
pub struct SidecarDocument {
    key: String,
    path: PathBuf,
    fields: Mutex<Map<String, Value>>,
}

impl SidecarDocument {
    fn load(key: &str, path: PathBuf) -> Self {
        let fields = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<Map<String, Value>>(&text) {
                Ok(map) => map,
                Err(e) => {
                    warn!("Discarding unreadable sidecar {}: {}", path.display(), e);
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                warn!("Failed to read sidecar {}: {}", path.display(), e);
                Map::new()
            }
        };

        Self {
            key: key.to_string(),
            path,
            fields: Mutex::new(fields),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Map<String, Value>> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Field value, `None` when absent or null
    pub fn get(&self, field: &str) -> Option<Value> {
        self.lock().get(field).filter(|v| !v.is_null()).cloned()
    }

    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.get(field)
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
    }

    pub fn get_f64(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(|v| v.as_f64())
    }

    pub fn get_string(&self, field: &str) -> Option<String> {
        self.get(field).and_then(|v| v.as_str().map(str::to_string))
    }

    pub fn contains(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    /// Set one field and flush the document
    pub fn set(&self, field: &str, value: impl Into<Value>) {
        self.update(|fields| {
            fields.insert(field.to_string(), value.into());
        });
    }

    /// Remove one field and flush the document
    pub fn remove(&self, field: &str) {
        self.update(|fields| {
            fields.remove(field);
        });
    }

    /// Apply several changes under one lock and flush once
    pub fn update(&self, apply: impl FnOnce(&mut Map<String, Value>)) {
        let mut fields = self.lock();
        apply(&mut fields);

        // The flush stays under the lock so two writers through this handle
        // can never reorder their files on disk.
        match serde_json::to_vec_pretty(&*fields) {
            Ok(bytes) => {
                if let Err(e) = write_synced(&self.path, &bytes) {
                    warn!(
                        "Dropping sidecar write for '{}' ({}): {}",
                        self.key,
                        self.path.display(),
                        e
                    );
                }
            }
            Err(e) => warn!("Failed to encode sidecar for '{}': {}", self.key, e),
        }
    }
}

/// Write to a temp file, fsync, then rename over the target
fn write_synced(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_location_shards_sha1() {
        let root = Path::new("/data/sidecar");
        // SHA-1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        let location = compute_location(root, "abc");
        assert_eq!(
            location,
            PathBuf::from("/data/sidecar/a9/993e364706816aba3e25717850c26c9cd0d89d")
        );
    }

    #[test]
    fn test_distinct_keys_distinct_locations() {
        let root = Path::new("/x");
        assert_ne!(
            compute_location(root, "/books/a/01.mp3"),
            compute_location(root, "/books/a/02.mp3")
        );
    }

    #[test]
    fn test_set_persists_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();

        store.set("/books/a/01.mp3", fields::DURATION, 600_000i64);

        // A fresh handle reads from disk
        let doc = store.document("/books/a/01.mp3");
        assert_eq!(doc.get_i64(fields::DURATION), Some(600_000));
        assert!(store.compute_location("/books/a/01.mp3").exists());
    }

    #[test]
    fn test_live_handles_are_shared() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();

        let first = store.document("/books/a/01.mp3");
        let second = store.document("/books/a/01.mp3");
        assert!(Arc::ptr_eq(&first, &second));

        second.set(fields::DURATION, 600_000i64);
        first.set(fields::CURRENT_TIME, 1500i64);

        drop(first);
        drop(second);
        let reloaded = store.document("/books/a/01.mp3");
        assert_eq!(reloaded.get_i64(fields::DURATION), Some(600_000));
        assert_eq!(reloaded.get_i64(fields::CURRENT_TIME), Some(1500));
    }

    #[test]
    fn test_missing_field_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();

        assert_eq!(store.get("never-written", fields::CURRENT_TIME), None);
        let doc = store.document("never-written");
        assert!(!doc.contains(fields::CURRENT_TIME));
    }

    #[test]
    fn test_update_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();
        let doc = store.document("k");

        doc.update(|f| {
            f.insert(fields::CURRENT_TIME.to_string(), Value::from(1500));
            f.insert(fields::COMPLETENESS.to_string(), Value::from(12.5));
        });
        doc.remove(fields::CURRENT_TIME);

        let reloaded = store.document("k");
        assert_eq!(reloaded.get_i64(fields::CURRENT_TIME), None);
        assert_eq!(reloaded.get_f64(fields::COMPLETENESS), Some(12.5));
    }

    #[test]
    fn test_corrupt_document_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();
        let path = store.compute_location("broken");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        let doc = store.document("broken");
        assert_eq!(doc.get(fields::DURATION), None);

        doc.set(fields::DURATION, 42i64);
        assert_eq!(store.document("broken").get_i64(fields::DURATION), Some(42));
    }

    #[test]
    fn test_write_failure_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SidecarStore::open(dir.path()).unwrap();
        let path = store.compute_location("blocked");

        // Occupy the shard directory name with a plain file
        std::fs::write(path.parent().unwrap(), b"").unwrap();

        store.set("blocked", fields::DURATION, 10i64);
        assert_eq!(store.get("blocked", fields::DURATION), None);
    }

    #[test]
    fn test_open_fails_on_file_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("occupied");
        std::fs::write(&root, b"").unwrap();

        assert!(matches!(SidecarStore::open(&root), Err(Error::Config(_))));
    }
}
