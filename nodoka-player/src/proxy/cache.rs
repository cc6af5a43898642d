//! Keyed proxy registry
//!
//! One live proxy per key: files by full path, audiobooks by id. Each
//! sub-cache has a size ceiling; when an insert would exceed it the whole
//! sub-cache is dropped first. Callers that still hold an `Arc` keep a
//! readable proxy, but its cascade hooks are detached and a later lookup
//! builds a fresh one.

use super::{AudiobookFileProxy, AudiobookProxy};
use crate::db::library;
use crate::error::{Error, Result};
use crate::sidecar::SidecarStore;
use nodoka_common::db::{AudiobookFileRecord, AudiobookRecord};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

struct KeyedCache<K, V> {
    label: &'static str,
    capacity: usize,
    entries: Mutex<HashMap<K, Arc<V>>>,
    /// Run on every entry dropped by a clear
    evict: fn(&V),
}

impl<K: Eq + Hash + Debug, V> KeyedCache<K, V> {
    fn new(label: &'static str, capacity: usize, evict: fn(&V)) -> Self {
        Self {
            label,
            capacity: capacity.max(1),
            entries: Mutex::new(HashMap::new()),
            evict,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, Arc<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get_or_insert_with(&self, key: K, make: impl FnOnce() -> V) -> Arc<V> {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(&key) {
            return Arc::clone(existing);
        }

        if entries.len() >= self.capacity {
            debug!(
                "{} cache reached {} entries, clearing before {:?}",
                self.label,
                entries.len(),
                key
            );
            self.drain(&mut entries);
        }

        let value = Arc::new(make());
        entries.insert(key, Arc::clone(&value));
        value
    }

    fn peek(&self, key: &K) -> Option<Arc<V>> {
        self.lock().get(key).cloned()
    }

    fn remove(&self, key: &K) -> Option<Arc<V>> {
        self.lock().remove(key)
    }

    fn clear(&self) {
        self.drain(&mut self.lock());
    }

    fn drain(&self, entries: &mut HashMap<K, Arc<V>>) {
        for (_, value) in entries.drain() {
            (self.evict)(&value);
        }
    }

    fn len(&self) -> usize {
        self.lock().len()
    }
}

/// Registry of live file and audiobook proxies
pub struct ProxyCache {
    store: SidecarStore,
    files: KeyedCache<String, AudiobookFileProxy>,
    audiobooks: KeyedCache<i64, AudiobookProxy>,
}

impl ProxyCache {
    pub fn new(store: SidecarStore, capacity: usize) -> Self {
        Self {
            store,
            files: KeyedCache::new("File", capacity, AudiobookFileProxy::detach_hooks),
            audiobooks: KeyedCache::new("Audiobook", capacity, |_| {}),
        }
    }

    pub fn store(&self) -> &SidecarStore {
        &self.store
    }

    /// Proxy for a file row, reusing the live one for the same path
    pub fn file(&self, record: AudiobookFileRecord) -> Arc<AudiobookFileProxy> {
        let store = &self.store;
        self.files.get_or_insert_with(record.full_path.clone(), || {
            AudiobookFileProxy::new(record, store)
        })
    }

    /// Proxy for an audiobook row, reusing the live one for the same id
    pub fn audiobook(&self, record: AudiobookRecord) -> Arc<AudiobookProxy> {
        let store = &self.store;
        self.audiobooks
            .get_or_insert_with(record.id, || AudiobookProxy::new(record, store))
    }

    /// Live audiobook proxy without touching the database
    pub fn peek_audiobook(&self, id: i64) -> Option<Arc<AudiobookProxy>> {
        self.audiobooks.peek(&id)
    }

    /// Live file proxy without touching the database
    pub fn peek_file(&self, path: &str) -> Option<Arc<AudiobookFileProxy>> {
        self.files.peek(&path.to_string())
    }

    /// Audiobook proxy by id, reading the row if it is not cached
    pub async fn load_audiobook(&self, db: &Pool<Sqlite>, id: i64) -> Result<Arc<AudiobookProxy>> {
        if let Some(audiobook) = self.peek_audiobook(id) {
            return Ok(audiobook);
        }

        let record = library::get_audiobook(db, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Audiobook {}", id)))?;
        Ok(self.audiobook(record))
    }

    /// File proxy by full path, reading the row if it is not cached
    pub async fn load_file(&self, db: &Pool<Sqlite>, path: &str) -> Result<Arc<AudiobookFileProxy>> {
        if let Some(file) = self.peek_file(path) {
            return Ok(file);
        }

        let record = library::get_file_by_path(db, path)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Audiobook file {}", path)))?;
        Ok(self.file(record))
    }

    /// The file following `file` in its audiobook, `None` at the last file
    pub async fn next_file(
        &self,
        db: &Pool<Sqlite>,
        file: &AudiobookFileProxy,
    ) -> Result<Option<Arc<AudiobookFileProxy>>> {
        let next_position = file.position() + 1;

        if let Some(audiobook) = self.peek_audiobook(file.audiobook_id()) {
            if audiobook.loaded_files().is_some() {
                return Ok(audiobook.file_at(next_position));
            }
        }

        let record = library::get_file_at_position(db, file.audiobook_id(), next_position).await?;
        Ok(record.map(|r| self.file(r)))
    }

    /// True iff a file with the next position exists in the same audiobook
    pub async fn has_next_file(&self, db: &Pool<Sqlite>, file: &AudiobookFileProxy) -> Result<bool> {
        Ok(self.next_file(db, file).await?.is_some())
    }

    /// Drop the audiobook proxy and the proxies of its files
    pub fn forget_audiobook(&self, id: i64) {
        if let Some(audiobook) = self.audiobooks.remove(&id) {
            for file in audiobook.loaded_files().unwrap_or_default() {
                self.files.remove(&file.path().to_string());
            }
        }
    }

    /// Delete the audiobook rows and drop its proxies
    ///
    /// Sidecar documents of the files stay on disk.
    pub async fn remove_audiobook(&self, db: &Pool<Sqlite>, id: i64) -> Result<bool> {
        let deleted = library::delete_audiobook(db, id).await?;
        self.forget_audiobook(id);
        Ok(deleted)
    }

    pub fn clear(&self) {
        self.files.clear();
        self.audiobooks.clear();
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn audiobook_count(&self) -> usize {
        self.audiobooks.len()
    }
}
