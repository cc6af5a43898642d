//! Audiobook-level proxy and the aggregation cascade
//!
//! An audiobook's duration and completeness are derived from its files.
//! When the file list is first loaded the proxy attaches two hooks to every
//! file proxy; each file write then calls back here and the aggregate is
//! recomputed from scratch. Recomputing (rather than applying deltas) keeps
//! both handlers idempotent: firing one twice leaves the same value.

use super::{audiobook_sidecar_key, AudiobookFileProxy, ProxyCache};
use crate::db::library;
use crate::error::{Error, Result};
use crate::sidecar::{fields, SidecarDocument, SidecarStore};
use nodoka_common::db::AudiobookRecord;
use sqlx::{Pool, Sqlite};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Wrapper over an [`AudiobookRecord`] with the aggregate sidecar document
pub struct AudiobookProxy {
    record: AudiobookRecord,
    document: Arc<SidecarDocument>,
    selected_file: Mutex<Option<String>>,
    files: OnceCell<Vec<Arc<AudiobookFileProxy>>>,
}

impl AudiobookProxy {
    pub fn new(record: AudiobookRecord, store: &SidecarStore) -> Self {
        let document = store.document(&audiobook_sidecar_key(record.id, &record.directory));
        let selected_file = Mutex::new(record.selected_file.clone());
        Self {
            record,
            document,
            selected_file,
            files: OnceCell::new(),
        }
    }

    pub fn record(&self) -> &AudiobookRecord {
        &self.record
    }

    pub fn id(&self) -> i64 {
        self.record.id
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn directory(&self) -> &str {
        &self.record.directory
    }

    pub fn sidecar_key(&self) -> &str {
        self.document.key()
    }

    /// Ordered file proxies, loaded from the library on first use
    ///
    /// Files come from the shared cache so hooks attached here are seen by
    /// every other holder of the same file proxy.
    pub async fn files(
        self: &Arc<Self>,
        db: &Pool<Sqlite>,
        cache: &ProxyCache,
    ) -> Result<Vec<Arc<AudiobookFileProxy>>> {
        let files = self
            .files
            .get_or_try_init(|| async {
                let records = library::get_audiobook_files(db, self.id()).await?;
                let proxies: Vec<_> = records.into_iter().map(|r| cache.file(r)).collect();
                for file in &proxies {
                    self.attach(file);
                }
                debug!(
                    "Loaded {} files for audiobook {}",
                    proxies.len(),
                    self.id()
                );
                Ok::<_, Error>(proxies)
            })
            .await?;

        Ok(files.clone())
    }

    /// File list if it was already loaded
    pub fn loaded_files(&self) -> Option<&[Arc<AudiobookFileProxy>]> {
        self.files.get().map(Vec::as_slice)
    }

    /// Loaded file at `position`, if any
    pub fn file_at(&self, position: i32) -> Option<Arc<AudiobookFileProxy>> {
        self.loaded_files()?
            .iter()
            .find(|f| f.position() == position)
            .cloned()
    }

    fn attach(self: &Arc<Self>, file: &AudiobookFileProxy) {
        let weak = Arc::downgrade(self);
        file.set_duration_hook(Arc::new(move || {
            if let Some(audiobook) = weak.upgrade() {
                audiobook.on_duration_changed();
            }
        }));

        let weak = Arc::downgrade(self);
        file.set_completeness_hook(Arc::new(move || {
            if let Some(audiobook) = weak.upgrade() {
                audiobook.on_completeness_changed();
            }
        }));
    }

    /// Sum of known file durations in milliseconds, 0 before any scan
    pub fn total_duration(&self) -> i64 {
        self.document.get_i64(fields::DURATION).unwrap_or(0)
    }

    /// Aggregate completeness, 0-100
    pub fn completeness(&self) -> i32 {
        self.document
            .get_f64(fields::COMPLETENESS)
            .map(|c| c.round() as i32)
            .unwrap_or(self.record.completeness)
    }

    /// Saved position of the aggregate (sum of file positions)
    pub fn current_time(&self) -> i64 {
        self.document.get_i64(fields::CURRENT_TIME).unwrap_or(0)
    }

    /// Recompute and persist the total duration
    pub fn on_duration_changed(&self) {
        let Some(files) = self.loaded_files() else {
            return;
        };

        let total: i64 = files
            .iter()
            .map(|f| f.media_duration())
            .filter(|d| *d >= 0)
            .sum();

        debug!("Audiobook {} total duration {} ms", self.id(), total);
        self.document.set(fields::DURATION, total);
    }

    /// Recompute and persist the listened position and completeness
    ///
    /// Nothing is written while the total duration is unknown.
    pub fn on_completeness_changed(&self) {
        let Some(files) = self.loaded_files() else {
            return;
        };

        let total = self.total_duration();
        if total <= 0 {
            return;
        }

        let listened: i64 = files
            .iter()
            .map(|f| f.current_time().unwrap_or(0).max(0))
            .sum();
        let percent = (listened as f64 / total as f64 * 100.0)
            .round()
            .clamp(0.0, 100.0) as i64;

        self.document.update(|doc| {
            doc.insert(fields::CURRENT_TIME.to_string(), listened.into());
            doc.insert(fields::COMPLETENESS.to_string(), percent.into());
        });
    }

    /// True once every file has a positive duration
    ///
    /// Reads the loaded file list; callers load it with [`files`](Self::files)
    /// first. The scan queue does so when an entry is enqueued.
    pub fn all_children_scanned(&self) -> bool {
        match self.loaded_files() {
            Some(files) if !files.is_empty() => files.iter().all(|f| f.is_scanned()),
            _ => false,
        }
    }

    /// Called by the scan queue once the last file of this audiobook is probed
    pub fn handle_scan_finished(&self) {
        self.on_duration_changed();
        self.on_completeness_changed();
        info!(
            "Audiobook {} '{}' scanned: {} ms, {}%",
            self.id(),
            self.name(),
            self.total_duration(),
            self.completeness()
        );
    }

    /// Path of the file the user last played
    pub fn selected_file(&self) -> Option<String> {
        self.selected_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_selected_file(&self, path: &str) {
        *self
            .selected_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.to_string());
    }

    /// Forget progress of every file and of the aggregate
    pub async fn reset_read_status(
        self: &Arc<Self>,
        db: &Pool<Sqlite>,
        cache: &ProxyCache,
    ) -> Result<()> {
        for file in self.files(db, cache).await? {
            file.reset_read_status();
        }
        self.document.update(|doc| {
            doc.remove(fields::CURRENT_TIME);
            doc.insert(fields::COMPLETENESS.to_string(), 0.into());
        });
        Ok(())
    }
}

impl std::fmt::Debug for AudiobookProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudiobookProxy")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .field("directory", &self.record.directory)
            .finish()
    }
}
