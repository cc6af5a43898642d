//! File-level proxy: one media file plus its sidecar document

use super::CascadeHook;
use crate::checksum::file_sha1;
use crate::sidecar::{fields, SidecarDocument, SidecarStore};
use nodoka_common::db::AudiobookFileRecord;
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, warn};

/// Wrapper over an [`AudiobookFileRecord`]
///
/// Duration, position and completeness are read from and written to the
/// sidecar document keyed by the file path. The row itself is never
/// refreshed for the lifetime of the proxy.
pub struct AudiobookFileProxy {
    record: AudiobookFileRecord,
    document: Arc<SidecarDocument>,
    on_duration_changed: RwLock<Option<CascadeHook>>,
    on_completeness_changed: RwLock<Option<CascadeHook>>,
}

impl AudiobookFileProxy {
    pub fn new(record: AudiobookFileRecord, store: &SidecarStore) -> Self {
        let document = store.document(&record.full_path);
        Self {
            record,
            document,
            on_duration_changed: RwLock::new(None),
            on_completeness_changed: RwLock::new(None),
        }
    }

    pub fn record(&self) -> &AudiobookFileRecord {
        &self.record
    }

    pub fn path(&self) -> &str {
        &self.record.full_path
    }

    pub fn name(&self) -> &str {
        &self.record.name
    }

    pub fn audiobook_id(&self) -> i64 {
        self.record.audiobook_id
    }

    pub fn position(&self) -> i32 {
        self.record.position
    }

    /// Duration in milliseconds, -1 while unknown
    pub fn media_duration(&self) -> i64 {
        self.document
            .get_i64(fields::DURATION)
            .filter(|d| *d > 0)
            .unwrap_or(-1)
    }

    /// True once a positive duration has been persisted
    pub fn is_scanned(&self) -> bool {
        self.media_duration() > 0
    }

    /// Persist a probed duration and notify the parent aggregate
    ///
    /// Non-positive values are ignored so a failed probe never overwrites a
    /// good duration.
    pub fn set_media_duration(&self, duration: i64) {
        if duration <= 0 {
            debug!("Ignoring non-positive duration {} for {}", duration, self.path());
            return;
        }

        self.document.set(fields::DURATION, duration);
        fire(&self.on_duration_changed);
    }

    /// Last saved position, `None` if the file was never played
    pub fn current_time(&self) -> Option<i64> {
        self.document.get_i64(fields::CURRENT_TIME)
    }

    /// Completeness rounded to a whole percent
    pub fn completeness(&self) -> i32 {
        self.document
            .get_f64(fields::COMPLETENESS)
            .map(|c| c.round() as i32)
            .unwrap_or(0)
    }

    /// Persist the playback position and notify the parent aggregate
    ///
    /// Completeness only moves forward: it is rewritten when the new
    /// position is further than anything recorded before.
    pub fn save_current_time(&self, current_time: i64) {
        let current_time = current_time.max(0);
        let duration = self.media_duration();

        self.document.update(|doc| {
            doc.insert(fields::CURRENT_TIME.to_string(), Value::from(current_time));

            if duration > 0 {
                let calculated =
                    (current_time as f64 / duration as f64 * 100.0).round().min(100.0) as i64;
                let previous = doc
                    .get(fields::COMPLETENESS)
                    .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64)))
                    .unwrap_or(0);
                if calculated > previous {
                    doc.insert(fields::COMPLETENESS.to_string(), Value::from(calculated));
                }
            }
        });

        fire(&self.on_completeness_changed);
    }

    /// Mark the file as fully listened
    pub fn set_as_complete(&self) {
        self.document.set(fields::COMPLETENESS, 100);
        fire(&self.on_completeness_changed);
    }

    /// Forget position and completeness (explicit user reset)
    pub fn reset_read_status(&self) {
        self.document.update(|doc| {
            doc.remove(fields::CURRENT_TIME);
            doc.remove(fields::COMPLETENESS);
        });
        fire(&self.on_completeness_changed);
    }

    pub fn checksum(&self) -> Option<String> {
        self.document.get_string(fields::CHECKSUM)
    }

    /// Compute the SHA-1 of the file unless one is already stored
    ///
    /// Returns the stored checksum afterwards. Read failures are logged and
    /// leave the document untouched.
    pub fn calc_and_write_checksum(&self, forced: bool) -> Option<String> {
        if !forced {
            if let Some(existing) = self.checksum() {
                return Some(existing);
            }
        }

        match file_sha1(Path::new(self.path())) {
            Ok(hash) => {
                self.document.set(fields::CHECKSUM, hash.clone());
                Some(hash)
            }
            Err(e) => {
                warn!("Checksum failed for {}: {}", self.path(), e);
                self.checksum()
            }
        }
    }

    pub fn file_exists(&self) -> bool {
        Path::new(self.path()).is_file()
    }

    pub fn set_duration_hook(&self, hook: CascadeHook) {
        *self
            .on_duration_changed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    pub fn set_completeness_hook(&self, hook: CascadeHook) {
        *self
            .on_completeness_changed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    /// Drop both cascade hooks; later writes no longer reach the audiobook
    pub fn detach_hooks(&self) {
        for slot in [&self.on_duration_changed, &self.on_completeness_changed] {
            *slot.write().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}

impl std::fmt::Debug for AudiobookFileProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudiobookFileProxy")
            .field("path", &self.record.full_path)
            .field("audiobook_id", &self.record.audiobook_id)
            .field("position", &self.record.position)
            .finish()
    }
}

// The hook is cloned out so no lock is held while the parent recomputes.
fn fire(slot: &RwLock<Option<CascadeHook>>) {
    let hook = slot.read().unwrap_or_else(PoisonError::into_inner).clone();
    if let Some(hook) = hook {
        hook();
    }
}
