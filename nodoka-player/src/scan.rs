//! Duration scan queue
//!
//! Probes the duration of files nobody has played yet. A single worker
//! thread owns a backend instance of its own, so probes never touch the
//! interactive player's engine. Entries are processed strictly in FIFO
//! order, one at a time.
//!
//! For each entry the worker opens the file, starts playback and blocks on
//! the backend's event stream until playback is confirmed, then reads and
//! persists the duration, stops, and releases the media. When the last
//! unscanned file of an audiobook is done the audiobook recomputes its
//! totals once more.

use crate::backend::{event_channel, BackendEvent, BackendState, EventStream, MediaBackend};
use crate::error::{Error, Result};
use crate::proxy::{AudiobookFileProxy, AudiobookProxy, ProxyCache};
use sqlx::{Pool, Sqlite};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Scan progress reported to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// Duration found and persisted
    Probed { path: String, duration: i64 },
    /// Probe failed; the file stays unscanned
    Failed { path: String, reason: String },
    /// Every file of the audiobook now has a duration
    AudiobookScanned { audiobook_id: i64, total_duration: i64 },
    /// The queue ran empty
    Drained,
}

struct ScanEntry {
    file: Arc<AudiobookFileProxy>,
    /// Always has its file list loaded
    audiobook: Option<Arc<AudiobookProxy>>,
}

#[derive(Default)]
struct PendingScans {
    queue: VecDeque<ScanEntry>,
    /// Paths currently in `queue`
    queued: HashSet<String>,
}

struct SharedScanState {
    pending: Mutex<PendingScans>,
    condvar: Condvar,
    stop_flag: AtomicBool,
    events: broadcast::Sender<ScanEvent>,
}

impl SharedScanState {
    fn lock(&self) -> MutexGuard<'_, PendingScans> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ScanEvent) {
        let _ = self.events.send(event);
    }
}

/// Serial duration-probe queue
pub struct ScanQueue {
    shared: Arc<SharedScanState>,
    thread: Option<JoinHandle<()>>,
    db: Pool<Sqlite>,
    cache: Arc<ProxyCache>,
}

impl ScanQueue {
    /// Start the worker thread on a dedicated backend instance
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        db: Pool<Sqlite>,
        cache: Arc<ProxyCache>,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(256);
        let shared = Arc::new(SharedScanState {
            pending: Mutex::new(PendingScans::default()),
            condvar: Condvar::new(),
            stop_flag: AtomicBool::new(false),
            events,
        });

        let worker_state = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("nodoka-scan".to_string())
            .spawn(move || Self::worker_loop(worker_state, backend))
            .map_err(|e| Error::Backend(format!("Failed to start scan worker: {}", e)))?;

        info!("Scan queue started");

        Ok(Self {
            shared,
            thread: Some(handle),
            db,
            cache,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.shared.events.subscribe()
    }

    /// Entries waiting for the worker (not counting an in-flight probe)
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Queue every unscanned file of `audiobook`; returns how many were added
    pub async fn enqueue_audiobook(&self, audiobook: &Arc<AudiobookProxy>) -> Result<usize> {
        let files = audiobook.files(&self.db, &self.cache).await?;

        let added = {
            let mut pending = self.shared.lock();
            files
                .into_iter()
                .filter(|file| {
                    Self::push(&mut pending, Arc::clone(file), Some(Arc::clone(audiobook)))
                })
                .count()
        };

        debug!(
            "Queued {} files of audiobook {} for scanning",
            added,
            audiobook.id()
        );
        if added > 0 {
            self.shared.condvar.notify_one();
        }
        Ok(added)
    }

    /// Queue one file unless it is already scanned or queued
    ///
    /// The owning audiobook and its file list are loaded first so the worker
    /// can tell when this file was the last one missing a duration.
    pub async fn enqueue_file(&self, file: Arc<AudiobookFileProxy>) -> Result<bool> {
        let audiobook = self
            .cache
            .load_audiobook(&self.db, file.audiobook_id())
            .await?;
        audiobook.files(&self.db, &self.cache).await?;

        let added = Self::push(&mut self.shared.lock(), file, Some(audiobook));
        if added {
            self.shared.condvar.notify_one();
        }
        Ok(added)
    }

    fn push(
        pending: &mut PendingScans,
        file: Arc<AudiobookFileProxy>,
        audiobook: Option<Arc<AudiobookProxy>>,
    ) -> bool {
        if file.is_scanned() || pending.queued.contains(file.path()) {
            return false;
        }

        pending.queued.insert(file.path().to_string());
        pending.queue.push_back(ScanEntry { file, audiobook });
        true
    }

    fn worker_loop(state: Arc<SharedScanState>, backend: Arc<dyn MediaBackend>) {
        debug!("Scan worker started");

        loop {
            let entry = {
                let mut pending = state.lock();
                while pending.queue.is_empty() && !state.stop_flag.load(Ordering::Relaxed) {
                    pending = state
                        .condvar
                        .wait(pending)
                        .unwrap_or_else(PoisonError::into_inner);
                }

                if state.stop_flag.load(Ordering::Relaxed) {
                    debug!("Scan worker received shutdown signal");
                    break;
                }

                let entry = pending.queue.pop_front();
                if let Some(entry) = &entry {
                    pending.queued.remove(entry.file.path());
                }
                entry
            };

            if let Some(entry) = entry {
                Self::process_entry(&state, backend.as_ref(), entry);
            }

            if state.lock().queue.is_empty() {
                state.emit(ScanEvent::Drained);
            }
        }

        debug!("Scan worker stopped");
    }

    fn process_entry(state: &SharedScanState, backend: &dyn MediaBackend, entry: ScanEntry) {
        let ScanEntry { file, audiobook } = entry;

        // Queued twice across a clear, or probed by the player meanwhile
        if file.is_scanned() {
            debug!("{} already scanned, skipping", file.path());
        } else {
            let started = Instant::now();
            match Self::probe(backend, &file) {
                Ok(duration) => {
                    file.set_media_duration(duration);
                    debug!(
                        "Probed {} = {} ms in {:.2}s",
                        file.path(),
                        duration,
                        started.elapsed().as_secs_f64()
                    );
                    state.emit(ScanEvent::Probed {
                        path: file.path().to_string(),
                        duration,
                    });
                }
                Err(e) => {
                    warn!("Dropping scan of {}: {}", file.path(), e);
                    state.emit(ScanEvent::Failed {
                        path: file.path().to_string(),
                        reason: e.to_string(),
                    });
                }
            }

            if let Err(e) = backend.stop() {
                debug!("Stopping scan engine failed: {}", e);
            }
            backend.release();
        }

        if let Some(audiobook) = audiobook {
            if audiobook.all_children_scanned() {
                audiobook.handle_scan_finished();
                state.emit(ScanEvent::AudiobookScanned {
                    audiobook_id: audiobook.id(),
                    total_duration: audiobook.total_duration(),
                });
            }
        }
    }

    /// Open, start playback, wait until the engine confirms, read duration
    fn probe(backend: &dyn MediaBackend, file: &AudiobookFileProxy) -> Result<i64> {
        let (sink, mut stream) = event_channel();
        backend.open(Path::new(file.path()), sink)?;
        backend.play()?;
        wait_until_playing(&mut stream)?;

        let duration = backend.duration();
        if duration <= 0 {
            return Err(Error::MediaParse(format!(
                "Backend reported no duration ({})",
                duration
            )));
        }
        Ok(duration)
    }

    /// Stop the worker after the in-flight probe and wait for it
    pub fn shutdown(mut self) {
        self.signal_stop();
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                warn!("Scan worker panicked");
            }
        }
    }

    fn signal_stop(&self) {
        self.shared.stop_flag.store(true, Ordering::Relaxed);
        // Take the lock so the worker is either waiting or will see the flag
        let _pending = self.shared.lock();
        self.shared.condvar.notify_all();
    }
}

impl Drop for ScanQueue {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.signal_stop();
        }
    }
}

/// Block the worker thread until the backend reports playback
fn wait_until_playing(stream: &mut EventStream) -> Result<()> {
    while let Some(event) = stream.blocking_recv() {
        match event {
            BackendEvent::StateChanged(BackendState::Playing) => return Ok(()),
            BackendEvent::StateChanged(BackendState::Error) => {
                return Err(Error::Backend("Engine entered error state".to_string()))
            }
            BackendEvent::Error(message) => return Err(Error::Backend(message)),
            BackendEvent::EndReached => {
                return Err(Error::Backend("Media ended before playback was confirmed".to_string()))
            }
            _ => {}
        }
    }

    Err(Error::Backend(
        "Event stream closed before playback started".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_until_playing_skips_other_events() {
        let (sink, mut stream) = event_channel();
        sink.send(BackendEvent::StateChanged(BackendState::Opening)).unwrap();
        sink.send(BackendEvent::ParsedChanged(true)).unwrap();
        sink.send(BackendEvent::StateChanged(BackendState::Playing)).unwrap();

        assert!(wait_until_playing(&mut stream).is_ok());
    }

    #[test]
    fn test_wait_until_playing_fails_on_error() {
        let (sink, mut stream) = event_channel();
        sink.send(BackendEvent::Error("cannot decode".to_string())).unwrap();

        assert!(matches!(
            wait_until_playing(&mut stream),
            Err(Error::Backend(message)) if message == "cannot decode"
        ));
    }

    #[test]
    fn test_wait_until_playing_fails_on_closed_stream() {
        let (sink, mut stream) = event_channel();
        sink.send(BackendEvent::TimeChanged(0)).unwrap();
        drop(sink);

        assert!(wait_until_playing(&mut stream).is_err());
    }
}
