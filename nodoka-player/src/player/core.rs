//! Player construction and control calls
//!
//! Control calls run on the caller's task and only touch the backend and the
//! session bookkeeping. Everything that follows from a backend event (state
//! changes, persistence, notifications, auto-advance) happens on the per-load
//! event task in `events.rs`.

use super::events::PlayerNotification;
use super::state::{next_state, PlayerState};
use crate::backend::{event_channel, BackendEvent, MediaBackend};
use crate::db::settings;
use crate::error::{Error, Result};
use crate::proxy::{AudiobookFileProxy, ProxyCache};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Notification channel capacity
const NOTIFICATION_CAPACITY: usize = 256;

pub(super) struct Session {
    pub(super) state: PlayerState,
    pub(super) file: Option<Arc<AudiobookFileProxy>>,
    /// Bumped on every load and release; events of an older load are dropped
    pub(super) generation: u64,
}

/// Interactive player wrapping one backend instance
///
/// Cloning is cheap and every clone drives the same player.
#[derive(Clone)]
pub struct Player {
    pub(super) backend: Arc<dyn MediaBackend>,
    pub(super) db: Pool<Sqlite>,
    pub(super) cache: Arc<ProxyCache>,
    pub(super) session: Arc<Mutex<Session>>,
    pub(super) notify_tx: broadcast::Sender<PlayerNotification>,
    pub(super) runtime: Handle,
}

impl Player {
    /// Create a player and apply the saved volume and speed to the backend
    ///
    /// Must be called from within a tokio runtime; event tasks are spawned
    /// on that runtime.
    pub async fn new(
        backend: Arc<dyn MediaBackend>,
        db: Pool<Sqlite>,
        cache: Arc<ProxyCache>,
    ) -> Result<Self> {
        let volume = settings::get_volume(&db).await.unwrap_or_else(|e| {
            warn!("Using default volume: {}", e);
            settings::DEFAULT_VOLUME
        });
        let speed = settings::get_speed(&db).await.unwrap_or_else(|e| {
            warn!("Using default speed: {}", e);
            settings::DEFAULT_SPEED
        });

        backend.set_volume(volume)?;
        backend.set_rate(speed)?;
        info!("Player ready (volume {}, speed {})", volume, speed);

        let (notify_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        Ok(Self {
            backend,
            db,
            cache,
            session: Arc::new(Mutex::new(Session {
                state: PlayerState::Idle,
                file: None,
                generation: 0,
            })),
            notify_tx,
            runtime: Handle::current(),
        })
    }

    pub(super) fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to player notifications
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerNotification> {
        self.notify_tx.subscribe()
    }

    pub fn state(&self) -> PlayerState {
        self.lock().state
    }

    /// File of the current load cycle, if any
    pub fn current_file(&self) -> Option<Arc<AudiobookFileProxy>> {
        self.lock().file.clone()
    }

    pub fn cache(&self) -> &Arc<ProxyCache> {
        &self.cache
    }

    /// Open `file` on the backend and start listening for its events
    ///
    /// Fails without side effects while another media item is loaded; call
    /// [`release_media`](Self::release_media) first.
    pub fn load_media(&self, file: Arc<AudiobookFileProxy>) -> Result<()> {
        let (sink, stream) = event_channel();

        let (generation, previous) = {
            let mut session = self.lock();
            if session.state.has_media() {
                warn!(
                    "Refusing to load {} while in state {}",
                    file.path(),
                    session.state
                );
                return Err(Error::InvalidState(format!(
                    "Media already loaded (state {})",
                    session.state
                )));
            }

            let previous = session.state;
            session.generation += 1;
            session.state = PlayerState::Loading;
            session.file = Some(Arc::clone(&file));
            (session.generation, previous)
        };

        debug!("Loading {} (load {})", file.path(), generation);
        self.runtime
            .spawn(self.clone().drain_events(generation, Arc::clone(&file), stream));

        if let Err(e) = self.backend.open(Path::new(file.path()), sink) {
            warn!("Failed to open {}: {}", file.path(), e);
            let mut session = self.lock();
            if session.generation == generation {
                session.state = previous;
                session.file = None;
            }
            return Err(e);
        }

        Ok(())
    }

    /// Release the media handle; a no-op when nothing is loaded
    pub fn release_media(&self) {
        let released = {
            let mut session = self.lock();
            if !session.state.has_media() {
                return;
            }
            session.generation += 1;
            session.state = PlayerState::Released;
            session.file.take()
        };

        self.backend.release();
        if let Some(file) = released {
            debug!("Released {}", file.path());
        }
    }

    pub fn play(&self) -> Result<()> {
        self.require_media("play")?;
        self.backend.play().map_err(|e| {
            warn!("Play failed: {}", e);
            e
        })
    }

    pub fn pause(&self) -> Result<()> {
        self.require_media("pause")?;
        self.backend.pause().map_err(|e| {
            warn!("Pause failed: {}", e);
            e
        })
    }

    pub fn stop(&self) -> Result<()> {
        self.require_media("stop")?;
        self.backend.stop().map_err(|e| {
            warn!("Stop failed: {}", e);
            e
        })
    }

    /// Seek the loaded media to `position_ms`
    ///
    /// Ignored when nothing is loaded or the media is not seekable.
    pub fn update_seek_position(&self, position_ms: i64) {
        if !self.state().has_media() {
            debug!("No media loaded, ignoring seek to {} ms", position_ms);
            return;
        }

        if !self.backend.is_seekable() {
            warn!("Media is not seekable, ignoring seek to {} ms", position_ms);
            return;
        }

        if let Err(e) = self.backend.seek(position_ms) {
            warn!("Seek to {} ms failed: {}", position_ms, e);
        }
    }

    /// Apply a volume (0-200) and remember it for the next session
    pub async fn set_volume(&self, volume: i32) -> Result<()> {
        let volume = volume.clamp(0, settings::MAX_VOLUME);
        if let Err(e) = self.backend.set_volume(volume) {
            warn!("Backend rejected volume {}: {}", volume, e);
        }
        settings::set_volume(&self.db, volume).await
    }

    /// Apply a playback speed and remember it for the next session
    pub async fn set_speed(&self, speed: f32) -> Result<()> {
        let speed = settings::clamp_speed(speed);
        if let Err(e) = self.backend.set_rate(speed) {
            warn!("Backend rejected speed {}: {}", speed, e);
        }
        settings::set_speed(&self.db, speed).await
    }

    fn require_media(&self, action: &str) -> Result<()> {
        if self.state().has_media() {
            Ok(())
        } else {
            Err(Error::InvalidState(format!("Cannot {} without media", action)))
        }
    }

    /// Apply the transition for `event` if it belongs to the current load
    ///
    /// Returns false for events of a released or replaced load.
    pub(super) fn advance_state(&self, generation: u64, event: &BackendEvent) -> bool {
        let mut session = self.lock();
        if session.generation != generation {
            return false;
        }

        if let Some(next) = next_state(session.state, event) {
            debug!("Player {} -> {}", session.state, next);
            session.state = next;
        }
        true
    }

    pub(super) fn is_current(&self, generation: u64) -> bool {
        self.lock().generation == generation
    }

    pub(super) fn notify(&self, notification: PlayerNotification) {
        // No receivers is fine
        let _ = self.notify_tx.send(notification);
    }
}
