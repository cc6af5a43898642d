//! Backend event handling
//!
//! One task per load drains the backend's event stream in order. Proxy
//! writes (position, duration, completeness) happen only here, so a file's
//! sidecar document has a single writer while it is playing.

use super::core::Player;
use crate::backend::{BackendEvent, BackendState, EventStream};
use crate::db::{library, settings};
use crate::proxy::AudiobookFileProxy;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Notification sent to player subscribers
#[derive(Debug, Clone)]
pub enum PlayerNotification {
    /// Playback started (`is_playing`) or paused/stopped
    State {
        file: Arc<AudiobookFileProxy>,
        is_playing: bool,
    },
    /// Playback position in milliseconds
    Time {
        file: Arc<AudiobookFileProxy>,
        current_time: i64,
    },
    /// Duration known, resume seek (if any) issued
    MediaParsed { file: Arc<AudiobookFileProxy> },
    /// The file played to its end
    Finished { file: Arc<AudiobookFileProxy> },
}

impl PlayerNotification {
    pub fn file(&self) -> &Arc<AudiobookFileProxy> {
        match self {
            PlayerNotification::State { file, .. }
            | PlayerNotification::Time { file, .. }
            | PlayerNotification::MediaParsed { file }
            | PlayerNotification::Finished { file } => file,
        }
    }
}

impl Player {
    /// Drain one load's events until the backend drops the sink or the load
    /// is replaced
    pub(super) async fn drain_events(
        self,
        generation: u64,
        file: Arc<AudiobookFileProxy>,
        mut stream: EventStream,
    ) {
        while let Some(event) = stream.recv().await {
            if !self.advance_state(generation, &event) {
                debug!("Dropping {:?} for released {}", event, file.path());
                break;
            }
            self.handle_event(generation, &file, event).await;
        }
        debug!("Event stream closed for {} (load {})", file.path(), generation);
    }

    async fn handle_event(
        &self,
        generation: u64,
        file: &Arc<AudiobookFileProxy>,
        event: BackendEvent,
    ) {
        match event {
            BackendEvent::StateChanged(BackendState::Playing) => self.on_playing(file).await,
            BackendEvent::StateChanged(BackendState::Paused | BackendState::Stopped) => {
                self.on_paused(file)
            }
            BackendEvent::StateChanged(BackendState::Error) => {
                warn!("Backend entered error state on {}", file.path())
            }
            BackendEvent::StateChanged(_) => {}
            BackendEvent::ParsedChanged(true) => self.on_parsed(file),
            BackendEvent::ParsedChanged(false) => debug!("Parse lost for {}", file.path()),
            BackendEvent::TimeChanged(current_time) => self.on_time(file, current_time),
            BackendEvent::EndReached => self.on_end_reached(generation, file).await,
            BackendEvent::Error(message) => {
                warn!("Backend error on {}: {}", file.path(), message)
            }
        }
    }

    async fn on_playing(&self, file: &Arc<AudiobookFileProxy>) {
        let audiobook_id = file.audiobook_id();

        if let Some(audiobook) = self.cache.peek_audiobook(audiobook_id) {
            audiobook.set_selected_file(file.path());
        }
        if let Err(e) = library::update_selected_file(&self.db, audiobook_id, file.path()).await {
            warn!("Failed to store selected file {}: {}", file.path(), e);
        }
        if let Err(e) = settings::save_current_audiobook(&self.db, audiobook_id).await {
            warn!("Failed to store current audiobook {}: {}", audiobook_id, e);
        }

        self.notify(PlayerNotification::State {
            file: Arc::clone(file),
            is_playing: true,
        });
    }

    fn on_paused(&self, file: &Arc<AudiobookFileProxy>) {
        let position = self.backend.position();
        if position >= 0 {
            file.save_current_time(position);
        }

        self.notify(PlayerNotification::State {
            file: Arc::clone(file),
            is_playing: false,
        });
    }

    fn on_parsed(&self, file: &Arc<AudiobookFileProxy>) {
        let duration = self.backend.duration();
        if duration > 0 {
            file.set_media_duration(duration);
        } else {
            debug!("No duration reported for {}", file.path());
        }

        if let Some(resume_at) = file.current_time().filter(|t| *t > 0) {
            if self.backend.is_seekable() {
                info!("Resuming {} at {} ms", file.path(), resume_at);
                if let Err(e) = self.backend.seek(resume_at) {
                    warn!("Resume seek failed for {}: {}", file.path(), e);
                }
            } else {
                warn!("{} is not seekable, starting from the beginning", file.path());
            }
        }

        self.notify(PlayerNotification::MediaParsed {
            file: Arc::clone(file),
        });
    }

    fn on_time(&self, file: &Arc<AudiobookFileProxy>, current_time: i64) {
        self.notify(PlayerNotification::Time {
            file: Arc::clone(file),
            current_time,
        });
        file.save_current_time(current_time);
    }

    async fn on_end_reached(&self, generation: u64, file: &Arc<AudiobookFileProxy>) {
        self.notify(PlayerNotification::Finished {
            file: Arc::clone(file),
        });
        file.set_as_complete();

        let next = match self.cache.next_file(&self.db, file).await {
            Ok(next) => next,
            Err(e) => {
                warn!("Next file lookup failed after {}: {}", file.path(), e);
                None
            }
        };

        let Some(next) = next else {
            info!(
                "Reached the end of audiobook {} at {}",
                file.audiobook_id(),
                file.path()
            );
            return;
        };

        // The user may have loaded something else while we looked
        if !self.is_current(generation) {
            return;
        }

        info!("Advancing to {}", next.path());
        self.release_media();
        if let Err(e) = self.load_media(next) {
            warn!("Auto-advance load failed: {}", e);
            return;
        }
        if let Err(e) = self.play() {
            warn!("Auto-advance play failed: {}", e);
        }
    }
}
