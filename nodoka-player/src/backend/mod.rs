//! Media backend seam
//!
//! The player and the scan queue each own one [`MediaBackend`] instance and
//! never share it. A backend reports what happens to the opened media through
//! [`BackendEvent`]s pushed into the [`EventSink`] given at open time. Events
//! may be sent from any thread; the receiver side is drained by exactly one
//! task, so proxy state is only ever touched from that task.

pub mod headless;

pub use headless::SymphoniaBackend;

use crate::error::Result;
use std::path::Path;
use tokio::sync::mpsc;

/// Engine-side playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    NothingSpecial,
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

/// Asynchronous notification from a backend about the opened media
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// Engine state moved
    StateChanged(BackendState),
    /// Container metadata (duration) became available, or was lost
    ParsedChanged(bool),
    /// Playback position in milliseconds
    TimeChanged(i64),
    /// The media played through to its end
    EndReached,
    /// Engine-reported failure; the media stays loaded
    Error(String),
}

/// Sending half handed to a backend on open
pub type EventSink = mpsc::UnboundedSender<BackendEvent>;

/// Receiving half drained by the owner of the backend
pub type EventStream = mpsc::UnboundedReceiver<BackendEvent>;

/// Create a connected sink/stream pair
pub fn event_channel() -> (EventSink, EventStream) {
    mpsc::unbounded_channel()
}

/// Native media engine
///
/// Control calls return quickly; their effects are reported through events.
/// Positions and durations are in milliseconds, with -1 meaning unknown.
pub trait MediaBackend: Send + Sync {
    /// Open `path`, replacing (and releasing) any media already open
    fn open(&self, path: &Path, events: EventSink) -> Result<()>;

    /// Drop the media handle; no further events are sent for it
    fn release(&self);

    fn play(&self) -> Result<()>;

    fn pause(&self) -> Result<()>;

    fn stop(&self) -> Result<()>;

    fn seek(&self, position_ms: i64) -> Result<()>;

    fn is_seekable(&self) -> bool;

    fn position(&self) -> i64;

    fn duration(&self) -> i64;

    /// Volume on the 0-200 scale, 100 being unity
    fn set_volume(&self, volume: i32) -> Result<()>;

    fn set_rate(&self, rate: f32) -> Result<()>;

    fn state(&self) -> BackendState;
}
