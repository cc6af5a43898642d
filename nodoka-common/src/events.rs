//! Player state shared between the playback engine and its front ends

use serde::{Deserialize, Serialize};

/// Lifecycle state of the interactive player
///
/// `Idle` is the initial state and `Released` closes one load cycle. Loading
/// a new file from `Released` (or `Idle`) starts over at `Loading`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    /// Nothing has been loaded yet
    Idle,
    /// Media handle opened, nothing requested from the backend yet
    Loading,
    /// Backend is opening/parsing the media
    Parsing,
    /// Media parsed and ready to play
    Ready,
    /// Backend reports playback in progress
    Playing,
    /// Playback paused by the user
    Paused,
    /// Backend reached the end of the media
    Ended,
    /// Media handle released
    Released,
}

impl PlayerState {
    /// True while a media item is held by the player
    pub fn has_media(self) -> bool {
        !matches!(self, PlayerState::Idle | PlayerState::Released)
    }
}

impl std::fmt::Display for PlayerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Parsing => "parsing",
            PlayerState::Ready => "ready",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
            PlayerState::Ended => "ended",
            PlayerState::Released => "released",
        };
        write!(f, "{}", name)
    }
}
