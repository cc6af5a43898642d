//! Player state transitions
//!
//! ```text
//! Idle -> Loading -> Parsing -> Ready <-> Playing <-> Paused -> Ended -> Released
//! ```
//!
//! `Idle` is the initial state and `Released` ends a load cycle; the next
//! `load_media` re-enters `Loading` from either. Control calls only set
//! `Loading` and `Released` directly. Every other transition is driven by
//! backend events through [`next_state`].

use crate::backend::{BackendEvent, BackendState};
pub use nodoka_common::PlayerState;

/// State reached when `event` arrives in `current`
///
/// Returns `None` when the event does not move the state machine (time
/// ticks, errors, or events that make no sense in the current state).
pub fn next_state(current: PlayerState, event: &BackendEvent) -> Option<PlayerState> {
    use PlayerState::*;

    if !current.has_media() {
        return None;
    }

    let next = match event {
        BackendEvent::StateChanged(BackendState::Opening | BackendState::Buffering) => {
            match current {
                Loading => Parsing,
                _ => return None,
            }
        }
        BackendEvent::ParsedChanged(true) => match current {
            Loading | Parsing => Ready,
            _ => return None,
        },
        BackendEvent::StateChanged(BackendState::Playing) => Playing,
        BackendEvent::StateChanged(BackendState::Paused) => match current {
            Playing => Paused,
            _ => return None,
        },
        BackendEvent::StateChanged(BackendState::Stopped) => match current {
            Playing | Paused | Ended => Ready,
            _ => return None,
        },
        BackendEvent::StateChanged(BackendState::Ended) | BackendEvent::EndReached => {
            match current {
                Playing | Paused => Ended,
                _ => return None,
            }
        }
        BackendEvent::StateChanged(BackendState::NothingSpecial | BackendState::Error)
        | BackendEvent::ParsedChanged(false)
        | BackendEvent::TimeChanged(_)
        | BackendEvent::Error(_) => return None,
    };

    (next != current).then_some(next)
}
