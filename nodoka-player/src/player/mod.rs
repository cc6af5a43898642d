//! Interactive player
//!
//! **Module Structure:**
//! - `core.rs`: Player construction and control calls
//! - `events.rs`: backend event handling and outgoing notifications
//! - `state.rs`: the state machine's transition table

mod core;
mod events;
pub mod state;

pub use self::core::Player;
pub use events::PlayerNotification;
pub use state::PlayerState;
