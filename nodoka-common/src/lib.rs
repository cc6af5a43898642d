//! # Nodoka Common Library
//!
//! Shared code for the Nodoka audiobook player crates:
//! - Relational records for directories, audiobooks and audiobook files
//! - Schema creation for the SQLite library database
//! - Player state enumeration shared with front ends
//! - Bootstrap configuration loading and data folder resolution

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::PlayerState;
