//! # Nodoka Player Library (nodoka-player)
//!
//! Playback engine and playback-state cache for the Nodoka audiobook player.
//!
//! **Purpose:** Wrap a media backend in a player state machine, persist
//! per-file progress in a content-addressed sidecar store, and probe file
//! durations on a dedicated scan engine without disturbing live playback.
//!
//! **Architecture:**
//! - [`sidecar`]: hashed key/document store for high-churn playback fields
//! - [`proxy`]: cached wrappers over library rows plus the aggregate cascade
//! - [`backend`]: media engine seam and the silent headless symphonia engine
//! - [`player`]: interactive player state machine
//! - [`scan`]: serial duration-probe queue

pub mod backend;
pub mod checksum;
pub mod config;
pub mod db;
pub mod error;
pub mod player;
pub mod proxy;
pub mod scan;
pub mod sidecar;

pub use error::{Error, Result};
pub use player::{Player, PlayerNotification};
pub use proxy::{AudiobookFileProxy, AudiobookProxy, ProxyCache};
pub use scan::{ScanEvent, ScanQueue};
pub use sidecar::SidecarStore;
