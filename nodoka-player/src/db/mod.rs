//! Database access layer
//!
//! Queries against the library database: audiobook/file rows consumed by the
//! proxy layer, and the key/value settings table.

pub mod library;
pub mod settings;
