//! Proxy layer over library rows
//!
//! A proxy pairs an immutable library row with its sidecar document and is
//! the one place playback state is read and written. [`ProxyCache`] hands out
//! a single live instance per key so that cascade hooks attached by an
//! [`AudiobookProxy`] to its files keep firing for every caller.

pub mod audiobook_proxy;
pub mod cache;
pub mod file_proxy;

pub use audiobook_proxy::AudiobookProxy;
pub use cache::ProxyCache;
pub use file_proxy::AudiobookFileProxy;

use std::sync::Arc;

/// Callback a parent aggregate attaches to a child proxy
pub type CascadeHook = Arc<dyn Fn() + Send + Sync>;

/// Sidecar key of an audiobook: its id and base directory hashed together
pub fn audiobook_sidecar_key(id: i64, directory: &str) -> String {
    format!("Collection:{}:{}", id, directory)
}
