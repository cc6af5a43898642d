//! Error types for nodoka-player
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for nodoka-player
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Media engine errors (construction, open, control calls)
    #[error("Media backend error: {0}")]
    Backend(String),

    /// Container probing / duration errors
    #[error("Media parse error: {0}")]
    MediaParse(String),

    /// Operation not valid in the current player state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Record not found in the library
    #[error("Not found: {0}")]
    NotFound(String),

    /// Errors raised by shared library code
    #[error(transparent)]
    Common(#[from] nodoka_common::Error),
}

/// Convenience Result type using nodoka-player Error
pub type Result<T> = std::result::Result<T, Error>;
