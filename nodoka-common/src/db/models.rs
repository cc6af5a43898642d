//! Relational records as stored in the library database
//!
//! These are the raw rows the proxy layer wraps. They carry identity and
//! ordering only; high-churn playback state lives in the sidecar store.

use serde::{Deserialize, Serialize};

/// A base directory registered for scanning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DirectoryRecord {
    pub full_path: String,
    pub last_scanned: Option<chrono::NaiveDateTime>,
}

/// An audiobook (ordered collection of media files)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AudiobookRecord {
    pub id: i64,
    /// Base directory the audiobook was discovered under
    pub directory: String,
    pub name: String,
    pub full_path: String,
    /// Last completeness written back by the library (0-100)
    pub completeness: i32,
    pub default_order: i32,
    /// Path of the last file that started playing
    pub selected_file: Option<String>,
}

/// A single media file belonging to an audiobook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AudiobookFileRecord {
    pub id: i64,
    pub audiobook_id: i64,
    pub name: String,
    pub full_path: String,
    /// Ordinal within the audiobook, starting at 1
    pub position: i32,
}

/// Values for inserting a new audiobook row
#[derive(Debug, Clone)]
pub struct NewAudiobook {
    pub directory: String,
    pub name: String,
    pub full_path: String,
    pub default_order: i32,
}
