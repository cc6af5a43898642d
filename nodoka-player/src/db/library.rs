//! Audiobook and audiobook file queries
//!
//! The library database owns identity and ordering. Playback progress is not
//! stored here; see [`crate::sidecar`].

use crate::error::{Error, Result};
use nodoka_common::db::{AudiobookFileRecord, AudiobookRecord, NewAudiobook};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

const AUDIOBOOK_COLUMNS: &str =
    "id, directory, name, full_path, completeness, default_order, selected_file";
const FILE_COLUMNS: &str = "id, audiobook_id, name, full_path, position";

/// Get an audiobook row by id
pub async fn get_audiobook(db: &Pool<Sqlite>, id: i64) -> Result<Option<AudiobookRecord>> {
    let sql = format!("SELECT {} FROM audiobooks WHERE id = ?", AUDIOBOOK_COLUMNS);
    let record = sqlx::query_as::<_, AudiobookRecord>(&sql)
        .bind(id)
        .fetch_optional(db)
        .await?;
    Ok(record)
}

/// All audiobooks in display order
pub async fn list_audiobooks(db: &Pool<Sqlite>) -> Result<Vec<AudiobookRecord>> {
    let sql = format!(
        "SELECT {} FROM audiobooks ORDER BY default_order, name",
        AUDIOBOOK_COLUMNS
    );
    let records = sqlx::query_as::<_, AudiobookRecord>(&sql)
        .fetch_all(db)
        .await?;
    Ok(records)
}

/// Files of an audiobook ordered by position
pub async fn get_audiobook_files(
    db: &Pool<Sqlite>,
    audiobook_id: i64,
) -> Result<Vec<AudiobookFileRecord>> {
    let sql = format!(
        "SELECT {} FROM audiobook_file WHERE audiobook_id = ? ORDER BY position",
        FILE_COLUMNS
    );
    let records = sqlx::query_as::<_, AudiobookFileRecord>(&sql)
        .bind(audiobook_id)
        .fetch_all(db)
        .await?;
    Ok(records)
}

/// The file at `position` within an audiobook, if any
pub async fn get_file_at_position(
    db: &Pool<Sqlite>,
    audiobook_id: i64,
    position: i32,
) -> Result<Option<AudiobookFileRecord>> {
    let sql = format!(
        "SELECT {} FROM audiobook_file WHERE audiobook_id = ? AND position = ?",
        FILE_COLUMNS
    );
    let record = sqlx::query_as::<_, AudiobookFileRecord>(&sql)
        .bind(audiobook_id)
        .bind(position)
        .fetch_optional(db)
        .await?;
    Ok(record)
}

/// Look a file up by its full path
pub async fn get_file_by_path(db: &Pool<Sqlite>, full_path: &str) -> Result<Option<AudiobookFileRecord>> {
    let sql = format!("SELECT {} FROM audiobook_file WHERE full_path = ?", FILE_COLUMNS);
    let record = sqlx::query_as::<_, AudiobookFileRecord>(&sql)
        .bind(full_path)
        .fetch_optional(db)
        .await?;
    Ok(record)
}

/// Remember the last played file of an audiobook
pub async fn update_selected_file(db: &Pool<Sqlite>, audiobook_id: i64, full_path: &str) -> Result<()> {
    sqlx::query("UPDATE audiobooks SET selected_file = ? WHERE id = ?")
        .bind(full_path)
        .bind(audiobook_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Register a base directory (no-op if already known)
pub async fn insert_directory(db: &Pool<Sqlite>, full_path: &str) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO directories (full_path) VALUES (?)")
        .bind(full_path)
        .execute(db)
        .await?;
    Ok(())
}

/// Insert an audiobook row and return its id
pub async fn insert_audiobook(db: &Pool<Sqlite>, audiobook: &NewAudiobook) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO audiobooks (directory, name, full_path, default_order)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(&audiobook.directory)
    .bind(&audiobook.name)
    .bind(&audiobook.full_path)
    .bind(audiobook.default_order)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Insert one file row and return its id
pub async fn insert_audiobook_file(
    db: &Pool<Sqlite>,
    audiobook_id: i64,
    name: &str,
    full_path: &str,
    position: i32,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO audiobook_file (audiobook_id, name, full_path, position)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(audiobook_id)
    .bind(name)
    .bind(full_path)
    .bind(position)
    .execute(db)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Register an audiobook together with its ordered file list
///
/// `files` is the scanner's ordered output for the audiobook; positions are
/// assigned 1..=n in that order. Runs in one transaction.
pub async fn register_audiobook<P: AsRef<Path>>(
    db: &Pool<Sqlite>,
    audiobook: &NewAudiobook,
    files: &[P],
) -> Result<i64> {
    if files.is_empty() {
        return Err(Error::Common(nodoka_common::Error::InvalidInput(format!(
            "Audiobook '{}' has no files",
            audiobook.name
        ))));
    }

    let mut tx = db.begin().await?;

    sqlx::query("INSERT OR IGNORE INTO directories (full_path) VALUES (?)")
        .bind(&audiobook.directory)
        .execute(&mut *tx)
        .await?;

    let audiobook_id = sqlx::query(
        "INSERT INTO audiobooks (directory, name, full_path, default_order) VALUES (?, ?, ?, ?)",
    )
    .bind(&audiobook.directory)
    .bind(&audiobook.name)
    .bind(&audiobook.full_path)
    .bind(audiobook.default_order)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for (index, file) in files.iter().enumerate() {
        let path = file.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let position = i32::try_from(index + 1)
            .map_err(|_| {
                Error::Common(nodoka_common::Error::InvalidInput(
                    "Too many files in audiobook".to_string(),
                ))
            })?;

        sqlx::query(
            "INSERT INTO audiobook_file (audiobook_id, name, full_path, position) VALUES (?, ?, ?, ?)",
        )
        .bind(audiobook_id)
        .bind(&name)
        .bind(path.to_string_lossy().as_ref())
        .bind(position)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!(
        "Registered audiobook {} '{}' with {} files",
        audiobook_id,
        audiobook.name,
        files.len()
    );
    Ok(audiobook_id)
}

/// Delete an audiobook and its file rows
///
/// Sidecar documents of the files are left in place.
pub async fn delete_audiobook(db: &Pool<Sqlite>, audiobook_id: i64) -> Result<bool> {
    let mut tx = db.begin().await?;

    sqlx::query("DELETE FROM audiobook_file WHERE audiobook_id = ?")
        .bind(audiobook_id)
        .execute(&mut *tx)
        .await?;

    let deleted = sqlx::query("DELETE FROM audiobooks WHERE id = ?")
        .bind(audiobook_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    tx.commit().await?;

    debug!("Deleted audiobook {} ({} rows)", audiobook_id, deleted);
    Ok(deleted > 0)
}
