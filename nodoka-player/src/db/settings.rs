//! Settings database access
//!
//! Read/write runtime preferences from the settings table (key-value store).
//! These carry across sessions: volume, playback speed and the audiobook the
//! user was last listening to.

use crate::error::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

/// Default volume (backend scale, 100 = unity)
pub const DEFAULT_VOLUME: i32 = 100;
/// Maximum volume accepted by the backend
pub const MAX_VOLUME: i32 = 200;
/// Default playback speed
pub const DEFAULT_SPEED: f32 = 1.0;
/// Accepted playback speed range
pub const SPEED_RANGE: (f32, f32) = (0.25, 4.0);

/// Get volume setting (0-200)
pub async fn get_volume(db: &Pool<Sqlite>) -> Result<i32> {
    match get_setting::<i32>(db, "volume_level").await? {
        Some(vol) => Ok(vol.clamp(0, MAX_VOLUME)),
        None => Ok(DEFAULT_VOLUME),
    }
}

/// Set volume setting (0-200)
pub async fn set_volume(db: &Pool<Sqlite>, volume: i32) -> Result<()> {
    set_setting(db, "volume_level", volume.clamp(0, MAX_VOLUME)).await
}

/// Get playback speed setting
pub async fn get_speed(db: &Pool<Sqlite>) -> Result<f32> {
    match get_setting::<f32>(db, "playback_speed").await? {
        Some(speed) => Ok(clamp_speed(speed)),
        None => Ok(DEFAULT_SPEED),
    }
}

/// Set playback speed setting
pub async fn set_speed(db: &Pool<Sqlite>, speed: f32) -> Result<()> {
    set_setting(db, "playback_speed", clamp_speed(speed)).await
}

/// Clamp a speed into the accepted range (NaN maps to the default)
pub fn clamp_speed(speed: f32) -> f32 {
    if speed.is_nan() {
        return DEFAULT_SPEED;
    }
    speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1)
}

/// Remember which audiobook is currently being listened to
pub async fn save_current_audiobook(db: &Pool<Sqlite>, audiobook_id: i64) -> Result<()> {
    set_setting(db, "current_audiobook_id", audiobook_id).await
}

/// Load the audiobook bookmark, if any
pub async fn load_current_audiobook(db: &Pool<Sqlite>) -> Result<Option<i64>> {
    get_setting::<i64>(db, "current_audiobook_id").await
}

/// Generic setting getter
///
/// Returns None if key doesn't exist in database.
/// Parses value from string using FromStr trait.
pub async fn get_setting<T: FromStr>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await?;

    match value {
        Some(s) => match s.parse::<T>() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(Error::Config(format!(
                "Failed to parse setting '{}' value: {}",
                key, s
            ))),
        },
        None => Ok(None),
    }
}

/// Generic setting setter
///
/// Inserts or updates setting in database.
pub async fn set_setting<T: ToString>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()> {
    let value_str = value.to_string();

    sqlx::query(
        r#"
        INSERT INTO settings (key, value)
        VALUES (?, ?)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(key)
    .bind(value_str)
    .execute(db)
    .await?;

    Ok(())
}
