//! Nodoka player - command-line driver
//!
//! Registers audiobooks, probes their durations on the scan engine and plays
//! them headlessly, printing player notifications as they arrive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nodoka_common::config::TomlConfig;
use nodoka_common::db::{init_database, NewAudiobook};
use nodoka_player::backend::{MediaBackend, SymphoniaBackend};
use nodoka_player::config::Config;
use nodoka_player::db::{library, settings};
use nodoka_player::{Player, PlayerNotification, ProxyCache, ScanEvent, ScanQueue, SidecarStore};
use sqlx::{Pool, Sqlite};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for nodoka-player
#[derive(Parser, Debug)]
#[command(name = "nodoka-player")]
#[command(about = "Audiobook playback engine for Nodoka")]
#[command(version)]
struct Args {
    /// Folder holding the library database and the sidecar store
    #[arg(short, long)]
    data_folder: Option<PathBuf>,

    /// Configuration file (defaults to the platform config folder)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register an audiobook from an ordered list of files and scan it
    Add {
        #[arg(long)]
        name: String,
        /// Base directory the audiobook was found in
        #[arg(long)]
        directory: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Probe every unscanned file of an audiobook
    Scan { id: i64 },
    /// Run an audiobook headlessly from its last selected file
    ///
    /// No audio is output. Position advances on the wall clock and progress
    /// is saved as if the book were heard. Without an id the audiobook last
    /// played is resumed.
    Play { id: Option<i64> },
    /// Show duration and progress (all audiobooks when no id is given)
    Status { id: Option<i64> },
    /// Forget the progress of an audiobook
    Reset { id: i64 },
    /// Remove an audiobook from the library
    Remove { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let toml = TomlConfig::load_or_default(args.config.as_deref());

    // Initialize tracing
    let default_filter = format!(
        "nodoka_player={level},nodoka_common={level}",
        level = toml.logging.level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "nodoka-player {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let config = Config::resolve(args.data_folder.as_deref(), &toml);
    info!("Data folder: {}", config.data_folder.display());

    let db = init_database(&config.db_path)
        .await
        .context("Failed to open library database")?;
    let store = SidecarStore::open(&config.sidecar_folder)
        .context("Failed to open sidecar store")?;
    let cache = Arc::new(ProxyCache::new(store, config.proxy_cache_capacity));

    match args.command {
        Command::Add {
            name,
            directory,
            files,
        } => {
            let audiobook = NewAudiobook {
                full_path: PathBuf::from(&directory).join(&name).to_string_lossy().into_owned(),
                directory,
                name,
                default_order: 0,
            };
            let id = library::register_audiobook(&db, &audiobook, &files).await?;
            println!("Added audiobook {}", id);
            scan(&config, &db, &cache, id).await
        }
        Command::Scan { id } => scan(&config, &db, &cache, id).await,
        Command::Play { id } => play(&config, &db, &cache, id).await,
        Command::Status { id } => status(&db, &cache, id).await,
        Command::Reset { id } => {
            let audiobook = cache.load_audiobook(&db, id).await?;
            audiobook.reset_read_status(&db, &cache).await?;
            println!("Reset progress of audiobook {}", id);
            Ok(())
        }
        Command::Remove { id } => {
            if !cache.remove_audiobook(&db, id).await? {
                bail!("No audiobook with id {}", id);
            }
            println!("Removed audiobook {}", id);
            Ok(())
        }
    }
}

fn create_backend(config: &Config) -> Result<Arc<dyn MediaBackend>> {
    let backend = SymphoniaBackend::new(config.position_tick)
        .context("Failed to create media backend")?;
    Ok(Arc::new(backend))
}

async fn scan(config: &Config, db: &Pool<Sqlite>, cache: &Arc<ProxyCache>, id: i64) -> Result<()> {
    let audiobook = cache.load_audiobook(db, id).await?;
    let queue = ScanQueue::new(create_backend(config)?, db.clone(), Arc::clone(cache))?;
    let mut events = queue.subscribe();

    let queued = queue.enqueue_audiobook(&audiobook).await?;
    if queued == 0 {
        println!("Nothing to scan for audiobook {}", id);
        queue.shutdown();
        return Ok(());
    }

    loop {
        match events.recv().await {
            Ok(ScanEvent::Probed { path, duration }) => println!("{}  {} ms", path, duration),
            Ok(ScanEvent::Failed { path, reason }) => println!("{}  failed: {}", path, reason),
            Ok(ScanEvent::AudiobookScanned { total_duration, .. }) => {
                println!("Total: {}", format_ms(total_duration))
            }
            Ok(ScanEvent::Drained) => break,
            Err(e) => {
                warn!("Missed scan events: {}", e);
                if queue.pending() == 0 {
                    break;
                }
            }
        }
    }

    queue.shutdown();
    Ok(())
}

/// The requested audiobook, or the one last played
async fn audiobook_to_play(db: &Pool<Sqlite>, id: Option<i64>) -> Result<i64> {
    match id {
        Some(id) => Ok(id),
        None => settings::load_current_audiobook(db)
            .await?
            .context("No audiobook given and none played before"),
    }
}

async fn play(
    config: &Config,
    db: &Pool<Sqlite>,
    cache: &Arc<ProxyCache>,
    id: Option<i64>,
) -> Result<()> {
    let id = audiobook_to_play(db, id).await?;
    let audiobook = cache.load_audiobook(db, id).await?;
    let files = audiobook.files(db, cache).await?;

    let start = audiobook
        .selected_file()
        .and_then(|selected| files.iter().find(|f| f.path() == selected).cloned())
        .or_else(|| files.first().cloned())
        .with_context(|| format!("Audiobook {} has no files", id))?;

    let player = Player::new(create_backend(config)?, db.clone(), Arc::clone(cache)).await?;
    let mut notifications = player.subscribe();

    player.load_media(start)?;
    player.play()?;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let mut last_second = -1;
    loop {
        tokio::select! {
            notification = notifications.recv() => match notification {
                Ok(PlayerNotification::Time { file, current_time }) => {
                    if current_time / 1000 != last_second {
                        last_second = current_time / 1000;
                        println!("{}  {}", file.name(), format_ms(current_time));
                    }
                }
                Ok(PlayerNotification::Finished { file }) => {
                    println!("Finished {}", file.name());
                    if !cache.has_next_file(db, &file).await? {
                        break;
                    }
                }
                Ok(PlayerNotification::MediaParsed { file }) => {
                    println!("Playing {} ({})", file.name(), format_ms(file.media_duration()));
                }
                Ok(PlayerNotification::State { .. }) => {}
                Err(e) => warn!("Missed player notifications: {}", e),
            },
            _ = &mut shutdown => {
                player.pause()?;
                // Let the pause event persist the position
                tokio::time::sleep(Duration::from_millis(100)).await;
                break;
            }
        }
    }

    player.release_media();
    println!("Audiobook {} is {}% complete", id, audiobook.completeness());
    Ok(())
}

async fn status(db: &Pool<Sqlite>, cache: &Arc<ProxyCache>, id: Option<i64>) -> Result<()> {
    let records = match id {
        Some(id) => vec![library::get_audiobook(db, id)
            .await?
            .with_context(|| format!("No audiobook with id {}", id))?],
        None => library::list_audiobooks(db).await?,
    };

    for record in records {
        let audiobook = cache.audiobook(record);
        let files = audiobook.files(db, cache).await?;
        let scanned = files.iter().filter(|f| f.is_scanned()).count();
        println!(
            "{:>4}  {}  {}  {}%  ({}/{} scanned)",
            audiobook.id(),
            audiobook.name(),
            format_ms(audiobook.total_duration()),
            audiobook.completeness(),
            scanned,
            files.len()
        );
    }
    Ok(())
}

fn format_ms(ms: i64) -> String {
    if ms < 0 {
        return "--:--".to_string();
    }
    let seconds = ms / 1000;
    format!("{}:{:02}:{:02}", seconds / 3600, (seconds / 60) % 60, seconds % 60)
}

/// Ctrl+C / terminate signal
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodoka_common::db::create_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> Pool<Sqlite> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_tables(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_play_falls_back_to_bookmark() {
        let db = setup_test_db().await;

        assert!(audiobook_to_play(&db, None).await.is_err());
        assert_eq!(audiobook_to_play(&db, Some(4)).await.unwrap(), 4);

        settings::save_current_audiobook(&db, 7).await.unwrap();
        assert_eq!(audiobook_to_play(&db, None).await.unwrap(), 7);
        assert_eq!(audiobook_to_play(&db, Some(4)).await.unwrap(), 4);
    }
}
