//! Headless backend built on symphonia
//!
//! This engine is silent. It produces no audio output.
//!
//! Opening a file probes its container for the duration. Playback is a
//! wall-clock position scaled by the rate: a ticker thread reports the
//! position every tick and reports the end once the duration is reached.
//! No samples are decoded and no audio device is touched.

use super::{BackendEvent, BackendState, EventSink, MediaBackend};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::TimeBase;
use tracing::{debug, warn};

/// Probe a media file for its duration in milliseconds
///
/// Uses the frame count from the container header when present, otherwise
/// sums packet durations.
pub fn probe_duration_ms(path: &Path) -> Result<i64> {
    let file = std::fs::File::open(path)
        .map_err(|e| Error::MediaParse(format!("Failed to open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| Error::MediaParse(format!("Failed to probe {}: {}", path.display(), e)))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::MediaParse(format!("No audio track in {}", path.display())))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let time_base = params
        .time_base
        .or_else(|| params.sample_rate.map(|rate| TimeBase::new(1, rate)))
        .ok_or_else(|| Error::MediaParse(format!("No time base for {}", path.display())))?;

    let frames = match params.n_frames {
        Some(frames) => frames,
        None => {
            debug!("No frame count in header of {}, counting packets", path.display());
            let mut total = 0u64;
            loop {
                match format.next_packet() {
                    Ok(packet) if packet.track_id() == track_id => total += packet.dur,
                    Ok(_) => continue,
                    Err(symphonia::core::errors::Error::IoError(ref e))
                        if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                    {
                        break
                    }
                    Err(e) => {
                        warn!("Stopped counting packets of {}: {}", path.display(), e);
                        break;
                    }
                }
            }
            total
        }
    };

    let time = time_base.calc_time(frames);
    let millis = time.seconds as i64 * 1000 + (time.frac * 1000.0).round() as i64;
    if millis <= 0 {
        return Err(Error::MediaParse(format!(
            "Zero-length media {}",
            path.display()
        )));
    }
    Ok(millis)
}

struct Media {
    path: PathBuf,
    duration_ms: i64,
    sink: EventSink,
}

struct Inner {
    media: Option<Media>,
    state: BackendState,
    /// Position at the last rebase
    base_position: i64,
    /// Wall-clock instant of the last rebase while playing
    resumed_at: Option<Instant>,
    rate: f32,
    volume: i32,
    /// Bumped on every transition that must silence a running ticker
    generation: u64,
}

impl Inner {
    fn position_now(&self) -> i64 {
        let Some(media) = &self.media else {
            return -1;
        };
        let elapsed = self
            .resumed_at
            .map(|at| (at.elapsed().as_secs_f64() * 1000.0 * f64::from(self.rate)) as i64)
            .unwrap_or(0);
        (self.base_position + elapsed).min(media.duration_ms)
    }

    fn rebase(&mut self) {
        self.base_position = self.position_now().max(0);
        if self.resumed_at.is_some() {
            self.resumed_at = Some(Instant::now());
        }
    }

    fn emit(&self, event: BackendEvent) {
        if let Some(media) = &self.media {
            if media.sink.send(event).is_err() {
                debug!("Event receiver for {} dropped", media.path.display());
            }
        }
    }

    fn set_state(&mut self, state: BackendState) {
        self.state = state;
        self.emit(BackendEvent::StateChanged(state));
    }
}

/// Silent media engine
///
/// Reports real durations and a simulated playback position. Nothing is
/// played to a sound device.
pub struct SymphoniaBackend {
    inner: Arc<Mutex<Inner>>,
    tick: Duration,
}

impl SymphoniaBackend {
    /// Create an engine that reports the position every `tick`
    pub fn new(tick: Duration) -> Result<Self> {
        if tick.is_zero() {
            return Err(Error::Backend("Position tick must be positive".to_string()));
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                media: None,
                state: BackendState::NothingSpecial,
                base_position: 0,
                resumed_at: None,
                rate: 1.0,
                volume: 100,
                generation: 0,
            })),
            tick,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn volume(&self) -> i32 {
        self.lock().volume
    }

    pub fn rate(&self) -> f32 {
        self.lock().rate
    }

    fn spawn_ticker(&self, generation: u64) -> Result<()> {
        let shared = Arc::clone(&self.inner);
        let tick = self.tick;

        std::thread::Builder::new()
            .name("nodoka-backend-tick".to_string())
            .spawn(move || loop {
                std::thread::sleep(tick);

                let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
                if inner.generation != generation || inner.state != BackendState::Playing {
                    break;
                }

                let duration = match &inner.media {
                    Some(media) => media.duration_ms,
                    None => break,
                };
                let position = inner.position_now();

                if position >= duration {
                    inner.base_position = duration;
                    inner.resumed_at = None;
                    inner.state = BackendState::Ended;
                    inner.emit(BackendEvent::TimeChanged(duration));
                    inner.emit(BackendEvent::EndReached);
                    break;
                }

                inner.emit(BackendEvent::TimeChanged(position));
            })
            .map(|_| ())
            .map_err(|e| Error::Backend(format!("Failed to start position ticker: {}", e)))
    }
}

impl MediaBackend for SymphoniaBackend {
    fn open(&self, path: &Path, events: EventSink) -> Result<()> {
        self.release();

        let duration_ms = probe_duration_ms(path)?;
        debug!("Opened {} ({} ms)", path.display(), duration_ms);

        let mut inner = self.lock();
        inner.media = Some(Media {
            path: path.to_path_buf(),
            duration_ms,
            sink: events,
        });
        inner.base_position = 0;
        inner.resumed_at = None;
        inner.set_state(BackendState::Opening);
        inner.emit(BackendEvent::ParsedChanged(true));
        Ok(())
    }

    fn release(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.media = None;
        inner.state = BackendState::NothingSpecial;
        inner.base_position = 0;
        inner.resumed_at = None;
    }

    fn play(&self) -> Result<()> {
        let generation = {
            let mut inner = self.lock();
            if inner.media.is_none() {
                return Err(Error::Backend("No media opened".to_string()));
            }
            if inner.state == BackendState::Playing {
                return Ok(());
            }
            if matches!(inner.state, BackendState::Ended | BackendState::Stopped) {
                inner.base_position = 0;
            }

            inner.generation += 1;
            inner.resumed_at = Some(Instant::now());
            inner.set_state(BackendState::Playing);
            inner.generation
        };

        self.spawn_ticker(generation)
    }

    fn pause(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != BackendState::Playing {
            return Ok(());
        }

        inner.base_position = inner.position_now().max(0);
        inner.resumed_at = None;
        inner.generation += 1;
        inner.set_state(BackendState::Paused);
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.media.is_none() || inner.state == BackendState::Stopped {
            return Ok(());
        }

        // Position stays readable until the next play
        inner.base_position = inner.position_now().max(0);
        inner.resumed_at = None;
        inner.generation += 1;
        inner.set_state(BackendState::Stopped);
        Ok(())
    }

    fn seek(&self, position_ms: i64) -> Result<()> {
        let mut inner = self.lock();
        let duration = match &inner.media {
            Some(media) => media.duration_ms,
            None => return Err(Error::Backend("No media opened".to_string())),
        };

        inner.base_position = position_ms.clamp(0, duration);
        if inner.resumed_at.is_some() {
            inner.resumed_at = Some(Instant::now());
        }
        let position = inner.base_position;
        inner.emit(BackendEvent::TimeChanged(position));
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        self.lock()
            .media
            .as_ref()
            .map(|m| m.duration_ms > 0)
            .unwrap_or(false)
    }

    fn position(&self) -> i64 {
        self.lock().position_now()
    }

    fn duration(&self) -> i64 {
        self.lock()
            .media
            .as_ref()
            .map(|m| m.duration_ms)
            .unwrap_or(-1)
    }

    fn set_volume(&self, volume: i32) -> Result<()> {
        self.lock().volume = volume.clamp(0, 200);
        Ok(())
    }

    fn set_rate(&self, rate: f32) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(Error::Backend(format!("Invalid playback rate {}", rate)));
        }

        let mut inner = self.lock();
        inner.rebase();
        inner.rate = rate;
        Ok(())
    }

    fn state(&self) -> BackendState {
        self.lock().state
    }
}
