//! Scripted media backend
//!
//! Durations are registered per path; opening an unregistered path fails.
//! Control calls emit the events a real engine would and are recorded in
//! order. Tests push anything else (ticks, end of media, errors) through
//! [`FakeBackend::emit`] and friends.

use nodoka_player::backend::{BackendEvent, BackendState, EventSink, MediaBackend};
use nodoka_player::{Error, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Condvar, Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Open(String),
    Release,
    Play,
    Pause,
    Stop,
    Seek(i64),
    SetVolume(i32),
    SetRate(f32),
}

#[derive(Default)]
struct Loaded {
    path: Option<String>,
    sink: Option<EventSink>,
    duration: i64,
    position: i64,
    state: Option<BackendState>,
}

pub struct FakeBackend {
    durations: Mutex<HashMap<String, i64>>,
    loaded: Mutex<Loaded>,
    calls: Mutex<Vec<BackendCall>>,
    seekable: Mutex<bool>,
    /// While false, `play` blocks
    gate: Mutex<bool>,
    gate_changed: Condvar,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            durations: Mutex::new(HashMap::new()),
            loaded: Mutex::new(Loaded::default()),
            calls: Mutex::new(Vec::new()),
            seekable: Mutex::new(true),
            gate: Mutex::new(true),
            gate_changed: Condvar::new(),
        }
    }

    /// Make `path` openable with the given duration
    pub fn with_media(self, path: &str, duration: i64) -> Self {
        self.add_media(path, duration);
        self
    }

    pub fn add_media(&self, path: &str, duration: i64) {
        self.durations
            .lock()
            .unwrap()
            .insert(path.to_string(), duration);
    }

    pub fn set_seekable(&self, seekable: bool) {
        *self.seekable.lock().unwrap() = seekable;
    }

    /// Hold every `play` call until [`open_gate`](Self::open_gate)
    pub fn close_gate(&self) {
        *self.gate.lock().unwrap() = false;
    }

    pub fn open_gate(&self) {
        *self.gate.lock().unwrap() = true;
        self.gate_changed.notify_all();
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn opened_paths(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Open(path) => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn seeks(&self) -> Vec<i64> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::Seek(ms) => Some(ms),
                _ => None,
            })
            .collect()
    }

    pub fn loaded_path(&self) -> Option<String> {
        self.loaded.lock().unwrap().path.clone()
    }

    /// Set the position reported by [`MediaBackend::position`]
    pub fn set_position(&self, position: i64) {
        self.loaded.lock().unwrap().position = position;
    }

    /// Push an event to whoever opened the current media
    pub fn emit(&self, event: BackendEvent) {
        let loaded = self.loaded.lock().unwrap();
        if let Some(sink) = &loaded.sink {
            let _ = sink.send(event);
        }
    }

    /// Report a playback tick
    pub fn tick(&self, position: i64) {
        self.set_position(position);
        self.emit(BackendEvent::TimeChanged(position));
    }

    /// Play the current media through to its end
    pub fn finish(&self) {
        let duration = {
            let mut loaded = self.loaded.lock().unwrap();
            loaded.position = loaded.duration;
            loaded.state = Some(BackendState::Ended);
            loaded.duration
        };
        self.emit(BackendEvent::TimeChanged(duration));
        self.emit(BackendEvent::EndReached);
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn loaded(&self) -> MutexGuard<'_, Loaded> {
        self.loaded.lock().unwrap()
    }

    fn transition(&self, state: BackendState) -> Result<()> {
        let mut loaded = self.loaded();
        if loaded.path.is_none() {
            return Err(Error::Backend("No media opened".to_string()));
        }
        loaded.state = Some(state);
        if let Some(sink) = &loaded.sink {
            let _ = sink.send(BackendEvent::StateChanged(state));
        }
        Ok(())
    }
}

impl MediaBackend for FakeBackend {
    fn open(&self, path: &Path, events: EventSink) -> Result<()> {
        let path = path.to_string_lossy().into_owned();
        self.record(BackendCall::Open(path.clone()));

        let duration = self
            .durations
            .lock()
            .unwrap()
            .get(&path)
            .copied()
            .ok_or_else(|| Error::MediaParse(format!("Cannot open {}", path)))?;

        let mut loaded = self.loaded();
        *loaded = Loaded {
            path: Some(path),
            sink: Some(events),
            duration,
            position: 0,
            state: Some(BackendState::Opening),
        };
        if let Some(sink) = &loaded.sink {
            let _ = sink.send(BackendEvent::StateChanged(BackendState::Opening));
            let _ = sink.send(BackendEvent::ParsedChanged(true));
        }
        Ok(())
    }

    fn release(&self) {
        self.record(BackendCall::Release);
        *self.loaded() = Loaded::default();
    }

    fn play(&self) -> Result<()> {
        self.record(BackendCall::Play);

        let mut open = self.gate.lock().unwrap();
        while !*open {
            open = self.gate_changed.wait(open).unwrap();
        }
        drop(open);

        self.transition(BackendState::Playing)
    }

    fn pause(&self) -> Result<()> {
        self.record(BackendCall::Pause);
        self.transition(BackendState::Paused)
    }

    fn stop(&self) -> Result<()> {
        self.record(BackendCall::Stop);
        self.transition(BackendState::Stopped)
    }

    fn seek(&self, position_ms: i64) -> Result<()> {
        self.record(BackendCall::Seek(position_ms));
        let mut loaded = self.loaded();
        if loaded.path.is_none() {
            return Err(Error::Backend("No media opened".to_string()));
        }
        loaded.position = position_ms;
        if let Some(sink) = &loaded.sink {
            let _ = sink.send(BackendEvent::TimeChanged(position_ms));
        }
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        *self.seekable.lock().unwrap() && self.loaded().path.is_some()
    }

    fn position(&self) -> i64 {
        let loaded = self.loaded();
        if loaded.path.is_some() {
            loaded.position
        } else {
            -1
        }
    }

    fn duration(&self) -> i64 {
        let loaded = self.loaded();
        if loaded.path.is_some() {
            loaded.duration
        } else {
            -1
        }
    }

    fn set_volume(&self, volume: i32) -> Result<()> {
        self.record(BackendCall::SetVolume(volume));
        Ok(())
    }

    fn set_rate(&self, rate: f32) -> Result<()> {
        self.record(BackendCall::SetRate(rate));
        Ok(())
    }

    fn state(&self) -> BackendState {
        self.loaded().state.unwrap_or(BackendState::NothingSpecial)
    }
}
