//! Frame recorder that queues frames for the recording store

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::config::RecordingConfig;
use crate::types::Frame;

use super::types::{FlushBatch, SessionState};

/// Build a session key from the recording start time
pub fn session_filename(prefix: &str, started: DateTime<Local>) -> String {
    format!("{}-{}.csv", prefix, started.format("%Y%m%d-%H%M%S"))
}

/// Frame recorder for capturing a live stream into write batches
///
/// Frames pushed while recording are queued and handed back as a
/// [`FlushBatch`] once `flush_threshold` frames are queued or
/// `flush_interval` has passed since the last flush. Frames pushed while not
/// recording are ignored.
#[derive(Debug)]
pub struct FrameRecorder {
    /// Current recording state
    state: SessionState,
    /// Key of the active session
    filename: Option<String>,
    /// Frames not yet flushed
    queue: Vec<Frame>,
    /// Flush once this many frames are queued (0 = interval only)
    flush_threshold: usize,
    /// Flush at least this often while frames are queued
    flush_interval: Duration,
    last_flush: Instant,
    /// Prefix for generated session keys
    prefix: String,
    /// Frames accepted in the active session
    recorded: usize,
}

impl Default for FrameRecorder {
    fn default() -> Self {
        Self::new(&RecordingConfig::default())
    }
}

impl FrameRecorder {
    /// Create a new frame recorder
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            state: SessionState::Idle,
            filename: None,
            queue: Vec::new(),
            flush_threshold: config.flush_threshold,
            flush_interval: config.flush_interval(),
            last_flush: Instant::now(),
            prefix: config.filename_prefix.clone(),
            recorded: 0,
        }
    }

    /// Get current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Check if recording
    pub fn is_recording(&self) -> bool {
        self.state.is_recording()
    }

    /// Key of the active session
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// Frames waiting for the next flush
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Frames accepted since the session started
    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Start a new session, generating a key when none is given
    ///
    /// Starting while already recording keeps the active session.
    pub fn start(&mut self, filename: Option<String>) -> &str {
        if !self.is_recording() {
            let filename =
                filename.unwrap_or_else(|| session_filename(&self.prefix, Local::now()));
            tracing::info!("Recording started: {}", filename);
            self.queue.clear();
            self.recorded = 0;
            self.last_flush = Instant::now();
            self.state = SessionState::Recording;
            self.filename = Some(filename);
        } else {
            tracing::warn!("Recording already in progress");
        }
        self.filename.as_deref().unwrap_or_default()
    }

    /// Queue a frame, returning a batch when a flush is due
    pub fn push(&mut self, frame: Frame) -> Option<FlushBatch> {
        self.push_at(frame, Instant::now())
    }

    /// Queue a frame observed at `now`
    pub fn push_at(&mut self, frame: Frame, now: Instant) -> Option<FlushBatch> {
        if !self.is_recording() {
            return None;
        }
        self.queue.push(frame);
        self.recorded += 1;

        let threshold_hit = self.flush_threshold > 0 && self.queue.len() >= self.flush_threshold;
        if threshold_hit || self.interval_elapsed(now) {
            self.take_batch(now)
        } else {
            None
        }
    }

    /// Flush on the interval alone, for streams that have gone quiet
    pub fn tick(&mut self) -> Option<FlushBatch> {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> Option<FlushBatch> {
        if self.is_recording() && self.interval_elapsed(now) {
            self.take_batch(now)
        } else {
            None
        }
    }

    /// Stop recording, returning the session key and any remaining frames
    pub fn stop(&mut self) -> Option<(String, Option<FlushBatch>)> {
        if !self.is_recording() {
            return None;
        }
        let remainder = self.take_batch(Instant::now());
        self.state = SessionState::Stopped;
        let filename = self.filename.take()?;
        tracing::info!("Recording stopped: {} ({} frames)", filename, self.recorded);
        Some((filename, remainder))
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_flush) >= self.flush_interval
    }

    fn take_batch(&mut self, now: Instant) -> Option<FlushBatch> {
        self.last_flush = now;
        if self.queue.is_empty() {
            return None;
        }
        let filename = self.filename.clone()?;
        let frames = std::mem::take(&mut self.queue);
        tracing::debug!("Flushing {} frames to {}", frames.len(), filename);
        Some(FlushBatch { filename, frames })
    }
}
