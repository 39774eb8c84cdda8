//! Session types shared by the recorder and the acquisition loop

use crate::types::Frame;

/// Recording state of the ingestion side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session has been started
    #[default]
    Idle,
    /// Frames are being queued for the store
    Recording,
    /// The last session was stopped and fully flushed
    Stopped,
}

impl SessionState {
    /// Check if currently recording
    pub fn is_recording(&self) -> bool {
        matches!(self, SessionState::Recording)
    }
}

/// Frames ready to be sent to the store as one write request
#[derive(Debug, Clone, PartialEq)]
pub struct FlushBatch {
    pub filename: String,
    pub frames: Vec<Frame>,
}

impl FlushBatch {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
