//! Recording sessions on the ingestion side
//!
//! This module turns the live frame stream into write requests for the
//! recording worker.
//!
//! # Features
//!
//! - Queue frames while a session is recording
//! - Flush batches on a frame threshold or a time interval
//! - Generate timestamped session keys
//! - Tally detected loss while the stream runs

pub mod acquisition;
pub mod recorder;
pub mod types;

pub use acquisition::{Acquisition, LossTally};
pub use recorder::FrameRecorder;
pub use types::{FlushBatch, SessionState};
