//! # Chords Recorder: multi-channel signal stream recorder
//!
//! Records a continuous multi-channel numeric stream from an external device,
//! detects silent data loss from the stream's wrapping sequence counter, and
//! persists sessions to a local SQLite store for export as CSV or as a ZIP
//! archive of every session.
//!
//! ## Architecture
//!
//! - **Stream**: dispatches each frame to the rendering surface and the
//!   sequence integrity monitor
//! - **Session**: queues frames while recording and flushes them as write batches
//! - **Backend**: a worker thread that owns the store and answers requests over
//!   crossbeam channels
//! - **Storage**: append-only session records in SQLite, schema managed by
//!   versioned migrations
//! - **Export**: CSV tables and ZIP archives built from stored sessions
//!
//! ## Configuration
//!
//! Configuration and the recording store live in the platform-appropriate data
//! directory under `dev.chords.recorder`:
//!
//! - **Linux**: `~/.local/share/dev.chords.recorder/`
//! - **macOS**: `~/Library/Application Support/dev.chords.recorder/`
//! - **Windows**: `%APPDATA%\dev.chords.recorder\`
//!
//! ## Example
//!
//! ```ignore
//! use chords_recorder::{
//!     backend::{spawn_worker, StoreLocation},
//!     config::AppConfig,
//!     session::Acquisition,
//! };
//!
//! let config = AppConfig::load_or_default(None);
//! let worker = spawn_worker(StoreLocation::File(config.store_path()?), &config.worker)?;
//! let mut acquisition = Acquisition::new(Some(plot), worker, &config);
//!
//! acquisition.start_recording(None);
//! for frame in device.frames() {
//!     acquisition.on_frame(frame)?;
//! }
//! acquisition.stop_recording()?;
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod export;
pub mod session;
pub mod storage;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use backend::{spawn_worker, Request, Response, StoreLocation, WorkerHandle};
pub use config::AppConfig;
pub use error::{ChordsError, ErrorKind, Result};
pub use session::{Acquisition, LossTally};
pub use storage::{RecordingStore, SessionRecord};
pub use stream::{LiveFrameDispatcher, RenderSurface};
pub use types::{CounterPosition, Frame, LossEvent};
