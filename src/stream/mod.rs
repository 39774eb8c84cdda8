//! Stream ingestion path
//!
//! Frames arrive from the transport collaborator one at a time and are handled
//! synchronously; nothing here suspends or buffers.
//!
//! - [`LiveFrameDispatcher`] - Forwards frames to the display, then to the monitor
//! - [`SequenceMonitor`] - Detects gaps in the wrapping frame counter
//! - [`RenderSurface`] - Interface of the rendering collaborator

pub mod dispatcher;
pub mod integrity;

pub use dispatcher::{LiveFrameDispatcher, RenderSurface};
pub use integrity::SequenceMonitor;
