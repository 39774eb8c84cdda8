//! Durable recording storage
//!
//! The store is owned by the recording worker's thread; nothing else opens it
//! while the worker runs.

pub mod migrations;
pub mod store;

pub use store::{IndexedRecord, RecordingStore, SessionRecord};
