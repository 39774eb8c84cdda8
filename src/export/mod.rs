//! Export engine
//!
//! - [`to_table`] / [`ExportTable`] - Pure conversion of one session into table text
//! - [`CsvWriter`] - Streaming form of the same conversion
//! - [`ExportEngine`] - Store-backed single-session export and ZIP packaging

pub mod archive;
pub mod table;

pub use archive::{ArchiveEntry, ArchiveOutput, ExportEngine};
pub use table::{
    check_channel_count, format_field, to_table, CsvWriter, ExportTable, TableStats, MAX_CHANNEL_COUNT,
};
