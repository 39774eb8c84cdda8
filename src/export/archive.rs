//! Session export and archive packaging
//!
//! Frames are streamed out of the store straight into the CSV writer. For
//! archives, each entry is rendered into its own buffer before it is added,
//! so one unreadable record is skipped without leaving a half-written entry
//! behind.

use crate::error::{ChordsError, ErrorKind, Result, ResultExt};
use crate::export::table::{check_channel_count, CsvWriter, TableStats};
use crate::storage::RecordingStore;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

/// One entry written to an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Entry name (the session key)
    pub name: String,
    pub stats: TableStats,
}

/// A finished archive plus what went into it
#[derive(Debug)]
pub struct ArchiveOutput {
    /// ZIP file contents
    pub bytes: Vec<u8>,
    pub entries: Vec<ArchiveEntry>,
    /// Records left out, each as a `PartialExportFailure`
    pub skipped: Vec<ChordsError>,
}

/// Converts stored sessions into exportable files
pub struct ExportEngine<'a> {
    store: &'a RecordingStore,
}

impl<'a> ExportEngine<'a> {
    pub fn new(store: &'a RecordingStore) -> Self {
        Self { store }
    }

    fn render(&self, key: &str, channel_count: usize) -> Result<(Vec<u8>, TableStats)> {
        let mut writer = CsvWriter::new(Vec::new(), channel_count)?;
        self.store
            .for_each_frame(key, |frame| writer.write_frame(&frame))?;
        writer.finish()
    }

    /// Export a single session as CSV bytes
    pub fn export_one(&self, key: &str, channel_count: usize) -> Result<Vec<u8>> {
        let (bytes, stats) = self.render(key, channel_count)?;
        if stats.padded_rows > 0 {
            tracing::warn!(
                "'{}': {} of {} rows had fewer than {} fields and were padded",
                key,
                stats.padded_rows,
                stats.rows,
                channel_count + 1
            );
        }
        tracing::debug!("Exported '{}' ({} rows, {} bytes)", key, stats.rows, bytes.len());
        Ok(bytes)
    }

    /// Export every session into one ZIP archive
    ///
    /// Fails with `NoData` if the store holds no sessions. Records whose table
    /// cannot be generated are skipped and reported in
    /// [`ArchiveOutput::skipped`]; a store that cannot be read at all fails
    /// the whole export.
    pub fn export_all(&self, channel_count: usize) -> Result<ArchiveOutput> {
        check_channel_count(channel_count)?;
        let keys = self.store.keys().context("Failed to list recordings")?;
        if keys.is_empty() {
            return Err(ChordsError::NoData);
        }

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut entries = Vec::with_capacity(keys.len());
        let mut skipped = Vec::new();

        for key in keys {
            match self.render(&key, channel_count) {
                Ok((bytes, stats)) => {
                    zip.start_file(key.as_str(), options)?;
                    zip.write_all(&bytes)?;
                    entries.push(ArchiveEntry { name: key, stats });
                }
                Err(e) if e.kind() == ErrorKind::StoreUnavailable => return Err(e),
                Err(e) => {
                    tracing::warn!("Skipping '{}' in archive: {}", key, e);
                    skipped.push(ChordsError::PartialExportFailure {
                        entry: key,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let bytes = zip.finish()?.into_inner();
        tracing::info!(
            "Built archive with {} entries ({} skipped, {} bytes)",
            entries.len(),
            skipped.len(),
            bytes.len()
        );

        Ok(ArchiveOutput {
            bytes,
            entries,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Frame;
    use std::io::Read;

    fn store_with(sessions: &[(&str, &[&[f64]])]) -> RecordingStore {
        let mut store = RecordingStore::open_in_memory().unwrap();
        for (key, rows) in sessions {
            let frames: Vec<Frame> = rows.iter().map(|r| Frame::from(*r)).collect();
            store.write_batch(key, &frames).unwrap();
        }
        store
    }

    fn read_entry(bytes: &[u8], name: &str) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name(name).unwrap();
        let mut text = String::new();
        entry.read_to_string(&mut text).unwrap();
        text
    }

    #[test]
    fn test_export_one() {
        let store = store_with(&[("rec1", &[&[1.0, 2.0, 3.0, 0.0], &[4.0, 5.0, 6.0, 1.0]])]);
        let bytes = ExportEngine::new(&store).export_one("rec1", 3).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "Counter,Channel1,Channel2,Channel3\n1,2,3,0\n4,5,6,1"
        );
    }

    #[test]
    fn test_export_one_missing() {
        let store = store_with(&[]);
        let err = ExportEngine::new(&store).export_one("missing", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_export_all_empty_store() {
        let store = store_with(&[]);
        let err = ExportEngine::new(&store).export_all(1).unwrap_err();
        assert!(matches!(err, ChordsError::NoData));
    }

    #[test]
    fn test_export_all_one_entry_per_session() {
        let store = store_with(&[
            ("a.csv", &[&[1.0, 0.0]]),
            ("b.csv", &[&[2.0, 0.0], &[3.0, 1.0]]),
            ("c.csv", &[&[4.0, 0.0]]),
        ]);
        let output = ExportEngine::new(&store).export_all(1).unwrap();
        assert_eq!(output.entries.len(), 3);
        assert!(output.skipped.is_empty());

        let archive = zip::ZipArchive::new(Cursor::new(output.bytes.as_slice())).unwrap();
        assert_eq!(archive.len(), 3);
        let mut names: Vec<_> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["a.csv", "b.csv", "c.csv"]);
        assert_eq!(read_entry(&output.bytes, "b.csv"), "Counter,Channel1\n2,0\n3,1");
    }

    #[test]
    fn test_export_all_aborts_when_store_unreadable() {
        let store = store_with(&[("a.csv", &[&[1.0, 0.0]]), ("b.csv", &[&[2.0, 0.0]])]);
        store
            .with_raw_connection(|conn| conn.execute_batch("DROP TABLE recording_frames;"))
            .unwrap();

        let err = ExportEngine::new(&store).export_all(1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[test]
    fn test_oversized_channel_count_is_invalid() {
        let store = store_with(&[("a.csv", &[&[1.0, 0.0]])]);
        let engine = ExportEngine::new(&store);
        for err in [
            engine.export_all(usize::MAX).unwrap_err(),
            engine.export_one("a.csv", usize::MAX).unwrap_err(),
        ] {
            assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        }
    }

    #[test]
    fn test_export_all_skips_corrupted_record() {
        let store = store_with(&[("good.csv", &[&[1.0, 0.0]]), ("bad.csv", &[&[2.0, 0.0]])]);
        store
            .with_raw_connection(|conn| {
                conn.execute(
                    "UPDATE recording_frames SET payload = '{' WHERE filename = 'bad.csv'",
                    [],
                )
            })
            .unwrap();

        let output = ExportEngine::new(&store).export_all(1).unwrap();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.entries[0].name, "good.csv");
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].kind(), ErrorKind::PartialExportFailure);
        assert!(output.skipped[0].to_string().contains("bad.csv"));
    }
}
