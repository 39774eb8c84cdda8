//! Export table generation
//!
//! A session is exported as CSV-like text: a fixed header
//! `Counter,Channel1,...,ChannelN` followed by one row per frame holding the
//! frame's first `N + 1` fields in stored order. Rows are separated by `\n`
//! with no trailing newline. Frames narrower than `N + 1` fields are padded
//! with empty cells; wider frames are truncated.

use crate::error::{ChordsError, Result};
use crate::storage::SessionRecord;
use crate::types::Frame;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::io::{self, Write};

/// Name of the first header column
pub const COUNTER_COLUMN: &str = "Counter";

/// Largest channel count an export accepts
pub const MAX_CHANNEL_COUNT: usize = 1024;

/// Row statistics collected while generating a table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Data rows written (header excluded)
    pub rows: usize,
    /// Rows padded because the frame had fewer fields than the header
    pub padded_rows: usize,
}

/// A derived, in-memory table for one session
#[derive(Debug, Clone, PartialEq)]
pub struct ExportTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub stats: TableStats,
}

impl ExportTable {
    /// Serialize as CSV text
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv_writer(Vec::new());
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = into_sink(writer)?;
        String::from_utf8(bytes).map_err(|e| ChordsError::Serialization(e.to_string()))
    }
}

/// Reject channel counts no export can sensibly hold
pub fn check_channel_count(channel_count: usize) -> Result<()> {
    if channel_count > MAX_CHANNEL_COUNT {
        return Err(ChordsError::InvalidRequest(format!(
            "canvasCount {} exceeds the maximum of {}",
            channel_count, MAX_CHANNEL_COUNT
        )));
    }
    Ok(())
}

fn header(channel_count: usize) -> Vec<String> {
    std::iter::once(COUNTER_COLUMN.to_string())
        .chain((1..=channel_count).map(|i| format!("Channel{}", i)))
        .collect()
}

/// Render one numeric field
///
/// Integral values print without a fractional part, other finite values use
/// the shortest round-tripping form, and non-finite values render empty.
pub fn format_field(value: f64) -> String {
    const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0; // 2^53
    if !value.is_finite() {
        String::new()
    } else if value.fract() == 0.0 && value.abs() < MAX_EXACT_INT {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// The first `width` fields of a frame, and whether it had to be padded
fn row_fields(frame: &Frame, width: usize) -> (Vec<String>, bool) {
    let fields = (0..width)
        .map(|i| frame.get(i).map(format_field).unwrap_or_default())
        .collect();
    (fields, frame.len() < width)
}

/// Build the export table for a session
pub fn to_table(record: &SessionRecord, channel_count: usize) -> Result<ExportTable> {
    check_channel_count(channel_count)?;
    let width = channel_count + 1;
    let mut stats = TableStats::default();
    let rows = record
        .content
        .iter()
        .map(|frame| {
            let (fields, padded) = row_fields(frame, width);
            if padded {
                stats.padded_rows += 1;
            }
            fields
        })
        .collect::<Vec<Vec<String>>>();
    stats.rows = rows.len();

    Ok(ExportTable {
        header: header(channel_count),
        rows,
        stats,
    })
}

/// Passes bytes through but holds back a trailing `\n` until more follows,
/// so the last record ends without a terminator
struct NoFinalNewline<W> {
    inner: W,
    held: bool,
}

impl<W: Write> Write for NoFinalNewline<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.held {
            self.inner.write_all(b"\n")?;
            self.held = false;
        }
        match buf.split_last() {
            Some((b'\n', body)) => {
                self.inner.write_all(body)?;
                self.held = true;
            }
            _ => self.inner.write_all(buf)?,
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn csv_writer<W: Write>(inner: W) -> csv::Writer<NoFinalNewline<W>> {
    WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(NoFinalNewline { inner, held: false })
}

fn into_sink<W: Write>(writer: csv::Writer<NoFinalNewline<W>>) -> Result<W> {
    let sink = writer
        .into_inner()
        .map_err(|e| ChordsError::Io(e.into_error()))?;
    Ok(sink.inner)
}

/// Streams a table into a writer one frame at a time
///
/// Produces exactly the same text as [`ExportTable::to_csv`].
pub struct CsvWriter<W: Write> {
    writer: csv::Writer<NoFinalNewline<W>>,
    width: usize,
    stats: TableStats,
}

impl<W: Write> CsvWriter<W> {
    /// Create a writer and emit the header row
    pub fn new(inner: W, channel_count: usize) -> Result<Self> {
        check_channel_count(channel_count)?;
        let mut writer = csv_writer(inner);
        writer.write_record(header(channel_count))?;
        Ok(Self {
            writer,
            width: channel_count + 1,
            stats: TableStats::default(),
        })
    }

    /// Append one frame as a data row
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let (fields, padded) = row_fields(frame, self.width);
        self.writer.write_record(&fields)?;
        if padded {
            self.stats.padded_rows += 1;
        }
        self.stats.rows += 1;
        Ok(())
    }

    /// Flush and return the underlying writer
    pub fn finish(self) -> Result<(W, TableStats)> {
        let stats = self.stats;
        Ok((into_sink(self.writer)?, stats))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(rows: &[&[f64]]) -> SessionRecord {
        SessionRecord::new("rec.csv", rows.iter().map(|r| Frame::from(*r)).collect())
    }

    #[test]
    fn test_table_text() {
        let table = to_table(&record(&[&[1.0, 2.0, 3.0, 0.0], &[4.0, 5.0, 6.0, 1.0]]), 3).unwrap();
        assert_eq!(
            table.to_csv().unwrap(),
            "Counter,Channel1,Channel2,Channel3\n1,2,3,0\n4,5,6,1"
        );
        assert_eq!(table.stats.rows, 2);
        assert_eq!(table.stats.padded_rows, 0);
    }

    #[test]
    fn test_wider_frames_truncated() {
        let table = to_table(&record(&[&[100.0, 7.0, 42.0]]), 1).unwrap();
        assert_eq!(table.to_csv().unwrap(), "Counter,Channel1\n100,7");
    }

    #[test]
    fn test_narrow_frames_padded() {
        let table = to_table(&record(&[&[1.0, 2.0, 3.0, 0.0], &[4.0, 1.0]]), 3).unwrap();
        assert_eq!(table.rows[1], vec!["4", "1", "", ""]);
        assert_eq!(table.stats.padded_rows, 1);
        assert!(table.to_csv().unwrap().ends_with("\n4,1,,"));
    }

    #[test]
    fn test_empty_session_is_header_only() {
        let table = to_table(&record(&[]), 2).unwrap();
        assert_eq!(table.to_csv().unwrap(), "Counter,Channel1,Channel2");
    }

    #[test]
    fn test_field_formatting() {
        assert_eq!(format_field(3.0), "3");
        assert_eq!(format_field(-12.0), "-12");
        assert_eq!(format_field(2.5), "2.5");
        assert_eq!(format_field(0.1), "0.1");
        assert_eq!(format_field(f64::NAN), "");
        assert_eq!(format_field(f64::INFINITY), "");
    }

    #[test]
    fn test_streaming_matches_table() {
        let rec = record(&[&[1.5, 2.0, 0.0], &[3.0], &[4.0, 5.25, 2.0, 9.0]]);
        let mut writer = CsvWriter::new(Vec::new(), 2).unwrap();
        for frame in &rec.content {
            writer.write_frame(frame).unwrap();
        }
        let (bytes, stats) = writer.finish().unwrap();

        let table = to_table(&rec, 2).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), table.to_csv().unwrap());
        assert_eq!(stats, table.stats);
    }

    #[test]
    fn test_oversized_channel_count_rejected() {
        for count in [MAX_CHANNEL_COUNT + 1, usize::MAX] {
            let err = to_table(&record(&[&[1.0, 0.0]]), count).unwrap_err();
            assert!(matches!(err, ChordsError::InvalidRequest(_)));
            assert!(CsvWriter::new(Vec::new(), count).is_err());
        }
        assert!(CsvWriter::new(Vec::new(), MAX_CHANNEL_COUNT).is_ok());
    }

    #[test]
    fn test_newline_held_until_more_follows() {
        let mut sink = NoFinalNewline { inner: Vec::new(), held: false };
        sink.write_all(b"a,b\n").unwrap();
        sink.write_all(b"1,").unwrap();
        sink.write_all(b"2\n").unwrap();
        assert_eq!(sink.inner, b"a,b\n1,2");
    }
}
