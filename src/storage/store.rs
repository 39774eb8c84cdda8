//! Recording store backed by SQLite
//!
//! Session records are keyed by filename. Each frame is one row in
//! `recording_frames`, ordered by a per-session sequence number, so a write
//! batch only ever appends rows and large recordings can be streamed back
//! without loading them whole.

use crate::error::{ChordsError, Result, ResultExt};
use crate::storage::migrations;
use crate::types::Frame;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long a statement waits on a locked database file
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One named, append-only recording
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Session key, used as the exported file name
    pub filename: String,
    /// Frames in arrival order
    pub content: Vec<Frame>,
}

impl SessionRecord {
    pub fn new(filename: impl Into<String>, content: Vec<Frame>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.content.len()
    }
}

/// A session record tagged with its ordinal in a full-store read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    /// 1-based position in key order
    pub id: u64,
    #[serde(flatten)]
    pub record: SessionRecord,
}

/// Durable keyed collection of session records
pub struct RecordingStore {
    conn: Connection,
    /// Path to the database file (`None` for in-memory stores)
    path: Option<PathBuf>,
    schema_version: i64,
}

impl RecordingStore {
    /// Open or create a store at the specified path
    ///
    /// Opening is idempotent: an existing store is migrated to the latest
    /// schema and reused.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ChordsError::StoreUnavailable(format!(
                    "Failed to create store directory {:?}: {}",
                    parent, e
                ))
            })?;
        }

        let conn = Connection::open(&path).map_err(|e| {
            ChordsError::StoreUnavailable(format!("Failed to open store {:?}: {}", path, e))
        })?;
        let store = Self::initialize(conn, Some(path))?;
        tracing::info!(
            "Opened recording store at {:?} (schema v{})",
            store.path,
            store.schema_version
        );
        Ok(store)
    }

    /// Open a private, non-durable store (for tests and dry runs)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            ChordsError::StoreUnavailable(format!("Failed to open in-memory store: {}", e))
        })?;
        Self::initialize(conn, None)
    }

    fn initialize(mut conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .and_then(|_| conn.busy_timeout(BUSY_TIMEOUT))
            .map_err(|e| ChordsError::StoreUnavailable(format!("Failed to configure store: {}", e)))?;

        let schema_version = migrations::run_migrations(&mut conn).map_err(|e| {
            ChordsError::StoreUnavailable(format!("Failed to initialize schema: {}", e))
        })?;

        Ok(Self {
            conn,
            path,
            schema_version,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn schema_version(&self) -> i64 {
        self.schema_version
    }

    /// Append `frames` to the record for `key`, creating it if absent
    ///
    /// The whole batch is applied in one transaction: either every frame is
    /// appended or none is.
    pub fn write_batch(&mut self, key: &str, frames: &[Frame]) -> Result<()> {
        if key.is_empty() {
            return Err(ChordsError::InvalidRequest(
                "Recording filename must not be empty".to_string(),
            ));
        }

        let payloads = frames
            .iter()
            .map(encode_payload)
            .collect::<Result<Vec<String>>>()?;

        let now = chrono::Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR IGNORE INTO recordings (filename, created_at, updated_at, frame_count)
             VALUES (?1, ?2, ?2, 0)",
            params![key, now],
        )?;
        let next_seq: i64 = tx.query_row(
            "SELECT frame_count FROM recordings WHERE filename = ?1",
            params![key],
            |row| row.get(0),
        )?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO recording_frames (filename, seq, payload) VALUES (?1, ?2, ?3)",
            )?;
            for (offset, payload) in payloads.iter().enumerate() {
                stmt.execute(params![key, next_seq + offset as i64, payload])?;
            }
        }
        tx.execute(
            "UPDATE recordings SET frame_count = frame_count + ?2, updated_at = ?3
             WHERE filename = ?1",
            params![key, payloads.len() as i64, now],
        )?;
        tx.commit()
            .with_context(|| format!("Failed to commit batch for '{}'", key))?;

        tracing::debug!(
            "Appended {} frames to '{}' (now {} frames)",
            payloads.len(),
            key,
            next_seq + payloads.len() as i64
        );
        Ok(())
    }

    /// Check whether a record exists for `key`
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.frame_count(key)?.is_some())
    }

    /// Number of frames stored under `key`, or `None` if there is no such record
    pub fn frame_count(&self, key: &str) -> Result<Option<u64>> {
        let count = self
            .conn
            .query_row(
                "SELECT frame_count FROM recordings WHERE filename = ?1",
                params![key],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(count.map(|c| c.max(0) as u64))
    }

    /// All session keys in key order
    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT filename FROM recordings ORDER BY filename")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    /// Read every record in the store, tagged with 1-based ordinals
    pub fn read_all(&self) -> Result<Vec<IndexedRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.filename, f.payload
             FROM recordings r
             LEFT JOIN recording_frames f ON f.filename = r.filename
             ORDER BY r.filename, f.seq",
        )?;
        let mut rows = stmt.query([])?;

        let mut records: Vec<IndexedRecord> = Vec::new();
        while let Some(row) = rows.next()? {
            let filename: String = row.get(0)?;
            let payload: Option<String> = row.get(1)?;

            if records.last().map(|r| r.record.filename != filename).unwrap_or(true) {
                records.push(IndexedRecord {
                    id: records.len() as u64 + 1,
                    record: SessionRecord::new(filename.clone(), Vec::new()),
                });
            }
            if let (Some(payload), Some(last)) = (payload, records.last_mut()) {
                let frame = decode_payload(&payload)
                    .with_context(|| format!("Corrupted frame in '{}'", filename))?;
                last.record.content.push(frame);
            }
        }

        Ok(records)
    }

    /// Read the record for `key`
    pub fn read_one(&self, key: &str) -> Result<SessionRecord> {
        let mut content = Vec::new();
        self.for_each_frame(key, |frame| {
            content.push(frame);
            Ok(())
        })?;
        Ok(SessionRecord::new(key, content))
    }

    /// Stream the frames stored under `key` in order
    ///
    /// Returns the number of frames visited. Fails with `NotFound` if the
    /// record does not exist, or with the first error `visit` returns.
    pub fn for_each_frame<F>(&self, key: &str, mut visit: F) -> Result<usize>
    where
        F: FnMut(Frame) -> Result<()>,
    {
        if !self.contains(key)? {
            return Err(ChordsError::NotFound(key.to_string()));
        }

        let mut stmt = self.conn.prepare_cached(
            "SELECT payload FROM recording_frames WHERE filename = ?1 ORDER BY seq",
        )?;
        let mut rows = stmt.query(params![key])?;
        let mut visited = 0;
        while let Some(row) = rows.next()? {
            let payload: String = row.get(0)?;
            let frame = decode_payload(&payload)
                .with_context(|| format!("Corrupted frame {} in '{}'", visited, key))?;
            visit(frame)?;
            visited += 1;
        }
        Ok(visited)
    }

    #[cfg(test)]
    pub(crate) fn with_raw_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        f(&self.conn)
    }
}

impl std::fmt::Debug for RecordingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingStore")
            .field("path", &self.path)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

fn encode_payload(frame: &Frame) -> Result<String> {
    serde_json::to_string(frame).map_err(ChordsError::from_json_error)
}

fn decode_payload(payload: &str) -> Result<Frame> {
    serde_json::from_str(payload).map_err(ChordsError::from_json_error)
}
