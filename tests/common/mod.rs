//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use chords_recorder::backend::{spawn_worker, StoreLocation, WorkerHandle};
use chords_recorder::config::WorkerConfig;
use std::path::Path;
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        queue_capacity: 64,
        response_timeout_ms: test_timeout().as_millis() as u64,
    }
}

/// Start a worker on a store file inside `dir`
pub fn file_worker(dir: &Path) -> WorkerHandle {
    spawn_worker(
        StoreLocation::File(dir.join("recordings.sqlite3")),
        &worker_config(),
    )
    .expect("worker should start")
}

/// Names of the entries in a ZIP archive, in archive order
pub fn archive_names(bytes: &[u8]) -> Vec<String> {
    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("valid zip archive");
    (0..archive.len())
        .map(|i| archive.by_index(i).expect("entry").name().to_string())
        .collect()
}

/// Text of one archive entry
pub fn archive_entry(bytes: &[u8], name: &str) -> String {
    use std::io::Read;

    let mut archive =
        zip::ZipArchive::new(std::io::Cursor::new(bytes)).expect("valid zip archive");
    let mut entry = archive.by_name(name).expect("entry present");
    let mut text = String::new();
    entry.read_to_string(&mut text).expect("utf-8 entry");
    text
}
