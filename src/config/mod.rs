//! Configuration module for the recorder
//!
//! This module handles application configuration:
//! - Where the recording store lives
//! - How the live stream is interpreted (channel count, counter position)
//! - How often recorded frames are flushed to the store
//! - Worker queue sizing and response timeouts
//!
//! # App Data Location
//!
//! Configuration and recordings are stored in the platform-appropriate
//! location:
//! - **Linux**: `~/.local/share/dev.chords.recorder/`
//! - **macOS**: `~/Library/Application Support/dev.chords.recorder/`
//! - **Windows**: `%APPDATA%\dev.chords.recorder\`
//!
//! # Files
//!
//! - `config.toml` - Application configuration
//! - `ChordsRecordings.sqlite3` - Recording store
//!
//! # Example
//!
//! ```ignore
//! use chords_recorder::config::AppConfig;
//!
//! let config = AppConfig::load_or_default(None);
//! let store_path = config.store_path()?;
//! ```

use crate::error::{ChordsError, Result};
use crate::types::CounterPosition;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.chords.recorder";

/// Config filename
pub const CONFIG_FILE: &str = "config.toml";

/// Store filename
pub const STORE_FILE: &str = "ChordsRecordings.sqlite3";

/// Default number of frames buffered before a flush
pub const DEFAULT_FLUSH_THRESHOLD: usize = 500;

/// Default maximum time between flushes in milliseconds
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 1000;

/// Default worker request queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default time to wait for a worker response in milliseconds
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 30_000;

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        ChordsError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            ChordsError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the default config file
pub fn config_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

// ==================== App Config ====================

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
}

impl AppConfig {
    /// Parse a config from TOML text
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|e| ChordsError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a config file, or the default config file when `path` is `None`
    ///
    /// A missing default file yields the defaults; a missing explicit file is
    /// an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let Some(default) = config_path().filter(|p| p.exists()) else {
                    return Ok(Self::default());
                };
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            ChordsError::Config(format!("Failed to read config {:?}: {}", path, e))
        })?;
        Self::from_toml(&content)
    }

    /// Load a config, returning defaults on any error
    pub fn load_or_default(path: Option<&Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save config as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ChordsError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)
            .map_err(|e| ChordsError::Config(format!("Failed to write config: {}", e)))
    }

    /// Resolve the store path, falling back to the app data directory
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.store.path {
            Some(path) => Ok(path.clone()),
            None => Ok(ensure_app_data_dir()?.join(STORE_FILE)),
        }
    }
}

/// Recording store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file; defaults to the app data directory
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// How incoming frames are interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Number of channels exported per frame
    #[serde(default = "default_channel_count")]
    pub channel_count: usize,
    /// Where the sequence counter sits in each frame
    #[serde(default)]
    pub counter_position: CounterPosition,
}

fn default_channel_count() -> usize {
    1
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            channel_count: default_channel_count(),
            counter_position: CounterPosition::default(),
        }
    }
}

/// Recording flush behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Flush when this many frames are queued
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Flush at least this often while frames are queued
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Prefix for generated session names
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

fn default_flush_threshold() -> usize {
    DEFAULT_FLUSH_THRESHOLD
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL_MS
}

fn default_filename_prefix() -> String {
    "ChordsWeb".to_string()
}

impl RecordingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            flush_interval_ms: default_flush_interval_ms(),
            filename_prefix: default_filename_prefix(),
        }
    }
}

/// Worker boundary settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Capacity of the request and response queues
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// How long a blocking call waits for its response
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_response_timeout_ms() -> u64 {
    DEFAULT_RESPONSE_TIMEOUT_MS
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            response_timeout_ms: default_response_timeout_ms(),
        }
    }
}
