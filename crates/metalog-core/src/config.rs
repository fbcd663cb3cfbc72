//! Configuration management for metalog.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default rotation threshold for the active segment (5 MiB).
pub const DEFAULT_MAX_SEGMENT_SIZE_BYTES: u64 = 5 * 1024 * 1024;

/// Main configuration for a journal-owning process.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Journal configuration.
    pub journal: JournalConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(crate::Error::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string cannot be parsed or fails validation.
    pub fn parse(content: &str) -> crate::Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| crate::Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file, falling back to defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a path is given and it cannot be loaded.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Check invariants that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns a configuration error describing the first violated invariant.
    pub fn validate(&self) -> crate::Result<()> {
        if self.journal.path.as_os_str().is_empty() {
            return Err(crate::Error::config("journal.path must not be empty"));
        }
        if self.journal.path.file_name().is_none() {
            return Err(crate::Error::config(format!(
                "journal.path {} does not name a file",
                self.journal.path.display()
            )));
        }
        if self.journal.max_segment_size_bytes == 0 {
            return Err(crate::Error::config("journal.max_segment_size_bytes must be positive"));
        }
        if self.journal.buffer_size == 0 {
            return Err(crate::Error::config("journal.buffer_size must be positive"));
        }
        Ok(())
    }
}

/// Journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Path of the active segment. Completed segments live in a sibling
    /// `completed` directory.
    pub path: PathBuf,
    /// Size in bytes past which the active segment is rotated on flush.
    /// Default: 5 MiB (5242880 bytes).
    pub max_segment_size_bytes: u64,
    /// Sync mode applied on flush.
    pub sync_mode: WalSyncMode,
    /// Buffer size for appends (default: 64KB).
    pub buffer_size: usize,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("journal/log.data"),
            max_segment_size_bytes: DEFAULT_MAX_SEGMENT_SIZE_BYTES,
            sync_mode: WalSyncMode::Fdatasync,
            buffer_size: 64 * 1024,
        }
    }
}

impl JournalConfig {
    /// Configuration rooted at the given active segment path.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Override the rotation threshold.
    #[must_use]
    pub fn with_max_segment_size(mut self, bytes: u64) -> Self {
        self.max_segment_size_bytes = bytes;
        self
    }

    /// Override the sync mode.
    #[must_use]
    pub fn with_sync_mode(mut self, sync_mode: WalSyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }
}

/// WAL sync mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WalSyncMode {
    /// No explicit sync - rely on OS flush.
    None,
    /// Use fdatasync (faster, doesn't sync file metadata).
    #[default]
    Fdatasync,
    /// Use full fsync (slower, syncs all metadata).
    Fsync,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format.
    #[default]
    Pretty,
    /// JSON format.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Log output format.
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: LogFormat::Pretty }
    }
}
