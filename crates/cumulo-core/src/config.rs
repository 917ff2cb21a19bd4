//! Configuration module for the Cumulo sync core.
//!
//! Provides typed configuration structs that map to the YAML configuration
//! file, with loading, validation, and defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level configuration for the sync core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub uploads: UploadsConfig,
    pub logging: LoggingConfig,
}

/// Local storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the per-account metadata databases.
    pub data_dir: PathBuf,
}

/// Upload / chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Files above this size (in MiB) are uploaded in chunks.
    pub chunk_threshold_mb: u64,
    /// Size of each upload chunk (in MiB).
    pub chunk_size_mb: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".cumulo"),
        }
    }
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            chunk_threshold_mb: 10,
            chunk_size_mb: 10,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Serialize the configuration back to YAML at `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.uploads.chunk_size_mb == 0 {
            anyhow::bail!("uploads.chunk_size_mb must be non-zero");
        }
        if self.uploads.chunk_threshold_mb < self.uploads.chunk_size_mb {
            anyhow::bail!("uploads.chunk_threshold_mb must be at least chunk_size_mb");
        }
        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => anyhow::bail!("unknown logging.level: {other}"),
        }
        Ok(())
    }

    /// Chunking threshold in bytes.
    pub fn chunk_threshold_bytes(&self) -> u64 {
        self.uploads.chunk_threshold_mb * 1024 * 1024
    }

    /// Chunk size in bytes.
    pub fn chunk_size_bytes(&self) -> u64 {
        self.uploads.chunk_size_mb * 1024 * 1024
    }
}
