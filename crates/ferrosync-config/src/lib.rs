//! Configuration management system for ferrosync
//!
//! This crate loads the settings of a mirror run from layered sources:
//! built-in defaults, then a YAML, TOML or JSON file, then `FERROSYNC__*`
//! environment variables. Command line flags are applied on top by the
//! binary before [`Config::resolve_run`] turns everything into validated
//! [`RunSettings`].
//!
//! # Examples
//!
//! ```rust
//! use ferrosync_config::ConfigBuilder;
//!
//! let config = ConfigBuilder::new()
//!     .add_defaults()
//!     .add_source_file("ferrosync.yaml")
//!     .add_env_prefix("FERROSYNC")
//!     .build()
//!     .expect("Failed to load configuration");
//!
//! println!("Sync interval: {}s", config.sync.interval_secs);
//! ```

#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use ferrosync_types::{BufferSize, DigestAlgorithm, PathMapping, SyncInterval};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod builder;
pub mod error;
pub mod loader;

pub use builder::ConfigBuilder;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

/// Main configuration structure for ferrosync
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// What to mirror and how often
    pub sync: SyncConfig,
    /// How file contents are compared
    pub verification: VerificationConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Mirror configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory to mirror
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
    /// Directory kept identical to the source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replica_path: Option<PathBuf>,
    /// Seconds between the end of one tick and the start of the next
    pub interval_secs: u64,
    /// Only report what would change
    pub dry_run: bool,
    /// Preserve modification and access times on copies
    pub preserve_timestamps: bool,
    /// Preserve permission bits on copies
    pub preserve_permissions: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            replica_path: None,
            interval_secs: SyncInterval::DEFAULT_SECS,
            dry_run: false,
            preserve_timestamps: true,
            preserve_permissions: true,
        }
    }
}

/// Content comparison configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Digest used to compare file contents
    pub algorithm: DigestAlgorithm,
    /// Treat files of different sizes as different without reading them
    pub size_fast_path: bool,
    /// Read buffer size in bytes
    pub buffer_size: usize,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            algorithm: DigestAlgorithm::default(),
            size_fast_path: true,
            buffer_size: BufferSize::DEFAULT,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// File receiving a copy of every log line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Enable JSON formatting
    pub json_format: bool,
    /// Enable colored output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: Some(PathBuf::from("actions.log")),
            json_format: false,
            colored_output: true,
        }
    }
}

/// Everything a mirror run needs, validated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Source and replica roots
    pub mapping: PathMapping,
    /// Pause between ticks
    pub interval: SyncInterval,
    /// Only report what would change
    pub dry_run: bool,
    /// Preserve modification and access times on copies
    pub preserve_timestamps: bool,
    /// Preserve permission bits on copies
    pub preserve_permissions: bool,
    /// Digest used to compare file contents
    pub algorithm: DigestAlgorithm,
    /// Size-first comparison shortcut
    pub size_fast_path: bool,
    /// Read buffer size
    pub buffer_size: BufferSize,
}

impl Config {
    /// Turn the configuration into settings for a mirror run
    ///
    /// Fails when a root is not configured or a value is out of range.
    pub fn resolve_run(&self) -> ConfigResult<RunSettings> {
        let source = self
            .sync
            .source_path
            .clone()
            .ok_or_else(|| ConfigError::missing_required("sync.source_path"))?;
        let replica = self
            .sync
            .replica_path
            .clone()
            .ok_or_else(|| ConfigError::missing_required("sync.replica_path"))?;
        let interval = SyncInterval::from_secs(self.sync.interval_secs)
            .map_err(|message| ConfigError::invalid_value("sync.interval_secs", message))?;
        let buffer_size = BufferSize::new(self.verification.buffer_size)
            .map_err(|message| ConfigError::invalid_value("verification.buffer_size", message))?;

        Ok(RunSettings {
            mapping: PathMapping::new(source, replica),
            interval,
            dry_run: self.sync.dry_run,
            preserve_timestamps: self.sync.preserve_timestamps,
            preserve_permissions: self.sync.preserve_permissions,
            algorithm: self.verification.algorithm,
            size_fast_path: self.verification.size_fast_path,
            buffer_size,
        })
    }
}
