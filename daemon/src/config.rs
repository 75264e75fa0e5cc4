//! Configuration module for the Donefile daemon.
//!
//! This module handles parsing configuration from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `DONEFILE_VAULT_DIR` | No | Documents directory | Root of the watched document tree |
//! | `DONEFILE_EXTENSION` | No | `md` | Extension of task documents |
//! | `DONEFILE_DEBOUNCE_MS` | No | 100 | Quiet period before a changed document is processed |
//! | `DONEFILE_BUFFER_SIZE` | No | 1000 | Watch event buffer capacity |
//! | `DONEFILE_IO_TIMEOUT_SECS` | No | 10 | Bound on each document read or write |
//! | `DONEFILE_OVERLAP` | No | `drop` | `drop` or `rescan` edits made during a migration |
//!
//! # Example
//!
//! ```no_run
//! use donefile_daemon::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Vault: {}", config.vault_dir.display());
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use directories::UserDirs;
use thiserror::Error;

use crate::companion::{CompanionNaming, DEFAULT_EXTENSION};
use crate::engine::OverlapPolicy;
use crate::utils::DEFAULT_DEBOUNCE_MS;

/// Default event buffer capacity.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default per-call storage timeout (in seconds).
const DEFAULT_IO_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Failed to determine home directory.
    #[error("failed to determine home directory")]
    NoHomeDirectory,
}

/// Configuration for the Donefile daemon.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory whose documents are kept in sync.
    pub vault_dir: PathBuf,

    /// Extension of task documents, without the leading dot.
    pub extension: String,

    /// Quiet period after the last change before a document is processed.
    pub debounce: Duration,

    /// Capacity of the watch event buffer.
    pub buffer_size: usize,

    /// Bound on each storage call made during a migration.
    pub io_timeout: Duration,

    /// What to do with changes that arrive while their pair is being migrated.
    pub overlap: OverlapPolicy,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - A numeric variable is set but is not a positive integer
    /// - `DONEFILE_EXTENSION` is empty or contains a path separator
    /// - `DONEFILE_OVERLAP` is neither `drop` nor `rescan`
    /// - `DONEFILE_VAULT_DIR` is unset and no home directory can be found
    pub fn from_env() -> Result<Self, ConfigError> {
        // Optional: DONEFILE_VAULT_DIR (default: ~/Documents, or ~ without one)
        let vault_dir = match env::var("DONEFILE_VAULT_DIR") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => default_vault_dir()?,
        };

        // Optional: DONEFILE_EXTENSION (default: md)
        let extension = match env::var("DONEFILE_EXTENSION") {
            Ok(val) => {
                let ext = val.trim().trim_start_matches('.').to_string();
                if ext.is_empty() || ext.contains(['/', '\\', '.']) {
                    return Err(ConfigError::InvalidValue {
                        key: "DONEFILE_EXTENSION".to_string(),
                        message: format!("expected a bare extension like 'md', got '{val}'"),
                    });
                }
                ext
            }
            Err(_) => DEFAULT_EXTENSION.to_string(),
        };

        // Optional: DONEFILE_DEBOUNCE_MS (default: 100, zero disables the quiet period)
        let debounce_ms = match env::var("DONEFILE_DEBOUNCE_MS") {
            Ok(val) => val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "DONEFILE_DEBOUNCE_MS".to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            })?,
            Err(_) => DEFAULT_DEBOUNCE_MS,
        };

        // Optional: DONEFILE_BUFFER_SIZE (default: 1000, must be > 0)
        let buffer_size = parse_positive("DONEFILE_BUFFER_SIZE", DEFAULT_BUFFER_SIZE as u64)?;

        // Optional: DONEFILE_IO_TIMEOUT_SECS (default: 10, must be > 0)
        let io_timeout_secs = parse_positive("DONEFILE_IO_TIMEOUT_SECS", DEFAULT_IO_TIMEOUT_SECS)?;

        // Optional: DONEFILE_OVERLAP (default: drop)
        let overlap = match env::var("DONEFILE_OVERLAP") {
            Ok(val) => val
                .parse::<OverlapPolicy>()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "DONEFILE_OVERLAP".to_string(),
                    message,
                })?,
            Err(_) => OverlapPolicy::default(),
        };

        Ok(Self {
            vault_dir,
            extension,
            debounce: Duration::from_millis(debounce_ms),
            buffer_size: usize::try_from(buffer_size).unwrap_or(usize::MAX),
            io_timeout: Duration::from_secs(io_timeout_secs),
            overlap,
        })
    }

    /// Naming convention for the configured extension.
    #[must_use]
    pub fn naming(&self) -> CompanionNaming {
        CompanionNaming::new(&self.extension)
    }
}

/// Parses a positive integer variable, falling back to `default` when unset.
fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    let Ok(val) = env::var(key) else {
        return Ok(default);
    };
    let parsed = val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected positive integer, got '{val}'"),
    })?;
    if parsed == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value must be greater than 0".to_string(),
        });
    }
    Ok(parsed)
}

/// The user's Documents directory, or their home directory without one.
fn default_vault_dir() -> Result<PathBuf, ConfigError> {
    let user_dirs = UserDirs::new().ok_or(ConfigError::NoHomeDirectory)?;
    Ok(user_dirs
        .document_dir()
        .unwrap_or_else(|| user_dirs.home_dir())
        .to_path_buf())
}
