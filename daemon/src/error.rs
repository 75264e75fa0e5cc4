//! Error types for the Donefile daemon.
//!
//! This module defines the crate-level error returned by migration passes and
//! daemon setup, wrapping the narrower errors of each module.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::config::ConfigError;
use crate::store::StoreError;
use crate::watcher::WatcherError;

/// Errors that can occur while synchronizing task documents.
///
/// Inside the daemon these never escape a migration pass: the engine logs them
/// and reports a failed outcome. They surface directly only from setup code
/// and the one-shot CLI commands.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Configuration-related error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Document storage error (missing document, I/O failure).
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// File watching error.
    #[error("file watch error: {0}")]
    Watch(#[from] WatcherError),

    /// A storage call did not finish within the configured timeout.
    #[error("storage call timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The path is not a source or companion task document.
    #[error("not a task document: {}", .0.display())]
    Unrecognized(PathBuf),
}

/// A specialized `Result` type for synchronization operations.
pub type Result<T> = std::result::Result<T, SyncError>;
