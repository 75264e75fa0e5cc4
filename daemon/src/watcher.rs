//! File watcher for task documents.
//!
//! This module watches a vault directory tree for changes to task documents
//! and emits a [`WatchEvent`] per affected document. These are the change
//! notifications the migration engine reacts to.
//!
//! # Architecture
//!
//! The watcher uses the [`notify`] crate. Its callback runs on notify's own
//! thread and is kept lightweight: it filters by extension, skips hidden
//! directories (`.obsidian`, `.trash`, `.git`, ...) and forwards events
//! through a bounded channel with `try_send`, never blocking the watcher.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use tokio::sync::mpsc;
//! use donefile_daemon::companion::CompanionNaming;
//! use donefile_daemon::watcher::{DocumentWatcher, WatchEvent};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (tx, mut rx) = mpsc::channel(100);
//!     let _watcher = DocumentWatcher::new(PathBuf::from("/vault"), CompanionNaming::default(), tx)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             WatchEvent::Created(path) | WatchEvent::Modified(path) => {
//!                 println!("Changed: {}", path.display());
//!             }
//!             WatchEvent::Removed(path) => println!("Removed: {}", path.display()),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::fs;
use std::path::{Component, Path, PathBuf};

use notify::{
    event::{CreateKind, ModifyKind, RemoveKind},
    Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::companion::CompanionNaming;

/// Events emitted by the document watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A document appeared (new file, or renamed into place by an editor's atomic save).
    Created(PathBuf),
    /// A document's content changed.
    Modified(PathBuf),
    /// A document was removed.
    Removed(PathBuf),
}

impl WatchEvent {
    /// Path of the affected document.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Created(path) | Self::Modified(path) | Self::Removed(path) => path,
        }
    }

    /// Returns `true` if the document's content may have changed.
    #[must_use]
    pub fn is_content_change(&self) -> bool {
        matches!(self, Self::Created(_) | Self::Modified(_))
    }
}

/// Errors that can occur during file watching operations.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to initialize the file system watcher.
    #[error("failed to create watcher: {0}")]
    WatcherInit(#[from] notify::Error),

    /// Failed to read a directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The watch directory does not exist or is inaccessible.
    #[error("watch directory does not exist: {}", .0.display())]
    DirectoryNotFound(PathBuf),
}

/// Result type for watcher operations.
pub type Result<T> = std::result::Result<T, WatcherError>;

/// Recursive watcher over a vault of task documents.
#[derive(Debug)]
pub struct DocumentWatcher {
    /// Kept alive to maintain the watch subscription.
    #[allow(dead_code)]
    watcher: RecommendedWatcher,

    /// The root directory being watched.
    root: PathBuf,
}

impl DocumentWatcher {
    /// Starts watching `root` recursively, sending events to `event_sender`.
    ///
    /// # Errors
    ///
    /// Returns an error if `root` does not exist or the underlying watcher
    /// cannot be initialized.
    pub fn new(
        root: PathBuf,
        naming: CompanionNaming,
        event_sender: mpsc::Sender<WatchEvent>,
    ) -> Result<Self> {
        if !root.is_dir() {
            return Err(WatcherError::DirectoryNotFound(root));
        }

        let callback_root = root.clone();
        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| {
                handle_notify_event(res, &callback_root, &naming, &event_sender);
            },
            Config::default(),
        )?;
        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!(root = %root.display(), "Started recursive document watch");

        Ok(Self { watcher, root })
    }

    /// Returns the directory being watched.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Translates one notify event into zero or more [`WatchEvent`]s.
fn handle_notify_event(
    res: std::result::Result<Event, notify::Error>,
    root: &Path,
    naming: &CompanionNaming,
    sender: &mpsc::Sender<WatchEvent>,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "File watcher error");
            return;
        }
    };

    trace!(kind = ?event.kind, paths = ?event.paths, "Received notify event");

    for path in &event.paths {
        if !naming.is_recognized(path) || is_hidden(root, path) {
            continue;
        }

        let Some(watch_event) = translate(event.kind, path) else {
            trace!(kind = ?event.kind, path = %path.display(), "Ignoring event kind");
            continue;
        };

        // Never block notify's thread; a dropped event is recovered by the next save.
        if let Err(e) = sender.try_send(watch_event) {
            warn!(error = %e, "Failed to queue watch event, channel may be full");
        }
    }
}

fn translate(kind: EventKind, path: &Path) -> Option<WatchEvent> {
    match kind {
        EventKind::Create(CreateKind::File | CreateKind::Any) => {
            Some(WatchEvent::Created(path.to_path_buf()))
        }
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
            Some(WatchEvent::Modified(path.to_path_buf()))
        }
        // Atomic saves rename a temp file over the document; only the
        // destination side of the rename still exists.
        EventKind::Modify(ModifyKind::Name(_)) if path.is_file() => {
            Some(WatchEvent::Created(path.to_path_buf()))
        }
        EventKind::Remove(RemoveKind::File | RemoveKind::Any) => {
            Some(WatchEvent::Removed(path.to_path_buf()))
        }
        _ => None,
    }
}

/// Returns `true` if any component of `path` below `root` starts with a dot.
fn is_hidden(root: &Path, path: &Path) -> bool {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative.components().any(|component| match component {
        Component::Normal(name) => name.to_str().is_some_and(|s| s.starts_with('.')),
        _ => false,
    })
}

/// Lists every recognized document under `root`, sorted by path.
///
/// Hidden directories are skipped, as are directories that cannot be read.
///
/// # Errors
///
/// Returns an error if `root` does not exist or cannot be read.
pub fn scan_documents(root: &Path, naming: &CompanionNaming) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(WatcherError::DirectoryNotFound(root.to_path_buf()));
    }

    let mut documents = Vec::new();
    scan_directory_recursive(root, root, naming, &mut documents)?;
    documents.sort();

    info!(
        root = %root.display(),
        document_count = documents.len(),
        "Scanned existing documents"
    );

    Ok(documents)
}

fn scan_directory_recursive(
    root: &Path,
    dir: &Path,
    naming: &CompanionNaming,
    documents: &mut Vec<PathBuf>,
) -> Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && dir != root => {
            warn!(dir = %dir.display(), "Permission denied, skipping directory");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if is_hidden(root, &path) {
            continue;
        }

        if path.is_dir() {
            scan_directory_recursive(root, &path, naming, documents)?;
        } else if naming.role(&path).is_some() {
            debug!(path = %path.display(), "Found task document");
            documents.push(path);
        }
    }

    Ok(())
}
