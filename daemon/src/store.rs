//! Document storage used by the migration engine.
//!
//! The engine only needs a handful of operations on named documents, captured
//! by [`DocumentStore`]. Two implementations are provided:
//!
//! - [`FsStore`]: documents are files, accessed through `tokio::fs`.
//! - [`MemoryStore`]: documents live in a map. Every successful write or
//!   create is reported on an optional notification channel, mirroring the
//!   change notifications a file watcher produces for real files.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors reported by a [`DocumentStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    /// The document does not exist.
    #[error("document not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A document was to be created but already exists.
    #[error("document already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The underlying storage failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// Document the operation was on.
        path: PathBuf,
        /// Underlying failure.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    fn from_io(path: &Path, source: std::io::Error) -> Self {
        match source.kind() {
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Minimal document storage contract.
pub trait DocumentStore: Send + Sync {
    /// Reads a document. Fails with [`StoreError::NotFound`] if it is absent.
    fn read(&self, path: &Path) -> impl Future<Output = StoreResult<String>> + Send;

    /// Replaces a document's content.
    fn write(&self, path: &Path, content: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Creates a new document. Fails with [`StoreError::AlreadyExists`] if present.
    fn create(&self, path: &Path, initial: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Returns `true` if the document exists.
    fn exists(&self, path: &Path) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Creates the document with `initial` content unless it already exists.
    ///
    /// Returns `true` if the document was created by this call.
    fn ensure_exists(
        &self,
        path: &Path,
        initial: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send {
        async move {
            if self.exists(path).await? {
                return Ok(false);
            }
            match self.create(path, initial).await {
                Ok(()) => Ok(true),
                // Lost a race with another creator; the document is there either way.
                Err(StoreError::AlreadyExists(_)) => Ok(false),
                Err(e) => Err(e),
            }
        }
    }
}

/// File system backed store.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStore;

impl FsStore {
    /// Creates a file system store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DocumentStore for FsStore {
    async fn read(&self, path: &Path) -> StoreResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn write(&self, path: &Path, content: &str) -> StoreResult<()> {
        trace!(path = %path.display(), bytes = content.len(), "Writing document");
        tokio::fs::write(path, content)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }

    async fn create(&self, path: &Path, initial: &str) -> StoreResult<()> {
        debug!(path = %path.display(), "Creating document");
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))?;

        file.write_all(initial.as_bytes())
            .await
            .map_err(|e| StoreError::from_io(path, e))?;
        file.flush().await.map_err(|e| StoreError::from_io(path, e))
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| StoreError::from_io(path, e))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: HashMap<PathBuf, String>,
    failing: HashSet<PathBuf>,
}

/// In-memory store with optional change notifications.
///
/// Clones share the same documents, so a test can hand one clone to the
/// engine and inspect the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
    notify: Option<mpsc::UnboundedSender<PathBuf>>,
}

impl MemoryStore {
    /// Creates an empty store without notifications.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that reports every modified path on the returned receiver.
    #[must_use]
    pub fn with_notifications() -> (Self, mpsc::UnboundedReceiver<PathBuf>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Self {
            state: Arc::default(),
            notify: Some(tx),
        };
        (store, rx)
    }

    /// Seeds a document without emitting a notification.
    pub fn insert(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.lock().documents.insert(path.into(), content.into());
    }

    /// Returns a document's current content.
    #[must_use]
    pub fn get(&self, path: impl AsRef<Path>) -> Option<String> {
        self.lock().documents.get(path.as_ref()).cloned()
    }

    /// Makes every subsequent write or create of `path` fail with an I/O error.
    pub fn fail_writes_to(&self, path: impl Into<PathBuf>) {
        self.lock().failing.insert(path.into());
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_writable(state: &MemoryState, path: &Path) -> StoreResult<()> {
        if state.failing.contains(path) {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(ErrorKind::Other, "injected write failure"),
            });
        }
        Ok(())
    }

    fn notify_modified(&self, path: &Path) {
        if let Some(tx) = &self.notify {
            // A dropped receiver just means nobody is listening any more.
            let _ = tx.send(path.to_path_buf());
        }
    }
}

impl DocumentStore for MemoryStore {
    async fn read(&self, path: &Path) -> StoreResult<String> {
        self.get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Path, content: &str) -> StoreResult<()> {
        {
            let mut state = self.lock();
            Self::check_writable(&state, path)?;
            state
                .documents
                .insert(path.to_path_buf(), content.to_string());
        }
        self.notify_modified(path);
        Ok(())
    }

    async fn create(&self, path: &Path, initial: &str) -> StoreResult<()> {
        {
            let mut state = self.lock();
            Self::check_writable(&state, path)?;
            if state.documents.contains_key(path) {
                return Err(StoreError::AlreadyExists(path.to_path_buf()));
            }
            state
                .documents
                .insert(path.to_path_buf(), initial.to_string());
        }
        self.notify_modified(path);
        Ok(())
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        Ok(self.lock().documents.contains_key(path))
    }
}
