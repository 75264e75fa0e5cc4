//! Reentrancy guard for the migration engine.
//!
//! Each document pair (keyed by its source path) can be held by at most one
//! migration at a time. The engine's own writes fire change notifications for
//! both documents of the pair; while the lease is held those notifications
//! find the pair busy and are not processed.
//!
//! A [`Lease`] releases its pair when dropped, so every exit path of a
//! migration (early return, `?`, panic unwinding) frees the pair.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use donefile_daemon::guard::InFlight;
//!
//! let in_flight = InFlight::new();
//! let lease = in_flight.try_acquire(Path::new("Groceries.md")).unwrap();
//!
//! assert!(in_flight.try_acquire(Path::new("Groceries.md")).is_none());
//! drop(lease);
//! assert!(in_flight.try_acquire(Path::new("Groceries.md")).is_some());
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// Held pairs, each with a "rescan requested" flag.
type Registry = Arc<Mutex<HashMap<PathBuf, bool>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<PathBuf, bool>> {
    // The map stays consistent even if a holder panicked mid-update.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Registry of document pairs currently being migrated.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    held: Registry,
}

impl InFlight {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the lease for `key`, or returns `None` if it is already held.
    #[must_use]
    pub fn try_acquire(&self, key: &Path) -> Option<Lease> {
        let mut held = lock(&self.held);
        if held.contains_key(key) {
            return None;
        }
        held.insert(key.to_path_buf(), false);
        trace!(key = %key.display(), "Acquired migration lease");

        Some(Lease {
            key: key.to_path_buf(),
            held: Arc::clone(&self.held),
        })
    }

    /// Records that `key` should be scanned again once its lease is released.
    ///
    /// Returns `false` if the pair is not currently held.
    pub fn mark_pending(&self, key: &Path) -> bool {
        match lock(&self.held).get_mut(key) {
            Some(pending) => {
                *pending = true;
                true
            }
            None => false,
        }
    }

    /// Returns `true` if `key` is currently held.
    #[must_use]
    pub fn is_held(&self, key: &Path) -> bool {
        lock(&self.held).contains_key(key)
    }

    /// Number of pairs currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        lock(&self.held).len()
    }

    /// Returns `true` if no pair is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        lock(&self.held).is_empty()
    }
}

/// Exclusive hold on one document pair. Released on drop.
#[derive(Debug)]
pub struct Lease {
    key: PathBuf,
    held: Registry,
}

impl Lease {
    /// The pair key this lease holds.
    #[must_use]
    pub fn key(&self) -> &Path {
        &self.key
    }

    /// Clears and returns the pair's "rescan requested" flag.
    pub fn take_pending(&self) -> bool {
        lock(&self.held)
            .get_mut(&self.key)
            .map(std::mem::take)
            .unwrap_or(false)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.key);
        trace!(key = %self.key.display(), "Released migration lease");
    }
}
