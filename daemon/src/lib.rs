//! Donefile daemon - keeps checklists and their ` - Done` companions in sync.
//!
//! This crate watches a tree of plain-text task documents. When a task is
//! checked in `X.md` it moves to the companion `X - Done.md`, stamped with the
//! completion date. When a task is unchecked in the companion it moves back to
//! `X.md` with the stamp removed.
//!
//! # Overview
//!
//! A checklist line is `- [ ] text` (open) or `- [x] text` (done). Every other
//! line is left alone. Completed tasks carry a trailing `✅ YYYY-MM-DD`.
//!
//! The file watcher reports changed documents, the debouncer coalesces bursts
//! of events, and the [`MigrationEngine`] moves tasks across the pair. A
//! per-pair lease keeps the engine's own writes from re-triggering it.
//!
//! # Modules
//!
//! - [`line`]: Checklist line classification
//! - [`annotation`]: Completion-date stamps and the clock they come from
//! - [`companion`]: `X.md` / `X - Done.md` naming
//! - [`collector`]: Picks the tasks leaving a document
//! - [`dedup`]: Suppresses tasks the destination already holds
//! - [`guard`]: Per-pair reentrancy leases
//! - [`store`]: Document storage (file system and in-memory)
//! - [`engine`]: The migration pass
//! - [`watcher`]: File system watcher for task documents
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types for sync operations
//! - [`utils`]: Shared utilities (debouncing)

pub mod annotation;
pub mod collector;
pub mod companion;
pub mod config;
pub mod dedup;
pub mod engine;
pub mod error;
pub mod guard;
pub mod line;
pub mod store;
pub mod utils;
pub mod watcher;

pub use annotation::{AnnotationCodec, Clock, FixedClock, SystemClock};
pub use companion::{CompanionNaming, DocumentRole};
pub use config::{Config, ConfigError};
pub use engine::{MigrationEngine, MigrationOutcome, MigrationReport, OverlapPolicy, SkipReason};
pub use error::{Result, SyncError};
pub use store::{DocumentStore, FsStore, MemoryStore, StoreError};
pub use utils::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
pub use watcher::{scan_documents, DocumentWatcher, WatchEvent, WatcherError};
