//! Utility modules for the Donefile daemon.
//!
//! # Modules
//!
//! - [`debounce`]: Coalescing of rapid change notifications per document

pub mod debounce;

pub use debounce::{Debouncer, DebouncerError, DEFAULT_DEBOUNCE_MS};
