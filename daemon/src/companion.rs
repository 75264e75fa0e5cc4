//! Pairing between a task list and its ` - Done` companion.
//!
//! The relationship is derived purely from file names:
//!
//! ```text
//! notes/Groceries.md         <->  notes/Groceries - Done.md
//! ```
//!
//! Only files with the recognized extension take part. A file whose stem
//! already ends in ` - Done` is always a companion and never gets a companion
//! of its own, so `Groceries - Done - Done.md` belongs to neither role.
//!
//! # Example
//!
//! ```
//! use std::path::Path;
//! use donefile_daemon::companion::{CompanionNaming, DocumentRole};
//!
//! let naming = CompanionNaming::new("md");
//! let done = naming.companion_path(Path::new("notes/Groceries.md")).unwrap();
//!
//! assert_eq!(done, Path::new("notes/Groceries - Done.md"));
//! assert_eq!(naming.role(&done), Some(DocumentRole::Companion));
//! assert_eq!(naming.source_path(&done).unwrap(), Path::new("notes/Groceries.md"));
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Suffix inserted before the extension to form a companion name.
pub const COMPANION_SUFFIX: &str = " - Done";

/// Default recognized document extension.
pub const DEFAULT_EXTENSION: &str = "md";

/// Which side of a pair a document is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    /// Holds active tasks.
    Source,
    /// Holds completed tasks (` - Done`).
    Companion,
}

/// Naming convention for a given document extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanionNaming {
    extension: String,
}

impl Default for CompanionNaming {
    fn default() -> Self {
        Self::new(DEFAULT_EXTENSION)
    }
}

impl CompanionNaming {
    /// Creates a naming convention for `extension` (without the leading dot).
    #[must_use]
    pub fn new(extension: impl Into<String>) -> Self {
        let extension = extension.into();
        Self {
            extension: extension.trim_start_matches('.').to_string(),
        }
    }

    /// The recognized extension, without the leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns `true` if `path` has the recognized extension.
    #[must_use]
    pub fn is_recognized(&self, path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext == self.extension.as_str())
    }

    /// Classifies a path, or returns `None` if it takes no part in pairing.
    #[must_use]
    pub fn role(&self, path: &Path) -> Option<DocumentRole> {
        if !self.is_recognized(path) {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;

        match stem.strip_suffix(COMPANION_SUFFIX) {
            None if stem.is_empty() => None,
            None => Some(DocumentRole::Source),
            Some(base) if base.is_empty() || base.ends_with(COMPANION_SUFFIX) => None,
            Some(_) => Some(DocumentRole::Companion),
        }
    }

    /// Forward transform: `X.ext` to `X - Done.ext`.
    #[must_use]
    pub fn companion_path(&self, source: &Path) -> Option<PathBuf> {
        if self.role(source)? != DocumentRole::Source {
            return None;
        }
        let stem = source.file_stem()?.to_str()?;
        Some(source.with_file_name(format!(
            "{stem}{COMPANION_SUFFIX}.{}",
            self.extension
        )))
    }

    /// Inverse transform: `X - Done.ext` to `X.ext`.
    #[must_use]
    pub fn source_path(&self, companion: &Path) -> Option<PathBuf> {
        if self.role(companion)? != DocumentRole::Companion {
            return None;
        }
        let stem = companion.file_stem()?.to_str()?;
        let base = stem.strip_suffix(COMPANION_SUFFIX)?;
        Some(companion.with_file_name(format!("{base}.{}", self.extension)))
    }

    /// Returns the role of `path` and the path of the other side of its pair.
    #[must_use]
    pub fn counterpart(&self, path: &Path) -> Option<(DocumentRole, PathBuf)> {
        match self.role(path)? {
            DocumentRole::Source => Some((DocumentRole::Source, self.companion_path(path)?)),
            DocumentRole::Companion => Some((DocumentRole::Companion, self.source_path(path)?)),
        }
    }

    /// Key shared by both documents of a pair (the source path).
    #[must_use]
    pub fn pair_key(&self, path: &Path) -> Option<PathBuf> {
        match self.role(path)? {
            DocumentRole::Source => Some(path.to_path_buf()),
            DocumentRole::Companion => self.source_path(path),
        }
    }
}
