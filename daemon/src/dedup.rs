//! Duplicate detection against a destination document.
//!
//! Texts are compared after stripping the checkbox marker and any completion
//! annotation, so `Buy milk ✅ 2024-01-10` and `Buy milk ✅ 2024-02-01` are the
//! same task.

use std::collections::HashSet;

use crate::annotation::remove_annotation;
use crate::line::classify;

/// Set of normalized task texts already present in a document.
#[derive(Debug, Clone, Default)]
pub struct DedupIndex {
    texts: HashSet<String>,
}

impl DedupIndex {
    /// Indexes every checked and unchecked task in `content`.
    #[must_use]
    pub fn from_content(content: &str) -> Self {
        let texts = content
            .split('\n')
            .filter_map(|line| classify(line).text().map(remove_annotation))
            .collect();
        Self { texts }
    }

    /// Returns `true` if a task with the same normalized text is indexed.
    #[must_use]
    pub fn is_duplicate(&self, candidate: &str) -> bool {
        self.texts.contains(&remove_annotation(candidate))
    }

    /// Indexes `text`. Returns `false` if it was already present.
    pub fn insert(&mut self, text: &str) -> bool {
        self.texts.insert(remove_annotation(text))
    }

    /// Number of distinct normalized texts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    /// Returns `true` if nothing is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}
