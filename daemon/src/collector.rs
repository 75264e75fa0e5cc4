//! Collects the tasks of one document read that need to migrate.

use serde::Serialize;

use crate::companion::DocumentRole;
use crate::line::{classify, LineKind};

/// Where a collected task is headed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Checked task leaving a source document for its companion.
    ToCompanion,
    /// Unchecked task leaving a companion for its source document.
    ToSource,
}

impl Direction {
    /// Direction of tasks migrating out of a document with `role`.
    #[must_use]
    pub fn from_role(role: DocumentRole) -> Self {
        match role {
            DocumentRole::Source => Self::ToCompanion,
            DocumentRole::Companion => Self::ToSource,
        }
    }

    /// Checkbox state the task gets in its destination.
    #[must_use]
    pub fn destination_checked(self) -> bool {
        matches!(self, Self::ToCompanion)
    }
}

/// A task picked up from a document, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedTask {
    /// Zero-based index of the line the task came from.
    pub line_index: usize,
    /// Task text after the checkbox marker, as written (annotation included).
    pub text: String,
    /// Where the task is headed.
    pub direction: Direction,
}

/// Returns the tasks in `lines` that migrate out of a document with `role`.
///
/// Source documents yield their checked tasks, companions their unchecked
/// ones.
///
/// A bare marker such as `- [x]` stays where it is, in either direction. It
/// has no text to stamp or to match against the destination, so every move
/// would append another indistinguishable blank entry. Treat it as a task
/// still being typed.
#[must_use]
pub fn collect<S: AsRef<str>>(lines: &[S], role: DocumentRole) -> Vec<CollectedTask> {
    let direction = Direction::from_role(role);

    lines
        .iter()
        .enumerate()
        .filter_map(|(line_index, line)| {
            let text = match (classify(line.as_ref()), role) {
                (LineKind::Checked(text), DocumentRole::Source) => text,
                (LineKind::Unchecked(text), DocumentRole::Companion) => text,
                _ => return None,
            };
            if text.is_empty() {
                return None;
            }
            Some(CollectedTask {
                line_index,
                text,
                direction,
            })
        })
        .collect()
}
