//! Checklist line classification.
//!
//! Only two line shapes are tasks, after trimming surrounding whitespace:
//!
//! ```text
//! - [ ] Call Bob
//! - [x] Buy milk ✅ 2024-01-15
//! ```
//!
//! Everything else (headings, prose, blank lines, other bullet styles) is
//! [`LineKind::NotATask`] and is passed through untouched by the rest of the
//! pipeline.
//!
//! # Example
//!
//! ```
//! use donefile_daemon::line::{classify, LineKind};
//!
//! assert_eq!(classify("  - [x] Buy milk "), LineKind::Checked("Buy milk".to_string()));
//! assert_eq!(classify("# Groceries"), LineKind::NotATask);
//! ```

use crate::annotation::split_annotation;

/// Marker prefix of a checked task line.
pub const CHECKED_MARKER: &str = "- [x]";

/// Marker prefix of an unchecked task line.
pub const UNCHECKED_MARKER: &str = "- [ ]";

/// Classification of a single line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    /// Anything that is not a checklist item.
    NotATask,
    /// `- [x] <text>`; carries the trimmed text after the marker.
    Checked(String),
    /// `- [ ] <text>`; carries the trimmed text after the marker.
    Unchecked(String),
}

impl LineKind {
    /// Returns the task text, if this line is a task.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::NotATask => None,
            Self::Checked(text) | Self::Unchecked(text) => Some(text),
        }
    }

    /// Returns `true` for checked tasks.
    #[must_use]
    pub fn is_checked(&self) -> bool {
        matches!(self, Self::Checked(_))
    }
}

/// A task extracted from one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Task text without the checkbox marker and without a completion annotation.
    pub text: String,
    /// Checkbox state.
    pub checked: bool,
    /// Raw `YYYY-MM-DD` date of the completion annotation, if present.
    pub annotation_date: Option<String>,
}

impl Task {
    /// Parses a line into a task, separating any completion annotation.
    ///
    /// Returns `None` for lines that are not tasks.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let kind = classify(line);
        let checked = kind.is_checked();
        let raw = kind.text()?;
        let (body, date) = split_annotation(raw);

        Some(Self {
            text: body.to_string(),
            checked,
            annotation_date: date.map(str::to_string),
        })
    }
}

/// Classifies one line of a document.
#[must_use]
pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();

    if let Some(rest) = trimmed.strip_prefix(CHECKED_MARKER) {
        LineKind::Checked(rest.trim().to_string())
    } else if let Some(rest) = trimmed.strip_prefix(UNCHECKED_MARKER) {
        LineKind::Unchecked(rest.trim().to_string())
    } else {
        LineKind::NotATask
    }
}

/// Renders a task line with the given checkbox state.
#[must_use]
pub fn format_task(checked: bool, text: &str) -> String {
    let marker = if checked {
        CHECKED_MARKER
    } else {
        UNCHECKED_MARKER
    };
    format!("{marker} {text}")
}
