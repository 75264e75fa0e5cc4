//! Completion annotations on task text.
//!
//! A completed task carries a trailing marker and the local date it was
//! completed on:
//!
//! ```text
//! Buy milk ✅ 2024-01-15
//! ```
//!
//! Adding an annotation first strips any existing one, so re-completing a
//! task never stacks markers. Removing is permissive: any trailing
//! `<ws>✅<ws>DDDD-DD-DD` run is treated as an annotation, without checking
//! that the date exists on a calendar.
//!
//! # Example
//!
//! ```
//! use chrono::NaiveDate;
//! use donefile_daemon::annotation::{remove_annotation, AnnotationCodec, FixedClock};
//!
//! let today = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
//! let codec = AnnotationCodec::new(FixedClock::new(today));
//!
//! let annotated = codec.add_annotation("Buy milk");
//! assert_eq!(annotated, "Buy milk ✅ 2024-01-15");
//! assert_eq!(remove_annotation(&annotated), "Buy milk");
//! ```

use chrono::{Local, NaiveDate};

/// Completion marker placed between the task text and the date.
pub const COMPLETION_MARKER: char = '✅';

/// Length of a `YYYY-MM-DD` date in bytes.
const DATE_LEN: usize = 10;

/// Source of "today" for completion annotations.
pub trait Clock: Send + Sync {
    /// Returns the current local calendar date.
    fn today(&self) -> NaiveDate;
}

/// Clock backed by the system's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// Clock that always reports the same date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(NaiveDate);

impl FixedClock {
    /// Creates a clock pinned to `date`.
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Adds completion annotations using an injected [`Clock`].
#[derive(Debug, Clone)]
pub struct AnnotationCodec<C> {
    clock: C,
}

impl<C: Clock> AnnotationCodec<C> {
    /// Creates a codec reading dates from `clock`.
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    /// Returns `text` with any existing annotation replaced by today's.
    #[must_use]
    pub fn add_annotation(&self, text: &str) -> String {
        let body = remove_annotation(text);
        let date = self.clock.today().format("%Y-%m-%d");
        format!("{body} {COMPLETION_MARKER} {date}")
    }
}

/// Strips every trailing completion annotation from `text` and trims it.
///
/// Text without an annotation is returned trimmed but otherwise unchanged.
#[must_use]
pub fn remove_annotation(text: &str) -> String {
    split_annotation(text).0.to_string()
}

/// Splits `text` into its body and the date of its trailing annotation.
///
/// Trailing whitespace is ignored. When several annotations are stacked, all
/// are stripped and the outermost (last) date is returned.
#[must_use]
pub fn split_annotation(text: &str) -> (&str, Option<&str>) {
    let mut body = text.trim_end();
    let mut date = None;

    while let Some((rest, found)) = strip_one(body) {
        body = rest;
        date.get_or_insert(found);
    }

    (body.trim(), date)
}

/// Strips a single `<ws>✅<ws>DDDD-DD-DD` suffix anchored at the end of `text`.
fn strip_one(text: &str) -> Option<(&str, &str)> {
    let split = text.len().checked_sub(DATE_LEN)?;
    let date_bytes = &text.as_bytes()[split..];
    if !is_date_shape(date_bytes) {
        return None;
    }
    // All ten bytes are ASCII, so `split` is a char boundary.
    let (rest, date) = text.split_at(split);

    let rest = strip_required_whitespace(rest)?;
    let rest = rest.strip_suffix(COMPLETION_MARKER)?;
    let rest = strip_required_whitespace(rest)?;

    Some((rest, date))
}

/// Trims trailing whitespace, failing if there was none.
fn strip_required_whitespace(text: &str) -> Option<&str> {
    let trimmed = text.trim_end();
    (trimmed.len() < text.len()).then_some(trimmed)
}

fn is_date_shape(bytes: &[u8]) -> bool {
    bytes.len() == DATE_LEN
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        })
}
