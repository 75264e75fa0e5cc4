//! Migration engine: moves tasks between a document and its companion.
//!
//! One call to [`MigrationEngine::handle_change`] handles one change
//! notification:
//!
//! 1. Ignore documents that take no part in pairing, and pairs already being
//!    migrated (see [`crate::guard`]).
//! 2. Read the triggering document and collect the tasks leaving it.
//! 3. Make sure the destination exists before anything is modified.
//! 4. Annotate (to the companion) or de-annotate (back to the source), and
//!    drop tasks the destination already has.
//! 5. Stage both new contents, then write the destination followed by the
//!    triggering document.
//!
//! An error returned before step 5 leaves both documents untouched. A failure
//! between the two writes leaves the tasks in both documents; the next pass
//! removes them from the triggering document and deduplication keeps the
//! destination from growing a second copy. Tasks are never dropped from both.
//!
//! Timeouts are weaker: a storage call that times out is abandoned, not
//! cancelled, so its write may still land after the pass has been reported
//! as failed. The late write is one of the two staged contents, which leaves
//! the pair in one of the states above for the next pass to reconcile.
//!
//! Errors never escape `handle_change`: they are logged and reported as
//! [`MigrationOutcome::Failed`].

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::annotation::{remove_annotation, AnnotationCodec, Clock, SystemClock};
use crate::collector::{collect, Direction};
use crate::companion::CompanionNaming;
use crate::dedup::DedupIndex;
use crate::error::{Result, SyncError};
use crate::guard::InFlight;
use crate::line::format_task;
use crate::store::{DocumentStore, StoreResult};

/// Default bound on a single storage call.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// What to do with a notification for a pair that is already being migrated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Ignore it. An edit landing inside the window is picked up by the next
    /// notification for that pair.
    #[default]
    Drop,
    /// Remember it and scan both documents of the pair once more before
    /// releasing. At most one rescan is queued per pair.
    Rescan,
}

impl FromStr for OverlapPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "rescan" => Ok(Self::Rescan),
            other => Err(format!("expected 'drop' or 'rescan', got '{other}'")),
        }
    }
}

impl fmt::Display for OverlapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drop => write!(f, "drop"),
            Self::Rescan => write!(f, "rescan"),
        }
    }
}

/// Why a notification was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Wrong extension or a chained companion name.
    Unrecognized,
    /// The document's pair is already being migrated.
    InFlight,
}

/// Summary of one migration pass that found tasks to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Document whose change triggered the pass.
    pub trigger: PathBuf,
    /// Document the tasks moved to.
    pub destination: PathBuf,
    /// Direction of the move.
    pub direction: Direction,
    /// Tasks removed from the triggering document.
    pub collected: usize,
    /// Tasks added to the destination.
    pub inserted: usize,
    /// Tasks the destination already had.
    pub duplicates: usize,
    /// Whether the destination had to be created.
    pub destination_created: bool,
    /// Whether the destination content changed.
    pub destination_written: bool,
    /// Whether the triggering document content changed.
    pub trigger_written: bool,
}

/// Result of handling one change notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MigrationOutcome {
    /// The notification was ignored.
    Skipped {
        /// Notified path.
        path: PathBuf,
        /// Why it was ignored.
        reason: SkipReason,
    },
    /// The document had nothing to migrate.
    NoChanges {
        /// Notified path.
        path: PathBuf,
    },
    /// Tasks were migrated.
    Migrated(MigrationReport),
    /// The pass failed; see the log for details.
    Failed {
        /// Notified path.
        path: PathBuf,
        /// Error message.
        error: String,
    },
}

impl MigrationOutcome {
    /// Returns `true` for [`MigrationOutcome::Failed`].
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Returns the report if tasks were migrated.
    #[must_use]
    pub fn report(&self) -> Option<&MigrationReport> {
        match self {
            Self::Migrated(report) => Some(report),
            _ => None,
        }
    }
}

/// Synchronizes task documents with their companions.
///
/// The engine is shared across tasks (`Arc<MigrationEngine<..>>`); passes for
/// different pairs run concurrently, passes for the same pair never overlap.
#[derive(Debug)]
pub struct MigrationEngine<S, C = SystemClock> {
    store: S,
    codec: AnnotationCodec<C>,
    naming: CompanionNaming,
    in_flight: InFlight,
    io_timeout: Duration,
    overlap: OverlapPolicy,
}

impl<S: DocumentStore, C: Clock> MigrationEngine<S, C> {
    /// Creates an engine over `store`, stamping completions with `clock`.
    #[must_use]
    pub fn new(store: S, clock: C, naming: CompanionNaming) -> Self {
        Self {
            store,
            codec: AnnotationCodec::new(clock),
            naming,
            in_flight: InFlight::new(),
            io_timeout: DEFAULT_IO_TIMEOUT,
            overlap: OverlapPolicy::default(),
        }
    }

    /// Bounds every storage call by `timeout`.
    #[must_use]
    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the policy for notifications arriving while a pair is busy.
    #[must_use]
    pub fn with_overlap_policy(mut self, overlap: OverlapPolicy) -> Self {
        self.overlap = overlap;
        self
    }

    /// The naming convention in use.
    #[must_use]
    pub fn naming(&self) -> &CompanionNaming {
        &self.naming
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Registry of pairs currently being migrated.
    #[must_use]
    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Handles a change notification for `path`.
    pub async fn handle_change(&self, path: &Path) -> MigrationOutcome {
        let Some(key) = self.naming.pair_key(path) else {
            trace!(path = %path.display(), "Ignoring non-task document");
            return MigrationOutcome::Skipped {
                path: path.to_path_buf(),
                reason: SkipReason::Unrecognized,
            };
        };

        let Some(lease) = self.in_flight.try_acquire(&key) else {
            if self.overlap == OverlapPolicy::Rescan {
                self.in_flight.mark_pending(&key);
            }
            debug!(
                path = %path.display(),
                policy = %self.overlap,
                "Pair already being migrated, skipping notification"
            );
            return MigrationOutcome::Skipped {
                path: path.to_path_buf(),
                reason: SkipReason::InFlight,
            };
        };

        let outcome = self.run_pass(path).await;

        while self.overlap == OverlapPolicy::Rescan && lease.take_pending() {
            debug!(key = %key.display(), "Rescanning pair after overlapping notification");
            self.run_pass(&key).await;
            if let Some(companion) = self.naming.companion_path(&key) {
                self.run_pass(&companion).await;
            }
        }

        drop(lease);
        outcome
    }

    /// Handles `paths` one after another.
    ///
    /// Both documents of a pair often appear in one listing. Running them
    /// sequentially means neither finds the pair held by the other.
    pub async fn sweep(&self, paths: &[PathBuf]) -> Vec<MigrationOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            outcomes.push(self.handle_change(path).await);
        }
        outcomes
    }

    /// Runs one pass and turns errors into a logged outcome.
    async fn run_pass(&self, path: &Path) -> MigrationOutcome {
        match self.migrate(path).await {
            Ok(Some(report)) => MigrationOutcome::Migrated(report),
            Ok(None) => MigrationOutcome::NoChanges {
                path: path.to_path_buf(),
            },
            Err(e) => {
                error!(path = %path.display(), error = %e, "Task migration failed");
                MigrationOutcome::Failed {
                    path: path.to_path_buf(),
                    error: e.to_string(),
                }
            }
        }
    }

    /// Migrates the tasks leaving `path`. Returns `None` if there were none.
    async fn migrate(&self, path: &Path) -> Result<Option<MigrationReport>> {
        let (role, destination) = self
            .naming
            .counterpart(path)
            .ok_or_else(|| SyncError::Unrecognized(path.to_path_buf()))?;

        let content = self.bounded(self.store.read(path)).await?;
        let lines: Vec<&str> = content.split('\n').collect();
        let batch = collect(&lines, role);

        if batch.is_empty() {
            trace!(path = %path.display(), "No tasks to migrate");
            return Ok(None);
        }

        let direction = Direction::from_role(role);
        debug!(
            path = %path.display(),
            destination = %destination.display(),
            direction = ?direction,
            count = batch.len(),
            "Collected tasks to migrate"
        );

        // Destination must exist before the triggering document is touched.
        let destination_created = self
            .bounded(self.store.ensure_exists(&destination, ""))
            .await?;
        if destination_created {
            info!(path = %destination.display(), "Created destination document");
        }
        let existing = self.bounded(self.store.read(&destination)).await?;

        let mut index = DedupIndex::from_content(&existing);
        let mut incoming = Vec::with_capacity(batch.len());
        let mut duplicates = 0;

        for task in &batch {
            let text = match direction {
                Direction::ToCompanion => self.codec.add_annotation(&task.text),
                Direction::ToSource => remove_annotation(&task.text),
            };
            if index.insert(&text) {
                incoming.push(format_task(direction.destination_checked(), &text));
            } else {
                debug!(task = %text, destination = %destination.display(), "Skipping duplicate task");
                duplicates += 1;
            }
        }

        // Prepended lines follow the destination's line endings, or the
        // trigger's when the destination has none yet.
        let newline = line_ending(&existing)
            .or_else(|| line_ending(&content))
            .unwrap_or("\n");
        let new_destination = if incoming.is_empty() {
            existing.clone()
        } else {
            format!("{}{newline}{existing}", incoming.join(newline))
        };

        let moved: HashSet<usize> = batch.iter().map(|task| task.line_index).collect();
        let new_trigger = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| !moved.contains(i))
            .map(|(_, line)| *line)
            .collect::<Vec<_>>()
            .join("\n");

        let destination_written = new_destination != existing;
        if destination_written {
            self.bounded(self.store.write(&destination, &new_destination))
                .await?;
        }

        let trigger_written = new_trigger != content;
        if trigger_written {
            self.bounded(self.store.write(path, &new_trigger)).await?;
        }

        let report = MigrationReport {
            trigger: path.to_path_buf(),
            destination,
            direction,
            collected: batch.len(),
            inserted: incoming.len(),
            duplicates,
            destination_created,
            destination_written,
            trigger_written,
        };

        info!(
            trigger = %report.trigger.display(),
            destination = %report.destination.display(),
            moved = report.inserted,
            duplicates = report.duplicates,
            "Migrated tasks"
        );

        Ok(Some(report))
    }

    /// Applies the I/O timeout to one storage call.
    ///
    /// On timeout the call is dropped without waiting. A blocking write the
    /// store already handed to another thread keeps running and may still
    /// complete.
    async fn bounded<T>(&self, call: impl Future<Output = StoreResult<T>>) -> Result<T> {
        match tokio::time::timeout(self.io_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(SyncError::Timeout(self.io_timeout)),
        }
    }
}

/// Line ending used by `text`, if it has any line break.
fn line_ending(text: &str) -> Option<&'static str> {
    let at = text.find('\n')?;
    if text[..at].ends_with('\r') {
        Some("\r\n")
    } else {
        Some("\n")
    }
}
