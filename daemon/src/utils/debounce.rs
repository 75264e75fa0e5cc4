//! Debounce utility for coalescing rapid change notifications.
//!
//! Saving a document usually produces a burst of file system events (truncate,
//! write, metadata update), and editors with autosave keep saving while the
//! user types. The debouncer holds each key until no new event for it has
//! arrived for the configured interval, then emits the key once.
//!
//! # Architecture
//!
//! A background task owns a map from key to deadline. Every incoming key
//! pushes its deadline out by the interval; keys whose deadline has passed are
//! emitted on the output channel and forgotten. Closing the input (dropping
//! the [`Debouncer`]) flushes everything still pending.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use donefile_daemon::utils::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(100);
//!     let debouncer = Debouncer::new(Duration::from_millis(100), output_tx);
//!
//!     let path = PathBuf::from("/vault/Groceries.md");
//!     debouncer.send(path.clone()).await.unwrap();
//!     debouncer.send(path.clone()).await.unwrap();
//!
//!     // Emitted once, 100ms after the last send.
//!     assert_eq!(output_rx.recv().await, Some(path));
//! }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

/// Capacity of the channel feeding the background task.
const INPUT_CAPACITY: usize = 1000;

/// Error type for debouncer operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DebouncerError {
    /// The debouncer's background task has stopped.
    #[error("debouncer channel closed")]
    ChannelClosed,
}

/// Coalesces repeated keys arriving within an interval into one emission.
#[derive(Debug)]
pub struct Debouncer<K>
where
    K: Clone + Eq + Hash + Send + 'static,
{
    input_tx: mpsc::Sender<K>,
    interval: Duration,
}

impl<K> Debouncer<K>
where
    K: Clone + Eq + Hash + Send + Debug + 'static,
{
    /// Creates a debouncer emitting on `output_tx` and starts its background task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<K>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);

        tokio::spawn(run_debounce_loop(interval, input_rx, output_tx));

        Self { input_tx, interval }
    }

    /// Creates a debouncer with the default interval (100ms).
    #[must_use]
    pub fn with_default_interval(output_tx: mpsc::Sender<K>) -> Self {
        Self::new(Duration::from_millis(DEFAULT_DEBOUNCE_MS), output_tx)
    }

    /// The quiet period a key must observe before it is emitted.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Queues `key`, restarting its quiet period if it is already pending.
    ///
    /// # Errors
    ///
    /// Returns [`DebouncerError::ChannelClosed`] if the background task has
    /// terminated.
    pub async fn send(&self, key: K) -> Result<(), DebouncerError> {
        self.input_tx
            .send(key)
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }

    /// Queues `key` without waiting for channel capacity.
    ///
    /// Returns `false` if the input channel is full or closed.
    pub fn try_send(&self, key: K) -> bool {
        self.input_tx.try_send(key).is_ok()
    }
}

async fn run_debounce_loop<K>(
    interval: Duration,
    mut input_rx: mpsc::Receiver<K>,
    output_tx: mpsc::Sender<K>,
) where
    K: Clone + Eq + Hash + Debug,
{
    let mut deadlines: HashMap<K, Instant> = HashMap::new();

    debug!(interval_ms = interval.as_millis(), "Starting debounce loop");

    loop {
        let next_deadline = deadlines.values().min().copied();

        tokio::select! {
            received = input_rx.recv() => {
                match received {
                    Some(key) => {
                        trace!(key = ?key, "Key received, deadline reset");
                        deadlines.insert(key, Instant::now() + interval);
                    }
                    None => {
                        debug!(pending = deadlines.len(), "Input closed, flushing pending keys");
                        for (key, _) in deadlines.drain() {
                            emit(&output_tx, key).await;
                        }
                        break;
                    }
                }
            }

            () = sleep_until_or_forever(next_deadline) => {
                let now = Instant::now();
                let due: Vec<K> = deadlines
                    .iter()
                    .filter(|(_, deadline)| **deadline <= now)
                    .map(|(key, _)| key.clone())
                    .collect();

                for key in due {
                    deadlines.remove(&key);
                    emit(&output_tx, key).await;
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}

/// Sleeps until `deadline`, or never returns when nothing is pending.
async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn emit<K: Debug>(output_tx: &mpsc::Sender<K>, key: K) {
    trace!(key = ?key, "Emitting debounced key");
    if let Err(e) = output_tx.send(key).await {
        warn!(key = ?e.0, "Failed to emit debounced key, receiver dropped");
    }
}
