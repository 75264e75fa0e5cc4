//! Donefile daemon - keeps checklists and their ` - Done` companions in sync.
//!
//! # Commands
//!
//! - `donefile-daemon run`: Watch a vault and migrate tasks as documents change
//! - `donefile-daemon sync <FILE>`: Run one migration pass for a document
//! - `donefile-daemon scan`: Run one pass over every document in a vault
//! - `donefile-daemon companion <FILE>`: Print the other document of a pair
//!
//! # Environment Variables
//!
//! See the `donefile_daemon::config` module for available configuration options.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use donefile_daemon::config::Config;
use donefile_daemon::engine::{MigrationEngine, MigrationOutcome, SkipReason};
use donefile_daemon::store::FsStore;
use donefile_daemon::utils::Debouncer;
use donefile_daemon::watcher::{scan_documents, DocumentWatcher, WatchEvent};
use donefile_daemon::{SyncError, SystemClock};

/// Grace period for in-flight migrations on shutdown.
const SHUTDOWN_TIMEOUT_SECS: u64 = 5;

type Engine = MigrationEngine<FsStore, SystemClock>;

/// Donefile daemon - keeps checklists and their ` - Done` companions in sync.
///
/// Checked tasks move from `X.md` to `X - Done.md` with a completion date;
/// unchecked tasks move back.
#[derive(Parser, Debug)]
#[command(name = "donefile-daemon")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    DONEFILE_VAULT_DIR         Watched directory (default: ~/Documents)
    DONEFILE_EXTENSION         Task document extension (default: md)
    DONEFILE_DEBOUNCE_MS       Quiet period before processing (default: 100)
    DONEFILE_BUFFER_SIZE       Watch event buffer size (default: 1000)
    DONEFILE_IO_TIMEOUT_SECS   Bound on each read or write (default: 10)
    DONEFILE_OVERLAP           'drop' or 'rescan' overlapping edits (default: drop)
    RUST_LOG                   Log filter (default: info)

OPTIONS FOR ALL COMMANDS:
    --json-logs                Structured JSON logs on stderr

EXAMPLES:
    # Watch the default vault
    donefile-daemon run

    # Watch a specific vault, migrating anything already checked first
    donefile-daemon run --vault ~/notes --initial-scan

    # Migrate one document and print the result as JSON
    donefile-daemon sync ~/notes/Groceries.md --json

    # Where do completed tasks of this list go?
    donefile-daemon companion ~/notes/Groceries.md
")]
struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the daemon.
    ///
    /// Watches the vault recursively and migrates tasks whenever a document
    /// changes. Runs until SIGINT or SIGTERM.
    Run {
        /// Directory to watch (overrides DONEFILE_VAULT_DIR).
        #[arg(short, long)]
        vault: Option<PathBuf>,

        /// Process every existing document once before watching.
        #[arg(long)]
        initial_scan: bool,
    },

    /// Run a single migration pass for one document.
    Sync {
        /// A task document or its companion.
        file: PathBuf,

        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run a single migration pass for every document in the vault.
    Scan {
        /// Directory to scan (overrides DONEFILE_VAULT_DIR).
        #[arg(short, long)]
        vault: Option<PathBuf>,
    },

    /// Print the path of the other document of a pair.
    Companion {
        /// A task document or its companion.
        file: PathBuf,
    },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.json_logs);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Run {
            vault,
            initial_scan,
        } => runtime.block_on(run_daemon(vault, initial_scan)),
        Command::Sync { file, json } => runtime.block_on(run_sync(&file, json)),
        Command::Scan { vault } => runtime.block_on(run_scan(vault)),
        Command::Companion { file } => run_companion(&file),
    }
}

/// Loads configuration, applying a `--vault` override.
fn load_config(vault: Option<PathBuf>) -> Result<Config> {
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(vault) = vault {
        config.vault_dir = vault;
    }
    Ok(config)
}

fn build_engine(config: &Config) -> Engine {
    MigrationEngine::new(FsStore::new(), SystemClock, config.naming())
        .with_io_timeout(config.io_timeout)
        .with_overlap_policy(config.overlap)
}

/// Runs the watch daemon.
async fn run_daemon(vault: Option<PathBuf>, initial_scan: bool) -> Result<ExitCode> {
    info!("Starting Donefile daemon");

    let config = load_config(vault)?;

    info!(
        vault_dir = %config.vault_dir.display(),
        extension = %config.extension,
        debounce_ms = config.debounce.as_millis(),
        overlap = %config.overlap,
        "Configuration loaded"
    );

    let engine = Arc::new(build_engine(&config));

    let (watch_tx, mut watch_rx) = mpsc::channel::<WatchEvent>(config.buffer_size);
    let (ready_tx, mut ready_rx) = mpsc::channel::<PathBuf>(config.buffer_size);
    let debouncer = Debouncer::new(config.debounce, ready_tx);

    let watcher = DocumentWatcher::new(config.vault_dir.clone(), config.naming(), watch_tx)
        .with_context(|| {
            format!(
                "Failed to initialize file watcher for {}",
                config.vault_dir.display()
            )
        })?;

    info!(watch_dir = %watcher.root().display(), "File watcher initialized");

    if initial_scan {
        let documents = scan_documents(&config.vault_dir, engine.naming())
            .context("Failed to scan vault")?;
        // Before the loop starts spawning passes, so no pair is handled twice at once.
        let outcomes = engine.sweep(&documents).await;
        let migrated = outcomes.iter().filter(|o| o.report().is_some()).count();
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(
            documents = documents.len(),
            migrated, failed, "Initial scan complete"
        );
    }

    info!("Daemon running. Press Ctrl+C to stop.");

    let mut passes = JoinSet::new();
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }

            Some(event) = watch_rx.recv() => {
                if event.is_content_change() {
                    trace!(path = %event.path().display(), "Document changed");
                    if !debouncer.try_send(event.path().to_path_buf()) {
                        warn!(path = %event.path().display(), "Debouncer full, dropping change");
                    }
                } else {
                    debug!(path = %event.path().display(), "Document removed");
                }
            }

            Some(path) = ready_rx.recv() => {
                let engine = Arc::clone(&engine);
                passes.spawn(async move { engine.handle_change(&path).await });
            }

            Some(joined) = passes.join_next(), if !passes.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "Migration task panicked");
                }
            }
        }
    }

    info!("Shutting down...");
    drop(watcher);
    drop(debouncer);

    let drained = tokio::time::timeout(Duration::from_secs(SHUTDOWN_TIMEOUT_SECS), async {
        while passes.join_next().await.is_some() {}
    })
    .await;

    if drained.is_err() {
        warn!(
            remaining = passes.len(),
            "Migrations still running at shutdown, aborting"
        );
        passes.abort_all();
    }

    info!("Daemon stopped");
    Ok(ExitCode::SUCCESS)
}

/// Runs one pass for `file` and prints the outcome.
async fn run_sync(file: &Path, json: bool) -> Result<ExitCode> {
    let config = load_config(None)?;
    let engine = build_engine(&config);

    let outcome = engine.handle_change(file).await;

    if json {
        let rendered =
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
        println!("{rendered}");
    } else {
        println!("{}", describe(&outcome));
    }

    Ok(if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Runs one pass for every document in the vault.
async fn run_scan(vault: Option<PathBuf>) -> Result<ExitCode> {
    let config = load_config(vault)?;
    let engine = build_engine(&config);

    let documents = scan_documents(&config.vault_dir, engine.naming())
        .with_context(|| format!("Failed to scan {}", config.vault_dir.display()))?;

    let mut migrated = 0;
    let mut failed = 0;
    for outcome in engine.sweep(&documents).await {
        match &outcome {
            MigrationOutcome::Migrated(_) => migrated += 1,
            MigrationOutcome::Failed { .. } => failed += 1,
            _ => continue,
        }
        println!("{}", describe(&outcome));
    }

    info!(
        documents = documents.len(),
        migrated, failed, "Scan complete"
    );

    Ok(if failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Prints the other document of `file`'s pair.
fn run_companion(file: &Path) -> Result<ExitCode> {
    let config = load_config(None)?;
    let (_, other) = config
        .naming()
        .counterpart(file)
        .ok_or_else(|| SyncError::Unrecognized(file.to_path_buf()))?;

    println!("{}", other.display());
    Ok(ExitCode::SUCCESS)
}

/// One-line human rendering of an outcome.
fn describe(outcome: &MigrationOutcome) -> String {
    match outcome {
        MigrationOutcome::Migrated(report) => {
            let mut line = format!(
                "{}: moved {} task(s) to {}",
                report.trigger.display(),
                report.inserted,
                report.destination.display()
            );
            if report.duplicates > 0 {
                line.push_str(&format!(", {} already there", report.duplicates));
            }
            line
        }
        MigrationOutcome::NoChanges { path } => format!("{}: nothing to migrate", path.display()),
        MigrationOutcome::Skipped { path, reason } => match reason {
            SkipReason::Unrecognized => format!("{}: not a task document", path.display()),
            SkipReason::InFlight => format!("{}: pair busy, skipped", path.display()),
        },
        MigrationOutcome::Failed { path, error } => format!("{}: failed: {error}", path.display()),
    }
}

/// Initializes the logging subsystem.
///
/// Logs go to stderr so `sync --json` output stays machine readable.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(json_layer)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
