//! Integration tests for the migration engine over in-memory documents.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::Semaphore;

use donefile_daemon::collector::Direction;
use donefile_daemon::engine::SkipReason;
use donefile_daemon::store::StoreResult;
use donefile_daemon::{
    CompanionNaming, DocumentStore, FixedClock, MemoryStore, MigrationEngine, MigrationOutcome,
    OverlapPolicy,
};

fn today() -> FixedClock {
    FixedClock::new(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
}

fn engine<S: DocumentStore>(store: S) -> MigrationEngine<S, FixedClock> {
    MigrationEngine::new(store, today(), CompanionNaming::default())
}

/// Lines of a document that are tasks, ignoring blank lines.
fn task_lines(content: &str) -> Vec<&str> {
    content.split('\n').filter(|line| !line.is_empty()).collect()
}

/// Store whose writes block until the test opens the gate.
#[derive(Clone)]
struct GatedStore {
    inner: MemoryStore,
    gate: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    only: Option<PathBuf>,
}

impl GatedStore {
    fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            gate: Arc::new(Semaphore::new(0)),
            waiting: Arc::new(AtomicUsize::new(0)),
            only: None,
        }
    }

    /// Gates writes to `path` only.
    fn gating(mut self, path: &str) -> Self {
        self.only = Some(PathBuf::from(path));
        self
    }

    async fn wait_for_writers(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.waiting.load(Ordering::SeqCst) < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("writers never reached the gate");
    }

    fn open(&self) {
        self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
    }
}

impl DocumentStore for GatedStore {
    async fn read(&self, path: &Path) -> StoreResult<String> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &Path, content: &str) -> StoreResult<()> {
        if self.only.as_deref().map_or(true, |only| only == path) {
            self.waiting.fetch_add(1, Ordering::SeqCst);
            let _permit = self.gate.acquire().await.expect("gate closed");
        }
        self.inner.write(path, content).await
    }

    async fn create(&self, path: &Path, initial: &str) -> StoreResult<()> {
        self.inner.create(path, initial).await
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        self.inner.exists(path).await
    }
}

/// Store whose writes never complete.
struct HangingStore(MemoryStore);

impl DocumentStore for HangingStore {
    async fn read(&self, path: &Path) -> StoreResult<String> {
        self.0.read(path).await
    }

    async fn write(&self, _path: &Path, _content: &str) -> StoreResult<()> {
        std::future::pending().await
    }

    async fn create(&self, path: &Path, initial: &str) -> StoreResult<()> {
        self.0.create(path, initial).await
    }

    async fn exists(&self, path: &Path) -> StoreResult<bool> {
        self.0.exists(path).await
    }
}

#[tokio::test]
async fn checked_task_creates_companion() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x] Buy milk\n- [ ] Call Bob");

    let outcome = engine(store.clone()).handle_change(Path::new("list.md")).await;

    let report = outcome.report().expect("should migrate");
    assert_eq!(report.destination, PathBuf::from("list - Done.md"));
    assert_eq!(report.collected, 1);
    assert!(report.destination_created);
    assert_eq!(
        store.get("list - Done.md").as_deref(),
        Some("- [x] Buy milk ✅ 2024-01-15\n")
    );
    assert_eq!(store.get("list.md").as_deref(), Some("- [ ] Call Bob"));
}

#[tokio::test]
async fn unchecked_task_returns_without_annotation() {
    let store = MemoryStore::new();
    store.insert("list - Done.md", "- [ ] Buy milk ✅ 2024-01-10\n- [x] Call Bob");
    store.insert("list.md", "- [ ] Other");

    let outcome = engine(store.clone())
        .handle_change(Path::new("list - Done.md"))
        .await;

    let report = outcome.report().expect("should migrate");
    assert_eq!(report.direction, Direction::ToSource);
    assert!(!report.destination_created);
    assert_eq!(
        store.get("list.md").as_deref(),
        Some("- [ ] Buy milk\n- [ ] Other")
    );
    assert_eq!(store.get("list - Done.md").as_deref(), Some("- [x] Call Bob"));
}

#[tokio::test]
async fn task_already_in_companion_is_not_duplicated() {
    let store = MemoryStore::new();
    store.insert("list - Done.md", "- [x] Buy milk ✅ 2024-01-10");
    store.insert("list.md", "- [x] Buy milk");

    let outcome = engine(store.clone()).handle_change(Path::new("list.md")).await;

    let report = outcome.report().expect("should migrate");
    assert_eq!(report.inserted, 0);
    assert_eq!(report.duplicates, 1);
    assert!(!report.destination_written);
    assert_eq!(
        store.get("list - Done.md").as_deref(),
        Some("- [x] Buy milk ✅ 2024-01-10")
    );
    assert_eq!(store.get("list.md").as_deref(), Some(""));
}

#[tokio::test]
async fn every_collected_task_lands_exactly_once() {
    let store = MemoryStore::new();
    let source: Vec<String> = (0..50)
        .map(|i| {
            if i % 3 == 0 {
                format!("- [x] task {i}")
            } else {
                format!("- [ ] task {i}")
            }
        })
        .collect();
    store.insert("big.md", source.join("\n"));

    engine(store.clone()).handle_change(Path::new("big.md")).await;

    let remaining = store.get("big.md").unwrap();
    let done = store.get("big - Done.md").unwrap();
    for i in 0..50 {
        let needle = format!("task {i}");
        let in_source = remaining.split('\n').any(|l| l.ends_with(&needle));
        let in_done = done.split('\n').filter(|l| l.contains(&format!("{needle} ✅"))).count();
        if i % 3 == 0 {
            assert!(!in_source, "{needle} left behind");
            assert_eq!(in_done, 1, "{needle} not moved exactly once");
        } else {
            assert!(in_source, "{needle} lost");
            assert_eq!(in_done, 0);
        }
    }
}

#[tokio::test]
async fn batch_keeps_document_order() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x] A\n- [ ] keep\n- [x] B\n# heading\n- [x] C");
    store.insert("list - Done.md", "- [x] Older ✅ 2024-01-01");

    engine(store.clone()).handle_change(Path::new("list.md")).await;

    assert_eq!(
        task_lines(&store.get("list - Done.md").unwrap()),
        [
            "- [x] A ✅ 2024-01-15",
            "- [x] B ✅ 2024-01-15",
            "- [x] C ✅ 2024-01-15",
            "- [x] Older ✅ 2024-01-01",
        ]
    );
    assert_eq!(store.get("list.md").as_deref(), Some("- [ ] keep\n# heading"));
}

#[tokio::test]
async fn repeated_task_in_one_batch_lands_once() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x] Water plants\n- [x] Water plants ✅ 2023-12-31");

    let outcome = engine(store.clone()).handle_change(Path::new("list.md")).await;

    let report = outcome.report().unwrap();
    assert_eq!(report.collected, 2);
    assert_eq!(report.inserted, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(
        store.get("list - Done.md").as_deref(),
        Some("- [x] Water plants ✅ 2024-01-15\n")
    );
    assert_eq!(store.get("list.md").as_deref(), Some(""));
}

#[tokio::test]
async fn replaying_own_writes_converges() {
    let (store, mut changes) = MemoryStore::with_notifications();
    store.insert("list.md", "# Groceries\n- [x] Milk\n- [ ] Eggs\n- [x] Bread");
    store.insert(
        "list - Done.md",
        "- [ ] Butter ✅ 2024-01-02\n- [x] Jam ✅ 2024-01-01",
    );
    let engine = engine(store.clone());

    engine.handle_change(Path::new("list.md")).await;

    // Feed every write notification back in, as the watcher would.
    let mut replayed = 0;
    while let Ok(path) = changes.try_recv() {
        replayed += 1;
        assert!(replayed < 20, "engine kept rewriting documents");
        engine.handle_change(&path).await;
    }

    assert_eq!(
        store.get("list.md").as_deref(),
        Some("- [ ] Butter\n# Groceries\n- [ ] Eggs")
    );
    assert_eq!(
        store.get("list - Done.md").as_deref(),
        Some("- [x] Milk ✅ 2024-01-15\n- [x] Bread ✅ 2024-01-15\n- [x] Jam ✅ 2024-01-01")
    );

    // Settled: one more pass per side changes nothing.
    for path in ["list.md", "list - Done.md"] {
        let outcome = engine.handle_change(Path::new(path)).await;
        assert!(matches!(outcome, MigrationOutcome::NoChanges { .. }));
    }
}

#[tokio::test]
async fn failed_destination_write_keeps_source() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x] Buy milk");
    store.insert("list - Done.md", "");
    store.fail_writes_to("list - Done.md");
    let engine = engine(store.clone());

    let outcome = engine.handle_change(Path::new("list.md")).await;

    assert!(outcome.is_failure());
    assert_eq!(store.get("list.md").as_deref(), Some("- [x] Buy milk"));
    assert_eq!(store.get("list - Done.md").as_deref(), Some(""));
    assert!(engine.in_flight().is_empty());
}

#[tokio::test]
async fn failed_companion_creation_keeps_source() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x] Buy milk");
    store.fail_writes_to("list - Done.md");

    let outcome = engine(store.clone()).handle_change(Path::new("list.md")).await;

    assert!(outcome.is_failure());
    assert_eq!(store.get("list.md").as_deref(), Some("- [x] Buy milk"));
    assert!(store.get("list - Done.md").is_none());
}

#[tokio::test]
async fn failed_trigger_write_is_healed_by_next_pass() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x] Buy milk\n- [ ] Call Bob");
    store.fail_writes_to("list.md");

    let outcome = engine(store.clone()).handle_change(Path::new("list.md")).await;
    assert!(outcome.is_failure());
    // Destination was committed first, so the task exists in both documents.
    assert_eq!(
        store.get("list - Done.md").as_deref(),
        Some("- [x] Buy milk ✅ 2024-01-15\n")
    );

    let healed = MemoryStore::new();
    healed.insert("list.md", store.get("list.md").unwrap());
    healed.insert("list - Done.md", store.get("list - Done.md").unwrap());
    let outcome = engine(healed.clone())
        .handle_change(Path::new("list.md"))
        .await;

    assert_eq!(outcome.report().unwrap().duplicates, 1);
    assert_eq!(healed.get("list.md").as_deref(), Some("- [ ] Call Bob"));
    assert_eq!(
        healed.get("list - Done.md").as_deref(),
        Some("- [x] Buy milk ✅ 2024-01-15\n")
    );
}

#[tokio::test]
async fn notifications_during_migration_are_skipped() {
    let memory = MemoryStore::new();
    memory.insert("list.md", "- [x] Buy milk");
    let store = GatedStore::new(memory.clone());
    let engine = Arc::new(engine(store.clone()));

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.handle_change(Path::new("list.md")).await }
    });
    store.wait_for_writers(1).await;

    for path in ["list.md", "list - Done.md"] {
        let outcome = engine.handle_change(Path::new(path)).await;
        assert_eq!(
            outcome,
            MigrationOutcome::Skipped {
                path: PathBuf::from(path),
                reason: SkipReason::InFlight,
            }
        );
    }

    store.open();
    let outcome = first.await.unwrap();
    assert!(outcome.report().is_some());
    assert!(engine.in_flight().is_empty());
    assert_eq!(memory.get("list.md").as_deref(), Some(""));
}

#[tokio::test]
async fn unrelated_pairs_migrate_concurrently() {
    let memory = MemoryStore::new();
    memory.insert("a.md", "- [x] one");
    memory.insert("b.md", "- [x] two");
    let store = GatedStore::new(memory.clone());
    let engine = Arc::new(engine(store.clone()));

    let handles: Vec<_> = ["a.md", "b.md"]
        .into_iter()
        .map(|path| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.handle_change(Path::new(path)).await })
        })
        .collect();

    // Both passes are parked inside a write at the same time.
    store.wait_for_writers(2).await;
    assert_eq!(engine.in_flight().len(), 2);

    store.open();
    for handle in handles {
        assert!(handle.await.unwrap().report().is_some());
    }
    assert_eq!(
        memory.get("a - Done.md").as_deref(),
        Some("- [x] one ✅ 2024-01-15\n")
    );
    assert_eq!(
        memory.get("b - Done.md").as_deref(),
        Some("- [x] two ✅ 2024-01-15\n")
    );
}

#[tokio::test]
async fn rescan_policy_picks_up_overlapping_edit() {
    let memory = MemoryStore::new();
    memory.insert("list.md", "- [x] first");
    // Park the pass after the companion is written, before the source is.
    let store = GatedStore::new(memory.clone()).gating("list.md");
    let engine = Arc::new(engine(store.clone()).with_overlap_policy(OverlapPolicy::Rescan));

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.handle_change(Path::new("list.md")).await }
    });
    store.wait_for_writers(1).await;

    // The user unchecks a task in the companion meanwhile.
    memory.insert(
        "list - Done.md",
        "- [x] first ✅ 2024-01-15\n- [ ] reopened ✅ 2024-01-02",
    );
    let skipped = engine.handle_change(Path::new("list - Done.md")).await;
    assert!(matches!(
        skipped,
        MigrationOutcome::Skipped {
            reason: SkipReason::InFlight,
            ..
        }
    ));

    store.open();
    assert!(first.await.unwrap().report().is_some());

    assert!(engine.in_flight().is_empty());
    assert_eq!(memory.get("list.md").as_deref(), Some("- [ ] reopened\n"));
    assert_eq!(
        memory.get("list - Done.md").as_deref(),
        Some("- [x] first ✅ 2024-01-15")
    );
}

#[tokio::test]
async fn drop_policy_leaves_overlapping_edit_for_next_notification() {
    let memory = MemoryStore::new();
    memory.insert("list.md", "- [x] first");
    let store = GatedStore::new(memory.clone()).gating("list.md");
    let engine = Arc::new(engine(store.clone()));

    let first = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.handle_change(Path::new("list.md")).await }
    });
    store.wait_for_writers(1).await;

    let edited = "- [x] first ✅ 2024-01-15\n- [ ] reopened ✅ 2024-01-02";
    memory.insert("list - Done.md", edited);
    engine.handle_change(Path::new("list - Done.md")).await;

    store.open();
    first.await.unwrap();
    assert_eq!(memory.get("list - Done.md").as_deref(), Some(edited));

    // The next save of the companion migrates it.
    engine.handle_change(Path::new("list - Done.md")).await;
    assert_eq!(memory.get("list.md").as_deref(), Some("- [ ] reopened\n"));
}

#[tokio::test]
async fn hung_storage_times_out_and_releases_pair() {
    let memory = MemoryStore::new();
    memory.insert("list.md", "- [x] Buy milk");
    let engine = MigrationEngine::new(HangingStore(memory.clone()), today(), CompanionNaming::default())
        .with_io_timeout(Duration::from_millis(50));

    let outcome = engine.handle_change(Path::new("list.md")).await;

    match outcome {
        MigrationOutcome::Failed { error, .. } => assert!(error.contains("timed out"), "{error}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(engine.in_flight().is_empty());
    assert_eq!(memory.get("list.md").as_deref(), Some("- [x] Buy milk"));
}

#[tokio::test]
async fn custom_extension_pairs() {
    let store = MemoryStore::new();
    store.insert("todo.txt", "- [x] ship it");
    store.insert("todo.md", "- [x] not this one");
    let engine = MigrationEngine::new(store.clone(), today(), CompanionNaming::new("txt"));

    assert!(engine.handle_change(Path::new("todo.txt")).await.report().is_some());
    assert!(matches!(
        engine.handle_change(Path::new("todo.md")).await,
        MigrationOutcome::Skipped {
            reason: SkipReason::Unrecognized,
            ..
        }
    ));
    assert_eq!(
        store.get("todo - Done.txt").as_deref(),
        Some("- [x] ship it ✅ 2024-01-15\n")
    );
}

#[tokio::test]
async fn sweep_handles_both_sides_of_a_pair() {
    let store = MemoryStore::new();
    store.insert("L.md", "- [x] done here");
    store.insert("L - Done.md", "- [ ] reopened ✅ 2024-01-02");
    let engine = engine(store.clone());

    let paths = [PathBuf::from("L - Done.md"), PathBuf::from("L.md")];
    let outcomes = engine.sweep(&paths).await;

    assert_eq!(outcomes.len(), 2);
    assert!(
        outcomes.iter().all(|o| o.report().is_some()),
        "{outcomes:?}"
    );
    assert_eq!(store.get("L.md").as_deref(), Some("- [ ] reopened"));
    assert_eq!(
        store.get("L - Done.md").as_deref(),
        Some("- [x] done here ✅ 2024-01-15\n")
    );
    assert!(engine.in_flight().is_empty());
}

#[tokio::test]
async fn bare_checkbox_is_not_migrated() {
    let store = MemoryStore::new();
    store.insert("list.md", "- [x]\n- [ ] Call Bob");

    let outcome = engine(store.clone()).handle_change(Path::new("list.md")).await;

    assert!(matches!(outcome, MigrationOutcome::NoChanges { .. }), "{outcome:?}");
    assert_eq!(store.get("list - Done.md"), None);
    assert_eq!(store.get("list.md").as_deref(), Some("- [x]\n- [ ] Call Bob"));
}
