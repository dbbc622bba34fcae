//! Integration tests for the file inbound endpoint: polling, advisory
//! locking across adapters, post-processing actions, and shutdown behavior.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use flowgate::artifacts::InboundDef;
use flowgate::deployers::unmarshal_sequence;
use flowgate::inbound::FileInbound;
use flowgate::lifecycle::Lifecycle;
use flowgate::mediation::{InboundMessageMediator, MediationEngine, MediationError};
use flowgate::message::MessageContext;
use flowgate::registry::ConfigRegistry;

/// Counts dispatches; optionally blocks to simulate slow mediation.
struct CountingMediator {
    dispatches: AtomicUsize,
    delay: Duration,
}

impl CountingMediator {
    fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            dispatches: AtomicUsize::new(0),
            delay,
        })
    }

    fn count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InboundMessageMediator for CountingMediator {
    async fn mediate_inbound(
        &self,
        _token: CancellationToken,
        _sequence_name: &str,
        _msg: &mut MessageContext,
    ) -> Result<(), MediationError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(())
    }
}

fn file_inbound_def(watch_dir: &Path, extra: &[(&str, &str)]) -> InboundDef {
    let mut parameters: HashMap<String, String> = HashMap::new();
    parameters.insert("interval".to_string(), "100".to_string());
    parameters.insert(
        "transport.vfs.FileURI".to_string(),
        format!("file://{}", watch_dir.display()),
    );
    parameters.insert(
        "transport.vfs.ContentType".to_string(),
        "text/plain".to_string(),
    );
    for (key, value) in extra {
        parameters.insert(key.to_string(), value.to_string());
    }

    InboundDef {
        name: "file-in".to_string(),
        sequence: "FileSeq".to_string(),
        protocol: "file".to_string(),
        parameters,
        ..InboundDef::default()
    }
}

async fn wait_until<F: Fn() -> bool>(deadline: Duration, predicate: F) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

#[tokio::test]
async fn test_dropped_file_is_processed_and_deleted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"payload").unwrap();

    let mediator = CountingMediator::new();
    let lifecycle = Lifecycle::new();
    let adapter =
        FileInbound::new(&file_inbound_def(dir.path(), &[]), mediator.clone(), lifecycle.clone())
            .unwrap();

    let token = lifecycle.token();
    let task = tokio::spawn(adapter.start(token));

    // Picked up within one second with a 100ms interval.
    let removed = wait_until(Duration::from_secs(1), || !dir.path().join("a.txt").exists()).await;
    assert!(removed, "file must be removed within the deadline");
    assert_eq!(mediator.count(), 1, "sequence invoked exactly once");
    assert!(!dir.path().join("a.txt.lock").exists());

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("adapter stops after shutdown")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_two_adapters_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("contested.txt"), b"payload").unwrap();

    // Both adapters share one counting mediator, so the total dispatch count
    // observes double processing across the pair.
    let mediator = CountingMediator::new();
    let lifecycle = Lifecycle::new();

    let adapter_one = FileInbound::new(
        &file_inbound_def(dir.path(), &[]),
        mediator.clone(),
        lifecycle.clone(),
    )
    .unwrap();
    let adapter_two = FileInbound::new(
        &file_inbound_def(dir.path(), &[]),
        mediator.clone(),
        lifecycle.clone(),
    )
    .unwrap();

    let task_one = tokio::spawn(adapter_one.start(lifecycle.token()));
    let task_two = tokio::spawn(adapter_two.start(lifecycle.token()));

    let removed = wait_until(Duration::from_secs(2), || {
        !dir.path().join("contested.txt").exists()
    })
    .await;
    assert!(removed);

    // Let a few more poll cycles pass; the count must stay at one.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(mediator.count(), 1, "exactly one adapter processes the file");
    assert!(!dir.path().join("contested.txt.lock").exists());

    lifecycle.shutdown();
    for task in [task_one, task_two] {
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("adapter stops")
            .unwrap()
            .unwrap();
    }
}

#[tokio::test]
async fn test_move_after_process() {
    let dir = tempfile::tempdir().unwrap();
    let done = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"payload").unwrap();

    let mediator = CountingMediator::new();
    let lifecycle = Lifecycle::new();
    let done_uri = format!("file://{}/archive", done.path().display());
    let adapter = FileInbound::new(
        &file_inbound_def(
            dir.path(),
            &[
                ("transport.vfs.ActionAfterProcess", "MOVE"),
                ("transport.vfs.MoveAfterProcess", &done_uri),
            ],
        ),
        mediator.clone(),
        lifecycle.clone(),
    )
    .unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    let moved = wait_until(Duration::from_secs(1), || {
        done.path().join("archive/a.txt").exists()
    })
    .await;
    assert!(moved, "file must be moved into the destination directory");
    assert!(!dir.path().join("a.txt").exists());
    assert_eq!(
        std::fs::read(done.path().join("archive/a.txt")).unwrap(),
        b"payload"
    );

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_pattern_filters_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("pick.csv"), b"1").unwrap();
    std::fs::write(dir.path().join("skip.txt"), b"2").unwrap();

    let mediator = CountingMediator::new();
    let lifecycle = Lifecycle::new();
    let adapter = FileInbound::new(
        &file_inbound_def(dir.path(), &[("transport.vfs.FileNamePattern", r".*\.csv$")]),
        mediator.clone(),
        lifecycle.clone(),
    )
    .unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    let removed = wait_until(Duration::from_secs(1), || !dir.path().join("pick.csv").exists()).await;
    assert!(removed);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(dir.path().join("skip.txt").exists(), "non-matching file untouched");
    assert_eq!(mediator.count(), 1);

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_sequential_processes_all_files() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["a.txt", "b.txt", "c.txt"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }

    let mediator = CountingMediator::new();
    let lifecycle = Lifecycle::new();
    let adapter = FileInbound::new(
        &file_inbound_def(dir.path(), &[("sequential", "true")]),
        mediator.clone(),
        lifecycle.clone(),
    )
    .unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    let drained = wait_until(Duration::from_secs(2), || {
        ["a.txt", "b.txt", "c.txt"]
            .iter()
            .all(|n| !dir.path().join(n).exists())
    })
    .await;
    assert!(drained, "all files processed");
    assert_eq!(mediator.count(), 3);

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_waits_for_in_flight_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("slow.txt"), b"payload").unwrap();

    let mediator = CountingMediator::with_delay(Duration::from_millis(300));
    let lifecycle = Lifecycle::new();
    let adapter = FileInbound::new(
        &file_inbound_def(dir.path(), &[]),
        mediator.clone(),
        lifecycle.clone(),
    )
    .unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    // Cancel while mediation is underway: the dispatch counter increments at
    // the start of mediation and the mock then blocks for 300ms.
    let dispatched = wait_until(Duration::from_secs(2), || mediator.count() >= 1).await;
    assert!(dispatched, "mediation must have started");
    lifecycle.shutdown();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("start() returns after in-flight work completes")
        .unwrap()
        .unwrap();

    // The in-flight file finished its post-action and released its lock
    // before the adapter returned.
    assert!(!dir.path().join("slow.txt").exists());
    assert!(!dir.path().join("slow.txt.lock").exists());
    assert_eq!(mediator.count(), 1);
}

#[tokio::test]
async fn test_real_engine_respond_sequence() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"payload").unwrap();

    let registry = Arc::new(ConfigRegistry::new());
    let sequence = unmarshal_sequence(
        r#"<sequence name="FileSeq"><respond/></sequence>"#,
        flowgate::artifacts::Position::new("seq.xml"),
    )
    .unwrap();
    registry.register_sequence(sequence).unwrap();

    let lifecycle = Lifecycle::new();
    let engine = Arc::new(MediationEngine::new(registry, lifecycle.clone()));
    let adapter =
        FileInbound::new(&file_inbound_def(dir.path(), &[]), engine, lifecycle.clone()).unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    let removed = wait_until(Duration::from_secs(1), || !dir.path().join("a.txt").exists()).await;
    assert!(removed, "successful mediation applies the process action");

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_unknown_sequence_applies_failure_action() {
    let dir = tempfile::tempdir().unwrap();
    let failed = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"payload").unwrap();

    // Real engine with an empty registry: the configured sequence does not
    // resolve, the message is dropped, the failure action applies, and the
    // adapter keeps running.
    let registry = Arc::new(ConfigRegistry::new());
    let lifecycle = Lifecycle::new();
    let engine = Arc::new(MediationEngine::new(registry, lifecycle.clone()));

    let failed_uri = format!("file://{}/rejected", failed.path().display());
    let adapter = FileInbound::new(
        &file_inbound_def(
            dir.path(),
            &[
                ("transport.vfs.ActionAfterFailure", "MOVE"),
                ("transport.vfs.MoveAfterFailure", &failed_uri),
            ],
        ),
        engine,
        lifecycle.clone(),
    )
    .unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    let moved = wait_until(Duration::from_secs(1), || {
        failed.path().join("rejected/a.txt").exists()
    })
    .await;
    assert!(moved, "failure action applied for unresolvable sequence");

    // Adapter is still alive and picks up new files.
    std::fs::write(dir.path().join("b.txt"), b"again").unwrap();
    let second = wait_until(Duration::from_secs(1), || {
        failed.path().join("rejected/b.txt").exists()
    })
    .await;
    assert!(second, "adapter keeps polling after a failed dispatch");

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_files_dropped_after_startup_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();

    let mediator = CountingMediator::new();
    let lifecycle = Lifecycle::new();
    let adapter =
        FileInbound::new(&file_inbound_def(dir.path(), &[]), mediator.clone(), lifecycle.clone())
            .unwrap();

    let task = tokio::spawn(adapter.start(lifecycle.token()));

    // Let a few empty cycles pass before the file appears.
    tokio::time::sleep(Duration::from_millis(250)).await;
    std::fs::write(dir.path().join("late.txt"), b"late").unwrap();

    let removed = wait_until(Duration::from_secs(1), || !dir.path().join("late.txt").exists()).await;
    assert!(removed);
    assert_eq!(mediator.count(), 1);

    lifecycle.shutdown();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
