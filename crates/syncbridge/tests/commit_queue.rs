//! Commit queue behavior against the scripted server.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use syncbridge::router::NEW_OBJECT;
use syncbridge::store::{record, BlobStore, FileStore, MemoryCache};
use syncbridge::wire::{ConnectorConfig, MemoryTransport, Transport, TransportFault};
use syncbridge::{
    Clock, CommitAction, CommitEvent, CommitOutcome, Connector, ManualClock, QueueConfig,
    RetryPolicy, Value, MAX_FLUSH_FAILURES, OBSOLETE_THRESHOLD,
};
use tokio::sync::Notify;
use syncbridge_testkit::{init_tracing, ServerScript, TestFixture};

const NOW: i64 = 1_700_000_000_000;

fn connector(
    fixture: &TestFixture,
    config: ConnectorConfig,
    dir: &Path,
    clock: &ManualClock,
    queue: QueueConfig,
) -> Connector {
    Connector::builder(config)
        .transport(fixture.transport())
        .host(fixture.host.clone())
        .registry(fixture.registry.clone())
        .queue_dir(dir)
        .clock(Arc::new(clock.clone()))
        .queue_config(queue)
        .build()
        .unwrap()
}

fn deferred(fixture: &TestFixture, dir: &Path, clock: &ManualClock) -> Connector {
    connector(
        fixture,
        fixture.config.clone().with_post_commit(true),
        dir,
        clock,
        QueueConfig::default(),
    )
}

fn immediate(fixture: &TestFixture, dir: &Path) -> Connector {
    connector(
        fixture,
        fixture.config.clone(),
        dir,
        &ManualClock::new(NOW),
        QueueConfig::default(),
    )
}

/// Holds every call until released, then lets the fixture server answer.
/// Once opened, calls go straight through.
struct GatedTransport {
    inner: Arc<MemoryTransport>,
    closed: AtomicBool,
    in_flight: Notify,
    release: Notify,
}

impl GatedTransport {
    fn new(inner: Arc<MemoryTransport>) -> Self {
        Self {
            inner,
            closed: AtomicBool::new(true),
            in_flight: Notify::new(),
            release: Notify::new(),
        }
    }

    fn open(&self) {
        self.closed.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn invoke(&self, service: &str, payload: &str) -> Result<String, TransportFault> {
        if self.closed.load(Ordering::SeqCst) {
            self.in_flight.notify_one();
            self.release.notified().await;
        }
        self.inner.invoke(service, payload).await
    }

    fn target(&self) -> String {
        self.inner.target()
    }
}

/// Write `events` as the raw queue file, obsolete ones included.
async fn seed_queue(connector: &Connector, dir: &Path, events: &[CommitEvent]) {
    let bytes = record::encode_records(events).unwrap();
    FileStore::new(dir)
        .save(connector.queue().store().key(), bytes.into(), None)
        .await
        .unwrap();
}

fn stale_event(id: &str) -> CommitEvent {
    let mut event = CommitEvent::new("Product", vec![id.to_string()], CommitAction::Update, "admin", "", NOW);
    event.fail_count = OBSOLETE_THRESHOLD + 1;
    event
}

#[tokio::test]
async fn test_deferred_commit_is_deduplicated() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let clock = ManualClock::new(NOW);
    let connector = deferred(&fixture, dir.path(), &clock);

    assert!(connector.is_deferred_mode());
    assert!(connector.commit("Product", ["12"], CommitAction::Update, "admin", "price").await);
    assert!(connector.commit("Product", ["12"], CommitAction::Update, "bot", "stock").await);

    let waiting = connector.waiting_events().await.unwrap();
    assert_eq!(waiting.len(), 1);
    let event = waiting.values().next().unwrap();
    assert_eq!(event.user, "bot");
    assert_eq!(event.retry_at, NOW);

    // Nothing reaches the server before the flush
    assert_eq!(fixture.server.calls(), 0);

    let log = connector.commit_log();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|r| r.outcome == CommitOutcome::Queued));
}

#[tokio::test]
async fn test_distinct_actions_are_distinct_events() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = deferred(&fixture, dir.path(), &ManualClock::new(NOW));

    connector.commit("Product", ["12"], CommitAction::Update, "admin", "").await;
    connector.commit("Product", ["12"], CommitAction::Delete, "admin", "").await;
    connector.commit("Product", ["13"], CommitAction::Update, "admin", "").await;

    assert_eq!(connector.waiting_events().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_flush_delivers_and_empties_queue() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = deferred(&fixture, dir.path(), &ManualClock::new(NOW));

    connector
        .commit("Product", ["12", "13"], CommitAction::Update, "admin", "bulk edit")
        .await;
    let report = connector.flush().await.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 1);
    assert!(!report.halted);
    assert!(connector.waiting_events().await.unwrap().is_empty());

    let commits = fixture.server.commits();
    assert_eq!(commits.len(), 1);
    let params = &commits[0].params;
    assert_eq!(params.get("type"), Some(&Value::from("Product")));
    assert_eq!(
        params.get("id"),
        Some(&Value::List(vec![Value::from("12"), Value::from("13")]))
    );
    assert_eq!(params.get("action"), Some(&Value::from("update")));
    assert_eq!(params.get("comment"), Some(&Value::from("bulk edit")));
}

#[tokio::test]
async fn test_failed_delivery_is_rescheduled() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    fixture.server.set_script(ServerScript::Fault {
        code: 503,
        message: "maintenance".into(),
    });
    let clock = ManualClock::new(NOW);
    let connector = deferred(&fixture, dir.path(), &clock);

    connector.commit("Product", ["12"], CommitAction::Update, "admin", "").await;
    let report = connector.flush().await.unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.abandoned, 0);

    let waiting = connector.waiting_events().await.unwrap();
    let event = waiting.values().next().unwrap();
    assert_eq!(event.fail_count, 1);
    assert_eq!(event.retry_at, NOW + 60_000);

    // Not due yet
    let report = connector.flush().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.not_due, 1);

    fixture.server.set_script(ServerScript::Accept);
    clock.advance(60_000);
    let report = connector.flush().await.unwrap();
    assert_eq!(report.delivered, 1);
    assert!(connector.waiting_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_all_makes_every_event_due() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    fixture.server.set_script(ServerScript::FaultFirst(3));
    let clock = ManualClock::new(NOW);
    let connector = deferred(&fixture, dir.path(), &clock);

    for id in ["1", "2", "3"] {
        connector.commit("Product", [id], CommitAction::Create, "admin", "").await;
    }
    assert_eq!(connector.flush().await.unwrap().failed, 3);

    assert_eq!(connector.restart_all().await.unwrap(), 3);
    let now = clock.now_millis();
    for event in connector.waiting_events().await.unwrap().values() {
        assert!(event.retry_at <= now);
        assert_eq!(event.retry_at, now - 1_000);
    }

    let report = connector.flush().await.unwrap();
    assert_eq!(report.delivered, 3);
}

#[tokio::test]
async fn test_flush_stops_after_failure_limit() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    fixture.server.set_script(ServerScript::Fault {
        code: 500,
        message: "down".into(),
    });
    let connector = deferred(&fixture, dir.path(), &ManualClock::new(NOW));

    for id in 1..=11 {
        connector
            .commit("Product", [id.to_string()], CommitAction::Update, "admin", "")
            .await;
    }
    assert_eq!(connector.waiting_events().await.unwrap().len(), 11);

    let report = connector.flush().await.unwrap();
    assert_eq!(report.attempted, MAX_FLUSH_FAILURES);
    assert_eq!(report.failed, MAX_FLUSH_FAILURES);
    assert!(report.halted);
    assert_eq!(fixture.server.calls(), MAX_FLUSH_FAILURES);

    let waiting = connector.waiting_events().await.unwrap();
    assert_eq!(waiting.len(), 11);
    assert_eq!(waiting.values().filter(|e| e.fail_count == 1).count(), 10);
    assert_eq!(waiting.values().last().unwrap().fail_count, 0);
}

#[tokio::test]
async fn test_obsolete_event_never_comes_back() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    fixture.server.set_script(ServerScript::Fault {
        code: 500,
        message: "down".into(),
    });
    let queue = QueueConfig::default().with_retry(RetryPolicy::immediate());
    let connector = connector(
        &fixture,
        fixture.config.clone().with_post_commit(true),
        dir.path(),
        &ManualClock::new(NOW),
        queue,
    );

    connector.commit("Product", ["12"], CommitAction::Delete, "admin", "").await;
    for attempt in 1..=OBSOLETE_THRESHOLD {
        let report = connector.flush().await.unwrap();
        assert_eq!(report.failed, 1, "attempt {}", attempt);
        assert_eq!(report.abandoned, 0);
    }
    let waiting = connector.waiting_events().await.unwrap();
    assert_eq!(waiting.values().next().unwrap().fail_count, OBSOLETE_THRESHOLD);

    // Restarting does not save it: the next failure crosses the threshold
    assert_eq!(connector.restart_all().await.unwrap(), 1);
    let report = connector.flush().await.unwrap();
    assert_eq!(report.abandoned, 1);
    assert!(connector.waiting_events().await.unwrap().is_empty());

    fixture.server.set_script(ServerScript::Accept);
    assert_eq!(connector.restart_all().await.unwrap(), 0);
    let report = connector.flush().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(fixture.server.calls(), OBSOLETE_THRESHOLD as usize + 1);

    let errors = connector.logger().snapshot();
    assert!(errors.err.iter().any(|e| e.contains("obsolete")));
}

#[tokio::test]
async fn test_immediate_commit_reports_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = immediate(&fixture, dir.path());
    assert!(!connector.is_deferred_mode());

    let outcome = connector
        .commit_with_outcome("Product", ["12"], CommitAction::Update, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Delivered);
    assert_eq!(fixture.server.commits().len(), 1);

    fixture.server.set_script(ServerScript::Refuse);
    assert!(!connector.commit("Product", ["12"], CommitAction::Update, "admin", "").await);

    fixture.server.set_script(ServerScript::Fault {
        code: 401,
        message: "bad key".into(),
    });
    let outcome = connector
        .commit_with_outcome("Product", ["12"], CommitAction::Update, "admin", "")
        .await;
    assert!(matches!(outcome, CommitOutcome::Failed(_)));

    // Immediate failures are not queued
    assert!(connector.waiting_events().await.unwrap().is_empty());
    assert_eq!(connector.commit_log().len(), 3);
}

#[tokio::test]
async fn test_unknown_or_disabled_type_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = immediate(&fixture, dir.path());

    assert!(connector.commit("Invoice", ["1"], CommitAction::Create, "admin", "").await);
    fixture.products.set_valid(false);
    assert!(connector.commit("Product", ["12"], CommitAction::Update, "admin", "").await);

    assert_eq!(fixture.server.calls(), 0);
    let log = connector.commit_log();
    assert_eq!(log.len(), 2);
    assert!(log.iter().all(|r| r.outcome == CommitOutcome::Ignored));
    assert_eq!(log[0].object_type, "Invoice");
}

#[tokio::test]
async fn test_locked_object_is_not_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = immediate(&fixture, dir.path());

    assert!(connector.locks().lock("Product", "13"));
    let outcome = connector
        .commit_with_outcome("Product", ["12", "13"], CommitAction::Update, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Locked);
    assert_eq!(fixture.server.calls(), 0);

    connector.locks().unlock("Product", "13");
    let outcome = connector
        .commit_with_outcome("Product", ["12", "13"], CommitAction::Update, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Delivered);
}

#[tokio::test]
async fn test_create_during_server_creation_is_not_echoed() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = immediate(&fixture, dir.path());

    let creating = connector.locks().guard("Product", NEW_OBJECT);
    let outcome = connector
        .commit_with_outcome("Product", ["101"], CommitAction::Create, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Locked);
    let outcome = connector
        .commit_with_outcome("Product", ["101"], CommitAction::Update, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Delivered);

    drop(creating);
    let outcome = connector
        .commit_with_outcome("Product", ["102"], CommitAction::Create, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Delivered);
    assert_eq!(fixture.server.commits().len(), 2);
}

#[tokio::test]
async fn test_ci_bypass_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = connector(
        &fixture,
        fixture.config.clone().with_ci_bypass(true).with_post_commit(true),
        dir.path(),
        &ManualClock::new(NOW),
        QueueConfig::default(),
    );

    let outcome = connector
        .commit_with_outcome("Product", ["12"], CommitAction::Update, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Bypassed);
    assert!(connector.waiting_events().await.unwrap().is_empty());
    assert_eq!(fixture.server.calls(), 0);
}

#[tokio::test]
async fn test_missing_id_fails() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = immediate(&fixture, dir.path());

    let ids: [&str; 0] = [];
    assert!(!connector.commit("Product", ids, CommitAction::Update, "admin", "").await);
    assert_eq!(fixture.server.calls(), 0);
}

#[tokio::test]
async fn test_deferred_mode_requires_flush_hook() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = connector(
        &fixture,
        fixture.config.clone().with_post_commit(true),
        dir.path(),
        &ManualClock::new(NOW),
        QueueConfig::default().with_flush_hook(false),
    );

    assert!(!connector.is_deferred_mode());
    let outcome = connector
        .commit_with_outcome("Product", ["12"], CommitAction::Update, "admin", "")
        .await;
    assert_eq!(outcome, CommitOutcome::Delivered);
}

#[tokio::test]
async fn test_queue_outlives_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let clock = ManualClock::new(NOW);

    {
        let first = deferred(&fixture, dir.path(), &clock);
        first.commit("Product", ["12"], CommitAction::Update, "admin", "").await;
        first.commit("ThirdParty", ["1"], CommitAction::Create, "admin", "").await;
    }

    let second = deferred(&fixture, dir.path(), &clock);
    assert_eq!(second.waiting_events().await.unwrap().len(), 2);
    let report = second.flush().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert_eq!(fixture.server.commits().len(), 2);
}

#[tokio::test]
async fn test_shared_cache_is_preferred() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let cache = Arc::new(MemoryCache::new());
    let build = || {
        Connector::builder(fixture.config.clone().with_post_commit(true))
            .transport(fixture.transport())
            .host(fixture.host.clone())
            .registry(fixture.registry.clone())
            .cache(cache.clone())
            .queue_dir(dir.path())
            .clock(Arc::new(ManualClock::new(NOW)))
            .build()
            .unwrap()
    };

    let first = build();
    first.commit("Product", ["12"], CommitAction::Update, "admin", "").await;
    assert_eq!(first.queue().store().backend_name(), cache.name());
    assert_eq!(cache.len(), 1);
    // The file fallback was never written
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

    let second = build();
    assert_eq!(second.waiting_events().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_commit_during_flush_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let gate = Arc::new(GatedTransport::new(fixture.transport()));
    let connector = Connector::builder(fixture.config.clone().with_post_commit(true))
        .transport(gate.clone())
        .host(fixture.host.clone())
        .registry(fixture.registry.clone())
        .queue_dir(dir.path())
        .clock(Arc::new(ManualClock::new(NOW)))
        .build()
        .unwrap();

    connector.commit("Product", ["12"], CommitAction::Update, "admin", "").await;

    let during_delivery = async {
        gate.in_flight.notified().await;
        let other = connector.commit("Product", ["13"], CommitAction::Update, "admin", "").await;
        let again = connector.commit("Product", ["12"], CommitAction::Update, "bot", "").await;
        gate.release.notify_one();
        other && again
    };
    let (report, queued) = tokio::join!(connector.flush(), during_delivery);
    assert!(queued);
    let report = report.unwrap();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 1);

    // Both commits made while the delivery was in flight are still queued
    let waiting = connector.waiting_events().await.unwrap();
    assert_eq!(waiting.len(), 2);
    let users: Vec<(&str, &str)> = waiting
        .values()
        .map(|e| (e.local_ids[0].as_str(), e.user.as_str()))
        .collect();
    assert!(users.contains(&("12", "bot")));
    assert!(users.contains(&("13", "admin")));

    gate.open();
    let report = connector.flush().await.unwrap();
    assert_eq!(report.delivered, 2);
    assert!(connector.waiting_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_flush_drops_stored_obsolete_event_without_delivery() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = deferred(&fixture, dir.path(), &ManualClock::new(NOW));
    let live = CommitEvent::new("Product", vec!["13".into()], CommitAction::Update, "admin", "", NOW);
    seed_queue(&connector, dir.path(), &[stale_event("12"), live]).await;

    let report = connector.flush().await.unwrap();
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 1);

    let commits = fixture.server.commits();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].params.get("id"), Some(&Value::from("13")));
    assert!(connector.waiting_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_restart_prunes_stored_obsolete_event() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = TestFixture::new();
    let connector = deferred(&fixture, dir.path(), &ManualClock::new(NOW));
    seed_queue(&connector, dir.path(), &[stale_event("12")]).await;

    assert_eq!(connector.restart_all().await.unwrap(), 0);
    let report = connector.flush().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(fixture.server.calls(), 0);
}
