//! Scenario: the worker pool drives deliveries end-to-end.
//!
//! Uses real workers over the in-memory outbox with short intervals: a
//! healthy handler drains the queue exactly once per event; a failing
//! handler exhausts its retry budget and parks; shutdown waits for the
//! in-flight batch.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use osa_pipeline::{EventHandler, Outbox, SubscriptionRegistry, WorkerConfig, WorkerPool};
use osa_testkit::MemOutbox;
use osa_types::{Event, EventPayload};
use uuid::Uuid;

const GROUP: &str = "InsertRecordFeatures";

fn fast_config() -> WorkerConfig {
    WorkerConfig {
        batch_size: 2,
        batch_timeout: Duration::from_millis(20),
        poll_interval: Duration::from_millis(10),
        max_retries: 1,
        claim_timeout: Duration::from_millis(500),
    }
}

struct CountingHandler {
    seen: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl EventHandler for CountingHandler {
    fn consumer_group(&self) -> &'static str {
        GROUP
    }

    fn event_type(&self) -> &'static str {
        "RecordPublished"
    }

    fn worker_config(&self) -> WorkerConfig {
        fast_config()
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        self.seen.lock().unwrap().push(event.id);
        Ok(())
    }
}

struct AlwaysFails {
    attempts: AtomicUsize,
}

#[async_trait]
impl EventHandler for AlwaysFails {
    fn consumer_group(&self) -> &'static str {
        GROUP
    }

    fn event_type(&self) -> &'static str {
        "RecordPublished"
    }

    fn worker_config(&self) -> WorkerConfig {
        fast_config()
    }

    async fn handle(&self, _event: &Event) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("synthetic failure")
    }
}

fn record_published(i: usize) -> EventPayload {
    EventPayload::RecordPublished {
        record_srn: format!("urn:osa:test:rec:r{i}@1").parse().unwrap(),
        deposition_srn: format!("urn:osa:test:dep:d{i}").parse().unwrap(),
        convention_srn: "urn:osa:test:conv:c@1.0.0".parse().unwrap(),
    }
}

async fn wait_until(deadline_ms: u64, mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..(deadline_ms / 10) {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn healthy_handler_delivers_each_event_once() {
    let registry = SubscriptionRegistry::from_pairs([("RecordPublished", GROUP)]);
    let outbox = Arc::new(MemOutbox::new(registry));

    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(outbox.append(record_published(i)).await.unwrap().id);
    }

    let handler = Arc::new(CountingHandler {
        seen: Mutex::new(Vec::new()),
    });
    let handlers: Vec<Arc<dyn EventHandler>> = vec![handler.clone()];
    let pool =
        WorkerPool::start(outbox.clone(), handlers, Duration::from_millis(100)).unwrap();

    let drained = wait_until(2_000, || {
        ids.iter()
            .all(|id| outbox.delivery(*id, GROUP).map(|d| d.status) == Some("delivered"))
    })
    .await;
    pool.shutdown().await;

    assert!(drained, "all deliveries must reach delivered");
    let mut seen = handler.seen.lock().unwrap().clone();
    seen.sort();
    let mut expected = ids.clone();
    expected.sort();
    assert_eq!(seen, expected, "each event handled exactly once");
}

#[tokio::test]
async fn failing_handler_parks_after_retries() {
    let registry = SubscriptionRegistry::from_pairs([("RecordPublished", GROUP)]);
    let outbox = Arc::new(MemOutbox::new(registry));
    let event = outbox.append(record_published(0)).await.unwrap();

    let handler = Arc::new(AlwaysFails {
        attempts: AtomicUsize::new(0),
    });
    let handlers: Vec<Arc<dyn EventHandler>> = vec![handler.clone()];
    let pool =
        WorkerPool::start(outbox.clone(), handlers, Duration::from_millis(100)).unwrap();

    let parked = wait_until(5_000, || {
        outbox.delivery(event.id, GROUP).map(|d| d.status) == Some("failed")
    })
    .await;
    pool.shutdown().await;

    assert!(parked, "delivery must be parked as failed");
    // max_retries = 1: the first attempt requeues once, the second parks.
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(outbox.delivery(event.id, GROUP).unwrap().retry_count, 2);
}

#[tokio::test]
async fn shutdown_takes_no_new_claims() {
    let registry = SubscriptionRegistry::from_pairs([("RecordPublished", GROUP)]);
    let outbox = Arc::new(MemOutbox::new(registry));

    let handler = Arc::new(CountingHandler {
        seen: Mutex::new(Vec::new()),
    });
    let handlers: Vec<Arc<dyn EventHandler>> = vec![handler];
    let pool =
        WorkerPool::start(outbox.clone(), handlers, Duration::from_millis(100)).unwrap();
    pool.shutdown().await;

    // Events appended after shutdown stay pending.
    let event = outbox.append(record_published(0)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(outbox.delivery(event.id, GROUP).unwrap().status, "pending");
}
