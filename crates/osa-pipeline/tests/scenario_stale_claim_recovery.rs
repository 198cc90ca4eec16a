//! Scenario: crash recovery via stale-claim reclamation.
//!
//! # Invariant under test
//! A worker that dies between `claim` and `ack` leaves its rows `claimed`;
//! once `claimed_at + claim_timeout < now` the janitor returns them to
//! `pending` and another worker completes them. `retry_count` stays 0
//! throughout: a crash is not a processing failure.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use osa_pipeline::{Janitor, Outbox, SubscriptionRegistry};
use osa_testkit::MemOutbox;
use osa_types::EventPayload;
use tokio_util::sync::CancellationToken;

const GROUP: &str = "InsertRecordFeatures";

fn outbox() -> MemOutbox {
    MemOutbox::new(SubscriptionRegistry::from_pairs([(
        "RecordPublished",
        GROUP,
    )]))
}

fn record_published() -> EventPayload {
    EventPayload::RecordPublished {
        record_srn: "urn:osa:test:rec:r1@1".parse().unwrap(),
        deposition_srn: "urn:osa:test:dep:d1".parse().unwrap(),
        convention_srn: "urn:osa:test:conv:c@1.0.0".parse().unwrap(),
    }
}

#[tokio::test]
async fn reclaim_returns_expired_claims_only() {
    let outbox = outbox();
    let fresh = outbox.append(record_published()).await.unwrap();
    let stale = outbox.append(record_published()).await.unwrap();

    outbox
        .claim("RecordPublished", GROUP, 10, Utc::now())
        .await
        .unwrap();

    // Simulate a worker that died five minutes ago holding `stale`.
    outbox.age_claim(stale.id, GROUP, Utc::now() - Duration::seconds(301));

    let reclaimed = outbox
        .reclaim_stale(Duration::seconds(300), Utc::now())
        .await
        .unwrap();
    assert_eq!(reclaimed, 1);

    assert_eq!(outbox.delivery(stale.id, GROUP).unwrap().status, "pending");
    assert_eq!(
        outbox.delivery(fresh.id, GROUP).unwrap().status,
        "claimed",
        "a live claim inside the timeout must not be stolen"
    );
}

#[tokio::test]
async fn reclaimed_delivery_completes_with_zero_retries() {
    let outbox = outbox();
    let event = outbox.append(record_published()).await.unwrap();

    // Worker A claims and crashes.
    outbox
        .claim("RecordPublished", GROUP, 1, Utc::now())
        .await
        .unwrap();
    outbox.age_claim(event.id, GROUP, Utc::now() - Duration::seconds(400));

    outbox
        .reclaim_stale(Duration::seconds(300), Utc::now())
        .await
        .unwrap();

    // Worker B picks it up and finishes.
    let batch = outbox
        .claim("RecordPublished", GROUP, 1, Utc::now())
        .await
        .unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].retry_count, 0, "a crash is not a retry");

    assert!(outbox.ack(event.id, GROUP, Utc::now()).await.unwrap());
    let snapshot = outbox.delivery(event.id, GROUP).unwrap();
    assert_eq!(snapshot.status, "delivered");
    assert_eq!(snapshot.retry_count, 0);
}

#[tokio::test]
async fn janitor_task_sweeps_on_its_interval() {
    let outbox = Arc::new(outbox());
    let event = outbox.append(record_published()).await.unwrap();

    outbox
        .claim("RecordPublished", GROUP, 1, Utc::now())
        .await
        .unwrap();
    outbox.age_claim(event.id, GROUP, Utc::now() - Duration::seconds(400));

    let cancel = CancellationToken::new();
    let janitor = Janitor::new(
        outbox.clone(),
        StdDuration::from_millis(20),
        StdDuration::from_secs(300),
    );
    let handle = tokio::spawn(janitor.run(cancel.clone()));

    tokio::time::sleep(StdDuration::from_millis(100)).await;
    cancel.cancel();
    handle.await.unwrap();

    assert_eq!(outbox.delivery(event.id, GROUP).unwrap().status, "pending");
}
