//! Scenario: appending one event creates exactly one pending delivery per
//! subscribed consumer group.
//!
//! # Invariant under test
//! `count(deliveries where event_id = E) == |subscribers(event.type)|`, and
//! event types with zero subscribers still get their event row.

use chrono::Utc;
use osa_pipeline::{Outbox, SubscriptionRegistry};
use osa_testkit::MemOutbox;
use osa_types::EventPayload;

fn record_published() -> EventPayload {
    EventPayload::RecordPublished {
        record_srn: "urn:osa:test:rec:r1@1".parse().unwrap(),
        deposition_srn: "urn:osa:test:dep:d1".parse().unwrap(),
        convention_srn: "urn:osa:test:conv:c1@1.0.0".parse().unwrap(),
    }
}

#[tokio::test]
async fn one_pending_delivery_per_subscriber() {
    let registry = SubscriptionRegistry::from_pairs([
        ("RecordPublished", "InsertRecordFeatures"),
        ("RecordPublished", "FanOutToIndexBackends"),
        ("RecordPublished", "KeywordIndexHandler"),
        ("RecordPublished", "VectorIndexHandler"),
    ]);
    let outbox = MemOutbox::new(registry);

    let event = outbox.append(record_published()).await.unwrap();

    let mut deliveries = outbox.deliveries_for_event(event.id);
    deliveries.sort();
    assert_eq!(deliveries.len(), 4, "one delivery row per subscriber");
    let groups: Vec<&str> = deliveries.iter().map(|(g, _)| g.as_str()).collect();
    assert_eq!(
        groups,
        vec![
            "FanOutToIndexBackends",
            "InsertRecordFeatures",
            "KeywordIndexHandler",
            "VectorIndexHandler"
        ]
    );
    assert!(deliveries.iter().all(|(_, status)| *status == "pending"));
}

#[tokio::test]
async fn zero_subscribers_writes_event_row_only() {
    let registry = SubscriptionRegistry::from_pairs([("DepositionSubmitted", "BeginValidation")]);
    let outbox = MemOutbox::new(registry);

    let event = outbox.append(record_published()).await.unwrap();

    assert_eq!(outbox.events().len(), 1, "event row must exist");
    assert!(
        outbox.deliveries_for_event(event.id).is_empty(),
        "no delivery rows for an unsubscribed type"
    );
}

#[tokio::test]
async fn queue_depth_reflects_pending_backlog() {
    let registry = SubscriptionRegistry::from_pairs([("RecordPublished", "InsertRecordFeatures")]);
    let outbox = MemOutbox::new(registry);

    for _ in 0..3 {
        outbox.append(record_published()).await.unwrap();
    }
    assert_eq!(outbox.queue_depth("InsertRecordFeatures").await.unwrap(), 3);

    let claimed = outbox
        .claim("RecordPublished", "InsertRecordFeatures", 2, Utc::now())
        .await
        .unwrap();
    assert_eq!(claimed.len(), 2);
    assert_eq!(
        outbox.queue_depth("InsertRecordFeatures").await.unwrap(),
        1,
        "claimed rows no longer count as pending"
    );
}
