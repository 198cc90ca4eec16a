//! The outbox port: durable fan-out message bus backed by a relational DB.
//!
//! Delivery rows move along `pending → claimed → {delivered|failed}` with a
//! single recovery edge `claimed → pending` taken by `reclaim_stale` and by
//! a retryable `fail`. A `delivered` row is terminal.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use osa_types::{Event, EventPayload};

/// An event handed to a worker together with the delivery's retry count,
/// which drives the worker's backoff.
#[derive(Debug, Clone)]
pub struct ClaimedEvent {
    pub event: Event,
    pub retry_count: i32,
}

/// What `fail` did with the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Returned to `pending` for another attempt.
    Requeued { retry_count: i32 },
    /// Retry ceiling reached; parked as `failed` until an operator
    /// resurrects it.
    Parked,
}

/// Append-once event log with one pending delivery row per subscribed
/// consumer group.
///
/// Implementations must guarantee claim exclusivity: two concurrent `claim`
/// calls for the same `(event_type, consumer_group)` never return
/// overlapping events.
#[async_trait]
pub trait Outbox: Send + Sync {
    /// Write the event row plus one `pending` delivery per consumer group
    /// subscribed to the payload's event type, atomically. Event types with
    /// zero subscribers still get their event row.
    async fn append(&self, payload: EventPayload) -> Result<Event>;

    /// Atomically claim up to `batch_size` pending deliveries for this
    /// `(event_type, consumer_group)` pair, in event-id order, marking them
    /// `claimed` with `claimed_at = now`.
    async fn claim(
        &self,
        event_type: &str,
        consumer_group: &str,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedEvent>>;

    /// Mark a claimed delivery `delivered`. Returns `false` when the row was
    /// not in `claimed` state (a duplicate ack is a no-op, not an error).
    async fn ack(&self, event_id: Uuid, consumer_group: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Record a processing failure: increment `retry_count`, park the row as
    /// `failed` once `retry_count >= max_retries`, otherwise return it to
    /// `pending`.
    async fn fail(
        &self,
        event_id: Uuid,
        consumer_group: &str,
        error: &str,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome>;

    /// Return claimed deliveries whose `claimed_at + claim_timeout < now` to
    /// `pending`. This is the recovery path for workers that died mid-batch.
    /// Returns the number of reclaimed rows.
    async fn reclaim_stale(&self, claim_timeout: Duration, now: DateTime<Utc>) -> Result<u64>;

    /// Pending-delivery count for one consumer group, for lag telemetry.
    async fn queue_depth(&self, consumer_group: &str) -> Result<i64>;
}
