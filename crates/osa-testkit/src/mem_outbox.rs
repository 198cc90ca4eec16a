//! In-memory outbox honoring the delivery state machine.
//!
//! Claim order is event insertion order, standing in for the Postgres
//! implementation's event-id ordering. Claim exclusivity holds because the
//! whole store sits behind one mutex: two concurrent claims serialize and
//! the second sees only rows the first left `pending`.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use osa_pipeline::{ClaimedEvent, DeliveryOutcome, Outbox, SubscriptionRegistry};
use osa_types::{Event, EventPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Claimed,
    Delivered,
    Failed,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Claimed => "claimed",
            Status::Delivered => "delivered",
            Status::Failed => "failed",
        }
    }
}

struct DeliveryRow {
    event_index: usize,
    event_id: Uuid,
    consumer_group: String,
    status: Status,
    claimed_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    delivery_error: Option<String>,
    retry_count: i32,
}

/// Test-visible view of one delivery row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverySnapshot {
    pub status: &'static str,
    pub retry_count: i32,
    pub claimed_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_error: Option<String>,
}

#[derive(Default)]
struct Inner {
    events: Vec<Event>,
    deliveries: Vec<DeliveryRow>,
}

pub struct MemOutbox {
    registry: SubscriptionRegistry,
    inner: Mutex<Inner>,
}

impl MemOutbox {
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self {
            registry,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// All events appended so far, in append order.
    pub fn events(&self) -> Vec<Event> {
        self.inner.lock().unwrap().events.clone()
    }

    pub fn events_of_type(&self, event_type: &str) -> Vec<Event> {
        self.inner
            .lock()
            .unwrap()
            .events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn delivery(&self, event_id: Uuid, consumer_group: &str) -> Option<DeliverySnapshot> {
        let inner = self.inner.lock().unwrap();
        inner
            .deliveries
            .iter()
            .find(|d| d.event_id == event_id && d.consumer_group == consumer_group)
            .map(|d| DeliverySnapshot {
                status: d.status.as_str(),
                retry_count: d.retry_count,
                claimed_at: d.claimed_at,
                delivered_at: d.delivered_at,
                delivery_error: d.delivery_error.clone(),
            })
    }

    /// `(consumer_group, status)` pairs for one event.
    pub fn deliveries_for_event(&self, event_id: Uuid) -> Vec<(String, &'static str)> {
        let inner = self.inner.lock().unwrap();
        inner
            .deliveries
            .iter()
            .filter(|d| d.event_id == event_id)
            .map(|d| (d.consumer_group.clone(), d.status.as_str()))
            .collect()
    }

    /// Every `claimed_at` this delivery has seen would require history; the
    /// scenario tests instead sample `claimed_at` between attempts, so a
    /// direct setter for aging claims is enough.
    pub fn age_claim(&self, event_id: Uuid, consumer_group: &str, claimed_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(d) = inner
            .deliveries
            .iter_mut()
            .find(|d| d.event_id == event_id && d.consumer_group == consumer_group)
        {
            d.claimed_at = Some(claimed_at);
        }
    }
}

#[async_trait]
impl Outbox for MemOutbox {
    async fn append(&self, payload: EventPayload) -> Result<Event> {
        let event = Event::new(payload);
        let mut inner = self.inner.lock().unwrap();

        let event_index = inner.events.len();
        for group in self.registry.subscribers(event.event_type()) {
            inner.deliveries.push(DeliveryRow {
                event_index,
                event_id: event.id,
                consumer_group: group.to_string(),
                status: Status::Pending,
                claimed_at: None,
                delivered_at: None,
                delivery_error: None,
                retry_count: 0,
            });
        }

        inner.events.push(event.clone());
        Ok(event)
    }

    async fn claim(
        &self,
        event_type: &str,
        consumer_group: &str,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedEvent>> {
        let mut inner = self.inner.lock().unwrap();
        let Inner {
            events, deliveries, ..
        } = &mut *inner;

        let mut indices: Vec<usize> = deliveries
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                d.status == Status::Pending
                    && d.consumer_group == consumer_group
                    && events[d.event_index].event_type() == event_type
            })
            .map(|(i, _)| i)
            .collect();
        indices.sort_by_key(|&i| deliveries[i].event_index);
        indices.truncate(batch_size.max(0) as usize);

        let mut claimed = Vec::with_capacity(indices.len());
        for i in indices {
            let row = &mut deliveries[i];
            row.status = Status::Claimed;
            row.claimed_at = Some(now);
            claimed.push(ClaimedEvent {
                event: events[row.event_index].clone(),
                retry_count: row.retry_count,
            });
        }
        Ok(claimed)
    }

    async fn ack(&self, event_id: Uuid, consumer_group: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner
            .deliveries
            .iter_mut()
            .find(|d| d.event_id == event_id && d.consumer_group == consumer_group)
        else {
            return Ok(false);
        };

        // `delivered` is terminal and the transition fires at most once.
        if row.status != Status::Claimed {
            return Ok(false);
        }
        row.status = Status::Delivered;
        row.delivered_at = Some(now);
        Ok(true)
    }

    async fn fail(
        &self,
        event_id: Uuid,
        consumer_group: &str,
        error: &str,
        max_retries: i32,
        _now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let mut inner = self.inner.lock().unwrap();
        let Some(row) = inner
            .deliveries
            .iter_mut()
            .find(|d| d.event_id == event_id && d.consumer_group == consumer_group)
        else {
            anyhow::bail!("no delivery for event {event_id} group {consumer_group}");
        };

        if row.status != Status::Claimed {
            anyhow::bail!(
                "fail on delivery in state {} (event {event_id})",
                row.status.as_str()
            );
        }

        row.retry_count += 1;
        row.delivery_error = Some(error.to_string());
        if row.retry_count > max_retries {
            row.status = Status::Failed;
            Ok(DeliveryOutcome::Parked)
        } else {
            row.status = Status::Pending;
            row.claimed_at = None;
            Ok(DeliveryOutcome::Requeued {
                retry_count: row.retry_count,
            })
        }
    }

    async fn reclaim_stale(&self, claim_timeout: Duration, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.lock().unwrap();
        let mut count = 0;
        for row in inner.deliveries.iter_mut() {
            if row.status != Status::Claimed {
                continue;
            }
            let Some(claimed_at) = row.claimed_at else {
                continue;
            };
            if claimed_at + claim_timeout < now {
                row.status = Status::Pending;
                row.claimed_at = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn queue_depth(&self, consumer_group: &str) -> Result<i64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .deliveries
            .iter()
            .filter(|d| d.consumer_group == consumer_group && d.status == Status::Pending)
            .count() as i64)
    }
}
