//! Postgres outbox: append-with-fan-out, SKIP LOCKED claiming, ack/fail,
//! stale-claim recovery, and operator queries.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use osa_pipeline::{ClaimedEvent, DeliveryOutcome, Outbox, SubscriptionRegistry};
use osa_types::{Event, EventPayload};

/// Per-group pending-delivery count, for lag telemetry.
#[derive(Debug, Clone)]
pub struct QueueDepth {
    pub consumer_group: String,
    pub pending: i64,
}

pub struct PgOutbox {
    pool: PgPool,
    registry: SubscriptionRegistry,
}

impl PgOutbox {
    pub fn new(pool: PgPool, registry: SubscriptionRegistry) -> Self {
        Self { pool, registry }
    }

    /// Append inside the caller's transaction: the event row plus one
    /// `pending` delivery per subscribed consumer group commit or roll back
    /// together with the caller's domain writes.
    pub async fn append_in_tx(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        payload: EventPayload,
    ) -> Result<Event> {
        let event = Event::new(payload);

        sqlx::query(
            r#"
            insert into events (id, type, payload, created_at)
            values ($1, $2, $3, $4)
            "#,
        )
        .bind(event.id)
        .bind(event.event_type())
        .bind(serde_json::to_value(&event.payload)?)
        .bind(event.created_at)
        .execute(&mut **tx)
        .await
        .context("insert event failed")?;

        for group in self.registry.subscribers(event.event_type()) {
            sqlx::query(
                r#"
                insert into deliveries (event_id, consumer_group, status, updated_at)
                values ($1, $2, 'pending', $3)
                "#,
            )
            .bind(event.id)
            .bind(group)
            .bind(event.created_at)
            .execute(&mut **tx)
            .await
            .context("insert delivery failed")?;
        }

        Ok(event)
    }

    /// Deliveries parked as `failed` for one consumer group.
    pub async fn list_failed(&self, consumer_group: &str) -> Result<Vec<Uuid>> {
        let rows = sqlx::query(
            r#"
            select event_id
            from deliveries
            where consumer_group = $1 and status = 'failed'
            order by event_id
            "#,
        )
        .bind(consumer_group)
        .fetch_all(&self.pool)
        .await
        .context("list_failed query failed")?;

        rows.iter()
            .map(|row| row.try_get("event_id").map_err(Into::into))
            .collect()
    }

    /// Operator resurrection: return a group's `failed` deliveries to
    /// `pending` with a fresh retry budget. Returns the row count.
    pub async fn retry_failed(&self, consumer_group: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            update deliveries
               set status = 'pending',
                   retry_count = 0,
                   delivery_error = null,
                   claimed_at = null,
                   updated_at = now()
             where consumer_group = $1 and status = 'failed'
            "#,
        )
        .bind(consumer_group)
        .execute(&self.pool)
        .await
        .context("retry_failed update failed")?;

        Ok(result.rows_affected())
    }

    /// Drop `delivered` rows older than the retention window. The events
    /// themselves stay: the log is append-only and pruned separately, if
    /// ever.
    pub async fn prune_delivered(&self, retention: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - retention;
        let result = sqlx::query(
            r#"
            delete from deliveries
             where status = 'delivered'
               and delivered_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .context("prune_delivered failed")?;

        Ok(result.rows_affected())
    }

    /// Pending counts for every consumer group that has backlog.
    pub async fn queue_depths(&self) -> Result<Vec<QueueDepth>> {
        let rows = sqlx::query(
            r#"
            select consumer_group, count(*)::bigint as pending
            from deliveries
            where status = 'pending'
            group by consumer_group
            order by consumer_group
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("queue_depths query failed")?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(QueueDepth {
                consumer_group: row.try_get("consumer_group")?,
                pending: row.try_get("pending")?,
            });
        }
        Ok(out)
    }
}

fn event_from_row(row: &sqlx::postgres::PgRow) -> Result<Event> {
    let id: Uuid = row.try_get("id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let payload_json: serde_json::Value = row.try_get("payload")?;
    let payload: EventPayload =
        serde_json::from_value(payload_json).context("deserialize event payload")?;
    Ok(Event {
        id,
        created_at,
        payload,
    })
}

#[async_trait]
impl Outbox for PgOutbox {
    async fn append(&self, payload: EventPayload) -> Result<Event> {
        let mut tx = self.pool.begin().await.context("begin append tx")?;
        let event = self.append_in_tx(&mut tx, payload).await?;
        tx.commit().await.context("commit append tx")?;
        Ok(event)
    }

    /// Claim up to `batch_size` pending deliveries in event-id order.
    ///
    /// `FOR UPDATE OF d SKIP LOCKED` partitions the unclaimed set atomically:
    /// parallel workers on the same pair never block on, or double-claim,
    /// each other's rows.
    async fn claim(
        &self,
        event_type: &str,
        consumer_group: &str,
        batch_size: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<ClaimedEvent>> {
        let rows = sqlx::query(
            r#"
            with to_claim as (
                select d.id
                from deliveries d
                join events e on e.id = d.event_id
                where d.consumer_group = $1
                  and d.status = 'pending'
                  and e.type = $2
                order by d.event_id
                limit $3
                for update of d skip locked
            )
            update deliveries d
               set status     = 'claimed',
                   claimed_at = $4,
                   updated_at = $4
              from to_claim, events e
             where d.id = to_claim.id
               and e.id = d.event_id
            returning e.id, e.created_at, e.payload, d.retry_count
            "#,
        )
        .bind(consumer_group)
        .bind(event_type)
        .bind(batch_size)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .context("claim query failed")?;

        let mut claimed = Vec::with_capacity(rows.len());
        for row in &rows {
            claimed.push(ClaimedEvent {
                event: event_from_row(row)?,
                retry_count: row.try_get("retry_count")?,
            });
        }
        // RETURNING order is unspecified; hand batches to handlers in
        // event-id order, which is the claim order.
        claimed.sort_by_key(|c| c.event.id);
        Ok(claimed)
    }

    async fn ack(&self, event_id: Uuid, consumer_group: &str, now: DateTime<Utc>) -> Result<bool> {
        // Only claimed rows can become delivered; a second ack finds the row
        // already delivered and is a no-op.
        let row: Option<(i64,)> = sqlx::query_as(
            r#"
            update deliveries
               set status       = 'delivered',
                   delivered_at = $3,
                   updated_at   = $3
             where event_id = $1
               and consumer_group = $2
               and status = 'claimed'
            returning id
            "#,
        )
        .bind(event_id)
        .bind(consumer_group)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("ack update failed")?;

        Ok(row.is_some())
    }

    async fn fail(
        &self,
        event_id: Uuid,
        consumer_group: &str,
        error: &str,
        max_retries: i32,
        now: DateTime<Utc>,
    ) -> Result<DeliveryOutcome> {
        let row: Option<(i32, String)> = sqlx::query_as(
            r#"
            update deliveries
               set retry_count    = retry_count + 1,
                   delivery_error = $3,
                   status         = case when retry_count + 1 > $4 then 'failed' else 'pending' end,
                   claimed_at     = null,
                   updated_at     = $5
             where event_id = $1
               and consumer_group = $2
               and status = 'claimed'
            returning retry_count, status
            "#,
        )
        .bind(event_id)
        .bind(consumer_group)
        .bind(error)
        .bind(max_retries)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .context("fail update failed")?;

        let Some((retry_count, status)) = row else {
            bail!("fail on unclaimed delivery: event {event_id} group {consumer_group}");
        };

        Ok(if status == "failed" {
            DeliveryOutcome::Parked
        } else {
            DeliveryOutcome::Requeued { retry_count }
        })
    }

    async fn reclaim_stale(&self, claim_timeout: Duration, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - claim_timeout;
        let result = sqlx::query(
            r#"
            update deliveries
               set status     = 'pending',
                   claimed_at = null,
                   updated_at = $2
             where status = 'claimed'
               and claimed_at < $1
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("reclaim_stale update failed")?;

        Ok(result.rows_affected())
    }

    async fn queue_depth(&self, consumer_group: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            select count(*)::bigint
            from deliveries
            where consumer_group = $1 and status = 'pending'
            "#,
        )
        .bind(consumer_group)
        .fetch_one(&self.pool)
        .await
        .context("queue_depth query failed")?;

        Ok(count)
    }
}
