//! The event handler contract.

use anyhow::Result;
use async_trait::async_trait;

use osa_types::Event;

use crate::worker::WorkerConfig;

/// A pull-based event handler bound to one event type.
///
/// The handler's `consumer_group` names its delivery stream; the worker pool
/// spawns one worker per registered handler. Handlers must be idempotent
/// keyed on `event.id`: within a group event-id order is the claim order,
/// not the completion order, and re-delivery happens after stale-claim
/// recovery or a retryable failure.
///
/// Implement `handle` for single-event processing; override `handle_batch`
/// only when a bulk operation is genuinely cheaper (index ingestion, bulk
/// inserts). An error from either fails the whole batch.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Consumer-group name. One delivery row is created per event per group.
    fn consumer_group(&self) -> &'static str;

    /// The event type this handler subscribes to.
    fn event_type(&self) -> &'static str;

    /// Worker tuning for this handler. The defaults suit single-event
    /// handlers; batch handlers raise `batch_size`.
    fn worker_config(&self) -> WorkerConfig {
        WorkerConfig::default()
    }

    async fn handle(&self, event: &Event) -> Result<()>;

    /// Default batch implementation iterates `handle` over the batch.
    async fn handle_batch(&self, events: &[Event]) -> Result<()> {
        for event in events {
            self.handle(event).await?;
        }
        Ok(())
    }
}
