//! Index-side subscribers to record publication.
//!
//! The keyword and vector handlers ingest through the `IndexBackend` port in
//! batches; real backends live outside the core. `FanOutToIndexBackends`
//! re-appends one `IndexRecord` event per externally-registered backend;
//! with none configured those events simply have no subscribers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use osa_pipeline::{EventHandler, Outbox, WorkerConfig};
use osa_types::{Event, EventPayload};

use crate::ports::{DepositionStore, IndexBackend};

fn batch_config() -> WorkerConfig {
    WorkerConfig {
        batch_size: 100,
        poll_interval: Duration::from_secs(1),
        ..WorkerConfig::default()
    }
}

async fn collect_batch(
    depositions: &Arc<dyn DepositionStore>,
    events: &[Event],
) -> Result<Vec<(String, Value)>> {
    let mut records = Vec::with_capacity(events.len());
    for event in events {
        let EventPayload::RecordPublished {
            record_srn,
            deposition_srn,
            ..
        } = &event.payload
        else {
            bail!("unexpected payload for index handler: {}", event.event_type());
        };

        let metadata = depositions
            .get(deposition_srn)
            .await?
            .map(|dep| dep.metadata)
            .unwrap_or(Value::Null);
        records.push((record_srn.to_string(), metadata));
    }
    Ok(records)
}

pub struct KeywordIndexHandler {
    depositions: Arc<dyn DepositionStore>,
    backend: Arc<dyn IndexBackend>,
}

impl KeywordIndexHandler {
    pub const GROUP: &'static str = "KeywordIndexHandler";
    pub const EVENT_TYPE: &'static str = "RecordPublished";

    pub fn new(depositions: Arc<dyn DepositionStore>, backend: Arc<dyn IndexBackend>) -> Self {
        Self {
            depositions,
            backend,
        }
    }
}

#[async_trait]
impl EventHandler for KeywordIndexHandler {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn worker_config(&self) -> WorkerConfig {
        batch_config()
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        self.handle_batch(std::slice::from_ref(event)).await
    }

    async fn handle_batch(&self, events: &[Event]) -> Result<()> {
        let records = collect_batch(&self.depositions, events).await?;
        debug!(backend = self.backend.name(), count = records.len(), "index ingest");
        self.backend.ingest_batch(records).await
    }
}

pub struct VectorIndexHandler {
    depositions: Arc<dyn DepositionStore>,
    backend: Arc<dyn IndexBackend>,
}

impl VectorIndexHandler {
    pub const GROUP: &'static str = "VectorIndexHandler";
    pub const EVENT_TYPE: &'static str = "RecordPublished";

    pub fn new(depositions: Arc<dyn DepositionStore>, backend: Arc<dyn IndexBackend>) -> Self {
        Self {
            depositions,
            backend,
        }
    }
}

#[async_trait]
impl EventHandler for VectorIndexHandler {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn worker_config(&self) -> WorkerConfig {
        batch_config()
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        self.handle_batch(std::slice::from_ref(event)).await
    }

    async fn handle_batch(&self, events: &[Event]) -> Result<()> {
        let records = collect_batch(&self.depositions, events).await?;
        debug!(backend = self.backend.name(), count = records.len(), "index ingest");
        self.backend.ingest_batch(records).await
    }
}

/// Fans one `RecordPublished` out to externally-registered index backends as
/// individual `IndexRecord` events.
pub struct FanOutToIndexBackends {
    depositions: Arc<dyn DepositionStore>,
    outbox: Arc<dyn Outbox>,
    /// Backend names beyond the built-in keyword/vector pair.
    external_backends: Vec<String>,
}

impl FanOutToIndexBackends {
    pub const GROUP: &'static str = "FanOutToIndexBackends";
    pub const EVENT_TYPE: &'static str = "RecordPublished";

    pub fn new(
        depositions: Arc<dyn DepositionStore>,
        outbox: Arc<dyn Outbox>,
        external_backends: Vec<String>,
    ) -> Self {
        Self {
            depositions,
            outbox,
            external_backends,
        }
    }
}

#[async_trait]
impl EventHandler for FanOutToIndexBackends {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::RecordPublished {
            record_srn,
            deposition_srn,
            ..
        } = &event.payload
        else {
            bail!("unexpected payload for FanOutToIndexBackends: {}", event.event_type());
        };

        if self.external_backends.is_empty() {
            return Ok(());
        }

        let metadata = self
            .depositions
            .get(deposition_srn)
            .await?
            .map(|dep| dep.metadata)
            .unwrap_or(Value::Null);

        for backend in &self.external_backends {
            self.outbox
                .append(EventPayload::IndexRecord {
                    record_srn: record_srn.clone(),
                    backend: backend.clone(),
                    metadata: metadata.clone(),
                })
                .await?;
        }
        Ok(())
    }
}
