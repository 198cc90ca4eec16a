//! Source-side handlers: triggering and executing upstream pulls.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use osa_pipeline::{EventHandler, Outbox, WorkerConfig};
use osa_types::{Event, EventPayload, SourceDefinition, Srn};

use crate::ports::{FileStorage, SourceInputs, SourceRunner};

/// Requests an initial run for every source configured with one, once the
/// server has started.
pub struct TriggerInitialSourceRun {
    sources: BTreeMap<String, SourceDefinition>,
    outbox: Arc<dyn Outbox>,
}

impl TriggerInitialSourceRun {
    pub const GROUP: &'static str = "TriggerInitialSourceRun";
    pub const EVENT_TYPE: &'static str = "ServerStarted";

    pub fn new(sources: BTreeMap<String, SourceDefinition>, outbox: Arc<dyn Outbox>) -> Self {
        Self { sources, outbox }
    }
}

#[async_trait]
impl EventHandler for TriggerInitialSourceRun {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::ServerStarted {} = &event.payload else {
            bail!("unexpected payload for TriggerInitialSourceRun: {}", event.event_type());
        };

        for (name, source) in &self.sources {
            let Some(initial) = &source.initial_run else {
                continue;
            };
            if !initial.enabled {
                continue;
            }
            self.outbox
                .append(EventPayload::SourceRequested {
                    source_name: name.clone(),
                    limit: initial.limit,
                    offset: None,
                    since: None,
                })
                .await?;
            info!(source = %name, "initial source run requested");
        }
        Ok(())
    }
}

/// Executes a requested source run and emits one `SourceRecordReady` per
/// record the container produced.
///
/// Records are the parsed lines of `records.jsonl`; each record's staged
/// files live under `<files_dir>/<record_id>/`. The opaque `session.json`
/// continuation state is persisted for the next run.
pub struct RunSource {
    sources: BTreeMap<String, SourceDefinition>,
    runner: Arc<dyn SourceRunner>,
    storage: Arc<dyn FileStorage>,
    outbox: Arc<dyn Outbox>,
}

impl RunSource {
    pub const GROUP: &'static str = "RunSource";
    pub const EVENT_TYPE: &'static str = "SourceRequested";

    pub fn new(
        sources: BTreeMap<String, SourceDefinition>,
        runner: Arc<dyn SourceRunner>,
        storage: Arc<dyn FileStorage>,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        Self {
            sources,
            runner,
            storage,
            outbox,
        }
    }
}

#[async_trait]
impl EventHandler for RunSource {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn worker_config(&self) -> WorkerConfig {
        // Source containers may run for up to an hour; keep the claim alive
        // well past the container timeout.
        WorkerConfig {
            batch_size: 1,
            claim_timeout: Duration::from_secs(2 * 3600),
            ..WorkerConfig::default()
        }
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::SourceRequested {
            source_name,
            limit,
            offset,
            since,
        } = &event.payload
        else {
            bail!("unexpected payload for RunSource: {}", event.event_type());
        };

        let Some(source) = self.sources.get(source_name) else {
            bail!("unknown source: {source_name}");
        };
        let convention_srn: Srn = source.convention_srn.parse()?;

        let inputs = SourceInputs {
            config: source.config.clone(),
            session: self.storage.read_source_session(source_name)?,
            since: *since,
            limit: *limit,
            offset: *offset,
        };

        let files_dir = self.storage.source_files_dir(source_name);
        let work_dir = self.storage.source_work_dir(source_name);
        let output = self
            .runner
            .run(source, &inputs, &files_dir, &work_dir)
            .await?;

        let record_count = output.records.len() as u64;
        for (index, record) in output.records.into_iter().enumerate() {
            let record_id = record
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}-{index}", event.id));

            self.outbox
                .append(EventPayload::SourceRecordReady {
                    source_name: source_name.clone(),
                    source_record_id: record_id,
                    convention_srn: convention_srn.clone(),
                    metadata: record,
                    staging_dir: files_dir.to_string_lossy().into_owned(),
                })
                .await?;
        }

        if let Err(err) = self
            .storage
            .write_source_session(source_name, output.session.as_ref())
        {
            warn!(source = %source_name, error = %format!("{err:#}"), "failed to persist session");
        }

        self.outbox
            .append(EventPayload::SourceRunCompleted {
                source_name: source_name.clone(),
                record_count,
                session: output.session,
            })
            .await?;

        info!(source = %source_name, records = record_count, "source run completed");
        Ok(())
    }
}
