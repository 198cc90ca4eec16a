//! Validation orchestration: creating runs and executing hooks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use osa_pipeline::{EventHandler, Outbox, WorkerConfig};
use osa_types::{
    Event, EventPayload, HookSnapshot, HookStatus, RunStatus, Srn, SrnKind, ValidationRun,
};

use crate::ports::{ConventionStore, DepositionStore, FileStorage, HookInputs, HookRunner,
    ValidationRunStore};

/// Creates a `ValidationRun` and requests its execution.
///
/// The emitted `ValidationRequested` carries one `HookSnapshot` per
/// configured hook, so the executing side never reads the convention store.
pub struct BeginValidation {
    runs: Arc<dyn ValidationRunStore>,
    conventions: Arc<dyn ConventionStore>,
    outbox: Arc<dyn Outbox>,
    node_domain: String,
}

impl BeginValidation {
    pub const GROUP: &'static str = "BeginValidation";
    pub const EVENT_TYPE: &'static str = "DepositionSubmitted";

    pub fn new(
        runs: Arc<dyn ValidationRunStore>,
        conventions: Arc<dyn ConventionStore>,
        outbox: Arc<dyn Outbox>,
        node_domain: impl Into<String>,
    ) -> Self {
        Self {
            runs,
            conventions,
            outbox,
            node_domain: node_domain.into(),
        }
    }
}

#[async_trait]
impl EventHandler for BeginValidation {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::DepositionSubmitted {
            deposition_srn,
            convention_srn,
        } = &event.payload
        else {
            bail!("unexpected payload for BeginValidation: {}", event.event_type());
        };

        let convention = self
            .conventions
            .get(convention_srn)
            .await?
            .ok_or_else(|| anyhow!("convention not found: {convention_srn}"))?;

        let run_srn = Srn::unversioned(
            self.node_domain.clone(),
            SrnKind::ValidationRun,
            Uuid::new_v4().to_string(),
        )?;
        let run = ValidationRun {
            srn: run_srn.clone(),
            status: RunStatus::Pending,
            results: vec![],
            started_at: None,
            completed_at: None,
            expires_at: None,
        };
        self.runs.save(&run).await?;

        let hooks: Vec<HookSnapshot> = convention.hooks.iter().map(HookSnapshot::of).collect();
        self.outbox
            .append(EventPayload::ValidationRequested {
                deposition_srn: deposition_srn.clone(),
                validation_run_srn: run_srn.clone(),
                hooks,
            })
            .await?;

        info!(run = %run_srn, deposition = %deposition_srn, "validation run created");
        Ok(())
    }
}

/// Executes the hooks of a requested validation run.
///
/// Hooks run sequentially and halt on the first reject or failure. Hook
/// outputs land in the durable workspace under the deposition directory;
/// feature insertion is deferred to record publication.
pub struct ExecuteValidation {
    runs: Arc<dyn ValidationRunStore>,
    depositions: Arc<dyn DepositionStore>,
    hook_runner: Arc<dyn HookRunner>,
    storage: Arc<dyn FileStorage>,
    outbox: Arc<dyn Outbox>,
}

impl ExecuteValidation {
    pub const GROUP: &'static str = "ExecuteValidation";
    pub const EVENT_TYPE: &'static str = "ValidationRequested";

    pub fn new(
        runs: Arc<dyn ValidationRunStore>,
        depositions: Arc<dyn DepositionStore>,
        hook_runner: Arc<dyn HookRunner>,
        storage: Arc<dyn FileStorage>,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        Self {
            runs,
            depositions,
            hook_runner,
            storage,
            outbox,
        }
    }
}

#[async_trait]
impl EventHandler for ExecuteValidation {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    fn worker_config(&self) -> WorkerConfig {
        // Container runs are long; the claim must outlive the slowest hook
        // chain or the janitor would hand the run to a second worker.
        WorkerConfig {
            batch_size: 1,
            claim_timeout: Duration::from_secs(2 * 3600),
            ..WorkerConfig::default()
        }
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::ValidationRequested {
            deposition_srn,
            validation_run_srn,
            hooks,
        } = &event.payload
        else {
            bail!("unexpected payload for ExecuteValidation: {}", event.event_type());
        };

        let mut run = self
            .runs
            .get(validation_run_srn)
            .await?
            .ok_or_else(|| anyhow!("validation run not found: {validation_run_srn}"))?;

        // Idempotence: a re-delivered request for a finished run is a no-op.
        if matches!(
            run.status,
            RunStatus::Completed | RunStatus::Rejected | RunStatus::Failed
        ) {
            info!(run = %validation_run_srn, "validation run already terminal, skipping");
            return Ok(());
        }

        let deposition = self
            .depositions
            .get(deposition_srn)
            .await?
            .ok_or_else(|| anyhow!("deposition not found: {deposition_srn}"))?;

        run.status = RunStatus::Running;
        run.started_at = Some(Utc::now());
        self.runs.save(&run).await?;

        let inputs = HookInputs {
            record_json: deposition.metadata.clone(),
            files_dir: Some(self.storage.deposition_files_dir(deposition_srn)),
            config: None,
        };

        let mut reasons: Vec<String> = vec![];
        let mut halted = false;

        for hook in hooks {
            let workspace = self
                .storage
                .hook_output_dir(deposition_srn, hook.name.as_str());
            let result = self.hook_runner.run(hook, &inputs, &workspace).await;

            match result.status {
                HookStatus::Passed => {
                    run.results.push(result);
                }
                HookStatus::Rejected => {
                    if let Some(reason) = &result.rejection_reason {
                        reasons.push(reason.clone());
                    }
                    run.results.push(result);
                    halted = true;
                }
                HookStatus::Failed => {
                    if let Some(message) = &result.error_message {
                        reasons.push(message.clone());
                    }
                    run.results.push(result);
                    halted = true;
                }
            }
            if halted {
                break;
            }
        }

        run.status = if halted {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        run.completed_at = Some(Utc::now());
        self.runs.save(&run).await?;

        if halted {
            self.outbox
                .append(EventPayload::ValidationFailed {
                    deposition_srn: deposition_srn.clone(),
                    validation_run_srn: validation_run_srn.clone(),
                    reasons,
                })
                .await?;
        } else {
            self.outbox
                .append(EventPayload::ValidationSucceeded {
                    deposition_srn: deposition_srn.clone(),
                    validation_run_srn: validation_run_srn.clone(),
                })
                .await?;
        }

        info!(
            run = %validation_run_srn,
            status = run.status.as_str(),
            hooks = run.results.len(),
            "validation run finished"
        );
        Ok(())
    }
}
