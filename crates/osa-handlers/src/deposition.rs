//! Deposition-side reactions: ingesting source records and rolling back
//! failed validations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use osa_pipeline::{EventHandler, Outbox};
use osa_types::{Event, EventPayload};

use crate::ports::{DepositionStore, FileStorage, SYSTEM_USER_ID};

/// Creates a deposition when a source record is ready.
///
/// The source domain only emits events; this handler owns the deposition
/// side: create, copy metadata, move staged files, submit for validation.
pub struct CreateDepositionFromSource {
    depositions: Arc<dyn DepositionStore>,
    storage: Arc<dyn FileStorage>,
    outbox: Arc<dyn Outbox>,
}

impl CreateDepositionFromSource {
    pub const GROUP: &'static str = "CreateDepositionFromSource";
    pub const EVENT_TYPE: &'static str = "SourceRecordReady";

    pub fn new(
        depositions: Arc<dyn DepositionStore>,
        storage: Arc<dyn FileStorage>,
        outbox: Arc<dyn Outbox>,
    ) -> Self {
        Self {
            depositions,
            storage,
            outbox,
        }
    }
}

#[async_trait]
impl EventHandler for CreateDepositionFromSource {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::SourceRecordReady {
            source_name,
            source_record_id,
            convention_srn,
            metadata,
            staging_dir,
        } = &event.payload
        else {
            bail!("unexpected payload for CreateDepositionFromSource: {}", event.event_type());
        };

        let dep = self
            .depositions
            .create(convention_srn, SYSTEM_USER_ID)
            .await?;

        self.depositions.update_metadata(&dep.srn, metadata).await?;

        self.storage.move_source_files_to_deposition(
            Path::new(staging_dir),
            source_record_id,
            &dep.srn,
        )?;

        // Submit is idempotent by status check; a re-delivered event that
        // already submitted its deposition is a no-op here.
        self.depositions.submit(&dep.srn).await?;
        self.outbox
            .append(EventPayload::DepositionSubmitted {
                deposition_srn: dep.srn.clone(),
                convention_srn: convention_srn.clone(),
            })
            .await?;

        info!(
            deposition = %dep.srn,
            source = %source_name,
            record = %source_record_id,
            "created deposition from source record"
        );
        Ok(())
    }
}

/// Returns a deposition to draft when its validation fails.
pub struct ReturnToDraft {
    depositions: Arc<dyn DepositionStore>,
}

impl ReturnToDraft {
    pub const GROUP: &'static str = "ReturnToDraft";
    pub const EVENT_TYPE: &'static str = "ValidationFailed";

    pub fn new(depositions: Arc<dyn DepositionStore>) -> Self {
        Self { depositions }
    }
}

#[async_trait]
impl EventHandler for ReturnToDraft {
    fn consumer_group(&self) -> &'static str {
        Self::GROUP
    }

    fn event_type(&self) -> &'static str {
        Self::EVENT_TYPE
    }

    async fn handle(&self, event: &Event) -> Result<()> {
        let EventPayload::ValidationFailed {
            deposition_srn,
            reasons,
            ..
        } = &event.payload
        else {
            bail!("unexpected payload for ReturnToDraft: {}", event.event_type());
        };

        // No-op if the deposition has been deleted in the meantime.
        if !self.depositions.return_to_draft(deposition_srn).await? {
            warn!(deposition = %deposition_srn, "deposition not found for return_to_draft");
            return Ok(());
        }

        info!(
            deposition = %deposition_srn,
            reasons = ?reasons,
            "deposition returned to draft"
        );
        Ok(())
    }
}
