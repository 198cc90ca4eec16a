//! Deferred feature insertion on record publication.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tracing::{debug, error};

use osa_pipeline::EventHandler;
use osa_types::{Event, EventPayload};

use crate::ports::{ConventionStore, DepositionStore, FeatureStore, FileStorage};

/// Reads hook outputs from the durable workspace and inserts them into the
/// per-hook feature tables, keyed by the published record's SRN.
///
/// Idempotent: `FeatureStore::insert_features` replaces any previous rows
/// for the same `(record_srn, hook)` inside one transaction, so re-delivery
/// cannot duplicate features.
pub struct InsertRecordFeatures {
    depositions: Arc<dyn DepositionStore>,
    conventions: Arc<dyn ConventionStore>,
    storage: Arc<dyn FileStorage>,
    features: Arc<dyn FeatureStore>,
}

impl InsertRecordFeatures {
    pub const GROUP: &'static str = "InsertRecordFeatures";
    pub const EVENT_TYPE: &'static str = "RecordPublished";

    pub fn new(
        depositions: Arc<dyn DepositionStore>,
        conventions: Arc<dyn ConventionStore>,
        storage: Arc<dyn FileStorage>,
        features: Arc<dyn FeatureStore>,
    ) -> Self {
        Self {
            depositions,
            conventions,
            storage,
            features,
        }
    }
}

#[async_trait]
impl EventHandler for InsertRecordFeatures {
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
            bail!("unexpected payload for InsertRecordFeatures: {}", event.event_type());
        };

        let Some(dep) = self.depositions.get(deposition_srn).await? else {
            error!(deposition = %deposition_srn, "deposition not found");
            return Ok(());
        };

        let Some(convention) = self.conventions.get(&dep.convention_srn).await? else {
            error!(convention = %dep.convention_srn, "convention not found");
            return Ok(());
        };

        for hook_def in &convention.hooks {
            let hook_name = hook_def.manifest.name.as_str();
            if !self.storage.hook_features_exist(deposition_srn, hook_name) {
                continue;
            }

            let rows = self.storage.read_hook_features(deposition_srn, hook_name)?;
            if rows.is_empty() {
                continue;
            }

            let count = self
                .features
                .insert_features(hook_name, &record_srn.to_string(), &rows)
                .await?;
            debug!(hook = hook_name, record = %record_srn, count, "inserted features");
        }

        Ok(())
    }
}
