//! Domain events.
//!
//! Events are append-only: once written to the outbox they never change.
//! Each payload is a self-contained snapshot so consumers never need
//! cross-domain reads; that is why `ValidationRequested` carries full
//! `HookSnapshot`s instead of hook names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::hook::HookSnapshot;
use crate::srn::Srn;

/// The closed sum of event payloads, tagged by event type name.
///
/// The serialized tag doubles as the `events.type` column and as the key of
/// the subscription registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// Emitted once when the daemon finishes startup.
    ServerStarted {},

    /// Ask for a source container run, optionally windowed.
    SourceRequested {
        source_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        offset: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        since: Option<DateTime<Utc>>,
    },

    /// A source run produced one upstream record, staged on disk.
    SourceRecordReady {
        source_name: String,
        source_record_id: String,
        convention_srn: Srn,
        metadata: Value,
        staging_dir: String,
    },

    /// A source run finished; `session` is opaque continuation state.
    SourceRunCompleted {
        source_name: String,
        record_count: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<Value>,
    },

    /// A deposition was submitted for validation.
    DepositionSubmitted {
        deposition_srn: Srn,
        convention_srn: Srn,
    },

    /// A validation run was created; carries everything hooks need.
    ValidationRequested {
        deposition_srn: Srn,
        validation_run_srn: Srn,
        hooks: Vec<HookSnapshot>,
    },

    ValidationSucceeded {
        deposition_srn: Srn,
        validation_run_srn: Srn,
    },

    ValidationFailed {
        deposition_srn: Srn,
        validation_run_srn: Srn,
        reasons: Vec<String>,
    },

    /// A record became publicly visible in the catalog.
    RecordPublished {
        record_srn: Srn,
        deposition_srn: Srn,
        convention_srn: Srn,
    },

    /// Per-backend indexing request fanned out from `RecordPublished`.
    IndexRecord {
        record_srn: Srn,
        backend: String,
        metadata: Value,
    },
}

impl EventPayload {
    /// The globally-registered type name (the serde tag).
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::ServerStarted {} => "ServerStarted",
            EventPayload::SourceRequested { .. } => "SourceRequested",
            EventPayload::SourceRecordReady { .. } => "SourceRecordReady",
            EventPayload::SourceRunCompleted { .. } => "SourceRunCompleted",
            EventPayload::DepositionSubmitted { .. } => "DepositionSubmitted",
            EventPayload::ValidationRequested { .. } => "ValidationRequested",
            EventPayload::ValidationSucceeded { .. } => "ValidationSucceeded",
            EventPayload::ValidationFailed { .. } => "ValidationFailed",
            EventPayload::RecordPublished { .. } => "RecordPublished",
            EventPayload::IndexRecord { .. } => "IndexRecord",
        }
    }
}

/// An event as appended to (and read back from) the outbox.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            payload,
        }
    }

    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}
