//! Ports consumed by the event handlers.
//!
//! Boolean returns mark idempotent no-ops (`Ok(false)` = nothing to do), so
//! handlers stay safe under re-delivery without downcasting errors.

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use osa_types::{HookDefinition, HookResult, HookSnapshot, Srn, ValidationRun};

/// Owner recorded on depositions created by internal workers.
pub const SYSTEM_USER_ID: Uuid = Uuid::nil();

/// Deposition lifecycle. `record_srn` is set at publication and immutable
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositionStatus {
    Draft,
    Submitted,
    Published,
}

impl DepositionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepositionStatus::Draft => "draft",
            DepositionStatus::Submitted => "submitted",
            DepositionStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "draft" => DepositionStatus::Draft,
            "submitted" => DepositionStatus::Submitted,
            "published" => DepositionStatus::Published,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Deposition {
    pub srn: Srn,
    pub convention_srn: Srn,
    pub owner_id: Uuid,
    pub status: DepositionStatus,
    pub metadata: Value,
    pub record_srn: Option<Srn>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait DepositionStore: Send + Sync {
    async fn create(&self, convention_srn: &Srn, owner_id: Uuid) -> Result<Deposition>;

    async fn get(&self, srn: &Srn) -> Result<Option<Deposition>>;

    /// Replace the deposition's metadata. `Ok(false)` when it no longer
    /// exists.
    async fn update_metadata(&self, srn: &Srn, metadata: &Value) -> Result<bool>;

    /// `draft → submitted`. Idempotent by status check: already-submitted
    /// returns `Ok(false)`; submitting a published deposition is an error.
    async fn submit(&self, srn: &Srn) -> Result<bool>;

    /// `submitted|published → draft`. `Ok(false)` when the deposition no
    /// longer exists.
    async fn return_to_draft(&self, srn: &Srn) -> Result<bool>;
}

#[async_trait]
pub trait ValidationRunStore: Send + Sync {
    async fn save(&self, run: &ValidationRun) -> Result<()>;
    async fn get(&self, srn: &Srn) -> Result<Option<ValidationRun>>;
}

/// Per-hook feature tables: safe DDL plus bulk insert.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Create the hook's feature table and register it in the catalog.
    /// A name collision with a different schema is a conflict.
    async fn create_table(&self, hook_name: &str, hook: &HookDefinition) -> Result<()>;

    /// Bulk-insert feature rows keyed by `record_srn`; returns the inserted
    /// count. Re-inserting for the same `(record_srn, hook)` replaces the
    /// previous rows inside one transaction.
    async fn insert_features(
        &self,
        hook_name: &str,
        record_srn: &str,
        rows: &[Value],
    ) -> Result<u64>;
}

/// A convention bundles the hooks a deposition must pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Convention {
    pub srn: Srn,
    pub hooks: Vec<HookDefinition>,
}

#[async_trait]
pub trait ConventionStore: Send + Sync {
    async fn get(&self, srn: &Srn) -> Result<Option<Convention>>;
}

/// Durable workspace layout: deposition directories, staged source files,
/// and hook output trees. Small local files; the trait is synchronous.
pub trait FileStorage: Send + Sync {
    /// Directory of data files attached to a deposition.
    fn deposition_files_dir(&self, deposition: &Srn) -> PathBuf;

    /// Durable output directory for one hook run of a deposition.
    fn hook_output_dir(&self, deposition: &Srn, hook_name: &str) -> PathBuf;

    fn hook_features_exist(&self, deposition: &Srn, hook_name: &str) -> bool;

    /// Read back `features.json` written by a hook. A single object is
    /// returned as a one-element list.
    fn read_hook_features(&self, deposition: &Srn, hook_name: &str) -> Result<Vec<Value>>;

    /// Move the staged files of one source record into the deposition's
    /// files directory. Staged files live under
    /// `<staging_dir>/<source_record_id>/`.
    fn move_source_files_to_deposition(
        &self,
        staging_dir: &Path,
        source_record_id: &str,
        deposition: &Srn,
    ) -> Result<()>;

    /// Writable directory a source container fills with record files.
    fn source_files_dir(&self, source_name: &str) -> PathBuf;

    /// Scratch directory for one source run's `in/` and `out/` mounts.
    fn source_work_dir(&self, source_name: &str) -> PathBuf;

    fn read_source_session(&self, source_name: &str) -> Result<Option<Value>>;

    fn write_source_session(&self, source_name: &str, session: Option<&Value>) -> Result<()>;
}

/// Inputs staged into `/osa/in` for a hook run.
#[derive(Debug, Clone, Default)]
pub struct HookInputs {
    pub record_json: Value,
    pub files_dir: Option<PathBuf>,
    pub config: Option<Value>,
}

/// Executes one hook container run.
///
/// Infallible by contract: every runner-internal error (daemon unreachable,
/// bad image, timeout) is mapped to a `failed` `HookResult` so retry policy
/// stays with the worker.
#[async_trait]
pub trait HookRunner: Send + Sync {
    async fn run(&self, hook: &HookSnapshot, inputs: &HookInputs, workspace: &Path) -> HookResult;
}

/// Inputs for a source container run.
#[derive(Debug, Clone, Default)]
pub struct SourceInputs {
    pub config: Option<Value>,
    pub session: Option<Value>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// What a source run produced: parsed `records.jsonl` lines plus opaque
/// continuation state from `session.json`.
#[derive(Debug, Clone, Default)]
pub struct SourceOutput {
    pub records: Vec<Value>,
    pub session: Option<Value>,
}

#[async_trait]
pub trait SourceRunner: Send + Sync {
    async fn run(
        &self,
        source: &osa_types::SourceDefinition,
        inputs: &SourceInputs,
        files_dir: &Path,
        work_dir: &Path,
    ) -> Result<SourceOutput>;
}

/// Search/index ingestion boundary. Real backends are out of scope; the
/// port exists because index handlers exercise batch delivery.
#[async_trait]
pub trait IndexBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ingest `(record_srn, metadata)` pairs.
    async fn ingest_batch(&self, records: Vec<(String, Value)>) -> Result<()>;
}
