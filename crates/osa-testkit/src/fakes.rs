//! Fakes for the handler ports.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use osa_handlers::ports::{
    Convention, ConventionStore, Deposition, DepositionStatus, DepositionStore, FeatureStore,
    HookInputs, HookRunner, IndexBackend, SourceInputs, SourceOutput, SourceRunner,
    ValidationRunStore,
};
use osa_types::{
    HookDefinition, HookResult, HookSnapshot, HookStatus, SourceDefinition, Srn, SrnKind,
    ValidationRun,
};

/// In-memory deposition store with the production status machine.
pub struct FakeDepositionStore {
    node_domain: String,
    seq: AtomicU64,
    rows: Mutex<BTreeMap<String, Deposition>>,
}

impl FakeDepositionStore {
    pub fn new(node_domain: impl Into<String>) -> Self {
        Self {
            node_domain: node_domain.into(),
            seq: AtomicU64::new(1),
            rows: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn insert(&self, dep: Deposition) {
        self.rows.lock().unwrap().insert(dep.srn.to_string(), dep);
    }

    pub fn status_of(&self, srn: &Srn) -> Option<DepositionStatus> {
        self.rows
            .lock()
            .unwrap()
            .get(&srn.to_string())
            .map(|d| d.status)
    }

    pub fn all(&self) -> Vec<Deposition> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl DepositionStore for FakeDepositionStore {
    async fn create(&self, convention_srn: &Srn, owner_id: Uuid) -> Result<Deposition> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst);
        let srn = Srn::unversioned(
            self.node_domain.clone(),
            SrnKind::Deposition,
            format!("dep-{n}"),
        )?;
        let now = Utc::now();
        let dep = Deposition {
            srn: srn.clone(),
            convention_srn: convention_srn.clone(),
            owner_id,
            status: DepositionStatus::Draft,
            metadata: Value::Object(Default::default()),
            record_srn: None,
            created_at: now,
            updated_at: now,
        };
        self.rows
            .lock()
            .unwrap()
            .insert(srn.to_string(), dep.clone());
        Ok(dep)
    }

    async fn get(&self, srn: &Srn) -> Result<Option<Deposition>> {
        Ok(self.rows.lock().unwrap().get(&srn.to_string()).cloned())
    }

    async fn update_metadata(&self, srn: &Srn, metadata: &Value) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&srn.to_string()) {
            Some(dep) => {
                dep.metadata = metadata.clone();
                dep.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn submit(&self, srn: &Srn) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        let Some(dep) = rows.get_mut(&srn.to_string()) else {
            bail!("deposition not found: {srn}");
        };
        match dep.status {
            DepositionStatus::Draft => {
                dep.status = DepositionStatus::Submitted;
                dep.updated_at = Utc::now();
                Ok(true)
            }
            DepositionStatus::Submitted => Ok(false),
            DepositionStatus::Published => bail!("cannot submit published deposition: {srn}"),
        }
    }

    async fn return_to_draft(&self, srn: &Srn) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        match rows.get_mut(&srn.to_string()) {
            Some(dep) => {
                dep.status = DepositionStatus::Draft;
                dep.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct FakeValidationRunStore {
    rows: Mutex<BTreeMap<String, ValidationRun>>,
}

impl FakeValidationRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<ValidationRun> {
        self.rows.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl ValidationRunStore for FakeValidationRunStore {
    async fn save(&self, run: &ValidationRun) -> Result<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(run.srn.to_string(), run.clone());
        Ok(())
    }

    async fn get(&self, srn: &Srn) -> Result<Option<ValidationRun>> {
        Ok(self.rows.lock().unwrap().get(&srn.to_string()).cloned())
    }
}

#[derive(Default)]
pub struct FakeConventionStore {
    rows: Mutex<BTreeMap<String, Convention>>,
}

impl FakeConventionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, convention: Convention) {
        self.rows
            .lock()
            .unwrap()
            .insert(convention.srn.to_string(), convention);
    }
}

#[async_trait]
impl ConventionStore for FakeConventionStore {
    async fn get(&self, srn: &Srn) -> Result<Option<Convention>> {
        Ok(self.rows.lock().unwrap().get(&srn.to_string()).cloned())
    }
}

/// Scripted hook runner. Unscripted hooks pass with no features.
#[derive(Default)]
pub struct FakeHookRunner {
    results: Mutex<BTreeMap<String, HookResult>>,
    invocations: Mutex<Vec<String>>,
}

impl FakeHookRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, hook_name: &str, result: HookResult) {
        self.results
            .lock()
            .unwrap()
            .insert(hook_name.to_string(), result);
    }

    /// Hook names in invocation order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }
}

#[async_trait]
impl HookRunner for FakeHookRunner {
    async fn run(&self, hook: &HookSnapshot, _inputs: &HookInputs, _workspace: &Path) -> HookResult {
        self.invocations
            .lock()
            .unwrap()
            .push(hook.name.as_str().to_string());
        self.results
            .lock()
            .unwrap()
            .get(hook.name.as_str())
            .cloned()
            .unwrap_or_else(|| HookResult {
                hook_name: hook.name.as_str().to_string(),
                status: HookStatus::Passed,
                rejection_reason: None,
                error_message: None,
                progress: vec![],
                duration_seconds: 0.0,
            })
    }
}

/// Scripted source runner.
#[derive(Default)]
pub struct FakeSourceRunner {
    output: Mutex<SourceOutput>,
    runs: Mutex<Vec<SourceInputs>>,
}

impl FakeSourceRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, output: SourceOutput) {
        *self.output.lock().unwrap() = output;
    }

    pub fn runs(&self) -> usize {
        self.runs.lock().unwrap().len()
    }
}

#[async_trait]
impl SourceRunner for FakeSourceRunner {
    async fn run(
        &self,
        _source: &SourceDefinition,
        inputs: &SourceInputs,
        _files_dir: &Path,
        _work_dir: &Path,
    ) -> Result<SourceOutput> {
        self.runs.lock().unwrap().push(inputs.clone());
        Ok(self.output.lock().unwrap().clone())
    }
}

/// Feature store that records inserts instead of touching Postgres, while
/// still enforcing the safe-identifier boundary.
#[derive(Default)]
pub struct RecordingFeatureStore {
    tables: Mutex<BTreeMap<String, Value>>,
    inserts: Mutex<Vec<(String, String, Vec<Value>)>>,
}

impl RecordingFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tables(&self) -> Vec<String> {
        self.tables.lock().unwrap().keys().cloned().collect()
    }

    /// `(hook_name, record_srn, rows)` per insert call, in order.
    pub fn inserts(&self) -> Vec<(String, String, Vec<Value>)> {
        self.inserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeatureStore for RecordingFeatureStore {
    async fn create_table(&self, hook_name: &str, hook: &HookDefinition) -> Result<()> {
        let ident = osa_types::SafeIdent::new(hook_name)?;
        let schema = serde_json::to_value(&hook.manifest.feature_schema)?;
        let mut tables = self.tables.lock().unwrap();
        if let Some(existing) = tables.get(ident.as_str()) {
            if *existing != schema {
                bail!("feature table already exists with a different schema: {ident}");
            }
            return Ok(());
        }
        tables.insert(ident.as_str().to_string(), schema);
        Ok(())
    }

    async fn insert_features(
        &self,
        hook_name: &str,
        record_srn: &str,
        rows: &[Value],
    ) -> Result<u64> {
        let ident = osa_types::SafeIdent::new(hook_name)?;
        let mut inserts = self.inserts.lock().unwrap();
        // Delete-then-insert semantics: drop previous rows for the pair.
        inserts.retain(|(hook, record, _)| !(hook == ident.as_str() && record == record_srn));
        inserts.push((
            ident.as_str().to_string(),
            record_srn.to_string(),
            rows.to_vec(),
        ));
        Ok(rows.len() as u64)
    }
}

/// Index backend that records what was ingested.
pub struct RecordingIndexBackend {
    name: &'static str,
    batches: Mutex<Vec<Vec<(String, Value)>>>,
}

impl RecordingIndexBackend {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batches(&self) -> Vec<Vec<(String, Value)>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn ingested(&self) -> Vec<String> {
        self.batches
            .lock()
            .unwrap()
            .iter()
            .flatten()
            .map(|(srn, _)| srn.clone())
            .collect()
    }
}

#[async_trait]
impl IndexBackend for RecordingIndexBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn ingest_batch(&self, records: Vec<(String, Value)>) -> Result<()> {
        self.batches.lock().unwrap().push(records);
        Ok(())
    }
}
