//! Local JSONL index sink.
//!
//! The real search backends live outside the core; this sink materializes
//! each backend's ingest stream as an append-only JSON Lines file so the
//! pipeline is observable end-to-end on a single node.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use osa_handlers::ports::IndexBackend;

pub struct JsonlIndexBackend {
    name: &'static str,
    path: PathBuf,
}

impl JsonlIndexBackend {
    /// One file per backend under `<data_dir>/index/<name>.jsonl`.
    pub fn new(name: &'static str, data_dir: &Path) -> Self {
        Self {
            name,
            path: data_dir.join("index").join(format!("{name}.jsonl")),
        }
    }
}

#[async_trait]
impl IndexBackend for JsonlIndexBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn ingest_batch(&self, records: Vec<(String, Value)>) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;

        for (record_srn, metadata) in records {
            let line = json!({"record_srn": record_srn, "metadata": metadata});
            writeln!(file, "{line}").context("append index line")?;
        }
        Ok(())
    }
}
