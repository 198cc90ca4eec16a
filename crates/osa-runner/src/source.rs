//! OCI source runner.
//!
//! Differences from the hook runner, all deliberate:
//! - network access enabled (sources call upstream APIs)
//! - writable rootfs (package caches and the like)
//! - three mounts: `/osa/in` (ro), `/osa/out` (rw), `/osa/files` (rw)
//! - window env vars `OSA_SINCE` / `OSA_LIMIT` / `OSA_OFFSET`
//! - output is `records.jsonl` plus optional `session.json`
//!
//! Failures here are real errors (`ExternalService`), not hook-style result
//! values: a failed pull has nothing to validate downstream.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::Docker;
use tracing::error;

use osa_handlers::ports::{SourceInputs, SourceOutput, SourceRunner};
use osa_types::limits::{parse_memory, parse_nano_cpus};
use osa_types::{OsaError, SourceDefinition};

use crate::container::{force_delete, resolve_image, run_to_exit};
use crate::outcome;

pub struct OciSourceRunner {
    docker: Docker,
    /// When running as a sibling container with the Docker socket mounted,
    /// bind paths must be rewritten from this container's data dir to the
    /// host path the daemon can resolve.
    host_data_dir: Option<String>,
    container_data_dir: String,
}

impl OciSourceRunner {
    pub fn new(docker: Docker) -> Self {
        Self {
            docker,
            host_data_dir: None,
            container_data_dir: "/data".to_string(),
        }
    }

    pub fn with_host_translation(
        docker: Docker,
        host_data_dir: impl Into<String>,
        container_data_dir: impl Into<String>,
    ) -> Self {
        Self {
            docker,
            host_data_dir: Some(host_data_dir.into()),
            container_data_dir: container_data_dir.into(),
        }
    }

    fn host_path(&self, path: &Path) -> String {
        let path = path.to_string_lossy();
        match &self.host_data_dir {
            Some(host) => path.replacen(&self.container_data_dir, host, 1),
            None => path.into_owned(),
        }
    }

    async fn execute(
        &self,
        source: &SourceDefinition,
        inputs: &SourceInputs,
        staging_dir: &Path,
        files_dir: &Path,
        output_dir: &Path,
        id_slot: &Mutex<Option<String>>,
    ) -> Result<SourceOutput> {
        let mut env = vec![
            "OSA_IN=/osa/in".to_string(),
            "OSA_OUT=/osa/out".to_string(),
            "OSA_FILES=/osa/files".to_string(),
        ];
        if let Some(since) = &inputs.since {
            env.push(format!("OSA_SINCE={}", since.to_rfc3339()));
        }
        if let Some(limit) = inputs.limit {
            env.push(format!("OSA_LIMIT={limit}"));
        }
        if let Some(offset) = inputs.offset {
            env.push(format!("OSA_OFFSET={offset}"));
        }

        let memory = parse_memory(&source.limits.memory)?;
        let nano_cpus = parse_nano_cpus(&source.limits.cpu)?;
        let image_ref = resolve_image(&self.docker, &source.image, &source.digest).await?;

        let body = ContainerCreateBody {
            image: Some(image_ref),
            env: Some(env),
            host_config: Some(HostConfig {
                binds: Some(vec![
                    format!("{}:/osa/in:ro", self.host_path(staging_dir)),
                    format!("{}:/osa/out:rw", self.host_path(output_dir)),
                    format!("{}:/osa/files:rw", self.host_path(files_dir)),
                ]),
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some(nano_cpus),
                // No network_mode "none" and no readonly rootfs: sources
                // need to reach upstream and unpack toolchains.
                cap_drop: Some(vec!["ALL".into()]),
                security_opt: Some(vec!["no-new-privileges".into()]),
                pids_limit: Some(256),
                ..Default::default()
            }),
            ..Default::default()
        };

        let exit = run_to_exit(&self.docker, body, id_slot).await?;

        if exit.oom_killed {
            return Err(OsaError::external("source killed by OOM").into());
        }
        if exit.exit_code != 0 {
            return Err(OsaError::external(format!(
                "source exited with code {}: {}",
                exit.exit_code,
                outcome::log_tail(&exit.logs)
            ))
            .into());
        }

        Ok(SourceOutput {
            records: outcome::parse_records(output_dir),
            session: outcome::parse_session(output_dir),
        })
    }
}

#[async_trait]
impl SourceRunner for OciSourceRunner {
    async fn run(
        &self,
        source: &SourceDefinition,
        inputs: &SourceInputs,
        files_dir: &Path,
        work_dir: &Path,
    ) -> Result<SourceOutput> {
        fs::create_dir_all(files_dir).context("create files dir")?;
        let staging_dir = work_dir.join("input");
        let output_dir = work_dir.join("output");
        fs::create_dir_all(&staging_dir).context("create staging dir")?;
        fs::create_dir_all(&output_dir).context("create output dir")?;
        // Bind mounts must be absolute for the Docker daemon.
        let files_dir = fs::canonicalize(files_dir).context("canonicalize files dir")?;
        let staging_dir = fs::canonicalize(&staging_dir).context("canonicalize staging dir")?;
        let output_dir = fs::canonicalize(&output_dir).context("canonicalize output dir")?;

        stage_inputs(&staging_dir, source, inputs)?;

        let timeout = Duration::from_secs(source.limits.timeout_seconds);
        let id_slot = Mutex::new(None::<String>);

        let result = tokio::time::timeout(
            timeout,
            self.execute(source, inputs, &staging_dir, &files_dir, &output_dir, &id_slot),
        )
        .await;

        let container_id = id_slot.lock().unwrap().take();
        if let Some(id) = container_id {
            force_delete(&self.docker, &id).await;
        }
        remove_staging(&staging_dir);

        match result {
            Ok(output) => output,
            Err(_) => {
                error!(
                    image = %source.image,
                    timeout_seconds = source.limits.timeout_seconds,
                    "source timed out"
                );
                Err(OsaError::external(format!(
                    "source timed out after {}s",
                    source.limits.timeout_seconds
                ))
                .into())
            }
        }
    }
}

fn stage_inputs(staging_dir: &Path, source: &SourceDefinition, inputs: &SourceInputs) -> Result<()> {
    let config = match (&source.config, &inputs.config) {
        (None, None) => None,
        (Some(config), None) | (None, Some(config)) => Some(config.clone()),
        (Some(base), Some(overlay)) => {
            let mut merged = base.as_object().cloned().unwrap_or_default();
            if let Some(overlay) = overlay.as_object() {
                for (key, value) in overlay {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(serde_json::Value::Object(merged))
        }
    };

    if let Some(config) = config {
        fs::write(staging_dir.join("config.json"), serde_json::to_vec(&config)?)
            .context("write config.json")?;
    }

    if let Some(session) = &inputs.session {
        fs::write(staging_dir.join("session.json"), serde_json::to_vec(session)?)
            .context("write session.json")?;
    }
    Ok(())
}

fn remove_staging(staging_dir: &Path) {
    if let Err(err) = fs::remove_dir_all(staging_dir) {
        if staging_dir.exists() {
            tracing::warn!(dir = %staging_dir.display(), error = %err, "failed to remove staging dir");
        }
    }
}
