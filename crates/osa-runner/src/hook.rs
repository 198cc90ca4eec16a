//! OCI hook runner.
//!
//! Hooks run fully sandboxed: no network, read-only rootfs, all capabilities
//! dropped, no privilege escalation, bounded pids, tmpfs `/tmp`, and an
//! unprivileged user. The only writable surface is the `/osa/out` mount.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::Docker;
use serde_json::Value;
use tracing::error;

use osa_handlers::ports::{HookInputs, HookRunner};
use osa_types::limits::{parse_memory, parse_nano_cpus};
use osa_types::{HookResult, HookSnapshot, HookStatus};

use crate::container::{force_delete, resolve_image, run_to_exit};
use crate::outcome;
use crate::storage::copy_dir;

pub struct OciHookRunner {
    docker: Docker,
}

impl OciHookRunner {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    async fn execute(
        &self,
        hook: &HookSnapshot,
        inputs: &HookInputs,
        workspace: &Path,
        id_slot: &Mutex<Option<String>>,
    ) -> Result<HookResult> {
        let osa_in = workspace.join("in");
        let osa_out = workspace.join("out");
        fs::create_dir_all(&osa_in).context("create input dir")?;
        fs::create_dir_all(&osa_out).context("create output dir")?;
        // Bind mounts must be absolute for the Docker daemon.
        let osa_in = fs::canonicalize(&osa_in).context("canonicalize input dir")?;
        let osa_out = fs::canonicalize(&osa_out).context("canonicalize output dir")?;

        stage_inputs(&osa_in, hook, inputs)?;

        let memory = parse_memory(&hook.limits.memory)?;
        let nano_cpus = parse_nano_cpus(&hook.limits.cpu)?;
        let image_ref = resolve_image(&self.docker, &hook.image, &hook.digest).await?;

        let body = ContainerCreateBody {
            image: Some(image_ref),
            env: Some(vec!["OSA_IN=/osa/in".into(), "OSA_OUT=/osa/out".into()]),
            user: Some("65534:65534".into()),
            host_config: Some(HostConfig {
                binds: Some(vec![
                    format!("{}:/osa/in:ro", osa_in.display()),
                    format!("{}:/osa/out:rw", osa_out.display()),
                ]),
                memory: Some(memory),
                memory_swap: Some(memory),
                nano_cpus: Some(nano_cpus),
                network_mode: Some("none".into()),
                readonly_rootfs: Some(true),
                cap_drop: Some(vec!["ALL".into()]),
                security_opt: Some(vec!["no-new-privileges".into()]),
                pids_limit: Some(256),
                tmpfs: Some(HashMap::from([(
                    "/tmp".to_string(),
                    "rw,noexec,nosuid,size=100m".to_string(),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };

        let exit = run_to_exit(&self.docker, body, id_slot).await?;

        // Result mapping precedence: rejection beats exit code beats OOM.
        let progress = outcome::parse_progress(&osa_out);

        if let Some(reason) = outcome::find_rejection(&progress) {
            return Ok(HookResult {
                hook_name: hook.name.as_str().to_string(),
                status: HookStatus::Rejected,
                rejection_reason: Some(reason),
                error_message: None,
                progress,
                duration_seconds: 0.0,
            });
        }

        if exit.exit_code != 0 {
            return Ok(HookResult {
                hook_name: hook.name.as_str().to_string(),
                status: HookStatus::Failed,
                rejection_reason: None,
                error_message: Some(format!(
                    "hook exited with code {}: {}",
                    exit.exit_code,
                    outcome::log_tail(&exit.logs)
                )),
                progress,
                duration_seconds: 0.0,
            });
        }

        if exit.oom_killed {
            return Ok(HookResult {
                hook_name: hook.name.as_str().to_string(),
                status: HookStatus::Failed,
                rejection_reason: None,
                error_message: Some("hook killed by OOM".to_string()),
                progress,
                duration_seconds: 0.0,
            });
        }

        // A malformed features.json is a hook failure; the error maps to a
        // failed result in run(). The durable copy stays as the container
        // wrote it; readers normalize object-vs-list at read time.
        outcome::collect_features(&osa_out)?;

        Ok(HookResult {
            hook_name: hook.name.as_str().to_string(),
            status: HookStatus::Passed,
            rejection_reason: None,
            error_message: None,
            progress,
            duration_seconds: 0.0,
        })
    }
}

#[async_trait]
impl HookRunner for OciHookRunner {
    /// Run one hook under the full contract. Never errors: the hard timeout,
    /// Docker failures, and bad limits all map to a `failed` result so retry
    /// decisions stay with the worker.
    async fn run(&self, hook: &HookSnapshot, inputs: &HookInputs, workspace: &Path) -> HookResult {
        let started = Instant::now();
        let timeout = Duration::from_secs(hook.limits.timeout_seconds);
        let id_slot = Mutex::new(None::<String>);

        let outcome = tokio::time::timeout(
            timeout,
            self.execute(hook, inputs, workspace, &id_slot),
        )
        .await;

        // Unconditional cleanup: success, failure, and timeout all land here
        // with whatever container id the run got as far as creating.
        let container_id = id_slot.lock().unwrap().take();
        if let Some(id) = container_id {
            force_delete(&self.docker, &id).await;
        }

        let duration = started.elapsed().as_secs_f64();
        let mut result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                error!(hook = hook.name.as_str(), error = %format!("{err:#}"), "hook run failed");
                failed_result(hook, format!("{err:#}"))
            }
            Err(_) => {
                error!(
                    hook = hook.name.as_str(),
                    timeout_seconds = hook.limits.timeout_seconds,
                    "hook timed out"
                );
                failed_result(
                    hook,
                    format!("hook timed out after {}s", hook.limits.timeout_seconds),
                )
            }
        };
        result.duration_seconds = duration;
        result
    }
}

fn failed_result(hook: &HookSnapshot, message: String) -> HookResult {
    HookResult {
        hook_name: hook.name.as_str().to_string(),
        status: HookStatus::Failed,
        rejection_reason: None,
        error_message: Some(message),
        progress: vec![],
        duration_seconds: 0.0,
    }
}

/// Stage `record.json`, the optional `files/` tree, and the merged
/// `config.json` into the input mount.
fn stage_inputs(osa_in: &Path, hook: &HookSnapshot, inputs: &HookInputs) -> Result<()> {
    fs::write(
        osa_in.join("record.json"),
        serde_json::to_vec(&inputs.record_json)?,
    )
    .context("write record.json")?;

    if let Some(files_dir) = &inputs.files_dir {
        if files_dir.exists() {
            copy_dir(files_dir, &osa_in.join("files"))?;
        }
    }

    let config = merge_config(hook.config.as_ref(), inputs.config.as_ref());
    if let Some(config) = config {
        fs::write(osa_in.join("config.json"), serde_json::to_vec(&config)?)
            .context("write config.json")?;
    }
    Ok(())
}

/// Per-run config overrides the hook's baked-in config key-by-key.
fn merge_config(hook_config: Option<&Value>, run_config: Option<&Value>) -> Option<Value> {
    match (hook_config, run_config) {
        (None, None) => None,
        (Some(config), None) | (None, Some(config)) => Some(config.clone()),
        (Some(base), Some(overlay)) => {
            let mut merged = base.as_object().cloned().unwrap_or_default();
            if let Some(overlay) = overlay.as_object() {
                for (key, value) in overlay {
                    merged.insert(key.clone(), value.clone());
                }
            }
            Some(Value::Object(merged))
        }
    }
}
