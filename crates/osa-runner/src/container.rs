//! Shared Docker plumbing for hook and source runs.

use anyhow::{Context, Result};
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateImageOptionsBuilder, InspectContainerOptions, LogsOptionsBuilder,
    RemoveContainerOptionsBuilder, StartContainerOptions, WaitContainerOptions,
};
use bollard::Docker;
use futures_util::StreamExt;
use tracing::{info, warn};

/// Connect using the standard environment (DOCKER_HOST or the local socket).
pub fn connect_docker() -> Result<Docker> {
    Docker::connect_with_local_defaults().context("connect to docker daemon")
}

/// Outcome of one container run, before result mapping.
pub(crate) struct ContainerExit {
    pub exit_code: i64,
    pub oom_killed: bool,
    /// Combined stdout/stderr, fetched only when the exit code is non-zero.
    pub logs: String,
}

/// Resolve an image reference, preferring local images over registry pulls:
/// local tag, then local `image@digest`, then pull.
pub(crate) async fn resolve_image(docker: &Docker, image: &str, digest: &str) -> Result<String> {
    if docker.inspect_image(image).await.is_ok() {
        return Ok(image.to_string());
    }

    let digest_ref = format!("{image}@{digest}");
    if docker.inspect_image(&digest_ref).await.is_ok() {
        return Ok(digest_ref);
    }

    info!(image = %digest_ref, "pulling image");
    let options = CreateImageOptionsBuilder::default()
        .from_image(&digest_ref)
        .build();
    let mut pull = docker.create_image(Some(options), None, None);
    while let Some(progress) = pull.next().await {
        progress.context("pull image")?;
    }
    Ok(digest_ref)
}

/// Create, start, and wait for a container, then inspect its exit state.
///
/// The caller owns deletion via [`force_delete`]; this function records the
/// created id through `id_slot` *before* starting, so even a cancelled
/// future (hard timeout) leaves enough state behind to clean up.
pub(crate) async fn run_to_exit(
    docker: &Docker,
    body: ContainerCreateBody,
    id_slot: &std::sync::Mutex<Option<String>>,
) -> Result<ContainerExit> {
    let created = docker
        .create_container(None::<bollard::query_parameters::CreateContainerOptions>, body)
        .await
        .context("create container")?;
    *id_slot.lock().unwrap() = Some(created.id.clone());

    docker
        .start_container(&created.id, None::<StartContainerOptions>)
        .await
        .context("start container")?;

    let exit_code = wait_exit_code(docker, &created.id).await?;

    let inspect = docker
        .inspect_container(&created.id, None::<InspectContainerOptions>)
        .await
        .context("inspect container")?;
    let oom_killed = inspect
        .state
        .as_ref()
        .and_then(|state| state.oom_killed)
        .unwrap_or(false);

    let logs = if exit_code != 0 {
        collect_logs(docker, &created.id).await
    } else {
        String::new()
    };

    Ok(ContainerExit {
        exit_code,
        oom_killed,
        logs,
    })
}

async fn wait_exit_code(docker: &Docker, id: &str) -> Result<i64> {
    let mut wait = docker.wait_container(id, None::<WaitContainerOptions>);
    match wait.next().await {
        Some(Ok(response)) => Ok(response.status_code),
        // A non-zero exit surfaces as a typed error carrying the code; that
        // is a normal hook outcome, not a transport failure.
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
        Some(Err(err)) => Err(err).context("wait for container"),
        None => Ok(-1),
    }
}

async fn collect_logs(docker: &Docker, id: &str) -> String {
    let options = LogsOptionsBuilder::default()
        .stdout(true)
        .stderr(true)
        .build();
    let mut stream = docker.logs(id, Some(options));
    let mut out = String::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(log) => out.push_str(&String::from_utf8_lossy(&log.into_bytes())),
            Err(_) => break,
        }
    }
    out
}

/// Force-delete a container. Failures are logged, never propagated: cleanup
/// must not change a run's outcome.
pub(crate) async fn force_delete(docker: &Docker, id: &str) {
    let options = RemoveContainerOptionsBuilder::default().force(true).build();
    if let Err(err) = docker.remove_container(id, Some(options)).await {
        warn!(container = %id, error = %err, "failed to delete container");
    }
}
