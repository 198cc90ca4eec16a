//! Cron-scheduled source runs.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use cron::Schedule;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use osa_config::AppConfig;
use osa_pipeline::Outbox;
use osa_types::EventPayload;

/// Spawn one ticker per source with a configured schedule. Cron expressions
/// are validated up front so a typo aborts boot instead of silently never
/// firing.
pub fn spawn_source_schedules(
    config: &AppConfig,
    outbox: Arc<dyn Outbox>,
    cancel: CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let mut handles = Vec::new();

    for (name, source) in &config.sources {
        let Some(schedule_config) = &source.schedule else {
            continue;
        };

        let schedule = Schedule::from_str(&schedule_config.cron)
            .with_context(|| format!("invalid cron for source {name}: {}", schedule_config.cron))?;
        let limit = schedule_config.limit;
        let name = name.clone();
        let outbox = Arc::clone(&outbox);
        let cancel = cancel.clone();

        handles.push(tokio::spawn(async move {
            info!(source = %name, "source schedule started");
            loop {
                let now = Utc::now();
                let Some(next) = schedule.after(&now).next() else {
                    warn!(source = %name, "cron schedule has no future firings");
                    break;
                };
                let delay = (next - now).to_std().unwrap_or_default();

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let request = EventPayload::SourceRequested {
                    source_name: name.clone(),
                    limit,
                    offset: None,
                    since: None,
                };
                if let Err(err) = outbox.append(request).await {
                    warn!(source = %name, error = %format!("{err:#}"), "scheduled source request failed");
                }
            }
            info!(source = %name, "source schedule stopped");
        }));
    }

    Ok(handles)
}
