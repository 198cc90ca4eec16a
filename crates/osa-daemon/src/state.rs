//! Shared runtime state for the daemon's HTTP surface.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sqlx::PgPool;

use osa_db::PgOutbox;
use osa_pipeline::WorkerInfo;

/// Static build metadata included in health/status responses.
#[derive(Clone, Debug, Serialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Cloneable (Arc) handle shared across all Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub build: BuildInfo,
    pub pool: PgPool,
    pub outbox: Arc<PgOutbox>,
    pub workers: Vec<WorkerInfo>,
    pub config_hash: String,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        outbox: Arc<PgOutbox>,
        workers: Vec<WorkerInfo>,
        config_hash: String,
    ) -> Self {
        Self {
            build: BuildInfo {
                service: "osa-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            pool,
            outbox,
            workers,
            config_hash,
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
