//! HTTP routes: health, status, and queue telemetry.
//!
//! This is the whole HTTP surface of the core. Each route declares its auth
//! gate in `ROUTE_GATES`; startup validation refuses to boot with an
//! undeclared route. Requests carry no session plumbing here, so gated
//! routes evaluate against the anonymous identity.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use osa_policy::Gate;

use crate::state::AppState;

/// Every route handler with its gate. `validate_gates` runs over this list
/// at startup.
pub const ROUTE_GATES: &[(&str, Option<Gate>)] = &[
    ("GetHealth", Some(Gate::Public)),
    ("GetStatus", Some(Gate::Public)),
    ("GetQueueDepths", Some(Gate::Public)),
    ("GetWorkers", Some(Gate::Public)),
];

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/status", get(status))
        .route("/v1/queues", get(queue_depths))
        .route("/v1/workers", get(workers))
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    Json(json!({
        "service": state.build.service,
        "version": state.build.version,
        "status": "ok",
    }))
    .into_response()
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    match osa_db::status(&state.pool).await {
        Ok(db) => Json(json!({
            "service": state.build.service,
            "version": state.build.version,
            "uptime_secs": state.uptime_secs(),
            "config_hash": state.config_hash,
            "db_ok": db.ok,
            "migrated": db.has_deliveries_table,
        }))
        .into_response(),
        Err(err) => error_response(err),
    }
}

async fn queue_depths(State(state): State<Arc<AppState>>) -> Response {
    match state.outbox.queue_depths().await {
        Ok(depths) => {
            let body: Vec<_> = depths
                .iter()
                .map(|d| json!({"consumer_group": d.consumer_group, "pending": d.pending}))
                .collect();
            Json(json!({ "queues": body })).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn workers(State(state): State<Arc<AppState>>) -> Response {
    let body: Vec<_> = state
        .workers
        .iter()
        .map(|w| {
            json!({
                "consumer_group": w.consumer_group,
                "event_type": w.event_type,
                "processed": w.processed(),
                "failed": w.failed(),
            })
        })
        .collect();
    Json(json!({ "workers": body })).into_response()
}

fn error_response(err: anyhow::Error) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": format!("{err:#}")})),
    )
        .into_response()
}
