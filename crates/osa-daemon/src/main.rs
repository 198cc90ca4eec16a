//! osa-daemon entry point.
//!
//! Intentionally thin: tracing, config, boot, HTTP server, graceful
//! shutdown. All wiring lives in `wiring.rs`; all routes in `routes.rs`.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use osa_daemon::{routes, wiring};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Dev convenience; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let config_paths = config_paths_from_env();
    let path_refs: Vec<&str> = config_paths.iter().map(String::as_str).collect();
    let loaded = osa_config::load_layered_yaml(&path_refs)?;
    let config = loaded.parse()?;

    let bind_addr = resolve_bind_addr(config.bind_addr.as_deref())?;
    let daemon = wiring::boot(config, loaded.config_hash.clone()).await?;

    let app = routes::build_router(daemon.state.clone()).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    info!("osa-daemon listening on http://{}", bind_addr);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    daemon.shutdown().await;
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

/// OSA_CONFIG is a comma-separated overlay list in merge order; defaults to
/// a single `config.yaml` in the working directory.
fn config_paths_from_env() -> Vec<String> {
    match std::env::var("OSA_CONFIG") {
        Ok(value) => value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Err(_) => vec!["config.yaml".to_string()],
    }
}

fn resolve_bind_addr(configured: Option<&str>) -> Result<SocketAddr> {
    let text = std::env::var("OSA_DAEMON_ADDR")
        .ok()
        .or_else(|| configured.map(str::to_string))
        .unwrap_or_else(|| "127.0.0.1:8800".to_string());
    text.parse()
        .with_context(|| format!("invalid bind address: {text}"))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
