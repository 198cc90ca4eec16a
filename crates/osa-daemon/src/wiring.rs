//! Explicit construction of the whole pipeline at startup.
//!
//! Order matters and is spelled out: validate policy coverage and route
//! gates, open the pool and migrate, build the subscription registry from
//! the static handler list, then the outbox, then stores and runners, then
//! the handlers, then the worker pool and schedulers. Anything that fails
//! here aborts boot.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;
use tracing::info;

use osa_config::AppConfig;
use osa_db::{PgDepositionStore, PgFeatureStore, PgOutbox, PgValidationRunStore};
use osa_handlers::ports::{
    ConventionStore, DepositionStore, FeatureStore, FileStorage, HookRunner, IndexBackend,
    SourceRunner, ValidationRunStore,
};
use osa_handlers::{
    BeginValidation, CreateDepositionFromSource, ExecuteValidation, FanOutToIndexBackends,
    InsertRecordFeatures, KeywordIndexHandler, ReturnToDraft, RunSource, TriggerInitialSourceRun,
    VectorIndexHandler,
};
use osa_pipeline::{EventHandler, Outbox, SubscriptionRegistry, WorkerPool};
use osa_policy::{default_policy_set, validate_gates};
use osa_runner::{connect_docker, LocalFileStorage, OciHookRunner, OciSourceRunner};
use osa_types::EventPayload;

use crate::conventions::ConfigConventionStore;
use crate::index_sink::JsonlIndexBackend;
use crate::routes::ROUTE_GATES;
use crate::scheduler::spawn_source_schedules;
use crate::state::AppState;

/// The static handler registry: every `(event type, consumer group)` pair
/// the node subscribes. The worker pool is built from the instances; the
/// outbox fan-out is built from this list. Each entry references the
/// handler type's own constants, so the two cannot drift.
pub const HANDLER_REGISTRY: &[(&str, &str)] = &[
    (CreateDepositionFromSource::EVENT_TYPE, CreateDepositionFromSource::GROUP),
    (BeginValidation::EVENT_TYPE, BeginValidation::GROUP),
    (ExecuteValidation::EVENT_TYPE, ExecuteValidation::GROUP),
    (ReturnToDraft::EVENT_TYPE, ReturnToDraft::GROUP),
    (InsertRecordFeatures::EVENT_TYPE, InsertRecordFeatures::GROUP),
    (FanOutToIndexBackends::EVENT_TYPE, FanOutToIndexBackends::GROUP),
    (KeywordIndexHandler::EVENT_TYPE, KeywordIndexHandler::GROUP),
    (VectorIndexHandler::EVENT_TYPE, VectorIndexHandler::GROUP),
    (TriggerInitialSourceRun::EVENT_TYPE, TriggerInitialSourceRun::GROUP),
    (RunSource::EVENT_TYPE, RunSource::GROUP),
];

pub struct Daemon {
    pub state: Arc<AppState>,
    worker_pool: WorkerPool,
    schedule_handles: Vec<JoinHandle<()>>,
}

impl Daemon {
    /// Stop claim loops, finish in-flight batches, stop schedulers.
    pub async fn shutdown(self) {
        self.worker_pool.shutdown().await;
        for handle in self.schedule_handles {
            let _ = handle.await;
        }
    }
}

pub async fn boot(config: AppConfig, config_hash: String) -> Result<Daemon> {
    // Startup validation first: a hole in the policy set or an undeclared
    // route gate must abort before any worker starts.
    default_policy_set()
        .validate_coverage()
        .context("policy coverage validation failed")?;
    validate_gates(ROUTE_GATES).context("route gate validation failed")?;

    let pool = osa_db::connect_from_env().await?;
    osa_db::migrate(&pool).await?;

    let registry = SubscriptionRegistry::from_pairs(HANDLER_REGISTRY.iter().copied());
    let outbox = Arc::new(PgOutbox::new(pool.clone(), registry));
    let outbox_dyn: Arc<dyn Outbox> = outbox.clone();

    let depositions: Arc<dyn DepositionStore> = Arc::new(PgDepositionStore::new(
        pool.clone(),
        config.node_domain.clone(),
    ));
    let runs: Arc<dyn ValidationRunStore> = Arc::new(PgValidationRunStore::new(pool.clone()));
    let features: Arc<dyn FeatureStore> = Arc::new(PgFeatureStore::new(pool.clone()));

    let convention_store = Arc::new(ConfigConventionStore::from_config(&config)?);

    // Feature tables exist before the first hook can reference them;
    // create_table is idempotent across restarts, and a schema change under
    // an existing hook name is a boot-time conflict.
    for convention in convention_store.conventions() {
        for hook in &convention.hooks {
            features
                .create_table(hook.manifest.name.as_str(), hook)
                .await
                .with_context(|| format!("ensure feature table {}", hook.manifest.name))?;
        }
    }
    let conventions: Arc<dyn ConventionStore> = convention_store;

    let storage: Arc<dyn FileStorage> = Arc::new(LocalFileStorage::new(&config.data_dir));

    let docker = connect_docker()?;
    let hook_runner: Arc<dyn HookRunner> = Arc::new(OciHookRunner::new(docker.clone()));
    let source_runner: Arc<dyn SourceRunner> = Arc::new(OciSourceRunner::new(docker));

    let keyword_backend: Arc<dyn IndexBackend> =
        Arc::new(JsonlIndexBackend::new("keyword", &config.data_dir));
    let vector_backend: Arc<dyn IndexBackend> =
        Arc::new(JsonlIndexBackend::new("vector", &config.data_dir));

    let handlers: Vec<Arc<dyn EventHandler>> = vec![
        Arc::new(CreateDepositionFromSource::new(
            Arc::clone(&depositions),
            Arc::clone(&storage),
            Arc::clone(&outbox_dyn),
        )),
        Arc::new(BeginValidation::new(
            Arc::clone(&runs),
            Arc::clone(&conventions),
            Arc::clone(&outbox_dyn),
            config.node_domain.clone(),
        )),
        Arc::new(ExecuteValidation::new(
            Arc::clone(&runs),
            Arc::clone(&depositions),
            hook_runner,
            Arc::clone(&storage),
            Arc::clone(&outbox_dyn),
        )),
        Arc::new(ReturnToDraft::new(Arc::clone(&depositions))),
        Arc::new(InsertRecordFeatures::new(
            Arc::clone(&depositions),
            Arc::clone(&conventions),
            Arc::clone(&storage),
            features,
        )),
        Arc::new(FanOutToIndexBackends::new(
            Arc::clone(&depositions),
            Arc::clone(&outbox_dyn),
            config.extra_index_backends.clone(),
        )),
        Arc::new(KeywordIndexHandler::new(
            Arc::clone(&depositions),
            keyword_backend,
        )),
        Arc::new(VectorIndexHandler::new(
            Arc::clone(&depositions),
            vector_backend,
        )),
        Arc::new(TriggerInitialSourceRun::new(
            config.sources.clone(),
            Arc::clone(&outbox_dyn),
        )),
        Arc::new(RunSource::new(
            config.sources.clone(),
            source_runner,
            Arc::clone(&storage),
            Arc::clone(&outbox_dyn),
        )),
    ];

    let worker_pool = WorkerPool::start(
        Arc::clone(&outbox_dyn),
        handlers,
        Duration::from_secs(config.janitor_interval_seconds),
    )?;

    let schedule_handles = spawn_source_schedules(
        &config,
        Arc::clone(&outbox_dyn),
        worker_pool.cancellation_token(),
    )?;

    outbox_dyn
        .append(EventPayload::ServerStarted {})
        .await
        .context("append ServerStarted")?;

    info!(
        config_hash = %config_hash,
        node_domain = %config.node_domain,
        handlers = HANDLER_REGISTRY.len(),
        "daemon booted"
    );

    let state = Arc::new(AppState::new(
        pool,
        outbox,
        worker_pool.workers().to_vec(),
        config_hash,
    ));
    Ok(Daemon {
        state,
        worker_pool,
        schedule_handles,
    })
}
