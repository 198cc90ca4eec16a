//! Worker pool supervision and the stale-claim janitor.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use osa_types::OsaError;

use crate::handler::EventHandler;
use crate::outbox::Outbox;
use crate::worker::{Worker, WorkerStats};

/// Telemetry view of one supervised worker.
#[derive(Clone)]
pub struct WorkerInfo {
    pub consumer_group: &'static str,
    pub event_type: &'static str,
    stats: Arc<WorkerStats>,
}

impl WorkerInfo {
    pub fn processed(&self) -> u64 {
        self.stats.processed()
    }

    pub fn failed(&self) -> u64 {
        self.stats.failed()
    }
}

/// Periodically returns orphaned claims to `pending`.
///
/// This is the recovery mechanism for a worker that crashed mid-batch: its
/// claims age past `claim_timeout` and become claimable again, giving
/// at-least-once delivery.
pub struct Janitor {
    outbox: Arc<dyn Outbox>,
    interval: Duration,
    claim_timeout: Duration,
}

impl Janitor {
    pub fn new(outbox: Arc<dyn Outbox>, interval: Duration, claim_timeout: Duration) -> Self {
        Self {
            outbox,
            interval,
            claim_timeout,
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let claim_timeout =
            chrono::Duration::from_std(self.claim_timeout).unwrap_or(chrono::Duration::zero());
        let mut ticker = tokio::time::interval(self.interval);
        // The immediate first tick would race freshly-started workers.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.outbox.reclaim_stale(claim_timeout, Utc::now()).await {
                Ok(0) => {}
                Ok(count) => info!(count, "reclaimed stale deliveries"),
                Err(err) => warn!(error = %format!("{err:#}"), "reclaim_stale failed"),
            }
        }
    }
}

/// Supervises one worker per registered handler plus the janitor.
///
/// The pool owns a cancellation token: `shutdown` stops all claim loops,
/// lets in-flight batches finish, and joins every task.
pub struct WorkerPool {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
    workers: Vec<WorkerInfo>,
}

impl WorkerPool {
    /// Validate every handler's worker config and spawn the pool.
    ///
    /// The janitor runs with the largest `claim_timeout` of any handler, so
    /// it never reclaims a claim a slower worker may still be processing.
    pub fn start(
        outbox: Arc<dyn Outbox>,
        handlers: Vec<Arc<dyn EventHandler>>,
        janitor_interval: Duration,
    ) -> Result<Self, OsaError> {
        let mut max_claim_timeout = Duration::ZERO;
        for handler in &handlers {
            let config = handler.worker_config();
            config.validate(handler.consumer_group())?;
            max_claim_timeout = max_claim_timeout.max(config.claim_timeout);
        }

        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(handlers.len() + 1);
        let mut workers = Vec::with_capacity(handlers.len());

        for handler in handlers {
            let consumer_group = handler.consumer_group();
            let event_type = handler.event_type();
            let worker = Worker::new(handler, Arc::clone(&outbox));
            workers.push(WorkerInfo {
                consumer_group,
                event_type,
                stats: worker.stats(),
            });
            handles.push(tokio::spawn(worker.run(cancel.child_token())));
        }

        if max_claim_timeout > Duration::ZERO {
            let janitor = Janitor::new(Arc::clone(&outbox), janitor_interval, max_claim_timeout);
            handles.push(tokio::spawn(janitor.run(cancel.child_token())));
        }

        info!(workers = workers.len(), "worker pool started");
        Ok(Self {
            cancel,
            handles,
            workers,
        })
    }

    /// Telemetry handles for all supervised workers. The stats stay live
    /// for as long as the caller holds them, even across shutdown.
    pub fn workers(&self) -> &[WorkerInfo] {
        &self.workers
    }

    /// Stop claiming, let in-flight batches finish, and join every task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task join failed");
            }
        }
        info!("worker pool stopped");
    }

    /// Token observed by all workers; exposed so the daemon can tie pool
    /// lifetime to process signals.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}
