//! The pull-based worker loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use osa_types::{Event, OsaError};

use crate::handler::EventHandler;
use crate::outbox::{DeliveryOutcome, Outbox};

/// Ceiling for the failure backoff, regardless of retry count.
const BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Tuning for a single worker, supplied by its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Max events claimed per batch.
    pub batch_size: i64,
    /// Max wall time a batch may take before its claim is at risk.
    pub batch_timeout: Duration,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Consecutive failures before a delivery is parked as `failed`.
    pub max_retries: i32,
    /// Age after which a claim is considered orphaned and reclaimable.
    /// Must exceed `batch_timeout`, otherwise the janitor could steal a
    /// batch that is still being processed.
    pub claim_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            batch_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            max_retries: 3,
            claim_timeout: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Bounds check, run for every handler at pool construction.
    pub fn validate(&self, owner: &str) -> Result<(), OsaError> {
        if self.batch_size < 1 {
            return Err(OsaError::configuration(format!(
                "{owner}: batch_size must be >= 1"
            )));
        }
        if self.batch_timeout.is_zero() {
            return Err(OsaError::configuration(format!(
                "{owner}: batch_timeout must be > 0"
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(OsaError::configuration(format!(
                "{owner}: poll_interval must be > 0"
            )));
        }
        if self.max_retries < 0 {
            return Err(OsaError::configuration(format!(
                "{owner}: max_retries must be >= 0"
            )));
        }
        if self.claim_timeout <= self.batch_timeout {
            return Err(OsaError::configuration(format!(
                "{owner}: claim_timeout must be > batch_timeout"
            )));
        }
        Ok(())
    }
}

/// Live counters for one worker, shared with the telemetry surface.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// One long-running worker bound to a `(event type, consumer group)` pair.
pub struct Worker {
    handler: Arc<dyn EventHandler>,
    outbox: Arc<dyn Outbox>,
    config: WorkerConfig,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(handler: Arc<dyn EventHandler>, outbox: Arc<dyn Outbox>) -> Self {
        let config = handler.worker_config();
        Self {
            handler,
            outbox,
            config,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    /// Handle to this worker's counters; survives the worker task.
    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Claim loop. Runs until cancelled; a batch in flight when the token
    /// fires is finished (acked or failed) before the loop exits, so the
    /// janitor never has to clean up after a graceful shutdown.
    pub async fn run(self, cancel: CancellationToken) {
        let group = self.handler.consumer_group();
        let event_type = self.handler.event_type();
        let mut backoff: Option<Duration> = None;

        info!(group, event_type, "worker started");

        loop {
            let sleep_for = backoff.take().unwrap_or(self.config.poll_interval);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }

            let batch = match self
                .outbox
                .claim(event_type, group, self.config.batch_size, Utc::now())
                .await
            {
                Ok(batch) => batch,
                Err(err) => {
                    warn!(group, error = %format!("{err:#}"), "claim failed");
                    continue;
                }
            };

            if batch.is_empty() {
                continue;
            }

            debug!(group, count = batch.len(), "claimed batch");
            let events: Vec<Event> = batch.iter().map(|c| c.event.clone()).collect();

            match self.handler.handle_batch(&events).await {
                Ok(()) => {
                    for claimed in &batch {
                        if let Err(err) = self
                            .outbox
                            .ack(claimed.event.id, group, Utc::now())
                            .await
                        {
                            warn!(group, event_id = %claimed.event.id,
                                  error = %format!("{err:#}"), "ack failed");
                        }
                    }
                    self.stats
                        .processed
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);
                }
                Err(err) => {
                    // All-or-nothing: an unhandled handler error fails the
                    // entire batch.
                    let message = format!("{err:#}");
                    warn!(group, count = batch.len(), error = %message, "batch failed");
                    self.stats
                        .failed
                        .fetch_add(batch.len() as u64, Ordering::Relaxed);

                    let mut highest_retry = 0;
                    for claimed in &batch {
                        match self
                            .outbox
                            .fail(
                                claimed.event.id,
                                group,
                                &message,
                                self.config.max_retries,
                                Utc::now(),
                            )
                            .await
                        {
                            Ok(DeliveryOutcome::Requeued { retry_count }) => {
                                highest_retry = highest_retry.max(retry_count);
                            }
                            Ok(DeliveryOutcome::Parked) => {
                                warn!(group, event_id = %claimed.event.id,
                                      "delivery parked as failed after retry ceiling");
                            }
                            Err(err) => {
                                warn!(group, event_id = %claimed.event.id,
                                      error = %format!("{err:#}"), "fail-mark failed");
                            }
                        }
                    }
                    backoff = Some(backoff_delay(self.config.poll_interval, highest_retry));
                }
            }
        }

        info!(
            group,
            processed = self.stats.processed(),
            failed = self.stats.failed(),
            "worker stopped"
        );
    }
}

/// `poll_interval · 2^retry_count`, capped.
fn backoff_delay(poll_interval: Duration, retry_count: i32) -> Duration {
    let exp = retry_count.clamp(0, 16) as u32;
    poll_interval
        .saturating_mul(2u32.saturating_pow(exp))
        .min(BACKOFF_CAP)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        WorkerConfig::default().validate("W").unwrap();
    }

    #[test]
    fn bounds_are_enforced() {
        let base = WorkerConfig::default();

        let mut cfg = base.clone();
        cfg.batch_size = 0;
        assert!(cfg.validate("W").is_err());

        let mut cfg = base.clone();
        cfg.batch_timeout = Duration::ZERO;
        assert!(cfg.validate("W").is_err());

        let mut cfg = base.clone();
        cfg.poll_interval = Duration::ZERO;
        assert!(cfg.validate("W").is_err());

        let mut cfg = base.clone();
        cfg.max_retries = -1;
        assert!(cfg.validate("W").is_err());

        let mut cfg = base.clone();
        cfg.claim_timeout = cfg.batch_timeout;
        assert!(cfg.validate("W").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let poll = Duration::from_millis(500);
        assert_eq!(backoff_delay(poll, 0), Duration::from_millis(500));
        assert_eq!(backoff_delay(poll, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(poll, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(poll, 10), BACKOFF_CAP);
        assert_eq!(backoff_delay(poll, i32::MAX), BACKOFF_CAP);
    }
}
