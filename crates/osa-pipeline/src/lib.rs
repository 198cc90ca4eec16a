//! osa-pipeline
//!
//! The event-driven work pipeline: the `Outbox` port, the `EventHandler`
//! contract, per-handler worker configuration, the pull-based worker loop,
//! the stale-claim janitor, and the subscription registry that drives
//! delivery fan-out.
//!
//! This crate owns no storage. `osa-db` provides the Postgres outbox;
//! `osa-testkit` provides an in-memory one for scenario tests.

mod handler;
mod outbox;
mod pool;
mod registry;
mod worker;

pub use handler::EventHandler;
pub use outbox::{ClaimedEvent, DeliveryOutcome, Outbox};
pub use pool::{Janitor, WorkerInfo, WorkerPool};
pub use registry::SubscriptionRegistry;
pub use worker::{Worker, WorkerConfig, WorkerStats};
