//! osa-testkit
//!
//! Deterministic in-process doubles for scenario tests: an in-memory outbox
//! that honors the delivery state machine, plus fakes for the handler ports.
//! No Docker, no Postgres, no network.

mod fakes;
mod mem_outbox;

pub use fakes::{
    FakeConventionStore, FakeDepositionStore, FakeHookRunner, FakeSourceRunner,
    FakeValidationRunStore, RecordingFeatureStore, RecordingIndexBackend,
};
pub use mem_outbox::{DeliverySnapshot, MemOutbox};

pub use osa_runner::storage::LocalFileStorage;
