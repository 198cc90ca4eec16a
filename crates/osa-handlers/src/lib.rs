//! osa-handlers
//!
//! Domain reactions to pipeline events, one handler per subscription, plus
//! the ports they consume. Handlers are idempotent keyed on event id; the
//! worker pool re-delivers after crashes and retryable failures.
//!
//! Ports follow the hexagonal direction: this crate declares them, the
//! infrastructure crates (`osa-db`, `osa-runner`, `osa-testkit`) implement
//! them.

pub mod deposition;
pub mod features;
pub mod index;
pub mod ports;
pub mod source;
pub mod validation;

pub use deposition::{CreateDepositionFromSource, ReturnToDraft};
pub use features::InsertRecordFeatures;
pub use index::{FanOutToIndexBackends, KeywordIndexHandler, VectorIndexHandler};
pub use source::{RunSource, TriggerInitialSourceRun};
pub use validation::{BeginValidation, ExecuteValidation};
