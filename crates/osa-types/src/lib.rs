//! osa-types
//!
//! Shared value types for the OSA core: SRNs, safe identifiers, resource
//! limit grammars, roles and identities, hook/source definitions, validation
//! results, the event payload sum, and the domain error taxonomy.
//!
//! Everything here is pure data: no IO, no clocks, no database handles.
//! Higher crates (outbox, runner, feature store) depend on this one; it
//! depends on nothing inside the workspace.

pub mod auth;
pub mod error;
pub mod event;
pub mod hook;
pub mod ident;
pub mod limits;
pub mod source;
pub mod srn;
pub mod validation;

pub use auth::{Identity, Principal, ProviderIdentity, Role};
pub use error::{AuthCode, OsaError};
pub use event::{Event, EventPayload};
pub use hook::{
    Cardinality, ColumnDef, FeatureSchema, HookDefinition, HookLimits, HookManifest, HookSnapshot,
    JsonType,
};
pub use ident::SafeIdent;
pub use source::{InitialRunConfig, SourceDefinition, SourceLimits, SourceScheduleConfig};
pub use srn::{Srn, SrnKind, SrnVersion};
pub use validation::{HookResult, HookStatus, ProgressEntry, RunStatus, ValidationRun};
