//! osa-policy
//!
//! The authorization kernel: a declarative policy set evaluated against the
//! caller's identity, resource-level checks used at repository boundaries,
//! and the per-handler gates validated at startup.
//!
//! Pure in-memory logic. Denials are domain errors, never panics, and are
//! never fed into the worker retry path.

mod action;
mod gate;
mod guarded;
mod resource;
mod rules;

pub use action::Action;
pub use gate::{at_least, public, validate_gates, Gate};
pub use guarded::Guarded;
pub use resource::{has_role, owner, OwnedResource, ResourceCheck};
pub use rules::{default_policy_set, PolicyRule, PolicySet, Relationship};
