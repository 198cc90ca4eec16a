//! Resource-level authorization checks used by repository decorators.
//!
//! A small closed algebra: `owner()`, `has_role(role)`, and their `|`
//! combinator. Two hard invariants hold for every check: `System` identities
//! bypass everything, and `Anonymous` identities are rejected before any
//! check runs.

use std::ops::BitOr;

use uuid::Uuid;

use osa_types::{Identity, OsaError, Principal, Role};

/// A domain resource that can expose an owner for ownership checks.
pub trait OwnedResource {
    fn owner_id(&self) -> Option<Uuid>;
}

/// Closed set of repository-boundary checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceCheck {
    /// Principal must own the resource (`resource.owner_id == principal.user_id`).
    Owner,
    /// Principal must hold at least the given role.
    HasRole(Role),
    /// At least one sub-check must pass.
    AnyOf(Vec<ResourceCheck>),
}

pub fn owner() -> ResourceCheck {
    ResourceCheck::Owner
}

pub fn has_role(role: Role) -> ResourceCheck {
    ResourceCheck::HasRole(role)
}

impl BitOr for ResourceCheck {
    type Output = ResourceCheck;

    fn bitor(self, rhs: ResourceCheck) -> ResourceCheck {
        match self {
            ResourceCheck::AnyOf(mut checks) => {
                checks.push(rhs);
                ResourceCheck::AnyOf(checks)
            }
            lhs => ResourceCheck::AnyOf(vec![lhs, rhs]),
        }
    }
}

impl ResourceCheck {
    /// Evaluate against an identity and a loaded resource.
    pub fn evaluate(
        &self,
        identity: &Identity,
        resource: &dyn OwnedResource,
    ) -> Result<(), OsaError> {
        let principal = match identity {
            // Workers bypass all resource checks.
            Identity::System => return Ok(()),
            Identity::Anonymous => {
                return Err(OsaError::missing_token("authentication required"));
            }
            Identity::Principal(p) => p,
        };

        self.check(principal, resource)
    }

    fn check(&self, principal: &Principal, resource: &dyn OwnedResource) -> Result<(), OsaError> {
        match self {
            ResourceCheck::Owner => match resource.owner_id() {
                Some(owner_id) if owner_id == principal.user_id => Ok(()),
                _ => Err(OsaError::denied("access denied: not resource owner")),
            },
            ResourceCheck::HasRole(role) => {
                if principal.has_role(*role) {
                    Ok(())
                } else {
                    Err(OsaError::denied(format!(
                        "access denied: requires role {}",
                        role.as_str()
                    )))
                }
            }
            ResourceCheck::AnyOf(checks) => {
                for check in checks {
                    if check.check(principal, resource).is_ok() {
                        return Ok(());
                    }
                }
                Err(OsaError::denied("access denied"))
            }
        }
    }
}
