//! Identities, principals, and the role hierarchy.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hierarchical roles with numeric ordering.
///
/// Higher values inherit all permissions of lower values. Gaps allow future
/// role insertion without renumbering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Role {
    Public = 0,
    Depositor = 10,
    Curator = 20,
    Admin = 30,
    Superadmin = 40,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Public => "public",
            Role::Depositor => "depositor",
            Role::Curator => "curator",
            Role::Admin => "admin",
            Role::Superadmin => "superadmin",
        }
    }
}

/// External identity as asserted by an auth provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub provider: String,
    pub subject: String,
}

/// The authenticated identity of the current requester.
///
/// Resolved per-request from the session layer plus a role lookup.
/// Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub identity: ProviderIdentity,
    pub roles: BTreeSet<Role>,
}

impl Principal {
    /// True if any assigned role >= the given role (hierarchy comparison).
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.iter().any(|r| *r >= role)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.has_role(*r))
    }
}

/// The closed sum of caller authorities.
///
/// Matched exhaustively everywhere authority is relevant; there is no open
/// extension point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// Unauthenticated request.
    Anonymous,
    /// Internal worker/background process. Bypasses resource checks.
    System,
    /// Authenticated end user.
    Principal(Principal),
}

impl Identity {
    /// Principal id for audit lines; workers and anonymous callers get
    /// fixed markers.
    pub fn audit_id(&self) -> String {
        match self {
            Identity::Anonymous => "anonymous".to_string(),
            Identity::System => "system".to_string(),
            Identity::Principal(p) => p.user_id.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(roles: &[Role]) -> Principal {
        Principal {
            user_id: Uuid::new_v4(),
            identity: ProviderIdentity {
                provider: "orcid".into(),
                subject: "0000-0001".into(),
            },
            roles: roles.iter().copied().collect(),
        }
    }

    #[test]
    fn hierarchy_is_inherited_downward() {
        let curator = principal(&[Role::Curator]);
        assert!(curator.has_role(Role::Public));
        assert!(curator.has_role(Role::Depositor));
        assert!(curator.has_role(Role::Curator));
        assert!(!curator.has_role(Role::Admin));
    }

    #[test]
    fn any_assigned_role_counts() {
        let mixed = principal(&[Role::Depositor, Role::Superadmin]);
        assert!(mixed.has_role(Role::Admin));
    }

    #[test]
    fn empty_role_set_satisfies_nothing() {
        let none = principal(&[]);
        assert!(!none.has_role(Role::Public));
    }
}
