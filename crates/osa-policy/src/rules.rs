//! The declarative policy set.
//!
//! Rules are a flat list of `(action, role?, relationship?)` records; no
//! rule synthesis, no decorators. Evaluation is first-match-wins per action;
//! no match is a deny. `validate_coverage` runs at startup and aborts boot
//! when any `Action` has no rule at all.

use std::collections::{BTreeSet, HashMap};

use tracing::{info, warn};

use osa_types::{Identity, OsaError, Role};

use crate::action::Action;
use crate::resource::OwnedResource;

/// Relationships between a principal and a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    Owner,
}

/// A single authorization rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub action: Action,
    pub role: Option<Role>,
    pub relationship: Option<Relationship>,
}

impl PolicyRule {
    /// Public rule: anyone, including anonymous callers.
    pub fn public(action: Action) -> Self {
        Self {
            action,
            role: None,
            relationship: None,
        }
    }

    /// Role-gated rule.
    pub fn role(action: Action, role: Role) -> Self {
        Self {
            action,
            role: Some(role),
            relationship: None,
        }
    }

    /// Role-gated rule that also requires resource ownership.
    pub fn owner(action: Action, role: Role) -> Self {
        Self {
            action,
            role: Some(role),
            relationship: Some(Relationship::Owner),
        }
    }
}

/// Declarative set of all authorization rules.
pub struct PolicySet {
    rules: Vec<PolicyRule>,
    by_action: HashMap<Action, Vec<usize>>,
}

impl PolicySet {
    pub fn new(rules: Vec<PolicyRule>) -> Self {
        let mut by_action: HashMap<Action, Vec<usize>> = HashMap::new();
        for (i, rule) in rules.iter().enumerate() {
            by_action.entry(rule.action).or_default().push(i);
        }
        Self { rules, by_action }
    }

    /// Return on allow, `Authorization` error on deny.
    ///
    /// `System` identities are internal workers and are always allowed.
    /// Every decision emits an audit line with the caller and action.
    pub fn guard(
        &self,
        identity: &Identity,
        action: Action,
        resource: Option<&dyn OwnedResource>,
    ) -> Result<(), OsaError> {
        if matches!(identity, Identity::System) {
            info!(principal = "system", action = action.as_str(), "authorization allowed");
            return Ok(());
        }

        let principal_id = identity.audit_id();
        let indices = self.by_action.get(&action).map(Vec::as_slice).unwrap_or(&[]);

        for &i in indices {
            if self.matches(&self.rules[i], identity, resource) {
                info!(
                    principal = %principal_id,
                    action = action.as_str(),
                    "authorization allowed"
                );
                return Ok(());
            }
        }

        warn!(
            principal = %principal_id,
            action = action.as_str(),
            rules = indices.len(),
            "authorization denied"
        );
        Err(OsaError::denied(format!(
            "access denied: {}",
            action.as_str()
        )))
    }

    fn matches(
        &self,
        rule: &PolicyRule,
        identity: &Identity,
        resource: Option<&dyn OwnedResource>,
    ) -> bool {
        // Public rule: no role required.
        let Some(required_role) = rule.role else {
            return true;
        };

        // Role rules need an authenticated principal.
        let Identity::Principal(principal) = identity else {
            return false;
        };
        if !principal.has_role(required_role) {
            return false;
        }

        match rule.relationship {
            None => true,
            Some(Relationship::Owner) => resource
                .and_then(|r| r.owner_id())
                .is_some_and(|owner_id| owner_id == principal.user_id),
        }
    }

    /// Startup check: every `Action` member must have at least one rule.
    pub fn validate_coverage(&self) -> Result<(), OsaError> {
        let covered: BTreeSet<Action> = self.rules.iter().map(|r| r.action).collect();
        let missing: Vec<&'static str> = Action::ALL
            .iter()
            .filter(|a| !covered.contains(a))
            .map(|a| a.as_str())
            .collect();

        if !missing.is_empty() {
            return Err(OsaError::configuration(format!(
                "actions without policy rules: {}",
                missing.join(", ")
            )));
        }
        Ok(())
    }
}

/// The production policy set.
pub fn default_policy_set() -> PolicySet {
    use PolicyRule as R;

    PolicySet::new(vec![
        // Public reads (no auth required)
        R::public(Action::RecordRead),
        R::public(Action::SearchQuery),
        R::public(Action::SchemaRead),
        R::public(Action::ConventionRead),
        R::public(Action::OntologyRead),
        R::public(Action::ValidationRead),
        // Depositions (ownership-scoped)
        R::role(Action::DepositionCreate, Role::Depositor),
        R::owner(Action::DepositionRead, Role::Depositor),
        R::owner(Action::DepositionUpdate, Role::Depositor),
        R::owner(Action::DepositionSubmit, Role::Depositor),
        R::owner(Action::DepositionDelete, Role::Depositor),
        // Curators can read all depositions (no ownership required)
        R::role(Action::DepositionRead, Role::Curator),
        R::role(Action::DepositionApprove, Role::Curator),
        R::role(Action::DepositionReject, Role::Curator),
        // Registry (admin-only writes)
        R::role(Action::SchemaCreate, Role::Admin),
        R::role(Action::SchemaUpdate, Role::Admin),
        R::role(Action::SchemaDelete, Role::Admin),
        R::role(Action::ConventionCreate, Role::Admin),
        R::role(Action::ConventionUpdate, Role::Admin),
        R::role(Action::ConventionDelete, Role::Admin),
        R::role(Action::OntologyCreate, Role::Admin),
        R::role(Action::OntologyUpdate, Role::Admin),
        R::role(Action::OntologyDelete, Role::Admin),
        // Validation
        R::role(Action::ValidationCreate, Role::Depositor),
        // Administration (superadmin-only)
        R::role(Action::RoleAssign, Role::Superadmin),
        R::role(Action::RoleRevoke, Role::Superadmin),
        R::role(Action::RoleRead, Role::Superadmin),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use osa_types::{Principal, ProviderIdentity};
    use uuid::Uuid;

    struct Dep {
        owner: Option<Uuid>,
    }

    impl OwnedResource for Dep {
        fn owner_id(&self) -> Option<Uuid> {
            self.owner
        }
    }

    fn principal(user_id: Uuid, roles: &[Role]) -> Identity {
        Identity::Principal(Principal {
            user_id,
            identity: ProviderIdentity {
                provider: "orcid".into(),
                subject: "s".into(),
            },
            roles: roles.iter().copied().collect(),
        })
    }

    #[test]
    fn default_set_covers_every_action() {
        default_policy_set().validate_coverage().unwrap();
    }

    #[test]
    fn missing_action_fails_coverage() {
        let partial = PolicySet::new(vec![PolicyRule::public(Action::RecordRead)]);
        let err = partial.validate_coverage().unwrap_err();
        assert_eq!(err.code(), "configuration");
    }

    #[test]
    fn public_rules_admit_anonymous() {
        let set = default_policy_set();
        assert!(set
            .guard(&Identity::Anonymous, Action::RecordRead, None)
            .is_ok());
    }

    #[test]
    fn role_rules_reject_anonymous() {
        let set = default_policy_set();
        let err = set
            .guard(&Identity::Anonymous, Action::DepositionCreate, None)
            .unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[test]
    fn ownership_rule_requires_matching_owner() {
        let set = default_policy_set();
        let uid = Uuid::new_v4();
        let me = principal(uid, &[Role::Depositor]);
        let other = principal(Uuid::new_v4(), &[Role::Depositor]);
        let dep = Dep { owner: Some(uid) };

        assert!(set
            .guard(&me, Action::DepositionUpdate, Some(&dep))
            .is_ok());
        assert!(set
            .guard(&other, Action::DepositionUpdate, Some(&dep))
            .is_err());
    }

    #[test]
    fn later_rule_admits_curator_without_ownership() {
        // DEPOSITION_READ has an owner-scoped depositor rule first and a
        // curator rule second; first-match-wins still reaches the second.
        let set = default_policy_set();
        let curator = principal(Uuid::new_v4(), &[Role::Curator]);
        let dep = Dep {
            owner: Some(Uuid::new_v4()),
        };
        assert!(set
            .guard(&curator, Action::DepositionRead, Some(&dep))
            .is_ok());
    }

    #[test]
    fn system_identity_is_always_allowed() {
        let set = default_policy_set();
        assert!(set.guard(&Identity::System, Action::RoleAssign, None).is_ok());
    }

    #[test]
    fn hierarchy_applies_in_guard() {
        let set = default_policy_set();
        let admin = principal(Uuid::new_v4(), &[Role::Admin]);
        // Admin >= Depositor, so deposition:create passes.
        assert!(set
            .guard(&admin, Action::DepositionCreate, None)
            .is_ok());
        // Admin < Superadmin, so role:assign is denied.
        assert!(set.guard(&admin, Action::RoleAssign, None).is_err());
    }
}
