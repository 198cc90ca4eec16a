//! `Guarded<T>`: a loaded resource that forces an explicit authorization
//! check before use.
//!
//! Repositories hand out `Guarded` values instead of bare aggregates; the
//! only way to the inner resource is `check(action)`, so a call site cannot
//! forget the policy evaluation.

use osa_types::{Identity, OsaError};

use crate::action::Action;
use crate::resource::OwnedResource;
use crate::rules::PolicySet;

pub struct Guarded<'p, T> {
    resource: T,
    identity: Identity,
    policy_set: &'p PolicySet,
}

impl<'p, T: OwnedResource> Guarded<'p, T> {
    pub fn new(resource: T, identity: Identity, policy_set: &'p PolicySet) -> Self {
        Self {
            resource,
            identity,
            policy_set,
        }
    }

    /// Evaluate authorization and return the unwrapped resource.
    pub fn check(self, action: Action) -> Result<T, OsaError> {
        self.policy_set
            .guard(&self.identity, action, Some(&self.resource))?;
        Ok(self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_policy_set;
    use osa_types::{Principal, ProviderIdentity, Role};
    use uuid::Uuid;

    #[derive(Debug)]
    struct Dep {
        owner: Uuid,
    }

    impl OwnedResource for Dep {
        fn owner_id(&self) -> Option<Uuid> {
            Some(self.owner)
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
    fn check_unwraps_for_the_owner() {
        let set = default_policy_set();
        let uid = Uuid::new_v4();
        let guarded = Guarded::new(Dep { owner: uid }, principal(uid, &[Role::Depositor]), &set);
        let dep = guarded.check(Action::DepositionUpdate).unwrap();
        assert_eq!(dep.owner, uid);
    }

    #[test]
    fn check_denies_non_owners() {
        let set = default_policy_set();
        let guarded = Guarded::new(
            Dep {
                owner: Uuid::new_v4(),
            },
            principal(Uuid::new_v4(), &[Role::Depositor]),
            &set,
        );
        let err = guarded.check(Action::DepositionUpdate).unwrap_err();
        assert_eq!(err.code(), "access_denied");
    }

    #[test]
    fn system_identity_passes_any_check() {
        let set = default_policy_set();
        let guarded = Guarded::new(
            Dep {
                owner: Uuid::new_v4(),
            },
            Identity::System,
            &set,
        );
        assert!(guarded.check(Action::DepositionDelete).is_ok());
    }
}
