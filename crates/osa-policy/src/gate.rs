//! Handler-level authorization gates.
//!
//! Every command/query handler declares exactly one gate: `public()` or
//! `at_least(role)`. Gates are a coarse pre-filter evaluated before any
//! resource is loaded; resource-scoped decisions stay in the policy set.

use osa_types::{Identity, OsaError, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    /// No authentication required.
    Public,
    /// Requires the principal to hold at least the given role.
    AtLeast(Role),
}

/// Mark a handler as publicly accessible.
pub fn public() -> Gate {
    Gate::Public
}

/// Mark a handler as requiring at least the given role.
pub fn at_least(role: Role) -> Gate {
    Gate::AtLeast(role)
}

impl Gate {
    pub fn check(&self, identity: &Identity) -> Result<(), OsaError> {
        match self {
            Gate::Public => Ok(()),
            Gate::AtLeast(role) => match identity {
                Identity::System => Ok(()),
                Identity::Anonymous => Err(OsaError::missing_token("authentication required")),
                Identity::Principal(p) if p.has_role(*role) => Ok(()),
                Identity::Principal(_) => Err(OsaError::denied(format!(
                    "access denied: requires role {}",
                    role.as_str()
                ))),
            },
        }
    }
}

/// Startup check over the handler registry: every handler must declare a
/// gate. The registry hands in `(handler_name, gate)` pairs with `None`
/// marking a missing declaration; all violations are reported at once.
pub fn validate_gates(handlers: &[(&str, Option<Gate>)]) -> Result<(), OsaError> {
    let missing: Vec<&str> = handlers
        .iter()
        .filter(|(_, gate)| gate.is_none())
        .map(|(name, _)| *name)
        .collect();

    if !missing.is_empty() {
        return Err(OsaError::configuration(format!(
            "handlers without auth gate: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use osa_types::{Principal, ProviderIdentity};
    use uuid::Uuid;

    fn curator() -> Identity {
        Identity::Principal(Principal {
            user_id: Uuid::new_v4(),
            identity: ProviderIdentity {
                provider: "orcid".into(),
                subject: "s".into(),
            },
            roles: [Role::Curator].into_iter().collect(),
        })
    }

    #[test]
    fn public_admits_anyone() {
        assert!(public().check(&Identity::Anonymous).is_ok());
        assert!(public().check(&Identity::System).is_ok());
        assert!(public().check(&curator()).is_ok());
    }

    #[test]
    fn at_least_distinguishes_401_from_403() {
        let gate = at_least(Role::Admin);
        assert_eq!(
            gate.check(&Identity::Anonymous).unwrap_err().code(),
            "missing_token"
        );
        assert_eq!(gate.check(&curator()).unwrap_err().code(), "access_denied");
        assert!(at_least(Role::Depositor).check(&curator()).is_ok());
    }

    #[test]
    fn missing_gate_declarations_fail_startup() {
        let err = validate_gates(&[
            ("SubmitDeposition", Some(at_least(Role::Depositor))),
            ("GetRecord", None),
            ("ListRuns", None),
        ])
        .unwrap_err();
        assert_eq!(err.code(), "configuration");
        let msg = err.to_string();
        assert!(msg.contains("GetRecord") && msg.contains("ListRuns"));
    }

    #[test]
    fn fully_declared_registry_passes() {
        assert!(validate_gates(&[
            ("SubmitDeposition", Some(at_least(Role::Depositor))),
            ("GetRecord", Some(public())),
        ])
        .is_ok());
    }
}
