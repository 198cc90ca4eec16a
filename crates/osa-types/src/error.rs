//! Domain error taxonomy.
//!
//! Infrastructure code wraps failures in `anyhow` with context; anything that
//! crosses a domain boundary is one of these variants so callers can branch
//! on kind and surface a stable code.

use thiserror::Error;

/// Stable codes for authorization failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthCode {
    /// No credentials presented (401-class).
    MissingToken,
    /// Credentials presented but policy denies (403-class).
    AccessDenied,
}

impl AuthCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthCode::MissingToken => "missing_token",
            AuthCode::AccessDenied => "access_denied",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum OsaError {
    /// Referenced entity absent (404-class).
    #[error("not found: {0}")]
    NotFound(String),

    /// Input fails a declared constraint (422-class).
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        /// The offending field, when one can be named.
        field: Option<String>,
    },

    /// Precondition on entity state not met (409-class).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Uniqueness or duplicate-key collision (409-class).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Policy denial. Never retried.
    #[error("{message}")]
    Authorization { message: String, code: AuthCode },

    /// Startup misconfiguration. Fatal; aborts boot.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Docker, registry, or another external dependency unreachable (503-class).
    #[error("external service error: {0}")]
    ExternalService(String),
}

impl OsaError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        OsaError::NotFound(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        OsaError::Validation {
            message: msg.into(),
            field: None,
        }
    }

    pub fn validation_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        OsaError::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        OsaError::InvalidState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        OsaError::Conflict(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        OsaError::Authorization {
            message: msg.into(),
            code: AuthCode::AccessDenied,
        }
    }

    pub fn missing_token(msg: impl Into<String>) -> Self {
        OsaError::Authorization {
            message: msg.into(),
            code: AuthCode::MissingToken,
        }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        OsaError::Configuration(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        OsaError::ExternalService(msg.into())
    }

    /// Stable machine-readable code for telemetry and HTTP mapping.
    pub fn code(&self) -> &'static str {
        match self {
            OsaError::NotFound(_) => "not_found",
            OsaError::Validation { .. } => "validation",
            OsaError::InvalidState(_) => "invalid_state",
            OsaError::Conflict(_) => "conflict",
            OsaError::Authorization { code, .. } => code.as_str(),
            OsaError::Configuration(_) => "configuration",
            OsaError::ExternalService(_) => "external_service",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(OsaError::not_found("x").code(), "not_found");
        assert_eq!(OsaError::denied("x").code(), "access_denied");
        assert_eq!(OsaError::missing_token("x").code(), "missing_token");
        assert_eq!(OsaError::conflict("x").code(), "conflict");
    }

    #[test]
    fn validation_carries_field() {
        let err = OsaError::validation_field("bad name", "hook_name");
        match err {
            OsaError::Validation { field, .. } => assert_eq!(field.as_deref(), Some("hook_name")),
            _ => panic!("wrong variant"),
        }
    }
}
