//! Source definitions: containers that pull records from upstream origins.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource limits for source container execution.
///
/// Sources get higher defaults than hooks: they talk to upstream APIs and
/// may run long paginated pulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLimits {
    #[serde(default = "SourceLimits::default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "SourceLimits::default_memory")]
    pub memory: String,
    #[serde(default = "SourceLimits::default_cpu")]
    pub cpu: String,
}

impl SourceLimits {
    fn default_timeout() -> u64 {
        3600
    }

    fn default_memory() -> String {
        "4g".to_string()
    }

    fn default_cpu() -> String {
        "2.0".to_string()
    }
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: Self::default_timeout(),
            memory: Self::default_memory(),
            cpu: Self::default_cpu(),
        }
    }
}

/// Cron schedule for periodic source runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceScheduleConfig {
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

/// Configuration for the first source run after server startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitialRunConfig {
    #[serde(default = "InitialRunConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl InitialRunConfig {
    fn default_enabled() -> bool {
        true
    }
}

/// Complete specification for a source: image reference + config + limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub image: String,
    pub digest: String,
    /// Convention new depositions from this source are created under.
    pub convention_srn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default)]
    pub limits: SourceLimits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<SourceScheduleConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_run: Option<InitialRunConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_defaults_are_wider_than_hook_defaults() {
        let limits = SourceLimits::default();
        assert_eq!(limits.timeout_seconds, 3600);
        assert_eq!(limits.memory, "4g");
    }

    #[test]
    fn minimal_definition_parses() {
        let def: SourceDefinition = serde_json::from_value(serde_json::json!({
            "image": "ghcr.io/osa/geo-entrez",
            "digest": "sha256:abc",
            "convention_srn": "urn:osa:x:conv:geo@1.0.0"
        }))
        .unwrap();
        assert!(def.schedule.is_none());
        assert!(def.initial_run.is_none());
    }
}
