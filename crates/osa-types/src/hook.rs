//! Hook definitions: image references, resource limits, and the manifest
//! that drives feature-table creation.
//!
//! A `HookDefinition` is content-addressed (`image@digest`) and immutable;
//! changing a hook's feature schema means publishing a new hook name or a
//! versioned rename, never altering an existing table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ident::SafeIdent;

/// JSON Schema scalar/container types a feature column may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl JsonType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JsonType::String => "string",
            JsonType::Number => "number",
            JsonType::Integer => "integer",
            JsonType::Boolean => "boolean",
            JsonType::Array => "array",
            JsonType::Object => "object",
        }
    }
}

/// Definition of a single column in a feature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: SafeIdent,
    pub json_type: JsonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    pub required: bool,
}

/// Typed column definitions for the features a hook produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FeatureSchema {
    pub columns: Vec<ColumnDef>,
}

/// How many feature rows a hook emits per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// Manifest describing what a hook produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookManifest {
    pub name: SafeIdent,
    pub record_schema: String,
    pub cardinality: Cardinality,
    pub feature_schema: FeatureSchema,
}

/// Resource limits for hook execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookLimits {
    #[serde(default = "HookLimits::default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "HookLimits::default_memory")]
    pub memory: String,
    #[serde(default = "HookLimits::default_cpu")]
    pub cpu: String,
}

impl HookLimits {
    fn default_timeout() -> u64 {
        300
    }

    fn default_memory() -> String {
        "2g".to_string()
    }

    fn default_cpu() -> String {
        "2.0".to_string()
    }
}

impl Default for HookLimits {
    fn default() -> Self {
        Self {
            timeout_seconds: Self::default_timeout(),
            memory: Self::default_memory(),
            cpu: Self::default_cpu(),
        }
    }
}

/// Complete specification for a hook: image reference + manifest + limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDefinition {
    pub image: String,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default)]
    pub limits: HookLimits,
    pub manifest: HookManifest,
}

/// Snapshot of hook configuration carried inside event payloads.
///
/// Contains the subset of `HookDefinition` that downstream consumers need,
/// so they never have to read the producing domain's stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookSnapshot {
    pub name: SafeIdent,
    pub image: String,
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub features: Vec<ColumnDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    #[serde(default)]
    pub limits: HookLimits,
}

impl HookSnapshot {
    /// Capture the event-payload subset of a full definition.
    pub fn of(def: &HookDefinition) -> Self {
        Self {
            name: def.manifest.name.clone(),
            image: def.image.clone(),
            digest: def.digest.clone(),
            features: def.manifest.feature_schema.columns.clone(),
            config: def.config.clone(),
            limits: def.limits.clone(),
        }
    }
}
