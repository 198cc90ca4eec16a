//! osa-config
//!
//! Layered YAML configuration: files merge in order (later overrides
//! earlier, objects deep-merge, arrays replace), the merged document is
//! canonicalized to stable JSON, and the canonical bytes are hashed so every
//! boot can log exactly which configuration it runs under.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use osa_types::{HookDefinition, SourceDefinition};

/// Load + merge YAML files in order, then canonicalize to JSON and hash.
pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());

    for path in paths {
        let text = fs::read_to_string(path).with_context(|| format!("read config: {path}"))?;
        let yaml_value: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parse yaml: {path}"))?;
        let json_value = serde_json::to_value(yaml_value).context("yaml->json conversion failed")?;
        deep_merge(&mut merged, json_value);
    }

    let canonical = canonicalize_json(&merged);

    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let hash = hex::encode(hasher.finalize());

    Ok(LoadedConfig {
        config_json: serde_json::from_str(&canonical).context("canonical json parse failed")?,
        canonical_json: canonical,
        config_hash: hash,
    })
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_json: Value,
    pub canonical_json: String,
    pub config_hash: String,
}

impl LoadedConfig {
    pub fn parse(&self) -> Result<AppConfig> {
        let config: AppConfig = serde_json::from_value(self.config_json.clone())
            .context("config does not match the expected shape")?;
        Ok(config)
    }
}

/// A convention as configured on this node: the hooks a deposition under it
/// must pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConventionEntry {
    pub hooks: Vec<HookDefinition>,
}

/// Typed view of the merged configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// SRN domain of this node, e.g. `edu.example.archive`.
    pub node_domain: String,

    /// Root of the durable workspace (deposition files, hook outputs,
    /// source staging).
    pub data_dir: PathBuf,

    /// HTTP bind address for the daemon, host:port.
    #[serde(default)]
    pub bind_addr: Option<String>,

    /// Registered sources by name.
    #[serde(default)]
    pub sources: BTreeMap<String, SourceDefinition>,

    /// Conventions by SRN string.
    #[serde(default)]
    pub conventions: BTreeMap<String, ConventionEntry>,

    /// Index backends beyond the built-in keyword/vector pair.
    #[serde(default)]
    pub extra_index_backends: Vec<String>,

    /// Stale-claim sweep cadence.
    #[serde(default = "default_janitor_interval")]
    pub janitor_interval_seconds: u64,
}

fn default_janitor_interval() -> u64 {
    60
}

/// Deep-merge: objects merge recursively; arrays replaced; scalars
/// overwritten.
fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dst_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        dst_map.insert(key, value);
                    }
                }
            }
        }
        (dst_slot, src_value) => {
            *dst_slot = src_value;
        }
    }
}

/// Canonicalize JSON by sorting all object keys recursively and emitting
/// compact JSON.
fn canonicalize_json(value: &Value) -> String {
    let sorted = sort_keys(value);
    serde_json::to_string(&sorted).expect("json serialization must not fail")
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for key in keys {
                new.insert(key.clone(), sort_keys(&map[&key]));
            }
            Value::Object(new)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn later_files_override_and_objects_merge() {
        let dir = tempfile::tempdir().unwrap();
        let base = write_yaml(
            &dir,
            "base.yaml",
            "node_domain: edu.example\ndata_dir: /data\njanitor_interval_seconds: 30\n",
        );
        let overlay = write_yaml(&dir, "overlay.yaml", "janitor_interval_seconds: 10\n");

        let loaded = load_layered_yaml(&[&base, &overlay]).unwrap();
        let config = loaded.parse().unwrap();
        assert_eq!(config.node_domain, "edu.example");
        assert_eq!(config.janitor_interval_seconds, 10);
    }

    #[test]
    fn hash_is_stable_across_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_yaml(&dir, "a.yaml", "node_domain: x\ndata_dir: /d\n");
        let b = write_yaml(&dir, "b.yaml", "data_dir: /d\nnode_domain: x\n");

        let loaded_a = load_layered_yaml(&[&a]).unwrap();
        let loaded_b = load_layered_yaml(&[&b]).unwrap();
        assert_eq!(loaded_a.config_hash, loaded_b.config_hash);
    }

    #[test]
    fn sources_and_conventions_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(
            &dir,
            "full.yaml",
            r#"
node_domain: edu.example
data_dir: /data
sources:
  geo:
    image: ghcr.io/osa/geo
    digest: sha256:abc
    convention_srn: urn:osa:edu.example:conv:geo@1.0.0
    schedule:
      cron: "0 0 3 * * *"
      limit: 100
    initial_run:
      limit: 10
conventions:
  "urn:osa:edu.example:conv:geo@1.0.0":
    hooks:
      - image: ghcr.io/osa/check
        digest: sha256:def
        manifest:
          name: basic_check
          record_schema: urn:osa:edu.example:schema:geo@1.0.0
          cardinality: one
          feature_schema:
            columns: []
"#,
        );

        let config = load_layered_yaml(&[&path]).unwrap().parse().unwrap();
        assert_eq!(config.sources.len(), 1);
        let geo = &config.sources["geo"];
        assert_eq!(geo.schedule.as_ref().unwrap().cron, "0 0 3 * * *");
        assert_eq!(geo.initial_run.as_ref().unwrap().limit, Some(10));
        assert_eq!(config.conventions.len(), 1);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_layered_yaml(&["/nonexistent/config.yaml"]).is_err());
    }
}
