//! Durable workspace layout on the local filesystem.
//!
//! ```text
//! <root>/
//!   depositions/<local>/files/                  data files
//!   depositions/<local>/hooks/<hook>/{in,out}/  per-hook run workspace
//!   sources/<name>/files/<record_id>/           staged source files
//!   sources/<name>/work/                        source run scratch
//!   sources/<name>/session.json                 continuation state
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde_json::Value;

use osa_handlers::ports::FileStorage;
use osa_types::Srn;

pub struct LocalFileStorage {
    root: PathBuf,
}

impl LocalFileStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn deposition_dir(&self, deposition: &Srn) -> PathBuf {
        self.root.join("depositions").join(deposition.local())
    }

    fn source_dir(&self, source_name: &str) -> PathBuf {
        self.root.join("sources").join(source_name)
    }
}

impl FileStorage for LocalFileStorage {
    fn deposition_files_dir(&self, deposition: &Srn) -> PathBuf {
        self.deposition_dir(deposition).join("files")
    }

    fn hook_output_dir(&self, deposition: &Srn, hook_name: &str) -> PathBuf {
        self.deposition_dir(deposition).join("hooks").join(hook_name)
    }

    fn hook_features_exist(&self, deposition: &Srn, hook_name: &str) -> bool {
        self.hook_output_dir(deposition, hook_name)
            .join("out")
            .join("features.json")
            .exists()
    }

    fn read_hook_features(&self, deposition: &Srn, hook_name: &str) -> Result<Vec<Value>> {
        let path = self
            .hook_output_dir(deposition, hook_name)
            .join("out")
            .join("features.json");
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        let value: Value = serde_json::from_str(&text).context("parse features.json")?;
        Ok(match value {
            Value::Array(items) => items,
            other @ Value::Object(_) => vec![other],
            _ => Vec::new(),
        })
    }

    fn move_source_files_to_deposition(
        &self,
        staging_dir: &Path,
        source_record_id: &str,
        deposition: &Srn,
    ) -> Result<()> {
        // The record id comes from upstream JSON; refuse anything that could
        // escape the staging tree.
        validate_record_id(source_record_id)?;

        let record_dir = staging_dir.join(source_record_id);
        if !record_dir.exists() {
            return Ok(());
        }

        let files_dir = self.deposition_files_dir(deposition);
        fs::create_dir_all(&files_dir)
            .with_context(|| format!("create {}", files_dir.display()))?;

        for entry in fs::read_dir(&record_dir)? {
            let entry = entry?;
            let target = files_dir.join(entry.file_name());
            move_path(&entry.path(), &target)?;
        }
        fs::remove_dir_all(&record_dir).ok();
        Ok(())
    }

    fn source_files_dir(&self, source_name: &str) -> PathBuf {
        self.source_dir(source_name).join("files")
    }

    fn source_work_dir(&self, source_name: &str) -> PathBuf {
        self.source_dir(source_name).join("work")
    }

    fn read_source_session(&self, source_name: &str) -> Result<Option<Value>> {
        let path = self.source_dir(source_name).join("session.json");
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        Ok(serde_json::from_str(&text).ok())
    }

    fn write_source_session(&self, source_name: &str, session: Option<&Value>) -> Result<()> {
        let dir = self.source_dir(source_name);
        let path = dir.join("session.json");
        match session {
            Some(session) => {
                fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
                fs::write(&path, serde_json::to_vec(session)?)
                    .with_context(|| format!("write {}", path.display()))?;
            }
            None => {
                fs::remove_file(&path).ok();
            }
        }
        Ok(())
    }
}

fn validate_record_id(record_id: &str) -> Result<()> {
    let ok = !record_id.is_empty()
        && record_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && record_id != "."
        && record_id != "..";
    if !ok {
        bail!("unsafe source record id: {record_id:?}");
    }
    Ok(())
}

/// Rename, falling back to copy+remove across filesystems.
fn move_path(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    if from.is_dir() {
        copy_dir(from, to)?;
        fs::remove_dir_all(from)?;
    } else {
        fs::copy(from, to).with_context(|| format!("copy {}", from.display()))?;
        fs::remove_file(from)?;
    }
    Ok(())
}

/// Recursive directory copy.
pub(crate) fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("create {}", to.display()))?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("copy {}", entry.path().display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn dep_srn() -> Srn {
        "urn:osa:test:dep:d1".parse().unwrap()
    }

    #[test]
    fn layout_is_stable() {
        let storage = LocalFileStorage::new("/data");
        let dep = dep_srn();
        assert_eq!(
            storage.deposition_files_dir(&dep),
            PathBuf::from("/data/depositions/d1/files")
        );
        assert_eq!(
            storage.hook_output_dir(&dep, "pocket_detect"),
            PathBuf::from("/data/depositions/d1/hooks/pocket_detect")
        );
        assert_eq!(
            storage.source_files_dir("geo"),
            PathBuf::from("/data/sources/geo/files")
        );
    }

    #[test]
    fn hook_features_read_back_normalized() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        let dep = dep_srn();

        assert!(!storage.hook_features_exist(&dep, "h1"));

        let out = storage.hook_output_dir(&dep, "h1").join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("features.json"), r#"{"a": 1}"#).unwrap();

        assert!(storage.hook_features_exist(&dep, "h1"));
        let features = storage.read_hook_features(&dep, "h1").unwrap();
        assert_eq!(features, vec![json!({"a": 1})]);
    }

    #[test]
    fn moves_staged_record_files() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        let dep = dep_srn();

        let staging = storage.source_files_dir("geo");
        fs::create_dir_all(staging.join("rec-1")).unwrap();
        fs::write(staging.join("rec-1").join("data.csv"), "1,2,3").unwrap();

        storage
            .move_source_files_to_deposition(&staging, "rec-1", &dep)
            .unwrap();

        assert!(storage.deposition_files_dir(&dep).join("data.csv").exists());
        assert!(!staging.join("rec-1").exists());
    }

    #[test]
    fn missing_record_dir_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        storage
            .move_source_files_to_deposition(&storage.source_files_dir("geo"), "rec-9", &dep_srn())
            .unwrap();
    }

    #[test]
    fn rejects_traversal_record_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(tmp.path());
        for bad in ["..", "../x", "a/b", ""] {
            assert!(
                storage
                    .move_source_files_to_deposition(tmp.path(), bad, &dep_srn())
                    .is_err(),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn session_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = LocalFileStorage::new(tmp.path());

        assert!(storage.read_source_session("geo").unwrap().is_none());
        storage
            .write_source_session("geo", Some(&json!({"cursor": 7})))
            .unwrap();
        assert_eq!(
            storage.read_source_session("geo").unwrap().unwrap()["cursor"],
            7
        );
        storage.write_source_session("geo", None).unwrap();
        assert!(storage.read_source_session("geo").unwrap().is_none());
    }
}
