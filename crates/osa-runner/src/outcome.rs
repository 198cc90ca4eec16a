//! Pure parsing of container outputs.
//!
//! Everything here works on the `/osa/out` directory after a run and has no
//! Docker dependency, so the result-mapping rules are testable with plain
//! tempdirs.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use osa_types::ProgressEntry;

/// Parse `progress.jsonl`. Missing file means no progress; unparseable
/// lines are skipped, matching what hook authors actually produce.
pub fn parse_progress(out_dir: &Path) -> Vec<ProgressEntry> {
    let path = out_dir.join("progress.jsonl");
    let Ok(text) = fs::read_to_string(&path) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => entries.push(ProgressEntry {
                step: value.get("step").and_then(Value::as_str).map(str::to_string),
                status: value
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string(),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            Err(_) => continue,
        }
    }
    entries
}

/// The rejection message, if any progress entry declared one. The most
/// recent rejected entry wins.
pub fn find_rejection(progress: &[ProgressEntry]) -> Option<String> {
    progress
        .iter()
        .rev()
        .find(|entry| entry.status == "rejected")
        .map(|entry| entry.message.clone().unwrap_or_default())
}

/// Parse `features.json`: a list is kept as-is, a single object is wrapped
/// into a one-element list, a missing file is an empty list.
pub fn collect_features(out_dir: &Path) -> Result<Vec<Value>> {
    let path = out_dir.join("features.json");
    if !path.exists() {
        return Ok(Vec::new());
    }

    let text = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text).context("parse features.json")?;
    Ok(match value {
        Value::Array(items) => items,
        other @ Value::Object(_) => vec![other],
        _ => Vec::new(),
    })
}

/// Parse `records.jsonl` from a source run. Invalid lines are skipped with
/// a warning rather than failing the whole pull.
pub fn parse_records(out_dir: &Path) -> Vec<Value> {
    let path = out_dir.join("records.jsonl");
    let Ok(text) = fs::read_to_string(&path) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(record) => records.push(record),
            Err(_) => {
                warn!("skipping invalid JSON line in records.jsonl");
            }
        }
    }
    records
}

/// Parse the optional `session.json` continuation state.
pub fn parse_session(out_dir: &Path) -> Option<Value> {
    let path = out_dir.join("session.json");
    let text = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&text) {
        Ok(session) => Some(session),
        Err(_) => {
            warn!("invalid session.json");
            None
        }
    }
}

/// Keep the first 500 characters of container logs for error messages.
pub fn log_tail(logs: &str) -> &str {
    let end = logs
        .char_indices()
        .nth(500)
        .map(|(i, _)| i)
        .unwrap_or(logs.len());
    &logs[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn progress_parses_and_skips_garbage() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("progress.jsonl"),
            concat!(
                "{\"status\":\"running\",\"step\":\"load\"}\n",
                "not json\n",
                "\n",
                "{\"status\":\"rejected\",\"message\":\"missing coordinates\"}\n",
            ),
        )
        .unwrap();

        let progress = parse_progress(dir.path());
        assert_eq!(progress.len(), 2);
        assert_eq!(progress[0].step.as_deref(), Some("load"));
        assert_eq!(
            find_rejection(&progress).as_deref(),
            Some("missing coordinates")
        );
    }

    #[test]
    fn missing_progress_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_progress(dir.path()).is_empty());
        assert_eq!(find_rejection(&[]), None);
    }

    #[test]
    fn last_rejection_wins() {
        let entries = vec![
            ProgressEntry {
                step: None,
                status: "rejected".into(),
                message: Some("first".into()),
            },
            ProgressEntry {
                step: None,
                status: "rejected".into(),
                message: Some("second".into()),
            },
        ];
        assert_eq!(find_rejection(&entries).as_deref(), Some("second"));
    }

    #[test]
    fn features_wrap_single_object() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("features.json"), r#"{"pocket_id": 1}"#).unwrap();
        let features = collect_features(dir.path()).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["pocket_id"], 1);
    }

    #[test]
    fn features_keep_lists_and_tolerate_absence() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_features(dir.path()).unwrap().is_empty());

        fs::write(dir.path().join("features.json"), r#"[{"a":1},{"a":2}]"#).unwrap();
        assert_eq!(collect_features(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn malformed_features_are_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("features.json"), "{broken").unwrap();
        assert!(collect_features(dir.path()).is_err());
    }

    #[test]
    fn records_jsonl_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("records.jsonl"),
            "{\"id\":\"a\"}\nnope\n{\"id\":\"b\"}\n",
        )
        .unwrap();
        let records = parse_records(dir.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["id"], "b");
    }

    #[test]
    fn session_roundtrip_and_invalid() {
        let dir = tempfile::tempdir().unwrap();
        assert!(parse_session(dir.path()).is_none());

        fs::write(dir.path().join("session.json"), r#"{"cursor": 42}"#).unwrap();
        assert_eq!(parse_session(dir.path()).unwrap()["cursor"], 42);

        fs::write(dir.path().join("session.json"), "{bad").unwrap();
        assert!(parse_session(dir.path()).is_none());
    }

    #[test]
    fn log_tail_truncates_on_char_boundary() {
        let long = "x".repeat(1000);
        assert_eq!(log_tail(&long).len(), 500);
        assert_eq!(log_tail("short"), "short");
    }
}
