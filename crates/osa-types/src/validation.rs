//! Validation runs and per-hook results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::srn::Srn;

/// Outcome of a single hook execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    Passed,
    Rejected,
    Failed,
}

impl HookStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStatus::Passed => "passed",
            HookStatus::Rejected => "rejected",
            HookStatus::Failed => "failed",
        }
    }
}

/// A single progress update emitted by a hook via `progress.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Result of executing a single hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResult {
    pub hook_name: String,
    pub status: HookStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default)]
    pub progress: Vec<ProgressEntry>,
    pub duration_seconds: f64,
}

/// Lifecycle of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Rejected,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Rejected => "rejected",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => RunStatus::Pending,
            "running" => RunStatus::Running,
            "completed" => RunStatus::Completed,
            "rejected" => RunStatus::Rejected,
            "failed" => RunStatus::Failed,
            _ => return None,
        })
    }
}

/// Execution of validation hooks for one deposition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub srn: Srn,
    pub status: RunStatus,
    #[serde(default)]
    pub results: Vec<HookResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidationRun {
    /// Overall summary across hook results: failed wins over rejected wins
    /// over passed. `None` while no hook has run.
    pub fn summary(&self) -> Option<HookStatus> {
        if self.results.is_empty() {
            return None;
        }
        if self.results.iter().any(|r| r.status == HookStatus::Failed) {
            return Some(HookStatus::Failed);
        }
        if self.results.iter().any(|r| r.status == HookStatus::Rejected) {
            return Some(HookStatus::Rejected);
        }
        Some(HookStatus::Passed)
    }
}
