//! Resource-limit grammars shared by the hook and source runners.
//!
//! This is the single canonical memory parser; runners must not grow their
//! own copies.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::OsaError;

fn memory_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]+(?:\.[0-9]+)?)(g|m|k)?i?$").expect("memory regex"))
}

/// Parse a memory string like `2g`, `512m`, `1.5Gi`, or `1048576` into bytes.
///
/// Suffixes are case-insensitive; a trailing `i` is accepted and ignored
/// (`gi` == `g`). No suffix means bytes.
pub fn parse_memory(memory: &str) -> Result<i64, OsaError> {
    let normalized = memory.trim().to_ascii_lowercase();
    let caps = memory_re()
        .captures(&normalized)
        .ok_or_else(|| OsaError::validation(format!("invalid memory format: {memory:?}")))?;

    let amount: f64 = caps[1]
        .parse()
        .map_err(|_| OsaError::validation(format!("invalid memory amount: {memory:?}")))?;

    let bytes = match caps.get(2).map(|m| m.as_str()) {
        Some("g") => amount * 1024.0 * 1024.0 * 1024.0,
        Some("m") => amount * 1024.0 * 1024.0,
        Some("k") => amount * 1024.0,
        None => amount,
        Some(other) => {
            return Err(OsaError::validation(format!("unknown memory unit: {other}")));
        }
    };

    Ok(bytes as i64)
}

/// Parse a CPU count string like `2.0` or `0.5` into Docker NanoCpus.
pub fn parse_nano_cpus(cpu: &str) -> Result<i64, OsaError> {
    let cores: f64 = cpu
        .trim()
        .parse()
        .map_err(|_| OsaError::validation(format!("invalid cpu format: {cpu:?}")))?;
    if !(cores > 0.0) {
        return Err(OsaError::validation(format!("cpu must be positive: {cpu:?}")));
    }
    Ok((cores * 1e9) as i64)
}
