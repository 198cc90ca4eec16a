//! Safe SQL identifiers.
//!
//! Hook names become Postgres table names and column names come from hook
//! manifests, so this grammar is the SQL-injection boundary for all dynamic
//! DDL. Nothing that fails this check may ever reach a DDL string.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::OsaError;

fn ident_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]{0,62}$").expect("ident regex"))
}

/// A validated identifier: lowercase alnum/underscore, leading letter,
/// at most 63 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SafeIdent(String);

impl SafeIdent {
    pub fn new(s: impl Into<String>) -> Result<Self, OsaError> {
        let s = s.into();
        if !ident_re().is_match(&s) {
            return Err(OsaError::validation_field(
                format!(
                    "invalid identifier {s:?}: must be lowercase alphanumeric/underscore, \
                     starting with a letter, at most 63 chars"
                ),
                "name",
            ));
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SafeIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SafeIdent {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for SafeIdent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        SafeIdent::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        for ok in ["a", "pocket_detect", "x1", "col_2_b", &"a".repeat(63)] {
            assert!(SafeIdent::new(ok.to_string()).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_injection_shapes() {
        let bad = [
            "",
            "1abc",
            "_abc",
            "Abc",
            "foo; DROP TABLE bar",
            "foo\"",
            "foo'",
            "foo\nbar",
            "foo..bar",
            "foo-bar",
            "foo bar",
            &"a".repeat(64),
        ];
        for b in bad {
            assert!(SafeIdent::new(b.to_string()).is_err(), "{b:?}");
        }
    }
}
