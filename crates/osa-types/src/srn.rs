//! Structured Resource Names.
//!
//! Canonical form: `urn:osa:<domain>:<kind>:<local>[@<version>]`.
//!
//! Versioning rules per kind:
//! - `rec` carries an integer generation
//! - `schema`, `conv`, `onto` carry a semver
//! - `dep`, `val`, `evt` are unversioned
//!
//! SRNs are lowercase, ASCII, whitespace-free, and round-trip losslessly
//! through `Display` / `FromStr`.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::OsaError;

fn srn_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^urn:osa:(?P<domain>[a-z0-9][a-z0-9.\-]*):(?P<kind>dep|rec|conv|schema|onto|val|evt):(?P<local>[a-z0-9][a-z0-9.\-]*)(?:@(?P<ver>[0-9]+(?:\.[0-9]+\.[0-9]+)?))?$",
        )
        .expect("srn regex")
    })
}

/// The closed set of aggregate kinds an SRN can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SrnKind {
    Deposition,
    Record,
    Convention,
    Schema,
    Ontology,
    ValidationRun,
    Event,
}

impl SrnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SrnKind::Deposition => "dep",
            SrnKind::Record => "rec",
            SrnKind::Convention => "conv",
            SrnKind::Schema => "schema",
            SrnKind::Ontology => "onto",
            SrnKind::ValidationRun => "val",
            SrnKind::Event => "evt",
        }
    }

    fn from_token(s: &str) -> Option<Self> {
        Some(match s {
            "dep" => SrnKind::Deposition,
            "rec" => SrnKind::Record,
            "conv" => SrnKind::Convention,
            "schema" => SrnKind::Schema,
            "onto" => SrnKind::Ontology,
            "val" => SrnKind::ValidationRun,
            "evt" => SrnKind::Event,
            _ => return None,
        })
    }
}

/// Version component of an SRN.
///
/// `Generation` is the integer generation of a record; `Semver` is the
/// `MAJOR.MINOR.PATCH` version of a schema, convention, or ontology.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SrnVersion {
    Generation(u64),
    Semver(u64, u64, u64),
}

impl fmt::Display for SrnVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SrnVersion::Generation(n) => write!(f, "{n}"),
            SrnVersion::Semver(ma, mi, pa) => write!(f, "{ma}.{mi}.{pa}"),
        }
    }
}

/// A parsed, validated Structured Resource Name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Srn {
    domain: String,
    kind: SrnKind,
    local: String,
    version: Option<SrnVersion>,
}

impl Srn {
    /// Build an SRN from parts, enforcing the per-kind version rule.
    pub fn new(
        domain: impl Into<String>,
        kind: SrnKind,
        local: impl Into<String>,
        version: Option<SrnVersion>,
    ) -> Result<Self, OsaError> {
        let domain = domain.into();
        let local = local.into();

        validate_token(&domain, "domain")?;
        validate_token(&local, "local")?;
        validate_version(kind, version.as_ref())?;

        Ok(Self {
            domain,
            kind,
            local,
            version,
        })
    }

    /// Unversioned constructor for the kinds that never carry a version.
    pub fn unversioned(
        domain: impl Into<String>,
        kind: SrnKind,
        local: impl Into<String>,
    ) -> Result<Self, OsaError> {
        Self::new(domain, kind, local, None)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn kind(&self) -> SrnKind {
        self.kind
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn version(&self) -> Option<&SrnVersion> {
        self.version.as_ref()
    }

    /// Guard that this SRN names the expected aggregate kind.
    pub fn expect_kind(&self, kind: SrnKind) -> Result<&Self, OsaError> {
        if self.kind != kind {
            return Err(OsaError::validation(format!(
                "expected {} srn, got {}",
                kind.as_str(),
                self.kind.as_str()
            )));
        }
        Ok(self)
    }
}

impl fmt::Display for Srn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "urn:osa:{}:{}:{}",
            self.domain,
            self.kind.as_str(),
            self.local
        )?;
        if let Some(v) = &self.version {
            write!(f, "@{v}")?;
        }
        Ok(())
    }
}

impl FromStr for Srn {
    type Err = OsaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // The regex is all-lowercase/ASCII, but reject early with specific
        // messages so callers see why a near-miss failed.
        if s != s.to_lowercase() {
            return Err(OsaError::validation("srn must be lowercase"));
        }
        if !s.is_ascii() {
            return Err(OsaError::validation("srn must be ascii"));
        }
        if s.chars().any(char::is_whitespace) {
            return Err(OsaError::validation("srn cannot contain whitespace"));
        }

        let caps = srn_re()
            .captures(s)
            .ok_or_else(|| OsaError::validation(format!("invalid srn: {s:?}")))?;

        let kind = SrnKind::from_token(&caps["kind"]).expect("kind alternation matched");
        let version = match caps.name("ver") {
            None => None,
            Some(v) => Some(parse_version(kind, v.as_str())?),
        };

        Srn::new(&caps["domain"], kind, &caps["local"], version)
    }
}

impl Serialize for Srn {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Srn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

fn parse_version(kind: SrnKind, raw: &str) -> Result<SrnVersion, OsaError> {
    match kind {
        SrnKind::Record => {
            let n = raw
                .parse::<u64>()
                .map_err(|_| OsaError::validation(format!("not an integer generation: {raw}")))?;
            Ok(SrnVersion::Generation(n))
        }
        SrnKind::Schema | SrnKind::Convention | SrnKind::Ontology => {
            let parts: Vec<&str> = raw.split('.').collect();
            if parts.len() != 3 {
                return Err(OsaError::validation(format!("not a semver: {raw}")));
            }
            let nums: Result<Vec<u64>, _> = parts.iter().map(|p| p.parse::<u64>()).collect();
            match nums {
                Ok(n) => Ok(SrnVersion::Semver(n[0], n[1], n[2])),
                Err(_) => Err(OsaError::validation(format!("not a semver: {raw}"))),
            }
        }
        SrnKind::Deposition | SrnKind::ValidationRun | SrnKind::Event => Err(
            OsaError::validation(format!("{} srn cannot carry a version", kind.as_str())),
        ),
    }
}

fn validate_version(kind: SrnKind, version: Option<&SrnVersion>) -> Result<(), OsaError> {
    match (kind, version) {
        (SrnKind::Record, Some(SrnVersion::Generation(_))) | (SrnKind::Record, None) => Ok(()),
        (SrnKind::Record, Some(_)) => Err(OsaError::validation(
            "rec srn version must be an integer generation",
        )),
        (
            SrnKind::Schema | SrnKind::Convention | SrnKind::Ontology,
            Some(SrnVersion::Semver(..)) | None,
        ) => Ok(()),
        (SrnKind::Schema | SrnKind::Convention | SrnKind::Ontology, Some(_)) => {
            Err(OsaError::validation("srn version must be a semver"))
        }
        (SrnKind::Deposition | SrnKind::ValidationRun | SrnKind::Event, None) => Ok(()),
        (SrnKind::Deposition | SrnKind::ValidationRun | SrnKind::Event, Some(_)) => Err(
            OsaError::validation(format!("{} srn cannot carry a version", kind.as_str())),
        ),
    }
}

fn validate_token(s: &str, part: &str) -> Result<(), OsaError> {
    let ok = !s.is_empty()
        && s.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
        && s.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    if !ok {
        return Err(OsaError::validation(format!("invalid srn {part}: {s:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_kind() {
        let samples = [
            "urn:osa:edu.example:dep:a1b2c3",
            "urn:osa:edu.example:rec:a1b2c3@7",
            "urn:osa:edu.example:conv:protein-deposit@1.2.0",
            "urn:osa:edu.example:schema:pdb-entry@0.4.1",
            "urn:osa:edu.example:onto:chebi@2.0.0",
            "urn:osa:edu.example:val:9f8e7d",
            "urn:osa:edu.example:evt:0c1d2e",
        ];
        for s in samples {
            let srn: Srn = s.parse().unwrap();
            assert_eq!(srn.to_string(), s);
            let again: Srn = srn.to_string().parse().unwrap();
            assert_eq!(again, srn);
        }
    }

    #[test]
    fn rejects_uppercase_whitespace_nonascii() {
        assert!("URN:OSA:X:DEP:A".parse::<Srn>().is_err());
        assert!("urn:osa:x:dep:a b".parse::<Srn>().is_err());
        assert!("urn:osa:x:dep:å".parse::<Srn>().is_err());
    }

    #[test]
    fn rejects_version_on_unversioned_kinds() {
        assert!("urn:osa:x:dep:abc@1".parse::<Srn>().is_err());
        assert!("urn:osa:x:val:abc@1.0.0".parse::<Srn>().is_err());
        assert!("urn:osa:x:evt:abc@2".parse::<Srn>().is_err());
    }

    #[test]
    fn record_generation_must_be_integer() {
        assert!("urn:osa:x:rec:abc@1".parse::<Srn>().is_ok());
        assert!("urn:osa:x:rec:abc@1.0.0".parse::<Srn>().is_err());
    }

    #[test]
    fn semver_kinds_reject_bare_integers() {
        assert!("urn:osa:x:schema:abc@1.0.0".parse::<Srn>().is_ok());
        assert!("urn:osa:x:schema:abc@1".parse::<Srn>().is_err());
        assert!("urn:osa:x:conv:abc@3".parse::<Srn>().is_err());
    }

    #[test]
    fn kind_guard() {
        let srn: Srn = "urn:osa:x:dep:abc".parse().unwrap();
        assert!(srn.expect_kind(SrnKind::Deposition).is_ok());
        assert!(srn.expect_kind(SrnKind::Record).is_err());
    }

    #[test]
    fn serde_round_trip() {
        let srn: Srn = "urn:osa:x:rec:abc@3".parse().unwrap();
        let json = serde_json::to_string(&srn).unwrap();
        assert_eq!(json, "\"urn:osa:x:rec:abc@3\"");
        let back: Srn = serde_json::from_str(&json).unwrap();
        assert_eq!(back, srn);
    }
}
