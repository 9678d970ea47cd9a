//! Runtime configuration for the verification manager.

use serde::{Deserialize, Serialize};

use crate::error::{AuditError, AuditResult};

/// Environment variable toggling [`AuditConfig::attach_proofs`].
pub const ENV_ATTACH_PROOFS: &str = "BALLOT_AUDIT_ATTACH_PROOFS";
/// Environment variable overriding [`AuditConfig::default_methodology`].
pub const ENV_METHODOLOGY: &str = "BALLOT_AUDIT_METHODOLOGY";

const DEFAULT_METHODOLOGY: &str = "irv-v1";

/// Options consumed by [`BallotVerificationManager`](crate::BallotVerificationManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditConfig {
    /// Attach an inclusion proof to every commitment returned by `add_ballot`.
    /// Off by default since each proof forces a full rebuild.
    pub attach_proofs: bool,
    /// Methodology label used when a replay bundle is requested without one.
    pub default_methodology: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            attach_proofs: false,
            default_methodology: DEFAULT_METHODOLOGY.to_string(),
        }
    }
}

impl AuditConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(input: &str) -> AuditResult<Self> {
        serde_json::from_str(input).map_err(|err| AuditError::Config(err.to_string()))
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> AuditResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup, falling back to defaults
    /// for absent keys.
    pub fn from_lookup<F>(lookup: F) -> AuditResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(raw) = lookup(ENV_ATTACH_PROOFS) {
            config.attach_proofs = parse_flag(&raw).ok_or_else(|| {
                AuditError::Config(format!("{ENV_ATTACH_PROOFS} must be a boolean, got {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_METHODOLOGY) {
            let label = raw.trim();
            if label.is_empty() {
                return Err(AuditError::Config(format!("{ENV_METHODOLOGY} is empty")));
            }
            config.default_methodology = label.to_string();
        }
        Ok(config)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AuditConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AuditConfig::default());
        assert!(!config.attach_proofs);
        assert_eq!(config.default_methodology, "irv-v1");
    }

    #[test]
    fn test_overrides() {
        let config = AuditConfig::from_lookup(lookup(&[
            (ENV_ATTACH_PROOFS, "TRUE"),
            (ENV_METHODOLOGY, " stv-2 "),
        ]))
        .unwrap();
        assert!(config.attach_proofs);
        assert_eq!(config.default_methodology, "stv-2");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(AuditConfig::from_lookup(lookup(&[(ENV_ATTACH_PROOFS, "maybe")])).is_err());
        assert!(AuditConfig::from_lookup(lookup(&[(ENV_METHODOLOGY, "  ")])).is_err());
    }

    #[test]
    fn test_json_partial_document() {
        let config = AuditConfig::from_json_str(r#"{"attachProofs":true}"#).unwrap();
        assert!(config.attach_proofs);
        assert_eq!(config.default_methodology, "irv-v1");
        assert!(AuditConfig::from_json_str("not json").is_err());
    }
}
