//! Caller-supplied verification configuration.
//!
//! Configuration is an immutable value handed to each verifier. It is never
//! read from global state during verification; `from_env` and `from_file`
//! are explicit constructors for callers that keep keys outside the binary.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `GOVERNANCE_SUPERADMIN_KEYS_FILE` | Path to a YAML config file (takes precedence) |
//! | `GOVERNANCE_SUPERADMIN_KEYS` | Concatenated SPKI PEM super-admin keys |
//! | `GOVERNANCE_MIN_VALID_SIGNATURES` | Super-admin quorum |
//! | `GOVERNANCE_STRICT_USER_KEYS` | Reject rules containers with unparsable user keys |

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;
use crate::error::{GovernanceError, GovernanceResult};

const PEM_END: &str = "-----END PUBLIC KEY-----";

/// Trusted root keys and the quorum required over a rules container.
#[derive(Debug, Clone)]
pub struct SuperAdminKeySet {
    keys: Vec<PublicKey>,
    min_valid_signatures: usize,
}

impl SuperAdminKeySet {
    /// Build a key set. Duplicate keys count once toward the quorum.
    pub fn new(keys: Vec<PublicKey>, min_valid_signatures: usize) -> GovernanceResult<Self> {
        let mut distinct: Vec<PublicKey> = Vec::with_capacity(keys.len());
        for key in keys {
            if distinct.contains(&key) {
                tracing::warn!("duplicate super-admin key ignored");
                continue;
            }
            distinct.push(key);
        }

        if min_valid_signatures == 0 {
            return Err(GovernanceError::config(
                "min_valid_signatures must be at least 1",
            ));
        }
        if min_valid_signatures > distinct.len() {
            return Err(GovernanceError::config(format!(
                "min_valid_signatures is {} but only {} distinct super-admin keys are configured",
                min_valid_signatures,
                distinct.len()
            )));
        }

        Ok(Self {
            keys: distinct,
            min_valid_signatures,
        })
    }

    /// Build a key set from SPKI PEM strings.
    pub fn from_pem<I, S>(pems: I, min_valid_signatures: usize) -> GovernanceResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = pems
            .into_iter()
            .enumerate()
            .map(|(i, pem)| {
                PublicKey::from_pem(pem.as_ref()).map_err(|e| {
                    GovernanceError::config(format!("super-admin key {}: {}", i, e))
                })
            })
            .collect::<GovernanceResult<Vec<_>>>()?;
        Self::new(keys, min_valid_signatures)
    }

    pub fn keys(&self) -> &[PublicKey] {
        &self.keys
    }

    pub fn min_valid_signatures(&self) -> usize {
        self.min_valid_signatures
    }
}

/// How the rules decoder treats a user whose public key does not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// Exclude the user; they can never contribute a valid signature.
    #[default]
    Lenient,
    /// Reject the whole rules container.
    Strict,
}

/// Verification configuration.
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    super_admins: SuperAdminKeySet,
    key_policy: KeyPolicy,
}

/// On-disk configuration format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GovernanceConfigFile {
    /// SPKI PEM super-admin keys.
    pub super_admin_keys: Vec<String>,

    /// Super-admin quorum.
    pub min_valid_signatures: usize,

    #[serde(default)]
    pub key_policy: KeyPolicy,
}

impl GovernanceConfig {
    pub fn new(super_admins: SuperAdminKeySet) -> Self {
        Self {
            super_admins,
            key_policy: KeyPolicy::default(),
        }
    }

    /// Set the user key policy.
    pub fn with_key_policy(mut self, key_policy: KeyPolicy) -> Self {
        self.key_policy = key_policy;
        self
    }

    pub fn super_admins(&self) -> &SuperAdminKeySet {
        &self.super_admins
    }

    pub fn key_policy(&self) -> KeyPolicy {
        self.key_policy
    }

    /// Build from the file format.
    pub fn from_file_config(file: &GovernanceConfigFile) -> GovernanceResult<Self> {
        let super_admins =
            SuperAdminKeySet::from_pem(&file.super_admin_keys, file.min_valid_signatures)?;
        Ok(Self::new(super_admins).with_key_policy(file.key_policy))
    }

    /// Parse a YAML config document.
    pub fn from_yaml_str(yaml: &str) -> GovernanceResult<Self> {
        let file: GovernanceConfigFile = serde_yaml::from_str(yaml)
            .map_err(|e| GovernanceError::config(format!("invalid config YAML: {}", e)))?;
        Self::from_file_config(&file)
    }

    /// Load a YAML config file.
    pub fn from_file(path: impl AsRef<Path>) -> GovernanceResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            GovernanceError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Create config from environment variables (see module docs).
    pub fn from_env() -> GovernanceResult<Self> {
        if let Ok(path) = std::env::var("GOVERNANCE_SUPERADMIN_KEYS_FILE") {
            return Self::from_file(path);
        }

        let bundle = std::env::var("GOVERNANCE_SUPERADMIN_KEYS")
            .map_err(|_| GovernanceError::config("GOVERNANCE_SUPERADMIN_KEYS is not set"))?;
        let min_valid_signatures = std::env::var("GOVERNANCE_MIN_VALID_SIGNATURES")
            .map_err(|_| GovernanceError::config("GOVERNANCE_MIN_VALID_SIGNATURES is not set"))?
            .trim()
            .parse::<usize>()
            .map_err(|e| {
                GovernanceError::config(format!("invalid GOVERNANCE_MIN_VALID_SIGNATURES: {}", e))
            })?;
        let key_policy = match std::env::var("GOVERNANCE_STRICT_USER_KEYS") {
            Ok(v) if v == "1" || v.eq_ignore_ascii_case("true") => KeyPolicy::Strict,
            _ => KeyPolicy::Lenient,
        };

        let super_admins =
            SuperAdminKeySet::from_pem(split_pem_bundle(&bundle), min_valid_signatures)?;
        Ok(Self::new(super_admins).with_key_policy(key_policy))
    }
}

/// Split concatenated PEM blocks. Escaped `\n` sequences are unescaped first.
fn split_pem_bundle(bundle: &str) -> Vec<String> {
    let bundle = bundle.replace("\\n", "\n");
    let mut out = Vec::new();
    let mut rest = bundle.as_str();
    while let Some(end) = rest.find(PEM_END) {
        let split_at = end + PEM_END.len();
        let block = rest[..split_at].trim();
        if !block.is_empty() {
            out.push(block.to_string());
        }
        rest = &rest[split_at..];
    }
    out
}
