//! Envelope and result types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{GovernanceError, GovernanceResult, Stage};
use crate::hash::{is_hash_shaped, CanonicalVariant};

/// A whitelist entry as delivered by the custody API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Payload text exactly as it was hashed.
    #[serde(default)]
    pub payload: String,

    pub metadata: EnvelopeMetadata,

    /// Base64 rules container.
    #[serde(default, alias = "rulesContainerJson")]
    pub rules_container: String,

    /// Base64 list of super-admin signatures over the rules container.
    #[serde(default)]
    pub rules_signatures: String,
}

/// Claimed hash and approvals.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeMetadata {
    /// Claimed SHA-256 of the payload, lowercase hex.
    #[serde(default)]
    pub hash: String,

    #[serde(default)]
    pub signatures: Vec<WhitelistSignatureEntry>,
}

/// One user's approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistSignatureEntry {
    pub user_id: String,

    /// Base64 signature over the JSON encoding of `covered_hashes`.
    pub signature: String,

    /// Content hashes this approval is valid for.
    #[serde(default)]
    pub covered_hashes: Vec<String>,
}

impl WhitelistSignatureEntry {
    /// Bytes the user signed: the compact JSON array of covered hashes.
    pub fn signed_message(&self) -> Vec<u8> {
        serde_json::to_vec(&self.covered_hashes).unwrap_or_default()
    }
}

impl Envelope {
    /// Parse an envelope from JSON and check its shape.
    pub fn from_json(json: &str) -> GovernanceResult<Self> {
        let envelope: Self = serde_json::from_str(json).map_err(|e| {
            GovernanceError::validation(Stage::Envelope, "envelope", format!("invalid JSON: {}", e))
        })?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Check required top-level fields before any cryptographic work.
    pub fn validate(&self) -> GovernanceResult<()> {
        if self.payload.is_empty() {
            return Err(missing("payload"));
        }
        if self.metadata.hash.is_empty() {
            return Err(missing("metadata.hash"));
        }
        if !is_hash_shaped(&self.metadata.hash) {
            return Err(GovernanceError::validation(
                Stage::Envelope,
                "metadata.hash",
                "expected 64 lowercase hex characters",
            ));
        }
        if self.rules_container.trim().is_empty() {
            return Err(missing("rulesContainer"));
        }
        if self.rules_signatures.trim().is_empty() {
            return Err(missing("rulesSignatures"));
        }
        for (i, entry) in self.metadata.signatures.iter().enumerate() {
            if entry.user_id.is_empty() {
                return Err(missing(&format!("metadata.signatures[{}].userId", i)));
            }
        }
        Ok(())
    }
}

fn missing(field: &str) -> GovernanceError {
    GovernanceError::validation(Stage::Envelope, field, "required field is missing or empty")
}

/// Successful verification outcome.
#[derive(Debug, Clone)]
pub struct VerificationResult<T> {
    /// Parsed domain object.
    pub value: T,

    /// Hash that matched the claimed metadata hash.
    pub hash: String,

    /// Canonicalization the hash matched under.
    pub matched_variant: CanonicalVariant,

    /// Users whose signature verified and covered `hash`.
    pub verified_signer_ids: BTreeSet<String>,

    /// Number of distinct super-admin keys that signed the rules container.
    pub trusted_super_admins: usize,
}
