//! Super-admin trust over the rules container.
//!
//! A rules container is only consulted once at least `min_valid_signatures`
//! distinct super-admin keys have produced a valid signature over its raw
//! bytes. Signatures do not say which key they target; every signature is
//! tried against every configured key.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;

use crate::config::SuperAdminKeySet;
use crate::crypto::decode_signature_b64;
use crate::error::{GovernanceError, GovernanceResult, IntegrityFailure, Stage};

/// One entry of the super-admin signature list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignatureBlobWire {
    Bare(String),
    Tagged {
        #[serde(default, rename = "userId")]
        user_id: Option<String>,
        signature: String,
    },
}

impl SignatureBlobWire {
    fn signature(&self) -> &str {
        match self {
            Self::Bare(signature) | Self::Tagged { signature, .. } => signature,
        }
    }
}

/// Outcome of a successful trust check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustReport {
    /// Distinct configured keys with at least one valid signature.
    pub valid_keys: usize,
    pub required: usize,
    /// Decodable signatures present in the list.
    pub signatures_seen: usize,
}

/// Decode the Base64 JSON signature list into raw signature blobs.
///
/// Entries that are not valid Base64 are dropped; they can never verify.
pub fn decode_rules_signatures(b64: &str) -> GovernanceResult<Vec<Vec<u8>>> {
    let bytes = BASE64
        .decode(b64.trim())
        .map_err(|e| untrusted(0, 0, format!("invalid base64 signature list: {}", e)))?;
    let blobs: Vec<SignatureBlobWire> = serde_json::from_slice(&bytes)
        .map_err(|e| untrusted(0, 0, format!("invalid signature list: {}", e)))?;

    Ok(blobs
        .iter()
        .enumerate()
        .filter_map(|(i, blob)| {
            if let SignatureBlobWire::Tagged {
                user_id: Some(user_id),
                ..
            } = blob
            {
                tracing::trace!(index = i, user_id = %user_id, "super-admin signature");
            }
            let decoded = decode_signature_b64(blob.signature());
            if decoded.is_none() {
                tracing::warn!(index = i, "super-admin signature is not valid base64, ignored");
            }
            decoded
        })
        .collect())
}

/// Verify the super-admin quorum over `rules_bytes`.
pub fn verify_trust(
    rules_bytes: &[u8],
    rules_signatures_b64: &str,
    super_admins: &SuperAdminKeySet,
) -> GovernanceResult<TrustReport> {
    let required = super_admins.min_valid_signatures();
    let signatures = decode_rules_signatures(rules_signatures_b64)
        .map_err(|e| with_required(e, required))?;

    let keys = super_admins.keys();
    let mut matched = vec![false; keys.len()];
    for signature in &signatures {
        for (i, key) in keys.iter().enumerate() {
            if !matched[i] && key.verify(rules_bytes, signature) {
                matched[i] = true;
            }
        }
    }

    let valid_keys = matched.iter().filter(|m| **m).count();
    if valid_keys < required {
        tracing::warn!(
            valid_keys,
            required,
            signatures = signatures.len(),
            "rules container not trusted"
        );
        return Err(untrusted(
            valid_keys,
            required,
            format!(
                "{} of {} required super-admin keys signed the rules container",
                valid_keys, required
            ),
        ));
    }

    tracing::debug!(valid_keys, required, "rules container trusted");
    Ok(TrustReport {
        valid_keys,
        required,
        signatures_seen: signatures.len(),
    })
}

fn untrusted(valid: usize, required: usize, detail: String) -> GovernanceError {
    GovernanceError::integrity(
        Stage::RulesTrust,
        IntegrityFailure::InsufficientTrustSignatures { valid, required },
        detail,
    )
}

fn with_required(err: GovernanceError, required: usize) -> GovernanceError {
    match err {
        GovernanceError::Integrity {
            stage,
            failure: IntegrityFailure::InsufficientTrustSignatures { valid, .. },
            detail,
        } => GovernanceError::Integrity {
            stage,
            failure: IntegrityFailure::InsufficientTrustSignatures { valid, required },
            detail,
        },
        other => other,
    }
}
