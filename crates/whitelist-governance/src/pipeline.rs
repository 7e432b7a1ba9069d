//! Verification steps shared by the address and asset flows.
//!
//! Each step returns its intermediate value or the terminal error for the
//! call. Steps never log-and-continue on a failure of the step itself; only
//! individual signatures are skipped (and logged) while building the
//! verified signer set.

use std::collections::BTreeSet;

use crate::config::GovernanceConfig;
use crate::coverage::covers;
use crate::crypto::decode_signature_b64;
use crate::error::{GovernanceError, GovernanceResult, IntegrityFailure, Stage, WhitelistFailure};
use crate::hash::{match_hash, HashMatch, PayloadKind};
use crate::rules::{self, decode_container_bytes, DecodedRulesContainer, ThresholdPolicy};
use crate::threshold;
use crate::trust::{verify_trust, TrustReport};
use crate::types::{Envelope, WhitelistSignatureEntry};

/// Step: match the claimed hash against current and legacy canonicalizations.
pub(crate) fn check_hash(envelope: &Envelope, kind: PayloadKind) -> GovernanceResult<HashMatch> {
    match match_hash(&envelope.payload, &envelope.metadata.hash, kind) {
        Some(matched) => {
            tracing::debug!(
                stage = %Stage::HashCheck,
                variant = %matched.variant,
                "payload hash matched"
            );
            Ok(matched)
        }
        None => {
            tracing::warn!(stage = %Stage::HashCheck, "payload hash matches no canonical variant");
            Err(GovernanceError::integrity(
                Stage::HashCheck,
                IntegrityFailure::HashMismatch,
                "claimed hash matches neither the current nor any legacy canonicalization",
            ))
        }
    }
}

/// Step: verify the super-admin quorum. Returns the trusted container bytes.
pub(crate) fn establish_trust(
    envelope: &Envelope,
    config: &GovernanceConfig,
) -> GovernanceResult<(Vec<u8>, TrustReport)> {
    let bytes = decode_container_bytes(&envelope.rules_container).map_err(|e| match e {
        GovernanceError::Integrity { failure, detail, .. } => {
            GovernanceError::integrity(Stage::RulesTrust, failure, detail)
        }
        other => other,
    })?;
    let report = verify_trust(&bytes, &envelope.rules_signatures, config.super_admins())?;
    Ok((bytes, report))
}

/// Step: decode trusted container bytes.
pub(crate) fn decode_rules(
    trusted_bytes: &[u8],
    config: &GovernanceConfig,
) -> GovernanceResult<DecodedRulesContainer> {
    let decoded = rules::decode_bytes(trusted_bytes, config.key_policy());
    match &decoded {
        Ok(rules) => tracing::debug!(
            stage = %Stage::Decode,
            users = rules.users().count(),
            locked = rules.locked,
            "rules container decoded"
        ),
        Err(e) => tracing::warn!(stage = %Stage::Decode, error = %e, "rules container rejected"),
    }
    decoded
}

/// Pick the threshold policy governing an entry of `kind`.
pub(crate) fn select_policy<'a>(
    rules: &'a DecodedRulesContainer,
    kind: PayloadKind,
    blockchain: Option<&str>,
    network: Option<&str>,
) -> GovernanceResult<&'a ThresholdPolicy> {
    let set = rules.policies(kind).ok_or_else(|| {
        let section = match kind {
            PayloadKind::Address => "addressWhitelisting",
            PayloadKind::Asset => "assetWhitelisting",
        };
        tracing::warn!(stage = %Stage::Decode, section, "rules container has no applicable policy");
        GovernanceError::malformed_rules(format!("rules container has no {} section", section))
    })?;
    Ok(set.select(blockchain, network))
}

/// Step: build the set of users whose signature verifies and covers `target_hash`.
pub(crate) fn collect_verified_signers(
    entries: &[WhitelistSignatureEntry],
    rules: &DecodedRulesContainer,
    target_hash: &str,
) -> GovernanceResult<BTreeSet<String>> {
    let mut verified = BTreeSet::new();
    let mut any_covering = false;

    for entry in entries {
        if !covers(entry, target_hash) {
            tracing::warn!(user_id = %entry.user_id, "signature does not cover the verified hash");
            continue;
        }
        any_covering = true;

        let Some(user) = rules.user(&entry.user_id) else {
            tracing::warn!(user_id = %entry.user_id, "signer is not a rules container user");
            continue;
        };
        let Some(key) = user.public_key() else {
            tracing::warn!(user_id = %entry.user_id, "signer has no usable public key");
            continue;
        };
        let Some(signature) = decode_signature_b64(&entry.signature) else {
            tracing::warn!(user_id = %entry.user_id, "signature is not valid base64");
            continue;
        };
        if !key.verify(&entry.signed_message(), &signature) {
            tracing::warn!(user_id = %entry.user_id, "signature verification failed");
            continue;
        }

        verified.insert(entry.user_id.clone());
    }

    if !entries.is_empty() && !any_covering {
        tracing::warn!(
            stage = %Stage::HashCoverage,
            signatures = entries.len(),
            "no signature covers the verified hash"
        );
        return Err(GovernanceError::whitelist(
            Stage::HashCoverage,
            WhitelistFailure::HashCoverageMissing,
        ));
    }

    tracing::debug!(
        stage = %Stage::HashCoverage,
        verified = verified.len(),
        signatures = entries.len(),
        "signatures verified"
    );
    Ok(verified)
}

/// Step: evaluate the threshold policy.
pub(crate) fn check_threshold(
    policy: &ThresholdPolicy,
    verified: &BTreeSet<String>,
) -> GovernanceResult<()> {
    threshold::evaluate(policy, verified).map_err(|shortfall| {
        tracing::warn!(stage = %Stage::ThresholdCheck, %shortfall, "threshold not met");
        GovernanceError::whitelist(
            Stage::ThresholdCheck,
            WhitelistFailure::ThresholdNotMet(shortfall),
        )
    })?;
    tracing::debug!(stage = %Stage::ThresholdCheck, "threshold met");
    Ok(())
}
