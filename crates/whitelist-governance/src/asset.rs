//! Whitelisted asset verification (5 steps).
//!
//! The asset flow has no separate parse step: once the payload hash matches,
//! the payload is the verified metadata and the asset identity is read from
//! it as part of the hash check. Trust is still established before the rules
//! container is decoded.

use serde::{Deserialize, Serialize};

use crate::address::scalar_to_string;
use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, GovernanceResult, Stage};
use crate::hash::PayloadKind;
use crate::pipeline;
use crate::types::{Envelope, VerificationResult};

/// A verified whitelisted asset (token contract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistedAsset {
    pub blockchain: String,
    pub network: String,
    pub contract_address: String,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
    pub kind: Option<String>,
    pub token_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetPayloadWire {
    #[serde(default)]
    blockchain: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    decimals: Option<serde_json::Value>,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    token_id: Option<serde_json::Value>,
}

/// Read the asset identity from a hash-verified payload.
pub fn asset_from_metadata(payload: &str) -> GovernanceResult<WhitelistedAsset> {
    let wire: AssetPayloadWire = serde_json::from_str(payload).map_err(|e| {
        GovernanceError::validation(
            Stage::HashCheck,
            "payload",
            format!("invalid asset payload: {}", e),
        )
    })?;

    let decimals = match wire.decimals.and_then(scalar_to_string) {
        Some(raw) => Some(raw.parse::<u32>().map_err(|_| {
            GovernanceError::validation(Stage::HashCheck, "decimals", "expected an unsigned integer")
        })?),
        None => None,
    };

    Ok(WhitelistedAsset {
        blockchain: required(wire.blockchain, "blockchain")?,
        network: required(wire.network, "network")?,
        contract_address: required(wire.contract_address, "contractAddress")?,
        name: wire.name.filter(|v| !v.is_empty()),
        symbol: wire.symbol.filter(|v| !v.is_empty()),
        decimals,
        kind: wire.kind.filter(|v| !v.is_empty()),
        token_id: wire.token_id.and_then(scalar_to_string),
    })
}

fn required(value: Option<String>, field: &str) -> GovernanceResult<String> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        GovernanceError::validation(Stage::HashCheck, field, "required field is missing or empty")
    })
}

/// Run the asset flow against `config`.
pub fn verify_asset(
    envelope: &Envelope,
    config: &GovernanceConfig,
) -> GovernanceResult<VerificationResult<WhitelistedAsset>> {
    envelope.validate()?;

    let matched = pipeline::check_hash(envelope, PayloadKind::Asset)?;
    let value = asset_from_metadata(&envelope.payload).map_err(|e| {
        tracing::warn!(stage = %Stage::HashCheck, error = %e, "asset metadata rejected");
        e
    })?;

    let (trusted_bytes, trust) = pipeline::establish_trust(envelope, config)?;
    let rules = pipeline::decode_rules(&trusted_bytes, config)?;
    let policy = pipeline::select_policy(
        &rules,
        PayloadKind::Asset,
        Some(&value.blockchain),
        Some(&value.network),
    )?;

    let verified = pipeline::collect_verified_signers(
        &envelope.metadata.signatures,
        &rules,
        &matched.hash,
    )?;
    pipeline::check_threshold(policy, &verified)?;

    tracing::debug!(
        blockchain = %value.blockchain,
        contract_address = %value.contract_address,
        signers = verified.len(),
        "whitelisted asset verified"
    );

    Ok(VerificationResult {
        value,
        hash: matched.hash,
        matched_variant: matched.variant,
        verified_signer_ids: verified,
        trusted_super_admins: trust.valid_keys,
    })
}

/// Verifier for whitelisted assets bound to one configuration.
#[derive(Debug, Clone)]
pub struct WhitelistedAssetVerifier {
    config: GovernanceConfig,
}

impl WhitelistedAssetVerifier {
    pub fn new(config: GovernanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn verify(&self, envelope: &Envelope) -> GovernanceResult<VerificationResult<WhitelistedAsset>> {
        verify_asset(envelope, &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_from_metadata() {
        let asset = asset_from_metadata(
            r#"{"blockchain":"ETH","network":"mainnet","contractAddress":"0xa0b8","name":"USD Coin","symbol":"USDC","decimals":"6","kind":"ERC20","tokenId":""}"#,
        )
        .unwrap();
        assert_eq!(asset.contract_address, "0xa0b8");
        assert_eq!(asset.decimals, Some(6));
        assert_eq!(asset.symbol.as_deref(), Some("USDC"));
        assert_eq!(asset.token_id, None);
    }

    #[test]
    fn test_numeric_token_id() {
        let asset = asset_from_metadata(
            r#"{"blockchain":"ETH","network":"mainnet","contractAddress":"0x1","decimals":0,"tokenId":1234}"#,
        )
        .unwrap();
        assert_eq!(asset.decimals, Some(0));
        assert_eq!(asset.token_id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_missing_contract_address() {
        let err = asset_from_metadata(r#"{"blockchain":"ETH","network":"mainnet"}"#).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Validation { ref field, .. } if field == "contractAddress"
        ));
    }

    #[test]
    fn test_bad_decimals() {
        let err = asset_from_metadata(
            r#"{"blockchain":"ETH","network":"mainnet","contractAddress":"0x1","decimals":-3}"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Validation { ref field, .. } if field == "decimals"
        ));
    }
}
