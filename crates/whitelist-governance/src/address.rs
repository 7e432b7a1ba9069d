//! Whitelisted address verification (6 steps).
//!
//! ```text
//! 1. HashCheck       payload hash vs claimed hash (current, then legacy)
//! 2. RulesTrust      super-admin quorum over the rules container
//! 3. Decode          rules container -> users, groups, policies
//! 4. HashCoverage    per-signature crypto + coverage of the matched hash
//! 5. ThresholdCheck  policy evaluation over verified signers
//! 6. Parse           canonical text -> WhitelistedAddress under the matched field set
//! ```

use serde::{Deserialize, Serialize};

use crate::config::GovernanceConfig;
use crate::error::{GovernanceError, GovernanceResult, Stage};
use crate::hash::{CanonicalVariant, PayloadKind};
use crate::pipeline;
use crate::types::{Envelope, VerificationResult};

/// A verified whitelisted address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WhitelistedAddress {
    pub currency: String,
    pub network: String,
    pub address: String,
    pub memo: Option<String>,
    pub label: Option<String>,
    pub customer_id: Option<String>,
    pub address_type: Option<String>,
    pub exchange_account_id: Option<String>,
    /// Absent for entries approved under the V1 schema.
    pub contract_type: Option<String>,
    /// Absent for entries approved before participant ids existed.
    pub tn_participant_id: Option<String>,
    pub linked_internal_addresses: Vec<LinkedAddress>,
    pub linked_wallets: Vec<LinkedWallet>,
}

/// An internal address linked to the whitelisted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedAddress {
    pub id: String,
    pub address: Option<String>,
    pub label: Option<String>,
}

/// A wallet linked to the whitelisted entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkedWallet {
    pub id: String,
    pub path: Option<String>,
    pub label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressPayloadWire {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    memo: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    address_type: Option<String>,
    #[serde(default)]
    exchange_account_id: Option<serde_json::Value>,
    #[serde(default)]
    contract_type: Option<String>,
    #[serde(default, rename = "tnParticipantID")]
    tn_participant_id: Option<String>,
    #[serde(default)]
    linked_internal_addresses: Vec<LinkedAddressWire>,
    #[serde(default)]
    linked_wallets: Vec<LinkedWalletWire>,
}

#[derive(Debug, Deserialize)]
struct LinkedAddressWire {
    id: serde_json::Value,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkedWalletWire {
    id: serde_json::Value,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    label: Option<String>,
}

/// Blockchain and network of an address payload, read before full parsing
/// to select the governing policy.
#[derive(Debug, Default, Deserialize)]
struct AddressScopeWire {
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    network: Option<String>,
}

/// Parse a hash-verified payload under the field set of `variant`.
///
/// `payload` should be the canonical text of `variant`. Fields the variant
/// does not cover were not part of the signed content and are dropped.
pub fn parse_address(payload: &str, variant: CanonicalVariant) -> GovernanceResult<WhitelistedAddress> {
    let wire: AddressPayloadWire = serde_json::from_str(payload).map_err(|e| {
        GovernanceError::validation(Stage::Parse, "payload", format!("invalid address payload: {}", e))
    })?;
    let fields = variant.field_set();

    Ok(WhitelistedAddress {
        currency: required(wire.currency, "currency")?,
        network: required(wire.network, "network")?,
        address: required(wire.address, "address")?,
        memo: non_empty(wire.memo),
        label: non_empty(wire.label),
        customer_id: non_empty(wire.customer_id),
        address_type: non_empty(wire.address_type),
        exchange_account_id: wire.exchange_account_id.and_then(scalar_to_string),
        contract_type: non_empty(wire.contract_type).filter(|_| fields.contract_type),
        tn_participant_id: non_empty(wire.tn_participant_id).filter(|_| fields.participant_id),
        linked_internal_addresses: wire
            .linked_internal_addresses
            .into_iter()
            .map(|link| {
                Ok(LinkedAddress {
                    id: link_id(link.id, "linkedInternalAddresses")?,
                    address: non_empty(link.address),
                    label: non_empty(link.label).filter(|_| fields.link_labels),
                })
            })
            .collect::<GovernanceResult<Vec<_>>>()?,
        linked_wallets: wire
            .linked_wallets
            .into_iter()
            .map(|link| {
                Ok(LinkedWallet {
                    id: link_id(link.id, "linkedWallets")?,
                    path: non_empty(link.path),
                    label: non_empty(link.label).filter(|_| fields.link_labels),
                })
            })
            .collect::<GovernanceResult<Vec<_>>>()?,
    })
}

fn required(value: Option<String>, field: &str) -> GovernanceResult<String> {
    non_empty(value).ok_or_else(|| {
        GovernanceError::validation(Stage::Parse, field, "required field is missing or empty")
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

pub(crate) fn scalar_to_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn link_id(value: serde_json::Value, field: &str) -> GovernanceResult<String> {
    scalar_to_string(value).ok_or_else(|| {
        GovernanceError::validation(Stage::Parse, format!("{}.id", field), "link id is missing")
    })
}

fn address_scope(payload: &str) -> AddressScopeWire {
    serde_json::from_str(payload).unwrap_or_default()
}

/// Run the address flow against `config`.
pub fn verify_address(
    envelope: &Envelope,
    config: &GovernanceConfig,
) -> GovernanceResult<VerificationResult<WhitelistedAddress>> {
    envelope.validate()?;

    let matched = pipeline::check_hash(envelope, PayloadKind::Address)?;
    let (trusted_bytes, trust) = pipeline::establish_trust(envelope, config)?;
    let rules = pipeline::decode_rules(&trusted_bytes, config)?;

    // Only the bytes that were hashed are trusted from here on.
    let signed = matched.variant.canonicalize(&envelope.payload);
    let scope = address_scope(&signed);
    let policy = pipeline::select_policy(
        &rules,
        PayloadKind::Address,
        scope.currency.as_deref(),
        scope.network.as_deref(),
    )?;

    let verified = pipeline::collect_verified_signers(
        &envelope.metadata.signatures,
        &rules,
        &matched.hash,
    )?;
    pipeline::check_threshold(policy, &verified)?;

    let value = parse_address(&signed, matched.variant).map_err(|e| {
        tracing::warn!(stage = %Stage::Parse, error = %e, "address payload rejected");
        e
    })?;

    tracing::debug!(
        currency = %value.currency,
        network = %value.network,
        variant = %matched.variant,
        signers = verified.len(),
        "whitelisted address verified"
    );

    Ok(VerificationResult {
        value,
        hash: matched.hash,
        matched_variant: matched.variant,
        verified_signer_ids: verified,
        trusted_super_admins: trust.valid_keys,
    })
}

/// Verifier for whitelisted addresses bound to one configuration.
#[derive(Debug, Clone)]
pub struct WhitelistedAddressVerifier {
    config: GovernanceConfig,
}

impl WhitelistedAddressVerifier {
    pub fn new(config: GovernanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GovernanceConfig {
        &self.config
    }

    pub fn verify(
        &self,
        envelope: &Envelope,
    ) -> GovernanceResult<VerificationResult<WhitelistedAddress>> {
        verify_address(envelope, &self.config)
    }
}
