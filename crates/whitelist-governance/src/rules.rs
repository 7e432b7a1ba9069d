//! Rules container decoding.
//!
//! The rules container is a Base64 JSON document listing users (with their
//! public keys), groups of users, and the threshold policies that govern
//! address and asset whitelisting. Group and user references are resolved
//! here so the evaluator works on a self-contained model.
//!
//! Callers must establish super-admin trust over the container bytes (see
//! [`crate::trust`]) before decoding.

use std::collections::{BTreeMap, BTreeSet};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::KeyPolicy;
use crate::crypto::PublicKey;
use crate::error::{GovernanceError, GovernanceResult, IntegrityFailure, Stage};
use crate::hash::PayloadKind;

// ==================== Wire format ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RulesContainerWire {
    #[serde(default)]
    locked: bool,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    users: Vec<UserWire>,
    #[serde(default)]
    groups: Vec<GroupWire>,
    #[serde(default)]
    address_whitelisting: Option<PolicySetWire>,
    #[serde(default)]
    asset_whitelisting: Option<PolicySetWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserWire {
    id: String,
    #[serde(alias = "publicKeyPem")]
    public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupWire {
    id: String,
    #[serde(default)]
    user_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicySetWire {
    default: PolicyWire,
    #[serde(default)]
    overrides: Vec<OverrideWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OverrideWire {
    blockchain: String,
    #[serde(default)]
    network: Option<String>,
    policy: PolicyWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
enum PolicyWire {
    GroupThreshold(GroupThresholdWire),
    SequentialThresholds(SequentialWire),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupThresholdWire {
    thresholds: Vec<ThresholdWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SequentialWire {
    stages: Vec<GroupThresholdWire>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThresholdWire {
    group_id: String,
    minimum_signatures: usize,
}

// ==================== Decoded model ====================

/// A user allowed to approve entries.
#[derive(Debug, Clone)]
pub struct RuleUser {
    pub user_id: String,
    /// `None` when the registered key did not parse.
    public_key: Option<PublicKey>,
}

impl RuleUser {
    pub fn public_key(&self) -> Option<&PublicKey> {
        self.public_key.as_ref()
    }

    pub fn has_usable_key(&self) -> bool {
        self.public_key.is_some()
    }
}

/// A group of users and how many of them must sign.
#[derive(Debug, Clone)]
pub struct RuleGroup {
    pub group_id: String,
    pub required_count: usize,
    pub users: Vec<RuleUser>,
}

impl RuleGroup {
    pub fn is_member(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u.user_id == user_id)
    }

    /// Members that can ever produce a valid signature.
    pub fn usable_member_count(&self) -> usize {
        self.users.iter().filter(|u| u.has_usable_key()).count()
    }
}

/// Every rule group must reach its required count.
#[derive(Debug, Clone)]
pub struct GroupThreshold {
    pub rule_groups: Vec<RuleGroup>,
}

/// Threshold structure applied to an entry.
#[derive(Debug, Clone)]
pub enum ThresholdPolicy {
    GroupThreshold(GroupThreshold),
    /// Stages evaluated in declared order; all must succeed.
    SequentialThresholds(Vec<GroupThreshold>),
}

/// A policy that replaces the default for one blockchain (and optionally network).
#[derive(Debug, Clone)]
pub struct PolicyOverride {
    pub blockchain: String,
    pub network: Option<String>,
    pub policy: ThresholdPolicy,
}

/// Default policy plus per-blockchain overrides.
#[derive(Debug, Clone)]
pub struct PolicySet {
    pub default: ThresholdPolicy,
    pub overrides: Vec<PolicyOverride>,
}

impl PolicySet {
    /// Pick the policy for an entry: exact blockchain+network override,
    /// then blockchain-only override, then the default.
    pub fn select(&self, blockchain: Option<&str>, network: Option<&str>) -> &ThresholdPolicy {
        let Some(blockchain) = blockchain else {
            return &self.default;
        };
        let same_chain = |o: &&PolicyOverride| o.blockchain.eq_ignore_ascii_case(blockchain);

        if let Some(network) = network {
            if let Some(o) = self.overrides.iter().filter(same_chain).find(|o| {
                o.network
                    .as_deref()
                    .is_some_and(|n| n.eq_ignore_ascii_case(network))
            }) {
                return &o.policy;
            }
        }

        self.overrides
            .iter()
            .filter(same_chain)
            .find(|o| o.network.is_none())
            .map(|o| &o.policy)
            .unwrap_or(&self.default)
    }
}

/// A decoded, reference-resolved rules container.
#[derive(Debug, Clone)]
pub struct DecodedRulesContainer {
    pub locked: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    users: BTreeMap<String, RuleUser>,
    address_policies: Option<PolicySet>,
    asset_policies: Option<PolicySet>,
}

impl DecodedRulesContainer {
    pub fn user(&self, user_id: &str) -> Option<&RuleUser> {
        self.users.get(user_id)
    }

    pub fn users(&self) -> impl Iterator<Item = &RuleUser> {
        self.users.values()
    }

    pub fn policies(&self, kind: PayloadKind) -> Option<&PolicySet> {
        match kind {
            PayloadKind::Address => self.address_policies.as_ref(),
            PayloadKind::Asset => self.asset_policies.as_ref(),
        }
    }
}

// ==================== Decoding ====================

/// Decode the Base64 layer of a rules container.
pub fn decode_container_bytes(b64: &str) -> GovernanceResult<Vec<u8>> {
    BASE64
        .decode(b64.trim())
        .map_err(|e| GovernanceError::malformed_rules(format!("invalid base64: {}", e)))
}

/// Decode a Base64 rules container.
pub fn decode(b64: &str, key_policy: KeyPolicy) -> GovernanceResult<DecodedRulesContainer> {
    let bytes = decode_container_bytes(b64)?;
    decode_bytes(&bytes, key_policy)
}

/// Decode rules container JSON bytes.
pub fn decode_bytes(bytes: &[u8], key_policy: KeyPolicy) -> GovernanceResult<DecodedRulesContainer> {
    let wire: RulesContainerWire = serde_json::from_slice(bytes)
        .map_err(|e| GovernanceError::malformed_rules(format!("invalid rules JSON: {}", e)))?;

    let users = decode_users(wire.users, key_policy)?;
    let groups = index_groups(wire.groups, &users)?;

    let address_policies = wire
        .address_whitelisting
        .map(|set| resolve_policy_set(set, &groups))
        .transpose()?;
    let asset_policies = wire
        .asset_whitelisting
        .map(|set| resolve_policy_set(set, &groups))
        .transpose()?;

    Ok(DecodedRulesContainer {
        locked: wire.locked,
        created_at: wire.created_at,
        updated_at: wire.updated_at,
        users,
        address_policies,
        asset_policies,
    })
}

fn decode_users(
    users: Vec<UserWire>,
    key_policy: KeyPolicy,
) -> GovernanceResult<BTreeMap<String, RuleUser>> {
    let mut out = BTreeMap::new();
    for user in users {
        if user.id.is_empty() {
            return Err(GovernanceError::malformed_rules("user with empty id"));
        }

        let public_key = match PublicKey::from_pem(&user.public_key) {
            Ok(key) => Some(key),
            Err(e) => match key_policy {
                KeyPolicy::Strict => {
                    return Err(GovernanceError::integrity(
                        Stage::Decode,
                        IntegrityFailure::InvalidPublicKey,
                        format!("user {}: {}", user.id, e),
                    ));
                }
                KeyPolicy::Lenient => {
                    tracing::warn!(user_id = %user.id, error = %e, "unparsable user key, user excluded");
                    None
                }
            },
        };

        let id = user.id.clone();
        let previous = out.insert(
            id,
            RuleUser {
                user_id: user.id,
                public_key,
            },
        );
        if let Some(previous) = previous {
            return Err(GovernanceError::malformed_rules(format!(
                "duplicate user id {}",
                previous.user_id
            )));
        }
    }
    Ok(out)
}

fn index_groups(
    groups: Vec<GroupWire>,
    users: &BTreeMap<String, RuleUser>,
) -> GovernanceResult<BTreeMap<String, Vec<RuleUser>>> {
    let mut out = BTreeMap::new();
    for group in groups {
        let mut seen = BTreeSet::new();
        let mut members = Vec::with_capacity(group.user_ids.len());
        for user_id in &group.user_ids {
            if !seen.insert(user_id.as_str()) {
                continue;
            }
            let user = users.get(user_id).ok_or_else(|| {
                GovernanceError::malformed_rules(format!(
                    "group {} references unknown user {}",
                    group.id, user_id
                ))
            })?;
            members.push(user.clone());
        }

        if out.insert(group.id.clone(), members).is_some() {
            return Err(GovernanceError::malformed_rules(format!(
                "duplicate group id {}",
                group.id
            )));
        }
    }
    Ok(out)
}

fn resolve_policy_set(
    set: PolicySetWire,
    groups: &BTreeMap<String, Vec<RuleUser>>,
) -> GovernanceResult<PolicySet> {
    let default = resolve_policy(set.default, groups)?;
    let overrides = set
        .overrides
        .into_iter()
        .map(|o| {
            Ok(PolicyOverride {
                blockchain: o.blockchain,
                network: o.network,
                policy: resolve_policy(o.policy, groups)?,
            })
        })
        .collect::<GovernanceResult<Vec<_>>>()?;
    Ok(PolicySet { default, overrides })
}

fn resolve_policy(
    policy: PolicyWire,
    groups: &BTreeMap<String, Vec<RuleUser>>,
) -> GovernanceResult<ThresholdPolicy> {
    match policy {
        PolicyWire::GroupThreshold(threshold) => Ok(ThresholdPolicy::GroupThreshold(
            resolve_group_threshold(threshold, groups)?,
        )),
        PolicyWire::SequentialThresholds(sequential) => {
            if sequential.stages.is_empty() {
                return Err(GovernanceError::malformed_rules(
                    "sequential thresholds with no stages",
                ));
            }
            let stages = sequential
                .stages
                .into_iter()
                .map(|stage| resolve_group_threshold(stage, groups))
                .collect::<GovernanceResult<Vec<_>>>()?;
            Ok(ThresholdPolicy::SequentialThresholds(stages))
        }
    }
}

fn resolve_group_threshold(
    threshold: GroupThresholdWire,
    groups: &BTreeMap<String, Vec<RuleUser>>,
) -> GovernanceResult<GroupThreshold> {
    if threshold.thresholds.is_empty() {
        return Err(GovernanceError::malformed_rules(
            "group threshold with no groups",
        ));
    }

    let rule_groups = threshold
        .thresholds
        .into_iter()
        .map(|t| {
            if t.minimum_signatures == 0 {
                return Err(GovernanceError::malformed_rules(format!(
                    "group {} requires zero signatures",
                    t.group_id
                )));
            }
            let users = groups.get(&t.group_id).ok_or_else(|| {
                GovernanceError::malformed_rules(format!("unknown group {}", t.group_id))
            })?;
            Ok(RuleGroup {
                group_id: t.group_id,
                required_count: t.minimum_signatures,
                users: users.clone(),
            })
        })
        .collect::<GovernanceResult<Vec<_>>>()?;

    Ok(GroupThreshold { rule_groups })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkcs8::{EncodePublicKey, LineEnding};
    use serde_json::json;

    fn pem() -> String {
        p256::ecdsa::SigningKey::random(&mut rand::thread_rng())
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap()
    }

    fn encode(value: &serde_json::Value) -> String {
        BASE64.encode(value.to_string())
    }

    fn base_document() -> serde_json::Value {
        json!({
            "locked": true,
            "createdAt": "2024-03-01T10:00:00Z",
            "users": [
                {"id": "alice", "publicKey": pem()},
                {"id": "bob", "publicKey": pem()},
                {"id": "carol", "publicKey": pem()}
            ],
            "groups": [
                {"id": "approvers", "userIds": ["alice", "bob", "carol"]},
                {"id": "ops", "userIds": ["carol"]}
            ],
            "addressWhitelisting": {
                "default": {"groupThreshold": {"thresholds": [
                    {"groupId": "approvers", "minimumSignatures": 2}
                ]}},
                "overrides": [
                    {"blockchain": "ETH", "policy": {"sequentialThresholds": {"stages": [
                        {"thresholds": [{"groupId": "approvers", "minimumSignatures": 2}]},
                        {"thresholds": [{"groupId": "ops", "minimumSignatures": 1}]}
                    ]}}},
                    {"blockchain": "ETH", "network": "goerli", "policy": {"groupThreshold": {"thresholds": [
                        {"groupId": "ops", "minimumSignatures": 1}
                    ]}}}
                ]
            }
        })
    }

    fn malformed_detail(doc: serde_json::Value) -> String {
        match decode(&encode(&doc), KeyPolicy::Lenient).unwrap_err() {
            GovernanceError::Integrity {
                failure: IntegrityFailure::MalformedRulesContainer,
                detail,
                ..
            } => detail,
            other => panic!("expected malformed rules container, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_resolves_groups() {
        let rules = decode(&encode(&base_document()), KeyPolicy::Lenient).unwrap();

        assert!(rules.locked);
        assert!(rules.created_at.is_some());
        assert!(rules.updated_at.is_none());
        assert_eq!(rules.users().count(), 3);
        assert!(rules.user("alice").unwrap().has_usable_key());
        assert!(rules.policies(PayloadKind::Asset).is_none());

        let set = rules.policies(PayloadKind::Address).unwrap();
        let ThresholdPolicy::GroupThreshold(threshold) = &set.default else {
            panic!("expected group threshold default");
        };
        assert_eq!(threshold.rule_groups.len(), 1);
        let group = &threshold.rule_groups[0];
        assert_eq!(group.group_id, "approvers");
        assert_eq!(group.required_count, 2);
        assert!(group.is_member("bob"));
        assert!(!group.is_member("mallory"));
    }

    #[test]
    fn test_policy_selection_order() {
        let rules = decode(&encode(&base_document()), KeyPolicy::Lenient).unwrap();
        let set = rules.policies(PayloadKind::Address).unwrap();

        assert!(matches!(
            set.select(Some("eth"), Some("GOERLI")),
            ThresholdPolicy::GroupThreshold(t) if t.rule_groups[0].group_id == "ops"
        ));
        assert!(matches!(
            set.select(Some("ETH"), Some("mainnet")),
            ThresholdPolicy::SequentialThresholds(stages) if stages.len() == 2
        ));
        assert!(matches!(
            set.select(Some("BTC"), Some("mainnet")),
            ThresholdPolicy::GroupThreshold(t) if t.rule_groups[0].group_id == "approvers"
        ));
        assert!(matches!(
            set.select(None, None),
            ThresholdPolicy::GroupThreshold(_)
        ));
    }

    #[test]
    fn test_invalid_base64() {
        let err = decode("not base64!!", KeyPolicy::Lenient).unwrap_err();
        assert_eq!(err.code(), "malformed_rules_container");
        assert_eq!(err.stage(), Some(Stage::Decode));
    }

    #[test]
    fn test_invalid_json() {
        let err = decode(&BASE64.encode("{not json"), KeyPolicy::Lenient).unwrap_err();
        assert_eq!(err.code(), "malformed_rules_container");
    }

    #[test]
    fn test_unknown_policy_shape() {
        let mut doc = base_document();
        doc["addressWhitelisting"]["default"] =
            json!({"parallelThresholds": {"thresholds": []}});
        assert!(malformed_detail(doc).contains("invalid rules JSON"));
    }

    #[test]
    fn test_unknown_group_reference() {
        let mut doc = base_document();
        doc["addressWhitelisting"]["default"] = json!({"groupThreshold": {"thresholds": [
            {"groupId": "ghosts", "minimumSignatures": 1}
        ]}});
        assert!(malformed_detail(doc).contains("unknown group ghosts"));
    }

    #[test]
    fn test_unknown_user_reference() {
        let mut doc = base_document();
        doc["groups"][0]["userIds"] = json!(["alice", "mallory"]);
        assert!(malformed_detail(doc).contains("unknown user mallory"));
    }

    #[test]
    fn test_zero_minimum_rejected() {
        let mut doc = base_document();
        doc["addressWhitelisting"]["default"]["groupThreshold"]["thresholds"][0]
            ["minimumSignatures"] = json!(0);
        assert!(malformed_detail(doc).contains("zero signatures"));
    }

    #[test]
    fn test_empty_stage_lists_rejected() {
        let mut doc = base_document();
        doc["addressWhitelisting"]["default"] = json!({"sequentialThresholds": {"stages": []}});
        assert!(malformed_detail(doc).contains("no stages"));

        let mut doc = base_document();
        doc["addressWhitelisting"]["default"] = json!({"groupThreshold": {"thresholds": []}});
        assert!(malformed_detail(doc).contains("no groups"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut doc = base_document();
        doc["users"][1]["id"] = json!("alice");
        assert!(malformed_detail(doc).contains("duplicate user id alice"));

        let mut doc = base_document();
        doc["groups"][1]["id"] = json!("approvers");
        assert!(malformed_detail(doc).contains("duplicate group id approvers"));
    }

    #[test]
    fn test_duplicate_group_members_collapse() {
        let mut doc = base_document();
        doc["groups"][0]["userIds"] = json!(["alice", "alice", "bob"]);
        let rules = decode(&encode(&doc), KeyPolicy::Lenient).unwrap();
        let ThresholdPolicy::GroupThreshold(t) =
            &rules.policies(PayloadKind::Address).unwrap().default
        else {
            panic!("expected group threshold");
        };
        assert_eq!(t.rule_groups[0].users.len(), 2);
    }

    #[test]
    fn test_corrupt_key_lenient_excludes_user() {
        let mut doc = base_document();
        doc["users"][2]["publicKey"] = json!("-----BEGIN PUBLIC KEY-----\nZm9v\n-----END PUBLIC KEY-----");

        let rules = decode(&encode(&doc), KeyPolicy::Lenient).unwrap();
        let carol = rules.user("carol").unwrap();
        assert!(!carol.has_usable_key());
        assert!(carol.public_key().is_none());

        let ThresholdPolicy::GroupThreshold(t) =
            &rules.policies(PayloadKind::Address).unwrap().default
        else {
            panic!("expected group threshold");
        };
        assert_eq!(t.rule_groups[0].usable_member_count(), 2);
    }

    #[test]
    fn test_corrupt_key_strict_rejects_document() {
        let mut doc = base_document();
        doc["users"][2]["publicKey"] = json!("garbage");

        let err = decode(&encode(&doc), KeyPolicy::Strict).unwrap_err();
        assert!(matches!(
            err,
            GovernanceError::Integrity {
                stage: Stage::Decode,
                failure: IntegrityFailure::InvalidPublicKey,
                ..
            }
        ));
        assert!(err.to_string().contains("user carol"));
    }

    #[test]
    fn test_public_key_pem_alias() {
        let doc = json!({
            "users": [{"id": "alice", "publicKeyPem": pem()}],
            "groups": [{"id": "g", "userIds": ["alice"]}],
            "assetWhitelisting": {"default": {"groupThreshold": {"thresholds": [
                {"groupId": "g", "minimumSignatures": 1}
            ]}}}
        });
        let rules = decode(&encode(&doc), KeyPolicy::Strict).unwrap();
        assert!(rules.user("alice").unwrap().has_usable_key());
        assert!(rules.policies(PayloadKind::Asset).is_some());
        assert!(!rules.locked);
    }
}
