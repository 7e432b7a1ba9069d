//! Tests for the tokio wrappers.
#![cfg(feature = "tokio")]

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use pkcs8::{EncodePublicKey, LineEnding};
use serde_json::json;
use whitelist_governance::{
    compute_hash, verify_whitelisted_address_async, verify_whitelisted_asset_async, Envelope,
    EnvelopeMetadata, GovernanceConfig, SuperAdminKeySet, WhitelistSignatureEntry,
};

const PAYLOAD: &str = r#"{"currency":"BTC","network":"mainnet","address":"bc1qcold"}"#;

fn pem(key: &SigningKey) -> String {
    key.verifying_key().to_public_key_pem(LineEnding::LF).unwrap()
}

fn fixture() -> (Envelope, GovernanceConfig) {
    let mut rng = rand::thread_rng();
    let admin = SigningKey::random(&mut rng);
    let alice = SigningKey::random(&mut rng);

    let rules = serde_json::to_vec(&json!({
        "users": [{"id": "alice", "publicKey": pem(&alice)}],
        "groups": [{"id": "approvers", "userIds": ["alice"]}],
        "addressWhitelisting": {"default": {"groupThreshold": {"thresholds": [
            {"groupId": "approvers", "minimumSignatures": 1}
        ]}}}
    }))
    .unwrap();
    let admin_sig: Signature = admin.sign(&rules);
    let rules_signatures = BASE64.encode(
        serde_json::to_vec(&json!([BASE64.encode(admin_sig.to_bytes())])).unwrap(),
    );

    let hash = compute_hash(PAYLOAD);
    let covered = vec![hash.clone()];
    let sig: Signature = alice.sign(&serde_json::to_vec(&covered).unwrap());

    let envelope = Envelope {
        payload: PAYLOAD.to_string(),
        metadata: EnvelopeMetadata {
            hash,
            signatures: vec![WhitelistSignatureEntry {
                user_id: "alice".to_string(),
                signature: BASE64.encode(sig.to_der().as_bytes()),
                covered_hashes: covered,
            }],
        },
        rules_container: BASE64.encode(&rules),
        rules_signatures,
    };
    let config = GovernanceConfig::new(SuperAdminKeySet::from_pem([pem(&admin)], 1).unwrap());
    (envelope, config)
}

#[tokio::test]
async fn test_address_verifies_on_blocking_pool() {
    let (envelope, config) = fixture();
    let verified = verify_whitelisted_address_async(envelope, config)
        .await
        .expect("verify");
    assert_eq!(verified.value.address, "bc1qcold");
    assert!(verified.verified_signer_ids.contains("alice"));
}

#[tokio::test]
async fn test_async_errors_match_sync() {
    let (envelope, config) = fixture();
    // Address rules only; the asset flow has no policy and the payload has no contract.
    let err = verify_whitelisted_asset_async(envelope, config)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "missing_field");
}
