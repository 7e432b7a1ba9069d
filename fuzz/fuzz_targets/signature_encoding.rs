//! Fuzz harness for signature encoding detection and verification.
//!
//! Malformed signatures must fail to verify, never panic.

#![no_main]
use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use whitelist_governance::crypto::detect_ecdsa_encoding;
use whitelist_governance::PublicKey;

fn key() -> &'static PublicKey {
    static KEY: OnceLock<PublicKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let signing = p256::ecdsa::SigningKey::from_slice(&[7u8; 32]).expect("valid scalar");
        PublicKey::P256(*signing.verifying_key())
    })
}

fuzz_target!(|data: &[u8]| {
    let _ = detect_ecdsa_encoding(data);
    let (message, signature) = data.split_at(data.len() / 2);
    let _ = key().verify(message, signature);
});
