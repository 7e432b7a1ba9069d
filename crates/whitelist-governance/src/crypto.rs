//! Public key parsing and signature verification.
//!
//! Keys are SPKI PEM. ECDSA P-256 is the reference algorithm; Ed25519 keys
//! are accepted as well. ECDSA signatures may be raw (`r‖s`, 64 bytes) or
//! DER encoded; the encoding is detected from the bytes.
//!
//! Verification never errors: malformed keys are rejected at parse time and
//! malformed signatures simply fail to verify.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use p256::ecdsa::signature::Verifier;
use pkcs8::DecodePublicKey;

/// Raw ECDSA P-256 signature length (`r‖s`).
pub const RAW_ECDSA_P256_LEN: usize = 64;

/// Ed25519 signature length.
pub const ED25519_SIGNATURE_LEN: usize = 64;

/// Smallest and largest DER encodings of a P-256 ECDSA signature.
const MIN_DER_LEN: usize = 8;
const MAX_DER_LEN: usize = 72;

/// Public key parse failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unsupported or malformed public key: {reason}")]
pub struct KeyError {
    reason: String,
}

/// A verification key for governance signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    P256(p256::ecdsa::VerifyingKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Parse an SPKI PEM public key.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let pem = pem.trim();
        if pem.is_empty() {
            return Err(KeyError {
                reason: "empty key".to_string(),
            });
        }

        if let Ok(key) = p256::ecdsa::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::P256(key));
        }

        ed25519_dalek::VerifyingKey::from_public_key_pem(pem)
            .map(Self::Ed25519)
            .map_err(|e| KeyError {
                reason: format!("not a P-256 or Ed25519 SPKI key: {}", e),
            })
    }

    pub fn algorithm(&self) -> &'static str {
        match self {
            Self::P256(_) => "ECDSA-P256",
            Self::Ed25519(_) => "Ed25519",
        }
    }

    /// Verify `signature` over `message`. Returns `false` on any malformed input.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::P256(key) => verify_ecdsa_p256(key, message, signature),
            Self::Ed25519(key) => verify_ed25519(key, message, signature),
        }
    }
}

/// Verify a signature against a public key.
pub fn verify_signature(key: &PublicKey, message: &[u8], signature: &[u8]) -> bool {
    key.verify(message, signature)
}

/// ECDSA signature wire encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureEncoding {
    Raw,
    Der,
}

/// Detect the encoding of an ECDSA P-256 signature from its length and structure.
///
/// A 64-byte input is reported as raw even when it is also DER-shaped;
/// verification tries DER as well in that case.
pub fn detect_ecdsa_encoding(signature: &[u8]) -> Option<SignatureEncoding> {
    if signature.len() == RAW_ECDSA_P256_LEN {
        return Some(SignatureEncoding::Raw);
    }
    is_der_shaped(signature).then_some(SignatureEncoding::Der)
}

/// SEQUENCE tag followed by a short-form length covering the rest.
fn is_der_shaped(signature: &[u8]) -> bool {
    (MIN_DER_LEN..=MAX_DER_LEN).contains(&signature.len())
        && signature[0] == 0x30
        && usize::from(signature[1]) == signature.len() - 2
}

fn verify_ecdsa_p256(key: &p256::ecdsa::VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    match detect_ecdsa_encoding(signature) {
        Some(SignatureEncoding::Raw) => {
            verify_p256_raw(key, message, signature)
                || (is_der_shaped(signature) && verify_p256_der(key, message, signature))
        }
        Some(SignatureEncoding::Der) => verify_p256_der(key, message, signature),
        None => false,
    }
}

fn verify_p256_raw(key: &p256::ecdsa::VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    p256::ecdsa::Signature::from_slice(signature)
        .is_ok_and(|sig| key.verify(message, &sig).is_ok())
}

fn verify_p256_der(key: &p256::ecdsa::VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    p256::ecdsa::Signature::from_der(signature)
        .is_ok_and(|sig| key.verify(message, &sig).is_ok())
}

fn verify_ed25519(key: &ed25519_dalek::VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    if signature.len() != ED25519_SIGNATURE_LEN {
        return false;
    }
    match ed25519_dalek::Signature::from_slice(signature) {
        Ok(sig) => key.verify_strict(message, &sig).is_ok(),
        Err(_) => false,
    }
}

/// Decode a Base64 signature blob; `None` if it is not valid Base64.
pub(crate) fn decode_signature_b64(b64: &str) -> Option<Vec<u8>> {
    BASE64.decode(b64.trim()).ok()
}
