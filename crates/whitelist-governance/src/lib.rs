//! Governance verification for whitelisted addresses and assets.
//!
//! A whitelist entry is only accepted after a fixed sequence of checks:
//!
//! - The payload hashes to the claimed metadata hash (current or legacy
//!   canonicalization)
//! - Enough distinct super-admin keys signed the rules container
//! - The rules container decodes into users, groups and threshold policies
//! - Each approval signature verifies and covers the verified hash
//! - The verified approvers satisfy the governing threshold policy
//!
//! Any failure rejects the entry. There is no partial result.
//!
//! # Quick Start
//!
//! ```no_run
//! use whitelist_governance::{verify_whitelisted_address, Envelope, GovernanceConfig};
//!
//! # fn example(json: &str) -> Result<(), whitelist_governance::GovernanceError> {
//! // Super-admin keys and quorum from the environment
//! let config = GovernanceConfig::from_env()?;
//!
//! let envelope = Envelope::from_json(json)?;
//! let verified = verify_whitelisted_address(&envelope, &config)?;
//! println!(
//!     "{} approved by {:?}",
//!     verified.value.address, verified.verified_signer_ids
//! );
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `GOVERNANCE_SUPERADMIN_KEYS_FILE` | Path to a YAML config file (takes precedence) |
//! | `GOVERNANCE_SUPERADMIN_KEYS` | Concatenated SPKI PEM super-admin keys |
//! | `GOVERNANCE_MIN_VALID_SIGNATURES` | Super-admin quorum |
//! | `GOVERNANCE_STRICT_USER_KEYS` | Reject rules containers with unparsable user keys (default: exclude the user) |
//!
//! # Features
//!
//! - `tokio`: `verify_whitelisted_address_async` / `verify_whitelisted_asset_async`

pub mod address;
pub mod asset;
pub mod config;
pub mod coverage;
pub mod crypto;
pub mod error;
pub mod hash;
mod pipeline;
pub mod rules;
pub mod threshold;
pub mod trust;
pub mod types;
pub mod verify;

// Re-export main types
pub use address::{
    parse_address, LinkedAddress, LinkedWallet, WhitelistedAddress, WhitelistedAddressVerifier,
};
pub use asset::{asset_from_metadata, WhitelistedAsset, WhitelistedAssetVerifier};
pub use config::{GovernanceConfig, GovernanceConfigFile, KeyPolicy, SuperAdminKeySet};
pub use crypto::{verify_signature, KeyError, PublicKey, SignatureEncoding};
pub use error::{
    GovernanceError, GovernanceResult, IntegrityFailure, Stage, ThresholdShortfall,
    WhitelistFailure,
};
pub use hash::{CanonicalVariant, HashMatch, PayloadKind, HASH_HEX_LEN};
pub use rules::{
    DecodedRulesContainer, GroupThreshold, PolicyOverride, PolicySet, RuleGroup, RuleUser,
    ThresholdPolicy,
};
pub use trust::{verify_trust, TrustReport};
pub use types::{Envelope, EnvelopeMetadata, VerificationResult, WhitelistSignatureEntry};
pub use verify::{
    compute_hash, compute_legacy_hashes, verify_whitelisted_address, verify_whitelisted_asset,
};

#[cfg(feature = "tokio")]
pub use verify::{verify_whitelisted_address_async, verify_whitelisted_asset_async};
