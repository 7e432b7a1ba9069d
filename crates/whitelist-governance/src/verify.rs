//! Verification entry points.
//!
//! The functions here are the stable surface for callers that do not hold a
//! verifier value. They are synchronous and CPU bound; with the `tokio`
//! feature enabled, `*_async` variants run them on the blocking pool.

use crate::address::{verify_address, WhitelistedAddress};
use crate::asset::{verify_asset, WhitelistedAsset};
use crate::config::GovernanceConfig;
use crate::error::GovernanceResult;
use crate::types::{Envelope, VerificationResult};

pub use crate::hash::{compute_hash, compute_legacy_hashes};

/// Verify a whitelisted address envelope.
pub fn verify_whitelisted_address(
    envelope: &Envelope,
    config: &GovernanceConfig,
) -> GovernanceResult<VerificationResult<WhitelistedAddress>> {
    let span = tracing::debug_span!("verify_whitelisted_address", hash = %envelope.metadata.hash);
    let _guard = span.enter();
    verify_address(envelope, config)
}

/// Verify a whitelisted asset envelope.
pub fn verify_whitelisted_asset(
    envelope: &Envelope,
    config: &GovernanceConfig,
) -> GovernanceResult<VerificationResult<WhitelistedAsset>> {
    let span = tracing::debug_span!("verify_whitelisted_asset", hash = %envelope.metadata.hash);
    let _guard = span.enter();
    verify_asset(envelope, config)
}

#[cfg(feature = "tokio")]
mod blocking {
    use super::*;
    use crate::error::GovernanceError;

    /// Run a verification on tokio's blocking pool.
    ///
    /// A panic inside the verification is resumed on the caller; a cancelled
    /// task maps to [`GovernanceError::Aborted`].
    async fn run_blocking<T, F>(f: F) -> GovernanceResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> GovernanceResult<T> + Send + 'static,
    {
        match tokio::task::spawn_blocking(f).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(GovernanceError::Aborted {
                message: e.to_string(),
            }),
        }
    }

    /// Async form of [`verify_whitelisted_address`].
    pub async fn verify_whitelisted_address_async(
        envelope: Envelope,
        config: GovernanceConfig,
    ) -> GovernanceResult<VerificationResult<WhitelistedAddress>> {
        run_blocking(move || verify_whitelisted_address(&envelope, &config)).await
    }

    /// Async form of [`verify_whitelisted_asset`].
    pub async fn verify_whitelisted_asset_async(
        envelope: Envelope,
        config: GovernanceConfig,
    ) -> GovernanceResult<VerificationResult<WhitelistedAsset>> {
        run_blocking(move || verify_whitelisted_asset(&envelope, &config)).await
    }
}

#[cfg(feature = "tokio")]
pub use blocking::{verify_whitelisted_address_async, verify_whitelisted_asset_async};
