//! Error types for governance verification.

use std::fmt;

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Envelope shape checks, before any cryptographic work.
    Envelope,
    /// Payload hash against the claimed metadata hash.
    HashCheck,
    /// Super-admin quorum over the rules container.
    RulesTrust,
    /// Rules container decoding.
    Decode,
    /// Per-signature crypto and hash coverage checks.
    HashCoverage,
    /// Threshold policy evaluation.
    ThresholdCheck,
    /// Domain object parsing.
    Parse,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Envelope => "envelope",
            Self::HashCheck => "hash_check",
            Self::RulesTrust => "rules_trust",
            Self::Decode => "decode",
            Self::HashCoverage => "hash_coverage",
            Self::ThresholdCheck => "threshold_check",
            Self::Parse => "parse",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Integrity failures: the inputs are not what they claim to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityFailure {
    /// Claimed hash matches no canonicalization of the payload.
    HashMismatch,
    /// Rules container is not valid Base64 JSON or is internally inconsistent.
    MalformedRulesContainer,
    /// Fewer distinct super-admin keys signed the rules container than required.
    InsufficientTrustSignatures { valid: usize, required: usize },
    /// A user key in the rules container does not parse (strict key policy).
    InvalidPublicKey,
}

impl IntegrityFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::HashMismatch => "hash_mismatch",
            Self::MalformedRulesContainer => "malformed_rules_container",
            Self::InsufficientTrustSignatures { .. } => "insufficient_trust_signatures",
            Self::InvalidPublicKey => "invalid_public_key",
        }
    }
}

impl fmt::Display for IntegrityFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientTrustSignatures { valid, required } => {
                write!(f, "{} ({} of {} required)", self.code(), valid, required)
            }
            _ => f.write_str(self.code()),
        }
    }
}

/// Which part of a threshold policy was not satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdShortfall {
    /// Index of the failing stage for sequential policies.
    pub stage_index: Option<usize>,
    pub group_id: String,
    pub required: usize,
    pub obtained: usize,
    /// False when the group cannot reach quorum even with every usable member signing.
    pub reachable: bool,
}

impl fmt::Display for ThresholdShortfall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(stage) = self.stage_index {
            write!(f, "stage {}, ", stage)?;
        }
        write!(
            f,
            "group {}: {} of {} signatures",
            self.group_id, self.obtained, self.required
        )?;
        if !self.reachable {
            f.write_str(" (quorum unreachable)")?;
        }
        Ok(())
    }
}

/// Authorization failures: inputs are well-formed but not sufficiently approved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhitelistFailure {
    /// Verified signers do not satisfy the governing policy.
    ThresholdNotMet(ThresholdShortfall),
    /// Signatures are present but none covers the verified hash.
    HashCoverageMissing,
}

impl WhitelistFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ThresholdNotMet(_) => "threshold_not_met",
            Self::HashCoverageMissing => "hash_coverage_missing",
        }
    }
}

impl fmt::Display for WhitelistFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdNotMet(shortfall) => write!(f, "{} ({})", self.code(), shortfall),
            Self::HashCoverageMissing => f.write_str(self.code()),
        }
    }
}

/// Governance verification errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GovernanceError {
    /// Hash mismatch, untrusted or malformed rules container, bad key material.
    #[error("integrity error at {stage}: {failure}: {detail}")]
    Integrity {
        stage: Stage,
        failure: IntegrityFailure,
        detail: String,
    },

    /// Threshold not met or no signature covers the verified hash.
    #[error("whitelist error at {stage}: {failure}")]
    Whitelist {
        stage: Stage,
        failure: WhitelistFailure,
    },

    /// Envelope or payload field is missing or malformed. Every shape failure
    /// shares the `missing_field` code; `field` and `message` say which.
    #[error("validation error at {stage}: {field}: {message}")]
    Validation {
        stage: Stage,
        field: String,
        message: String,
    },

    /// Caller supplied configuration is unusable.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Verification task was cancelled before it produced a result.
    #[error("verification aborted: {message}")]
    Aborted { message: String },
}

impl GovernanceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Integrity { failure, .. } => failure.code(),
            Self::Whitelist { failure, .. } => failure.code(),
            Self::Validation { .. } => "missing_field",
            Self::Config { .. } => "invalid_config",
            Self::Aborted { .. } => "aborted",
        }
    }

    /// Stage the error was raised in, if it came from the pipeline.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Integrity { stage, .. }
            | Self::Whitelist { stage, .. }
            | Self::Validation { stage, .. } => Some(*stage),
            Self::Config { .. } | Self::Aborted { .. } => None,
        }
    }

    /// Exit code for CLI wrappers.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,
            Self::Validation { .. } => 2,
            Self::Whitelist { .. } => 3,
            Self::Integrity { .. } => 4,
            Self::Aborted { .. } => 5,
        }
    }

    /// Verification failures are facts about the inputs; nothing here is retryable.
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub(crate) fn integrity(
        stage: Stage,
        failure: IntegrityFailure,
        detail: impl Into<String>,
    ) -> Self {
        Self::Integrity {
            stage,
            failure,
            detail: detail.into(),
        }
    }

    pub(crate) fn malformed_rules(detail: impl Into<String>) -> Self {
        Self::integrity(
            Stage::Decode,
            IntegrityFailure::MalformedRulesContainer,
            detail,
        )
    }

    pub(crate) fn whitelist(stage: Stage, failure: WhitelistFailure) -> Self {
        Self::Whitelist { stage, failure }
    }

    pub(crate) fn validation(
        stage: Stage,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            stage,
            field: field.into(),
            message: message.into(),
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Result type for governance operations.
pub type GovernanceResult<T> = Result<T, GovernanceError>;
