//! Threshold policy evaluation.
//!
//! Input is the set of user ids whose signatures already passed both the
//! cryptographic check and the hash coverage check. Because it is a set, a
//! user counts at most once per group however many signatures they sent.

use std::collections::BTreeSet;

use crate::error::ThresholdShortfall;
use crate::rules::{GroupThreshold, RuleGroup, ThresholdPolicy};

/// Evaluate `policy` against the verified signers.
///
/// Sequential stages are evaluated in declared order and evaluation stops at
/// the first stage that is not met.
pub fn evaluate(
    policy: &ThresholdPolicy,
    verified_signers: &BTreeSet<String>,
) -> Result<(), ThresholdShortfall> {
    match policy {
        ThresholdPolicy::GroupThreshold(threshold) => {
            evaluate_group_threshold(threshold, verified_signers, None)
        }
        ThresholdPolicy::SequentialThresholds(stages) => {
            for (i, stage) in stages.iter().enumerate() {
                evaluate_group_threshold(stage, verified_signers, Some(i))?;
                tracing::debug!(stage = i, "threshold stage met");
            }
            Ok(())
        }
    }
}

/// Boolean form of [`evaluate`].
pub fn is_satisfied(policy: &ThresholdPolicy, verified_signers: &BTreeSet<String>) -> bool {
    evaluate(policy, verified_signers).is_ok()
}

fn evaluate_group_threshold(
    threshold: &GroupThreshold,
    verified_signers: &BTreeSet<String>,
    stage_index: Option<usize>,
) -> Result<(), ThresholdShortfall> {
    for group in &threshold.rule_groups {
        let obtained = count_group_signers(group, verified_signers);
        if obtained < group.required_count {
            return Err(ThresholdShortfall {
                stage_index,
                group_id: group.group_id.clone(),
                required: group.required_count,
                obtained,
                reachable: group.usable_member_count() >= group.required_count,
            });
        }
    }
    Ok(())
}

fn count_group_signers(group: &RuleGroup, verified_signers: &BTreeSet<String>) -> usize {
    group
        .users
        .iter()
        .filter(|user| verified_signers.contains(&user.user_id))
        .count()
}
