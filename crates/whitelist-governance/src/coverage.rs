//! Hash coverage check.
//!
//! A signature approves only the hashes it lists. Replaying an approval made
//! for an older payload against new content fails here, not with an error but
//! by simply not counting.

use subtle::{Choice, ConstantTimeEq};

use crate::types::WhitelistSignatureEntry;

/// Whether `entry` declares coverage of `target_hash`.
///
/// Every listed hash is compared so timing does not reveal the match position.
pub fn covers(entry: &WhitelistSignatureEntry, target_hash: &str) -> bool {
    let found = entry
        .covered_hashes
        .iter()
        .fold(Choice::from(0), |acc, hash| {
            acc | hash.as_bytes().ct_eq(target_hash.as_bytes())
        });
    bool::from(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(hashes: &[&str]) -> WhitelistSignatureEntry {
        WhitelistSignatureEntry {
            user_id: "alice".to_string(),
            signature: String::new(),
            covered_hashes: hashes.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn test_covers_exact_member() {
        assert!(covers(&entry(&["aa", "bb", "cc"]), "bb"));
        assert!(covers(&entry(&["cc"]), "cc"));
    }

    #[test]
    fn test_empty_coverage_is_false() {
        assert!(!covers(&entry(&[]), "aa"));
    }

    #[test]
    fn test_prefix_and_case_do_not_match() {
        assert!(!covers(&entry(&["aabb"]), "aa"));
        assert!(!covers(&entry(&["AA"]), "aa"));
    }
}
