//! Payload hashing with legacy canonicalization fallback.
//!
//! The claimed metadata hash is SHA-256 over the payload text, lowercase hex.
//! Entries approved under older payload schemas were hashed before later
//! fields existed, so each legacy variant strips those members back out of
//! the payload text and re-hashes it.
//!
//! ```text
//! V1       base fields
//! V2       + contractType
//! V3       + per-link label
//! Current  + tnParticipantID
//! ```
//!
//! Verified entries are parsed from the canonical text of the matched
//! variant, never from members that were stripped before hashing.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Length of a lowercase hex SHA-256 digest.
pub const HASH_HEX_LEN: usize = 64;

/// Structural context of a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    Address,
    Asset,
}

/// Payload canonicalization a hash was computed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CanonicalVariant {
    Current,
    LegacyV1,
    LegacyV2,
    LegacyV3,
}

/// Which schema-versioned fields a canonical variant covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet {
    pub contract_type: bool,
    pub link_labels: bool,
    pub participant_id: bool,
}

const ADDRESS_LEGACY: &[CanonicalVariant] = &[
    CanonicalVariant::LegacyV1,
    CanonicalVariant::LegacyV2,
    CanonicalVariant::LegacyV3,
];

impl CanonicalVariant {
    /// Legacy variants for a payload kind, oldest first.
    pub fn legacy_variants(kind: PayloadKind) -> &'static [CanonicalVariant] {
        match kind {
            PayloadKind::Address => ADDRESS_LEGACY,
            PayloadKind::Asset => &[],
        }
    }

    pub fn is_legacy(&self) -> bool {
        !matches!(self, Self::Current)
    }

    pub fn field_set(&self) -> FieldSet {
        match self {
            Self::Current => FieldSet {
                contract_type: true,
                link_labels: true,
                participant_id: true,
            },
            Self::LegacyV3 => FieldSet {
                contract_type: true,
                link_labels: true,
                participant_id: false,
            },
            Self::LegacyV2 => FieldSet {
                contract_type: true,
                link_labels: false,
                participant_id: false,
            },
            Self::LegacyV1 => FieldSet {
                contract_type: false,
                link_labels: false,
                participant_id: false,
            },
        }
    }

    fn stripped_members(&self) -> &'static [StrippedMember] {
        match self {
            Self::Current => &[],
            Self::LegacyV3 => &[StrippedMember::ParticipantId],
            Self::LegacyV2 => &[StrippedMember::ParticipantId, StrippedMember::LinkLabel],
            Self::LegacyV1 => &[
                StrippedMember::ParticipantId,
                StrippedMember::LinkLabel,
                StrippedMember::ContractType,
            ],
        }
    }

    /// Payload text as it was hashed under this variant.
    pub fn canonicalize<'a>(&self, payload: &'a str) -> Cow<'a, str> {
        let mut text = Cow::Borrowed(payload);
        for member in self.stripped_members() {
            let stripped = match member.strip(&text) {
                Cow::Borrowed(_) => None,
                Cow::Owned(s) => Some(s),
            };
            if let Some(s) = stripped {
                text = Cow::Owned(s);
            }
        }
        text
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::LegacyV1 => "legacy_v1",
            Self::LegacyV2 => "legacy_v2",
            Self::LegacyV3 => "legacy_v3",
        }
    }
}

impl fmt::Display for CanonicalVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payload member introduced after V1, removed textually for legacy hashing.
#[derive(Debug, Clone, Copy)]
enum StrippedMember {
    ParticipantId,
    LinkLabel,
    ContractType,
}

impl StrippedMember {
    fn strip<'a>(&self, text: &'a str) -> Cow<'a, str> {
        match self {
            Self::ParticipantId => participant_re().replace_all(text, ""),
            Self::LinkLabel => strip_link_labels(text),
            Self::ContractType => contract_type_re().replace_all(text, ""),
        }
    }
}

fn participant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#","tnParticipantID":"(?:[^"\\]|\\.)*""#).expect("static regex")
    })
}

/// Array members whose objects carry per-link labels.
const LINK_ARRAYS: &[&str] = &[r#""linkedInternalAddresses":["#, r#""linkedWallets":["#];

/// Remove labels that close a linked address/wallet object. Only the
/// contents of the link arrays are touched; the entry's own label is part
/// of every schema version.
fn strip_link_labels(text: &str) -> Cow<'_, str> {
    let mut out = String::new();
    let mut cursor = 0;
    let mut changed = false;
    while let Some((start, end)) = next_link_array(text, cursor) {
        if let Cow::Owned(stripped) = link_label_re().replace_all(&text[start..end], "}") {
            out.push_str(&text[cursor..start]);
            out.push_str(&stripped);
            changed = true;
        } else {
            out.push_str(&text[cursor..end]);
        }
        cursor = end;
    }

    if !changed {
        return Cow::Borrowed(text);
    }
    out.push_str(&text[cursor..]);
    Cow::Owned(out)
}

/// Byte range of the next link array's contents at or after `from`.
fn next_link_array(text: &str, from: usize) -> Option<(usize, usize)> {
    let rest = &text[from..];
    let start = LINK_ARRAYS
        .iter()
        .filter_map(|marker| rest.find(*marker).map(|i| from + i + marker.len()))
        .min()?;
    let end = array_end(text, start)?;
    Some((start, end))
}

/// Index of the `]` closing an array whose contents start at `from`.
fn array_end(text: &str, from: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate().skip(from) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn link_label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#","label":"(?:[^"\\]|\\.)*"\}"#).expect("static regex"))
}

fn contract_type_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#","contractType":"(?:[^"\\]|\\.)*""#).expect("static regex")
    })
}

/// A claimed hash matched under a specific canonical variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMatch {
    pub variant: CanonicalVariant,
    pub hash: String,
}

/// SHA-256 of the payload text, lowercase hex.
pub fn compute_hash(payload: &str) -> String {
    sha256_hex(payload.as_bytes())
}

/// Legacy address hashes of the payload, oldest schema first.
pub fn compute_legacy_hashes(payload: &str) -> Vec<String> {
    legacy_digests(payload, PayloadKind::Address)
        .into_iter()
        .map(|(_, hash)| hash)
        .collect()
}

/// Hash of every distinct legacy canonicalization, oldest schema first.
///
/// A legacy variant whose text is identical to the current payload or to an
/// earlier variant is skipped; it is the same canonicalization.
pub fn legacy_digests(payload: &str, kind: PayloadKind) -> Vec<(CanonicalVariant, String)> {
    candidates(payload, kind)
        .into_iter()
        .filter(|(variant, _)| variant.is_legacy())
        .map(|(variant, text)| (variant, sha256_hex(text.as_bytes())))
        .collect()
}

/// Find the canonical variant whose hash equals `claimed`.
///
/// The current canonicalization is tried first, then legacy ones in order.
pub fn match_hash(payload: &str, claimed: &str, kind: PayloadKind) -> Option<HashMatch> {
    candidates(payload, kind).into_iter().find_map(|(variant, text)| {
        let hash = sha256_hex(text.as_bytes());
        constant_time_eq(&hash, claimed).then_some(HashMatch { variant, hash })
    })
}

fn candidates(payload: &str, kind: PayloadKind) -> Vec<(CanonicalVariant, Cow<'_, str>)> {
    let mut out: Vec<(CanonicalVariant, Cow<'_, str>)> =
        vec![(CanonicalVariant::Current, Cow::Borrowed(payload))];

    for variant in CanonicalVariant::legacy_variants(kind) {
        let text = variant.canonicalize(payload);
        if out.iter().any(|(_, seen)| *seen == text) {
            continue;
        }
        out.push((*variant, text));
    }
    out
}

/// Constant-time string equality.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Whether `hash` has the shape of a lowercase hex SHA-256 digest.
pub(crate) fn is_hash_shaped(hash: &str) -> bool {
    hash.len() == HASH_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_PAYLOAD: &str = concat!(
        r#"{"currency":"ETH","network":"mainnet","address":"0xabc","label":"treasury","#,
        r#""contractType":"","tnParticipantID":"p-17","#,
        r#""linkedInternalAddresses":[{"id":"1","address":"0xdef","label":"hot"}],"#,
        r#""linkedWallets":[{"id":"7","path":"m/44'/60'/0'","label":"ops"}]}"#
    );

    #[test]
    fn test_compute_hash_known_vector() {
        assert_eq!(
            compute_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_current_variant_is_identity() {
        let text = CanonicalVariant::Current.canonicalize(FULL_PAYLOAD);
        assert!(matches!(text, Cow::Borrowed(_)));
        assert_eq!(text, FULL_PAYLOAD);
    }

    #[test]
    fn test_legacy_v3_drops_participant_only() {
        let text = CanonicalVariant::LegacyV3.canonicalize(FULL_PAYLOAD);
        assert!(!text.contains("tnParticipantID"));
        assert!(text.contains(r#""contractType":"""#));
        assert!(text.contains(r#""label":"hot""#));
    }

    #[test]
    fn test_legacy_v2_drops_link_labels_but_keeps_entry_label() {
        let text = CanonicalVariant::LegacyV2.canonicalize(FULL_PAYLOAD);
        assert!(text.contains(r#""label":"treasury""#));
        assert!(!text.contains(r#""label":"hot""#));
        assert!(!text.contains(r#""label":"ops""#));
        assert!(text.contains(r#"{"id":"1","address":"0xdef"}"#));
    }

    #[test]
    fn test_legacy_v1_drops_everything_later() {
        let text = CanonicalVariant::LegacyV1.canonicalize(FULL_PAYLOAD);
        assert_eq!(
            text,
            concat!(
                r#"{"currency":"ETH","network":"mainnet","address":"0xabc","label":"treasury","#,
                r#""linkedInternalAddresses":[{"id":"1","address":"0xdef"}],"#,
                r#""linkedWallets":[{"id":"7","path":"m/44'/60'/0'"}]}"#
            )
        );
    }

    #[test]
    fn test_entry_label_survives_legacy_stripping() {
        let payload = r#"{"currency":"ETH","network":"mainnet","address":"0xabc","label":"cold"}"#;
        assert_eq!(CanonicalVariant::LegacyV1.canonicalize(payload), payload);
        assert!(compute_legacy_hashes(payload).is_empty());

        let payload = concat!(
            r#"{"currency":"ETH","linkedWallets":[{"id":"7","label":"ops"}],"#,
            r#""note":"x]","label":"cold"}"#
        );
        assert_eq!(
            CanonicalVariant::LegacyV2.canonicalize(payload),
            concat!(
                r#"{"currency":"ETH","linkedWallets":[{"id":"7"}],"#,
                r#""note":"x]","label":"cold"}"#
            )
        );
    }

    #[test]
    fn test_link_array_bracket_inside_string() {
        let payload = r#"{"linkedInternalAddresses":[{"id":"1","address":"a]b","label":"hot"}],"label":"cold"}"#;
        assert_eq!(
            CanonicalVariant::LegacyV2.canonicalize(payload),
            r#"{"linkedInternalAddresses":[{"id":"1","address":"a]b"}],"label":"cold"}"#
        );
    }

    #[test]
    fn test_unterminated_link_array_left_alone() {
        let payload = r#"{"linkedWallets":[{"id":"7","label":"ops"}"#;
        assert_eq!(CanonicalVariant::LegacyV2.canonicalize(payload), payload);
    }

    #[test]
    fn test_strip_handles_escaped_quotes() {
        let payload = r#"{"address":"0x1","contractType":"say \"hi\"","memo":""}"#;
        let text = CanonicalVariant::LegacyV1.canonicalize(payload);
        assert_eq!(text, r#"{"address":"0x1","memo":""}"#);
    }

    #[test]
    fn test_match_prefers_current() {
        let claimed = compute_hash(FULL_PAYLOAD);
        let matched = match_hash(FULL_PAYLOAD, &claimed, PayloadKind::Address).unwrap();
        assert_eq!(matched.variant, CanonicalVariant::Current);
        assert_eq!(matched.hash, claimed);
    }

    #[test]
    fn test_match_legacy_variant() {
        let v2_text = CanonicalVariant::LegacyV2.canonicalize(FULL_PAYLOAD);
        let claimed = compute_hash(&v2_text);

        let matched = match_hash(FULL_PAYLOAD, &claimed, PayloadKind::Address).unwrap();
        assert_eq!(matched.variant, CanonicalVariant::LegacyV2);
        assert!(!matched.variant.field_set().link_labels);
    }

    #[test]
    fn test_no_match_returns_none() {
        let claimed = compute_hash("something else");
        assert!(match_hash(FULL_PAYLOAD, &claimed, PayloadKind::Address).is_none());
    }

    #[test]
    fn test_assets_have_no_legacy_variants() {
        let payload = r#"{"blockchain":"ETH","contractType":"ERC20"}"#;
        assert!(legacy_digests(payload, PayloadKind::Asset).is_empty());

        let v1 = CanonicalVariant::LegacyV1.canonicalize(payload);
        assert!(match_hash(payload, &compute_hash(&v1), PayloadKind::Asset).is_none());
    }

    #[test]
    fn test_identical_legacy_texts_are_skipped() {
        // Nothing to strip: every legacy text equals the current payload.
        let payload = r#"{"currency":"BTC","network":"mainnet","address":"bc1q"}"#;
        assert!(compute_legacy_hashes(payload).is_empty());

        // Only the participant id differs, so V2 and V1 collapse onto V3.
        let payload = r#"{"currency":"BTC","address":"bc1q","tnParticipantID":"p"}"#;
        let digests = legacy_digests(payload, PayloadKind::Address);
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].0, CanonicalVariant::LegacyV1);
    }

    #[test]
    fn test_legacy_hashes_oldest_first() {
        let digests = legacy_digests(FULL_PAYLOAD, PayloadKind::Address);
        let variants: Vec<_> = digests.iter().map(|(v, _)| *v).collect();
        assert_eq!(
            variants,
            vec![
                CanonicalVariant::LegacyV1,
                CanonicalVariant::LegacyV2,
                CanonicalVariant::LegacyV3
            ]
        );
        assert_eq!(compute_legacy_hashes(FULL_PAYLOAD).len(), 3);
    }

    #[test]
    fn test_hash_shape() {
        assert!(is_hash_shaped(&compute_hash("x")));
        assert!(!is_hash_shaped("ABC"));
        assert!(!is_hash_shaped(&compute_hash("x").to_uppercase()));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
    }
}
