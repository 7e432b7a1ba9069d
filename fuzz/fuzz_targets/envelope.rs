//! Fuzz harness for envelope parsing and hash matching.
//!
//! Exercises the legacy canonicalization regexes on arbitrary payload text.

#![no_main]
use libfuzzer_sys::fuzz_target;
use whitelist_governance::hash::{legacy_digests, match_hash};
use whitelist_governance::{Envelope, PayloadKind};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(envelope) = Envelope::from_json(text) {
        let _ = match_hash(&envelope.payload, &envelope.metadata.hash, PayloadKind::Address);
    }

    for (variant, hash) in legacy_digests(text, PayloadKind::Address) {
        assert!(variant.is_legacy());
        assert!(match_hash(text, &hash, PayloadKind::Address).is_some());
    }
});
