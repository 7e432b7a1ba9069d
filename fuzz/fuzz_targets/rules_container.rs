//! Fuzz harness for rules container decoding.
//!
//! Arbitrary bytes are decoded as container JSON under both key policies.
//! Decoding must return an error, never panic.

#![no_main]
use libfuzzer_sys::fuzz_target;
use whitelist_governance::rules::decode_bytes;
use whitelist_governance::KeyPolicy;

fuzz_target!(|data: &[u8]| {
    let _ = decode_bytes(data, KeyPolicy::Lenient);
    let _ = decode_bytes(data, KeyPolicy::Strict);
});
