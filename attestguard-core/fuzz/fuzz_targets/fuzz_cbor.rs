#![no_main]

//! Fuzz target for the CBOR decoders
//!
//! Arbitrary bytes must decode or fail with a `DecodeError`, never panic or
//! read past the buffer.
//!
//! Run with: cargo +nightly fuzz run fuzz_cbor

use attestguard_core::cbor;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = cbor::decode_value(data);
    let _ = cbor::decode_attestation_object(data);
    let _ = cbor::decode_assertion_object(data);
});
