#![no_main]

//! Fuzz target for authenticator data, COSE keys and DER signatures
//!
//! Run with: cargo +nightly fuzz run fuzz_authdata

use attestguard_core::{cose, signature, AuthenticatorData};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Some(parsed) = AuthenticatorData::parse(data) {
        if let Some(credential) = parsed.attested {
            let _ = cose::ec2_to_sec1(&credential.public_key_cose);
        }
    }
    let _ = AuthenticatorData::parse_fixed(data);
    let _ = cose::ec2_to_sec1(data);

    let raw = signature::der_to_raw(data);
    assert!(raw.len() == signature::RAW_SIGNATURE_LEN || raw == data);
});
