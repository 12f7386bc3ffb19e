#![no_main]

//! Fuzz target for the DER certificate parser
//!
//! The same bytes are also fed to the chain validator as a two-entry chain.
//!
//! Run with: cargo +nightly fuzz run fuzz_der

use attestguard_core::{chain, der, ChainValidator};
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = der::parse_certificate(data);
    let _ = der::certificate_bytes(data);
    let _ = chain::decode_nonce(data);

    if let Some(now) = Utc.timestamp_opt(1_750_000_000, 0).single() {
        let chain = [data.to_vec(), data.to_vec()];
        let _ = ChainValidator::default().verify(&chain, &[0u8; 32], now);
    }
});
