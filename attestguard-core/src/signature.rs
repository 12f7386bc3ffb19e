//! ECDSA P-256 / SHA-256 signature handling.
//!
//! Platform keys emit DER-encoded signatures (`SEQUENCE { INTEGER r, INTEGER s }`)
//! while the verifier works on fixed-width `r‖s`. Conversion is lenient:
//! input that is not a well-formed DER signature is passed through unchanged
//! and left for verification to reject.

use p256::ecdsa::{signature::Verifier, Signature, VerifyingKey};

use crate::der::{self, TAG_INTEGER, TAG_SEQUENCE};
use crate::reader::Reader;

/// Width of one P-256 scalar.
pub const SCALAR_LEN: usize = 32;
/// Width of a raw `r‖s` signature.
pub const RAW_SIGNATURE_LEN: usize = 2 * SCALAR_LEN;

/// Convert a DER signature to raw `r‖s`.
///
/// Returns the input unchanged when it is not a DER signature with two
/// integers that each fit in 32 bytes.
pub fn der_to_raw(signature: &[u8]) -> Vec<u8> {
    match parse_der(signature) {
        Some(raw) => raw.to_vec(),
        None => signature.to_vec(),
    }
}

fn parse_der(signature: &[u8]) -> Option<[u8; RAW_SIGNATURE_LEN]> {
    let mut outer = Reader::new(signature);
    let body = der::expect(&mut outer, TAG_SEQUENCE).ok()?;
    if !outer.is_empty() {
        return None;
    }

    let mut body = Reader::new(body);
    let r = der::expect(&mut body, TAG_INTEGER).ok()?;
    let s = der::expect(&mut body, TAG_INTEGER).ok()?;
    if !body.is_empty() {
        return None;
    }

    let mut raw = [0u8; RAW_SIGNATURE_LEN];
    left_pad(r, &mut raw[..SCALAR_LEN])?;
    left_pad(s, &mut raw[SCALAR_LEN..])?;
    Some(raw)
}

/// Strip sign-padding zeros and right-align into `out`.
fn left_pad(integer: &[u8], out: &mut [u8]) -> Option<()> {
    let first = integer.iter().position(|&b| b != 0).unwrap_or(integer.len());
    let magnitude = &integer[first..];
    if magnitude.len() > out.len() {
        return None;
    }
    let offset = out.len() - magnitude.len();
    out[offset..].copy_from_slice(magnitude);
    Some(())
}

/// Convert raw `r‖s` to a DER signature with minimal INTEGER encoding.
pub fn raw_to_der(raw: &[u8; RAW_SIGNATURE_LEN]) -> Vec<u8> {
    let mut body = encode_integer(&raw[..SCALAR_LEN]);
    body.extend(encode_integer(&raw[SCALAR_LEN..]));
    der::encode_tlv(TAG_SEQUENCE, &body)
}

fn encode_integer(scalar: &[u8]) -> Vec<u8> {
    let first = scalar
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(scalar.len().saturating_sub(1));
    let magnitude = &scalar[first..];

    let mut content = Vec::with_capacity(magnitude.len() + 1);
    if magnitude.first().is_some_and(|b| b & 0x80 != 0) {
        content.push(0);
    }
    content.extend_from_slice(magnitude);
    der::encode_tlv(TAG_INTEGER, &content)
}

/// Import an uncompressed (or compressed) SEC1 point as a P-256 key.
pub fn import_public_key(sec1: &[u8]) -> Option<VerifyingKey> {
    VerifyingKey::from_sec1_bytes(sec1).ok()
}

/// Verify `signature` over `auth_data ‖ client_data_hash` with SHA-256.
///
/// `signature` may be DER or raw `r‖s`. Every failure, including key import,
/// reports `false`.
pub fn verify(
    auth_data: &[u8],
    client_data_hash: &[u8],
    signature: &[u8],
    public_key: &[u8],
) -> bool {
    let Some(key) = import_public_key(public_key) else {
        tracing::debug!(key_len = public_key.len(), "Public key import failed");
        return false;
    };

    let mut message = Vec::with_capacity(auth_data.len() + client_data_hash.len());
    message.extend_from_slice(auth_data);
    message.extend_from_slice(client_data_hash);

    candidates(signature)
        .iter()
        .filter_map(|raw| Signature::from_slice(raw).ok())
        .any(|sig| key.verify(&message, &sig).is_ok())
}

/// A 64-byte value starting with a SEQUENCE tag is ambiguous; try both readings.
fn candidates(signature: &[u8]) -> Vec<Vec<u8>> {
    let mut out = Vec::with_capacity(2);
    if signature.len() == RAW_SIGNATURE_LEN {
        out.push(signature.to_vec());
    }
    if signature.first() == Some(&TAG_SEQUENCE) {
        if let Some(raw) = parse_der(signature) {
            out.push(raw.to_vec());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestKey;

    fn raw_with(r: &[u8], s: &[u8]) -> [u8; RAW_SIGNATURE_LEN] {
        let mut raw = [0u8; RAW_SIGNATURE_LEN];
        raw[SCALAR_LEN - r.len()..SCALAR_LEN].copy_from_slice(r);
        raw[RAW_SIGNATURE_LEN - s.len()..].copy_from_slice(s);
        raw
    }

    #[test]
    fn test_round_trip_preserves_scalars() {
        let cases = [
            raw_with(&[0x80; 32], &[0x7f; 32]),
            raw_with(&[0x01], &[0xff, 0x00]),
            raw_with(&[0x00; 0], &[0x00; 0]),
            raw_with(&[0x00, 0x00, 0x80, 0x01], &[0x12; 31]),
        ];
        for raw in cases {
            let der = raw_to_der(&raw);
            assert_eq!(der[0], TAG_SEQUENCE);
            assert_eq!(der_to_raw(&der), raw.to_vec());
        }
    }

    #[test]
    fn test_high_bit_integer_gets_zero_prefix() {
        let der = raw_to_der(&raw_with(&[0x80; 32], &[0x01]));
        // SEQUENCE, len, INTEGER, len 33, 0x00, 0x80...
        assert_eq!(&der[2..5], &[TAG_INTEGER, 33, 0x00]);
        assert_eq!(der[5], 0x80);
    }

    #[test]
    fn test_zero_scalar_encodes_as_single_byte() {
        let der = raw_to_der(&[0u8; RAW_SIGNATURE_LEN]);
        assert_eq!(der, vec![0x30, 0x06, 0x02, 0x01, 0x00, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_malformed_der_passes_through() {
        let inputs: [&[u8]; 4] = [
            &[0x31, 0x00],
            &[0x30, 0x03, 0x02, 0x01],
            &[0x30, 0x06, 0x02, 0x01, 0x01, 0x04, 0x01, 0x01],
            &[0xde, 0xad, 0xbe, 0xef],
        ];
        for input in inputs {
            assert_eq!(der_to_raw(input), input.to_vec());
        }

        // An integer wider than 32 bytes is not a P-256 scalar
        let mut wide = vec![0x02, 33];
        wide.extend([0x7f; 33]);
        wide.extend([0x02, 0x01, 0x01]);
        let der = der::encode_tlv(TAG_SEQUENCE, &wide);
        assert_eq!(der_to_raw(&der), der);
    }

    #[test]
    fn test_verify_accepts_der_and_raw() {
        let key = TestKey::from_seed(3);
        let auth_data = [0x11u8; 37];
        let client_data_hash = [0x22u8; 32];
        let mut message = auth_data.to_vec();
        message.extend_from_slice(&client_data_hash);

        let der = key.sign_der(&message);
        let raw = key.sign_raw(&message);
        let public_key = key.public_sec1();

        assert!(verify(&auth_data, &client_data_hash, &der, &public_key));
        assert!(verify(&auth_data, &client_data_hash, &raw, &public_key));
        assert_eq!(der_to_raw(&der).len(), RAW_SIGNATURE_LEN);
    }

    #[test]
    fn test_verify_rejects_wrong_message_key_or_shape() {
        let key = TestKey::from_seed(3);
        let other = TestKey::from_seed(4);
        let auth_data = [0x11u8; 37];
        let client_data_hash = [0x22u8; 32];
        let mut message = auth_data.to_vec();
        message.extend_from_slice(&client_data_hash);
        let sig = key.sign_der(&message);

        assert!(!verify(&auth_data, &[0x23u8; 32], &sig, &key.public_sec1()));
        assert!(!verify(&auth_data, &client_data_hash, &sig, &other.public_sec1()));
        assert!(!verify(&auth_data, &client_data_hash, &sig, &[0x04; 65]));
        assert!(!verify(&auth_data, &client_data_hash, &[0x30, 0x00], &key.public_sec1()));
        assert!(!verify(&auth_data, &client_data_hash, &[], &key.public_sec1()));
    }
}
