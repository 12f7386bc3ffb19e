//! COSE_Key reader for EC2 / P-256 credential public keys.
//!
//! The authenticator data carries the credential key as a COSE_Key map with
//! integer labels (`1: kty, 3: alg, -1: crv, -2: x, -3: y`). This reader
//! handles only that shape and converts it to an uncompressed SEC1 point so
//! it can be imported by [`signature::import_public_key`](crate::signature::import_public_key).

use crate::cbor::{self, Value};
use crate::error::DecodeError;

const LABEL_KTY: i64 = 1;
const LABEL_CRV: i64 = -1;
const LABEL_X: i64 = -2;
const LABEL_Y: i64 = -3;

const KTY_EC2: i64 = 2;
const CRV_P256: i64 = 1;

const COORDINATE_LEN: usize = 32;

/// Convert an EC2 P-256 COSE_Key to `0x04‖x‖y`.
pub fn ec2_to_sec1(cose: &[u8]) -> Option<Vec<u8>> {
    match read_ec2(cose) {
        Ok(point) => point,
        Err(e) => {
            tracing::debug!(error = %e, "COSE key decode failed");
            None
        }
    }
}

fn read_ec2(cose: &[u8]) -> Result<Option<Vec<u8>>, DecodeError> {
    let key = cbor::decode_value(cose)?;
    let entries = key.as_map().ok_or_else(|| DecodeError::UnexpectedType {
        expected: "map",
        found: key.type_name(),
    })?;

    let (mut kty, mut crv, mut x, mut y) = (None, None, None, None);
    for (label, value) in entries {
        let label = label
            .as_int()
            .ok_or_else(|| DecodeError::Unsupported("non-integer COSE label".into()))?;
        match (label, value) {
            (LABEL_KTY, v) => kty = v.as_int(),
            (LABEL_CRV, v) => crv = v.as_int(),
            (LABEL_X, Value::Bytes(b)) => x = Some(*b),
            (LABEL_Y, Value::Bytes(b)) => y = Some(*b),
            _ => {}
        }
    }

    let (Some(KTY_EC2), Some(CRV_P256), Some(x), Some(y)) = (kty, crv, x, y) else {
        return Ok(None);
    };
    if x.len() != COORDINATE_LEN || y.len() != COORDINATE_LEN {
        return Ok(None);
    }

    let mut point = Vec::with_capacity(1 + 2 * COORDINATE_LEN);
    point.push(0x04);
    point.extend_from_slice(x);
    point.extend_from_slice(y);
    Ok(Some(point))
}
