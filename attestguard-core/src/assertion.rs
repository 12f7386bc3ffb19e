//! Per-request assertion flow: decode, enforce the counter, verify the
//! signature against the key stored at attestation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::authdata::AuthenticatorData;
use crate::cbor;
use crate::error::AttestError;
use crate::result::{Condition, VerificationResult};
use crate::signature;

/// Smallest decoded assertion object accepted.
pub const MIN_ASSERTION_LEN: usize = 50;

pub const RISK_SIGNATURE_VERIFIED: u8 = 5;
pub const RISK_SIGNATURE_UNVERIFIED: u8 = 20;

#[derive(Debug, Clone, Copy)]
pub struct AssertionRequest<'a> {
    /// Base64 assertion object
    pub assertion: &'a str,
    /// Raw SHA-256 of the client request data
    pub client_data_hash: &'a [u8],
}

/// State persisted for the key from earlier verifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoredDevice<'a> {
    pub counter: u32,
    /// Base64 SEC1 public key
    pub public_key_base64: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AssertionVerifier;

impl AssertionVerifier {
    pub fn new() -> Self {
        Self
    }

    pub fn verify(&self, request: &AssertionRequest<'_>, stored: StoredDevice<'_>) -> VerificationResult {
        match run(request, stored) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(kind = e.kind().as_str(), error = %e, "Assertion rejected");
                let result = VerificationResult::failure(&e);
                match e {
                    // The counter must not advance on replay
                    AttestError::Replay { stored: counter, .. } => result.with_counter(counter),
                    _ => result,
                }
            }
        }
    }
}

fn run(request: &AssertionRequest<'_>, stored: StoredDevice<'_>) -> Result<VerificationResult, AttestError> {
    let bytes = BASE64
        .decode(request.assertion)
        .map_err(|_| AttestError::Decoding("Invalid assertion encoding".into()))?;
    if bytes.len() < MIN_ASSERTION_LEN {
        return Err(AttestError::Format("Assertion data too short".into()));
    }

    let object = cbor::decode_assertion_object(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "CBOR decode failed");
        AttestError::Decoding("Failed to decode assertion object".into())
    })?;

    let auth_data = AuthenticatorData::parse_fixed(&object.auth_data)
        .ok_or_else(|| AttestError::Format("Invalid authenticator data".into()))?;

    if auth_data.sign_count <= stored.counter {
        tracing::warn!(
            observed = auth_data.sign_count,
            stored = stored.counter,
            "Assertion counter did not increase"
        );
        return Err(AttestError::Replay {
            observed: auth_data.sign_count,
            stored: stored.counter,
        });
    }

    match (stored.public_key_base64, object.signature.as_deref()) {
        (Some(public_key), Some(sig)) => {
            let verified = BASE64.decode(public_key).is_ok_and(|key| {
                signature::verify(&object.auth_data, request.client_data_hash, sig, &key)
            });
            if !verified {
                return Err(AttestError::Crypto("Signature verification failed".into()));
            }
            Ok(VerificationResult::success(RISK_SIGNATURE_VERIFIED, "Assertion verified")
                .with_counter(auth_data.sign_count))
        }
        (key, sig) => {
            tracing::warn!(
                has_key = key.is_some(),
                has_signature = sig.is_some(),
                "Accepting assertion without signature verification"
            );
            Ok(VerificationResult::success(
                RISK_SIGNATURE_UNVERIFIED,
                "Assertion accepted without signature verification",
            )
            .with_counter(auth_data.sign_count)
            .with_condition(Condition::SignatureNotVerified))
        }
    }
}
