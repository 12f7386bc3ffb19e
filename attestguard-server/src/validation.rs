//! Request validation module
//!
//! Checks that each verification type carries its required fields and that
//! the small binary fields are valid base64. Payload contents are left to the
//! verification engine.

use attestguard_core::VerificationKind;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::ApiError;
use crate::handlers::DeviceVerifyRequest;

/// Longest key id accepted (a base64 SHA-256 is 44 characters)
pub const MAX_KEY_ID_LEN: usize = 128;

/// A request that passed shape validation
#[derive(Debug)]
pub enum VerifyInput<'a> {
    Attestation {
        key_id: &'a str,
        attestation: &'a str,
        challenge: Vec<u8>,
        bundle_id: Option<&'a str>,
    },
    Assertion {
        key_id: &'a str,
        assertion: &'a str,
        client_data_hash: Vec<u8>,
    },
    DeviceCheck {
        key_id: Option<&'a str>,
        token: &'a str,
    },
}

impl VerifyInput<'_> {
    pub fn kind(&self) -> VerificationKind {
        match self {
            Self::Attestation { .. } => VerificationKind::Attestation,
            Self::Assertion { .. } => VerificationKind::Assertion,
            Self::DeviceCheck { .. } => VerificationKind::DeviceCheck,
        }
    }

    /// Key whose record this request reads and writes
    pub fn key_id(&self) -> Option<&str> {
        match self {
            Self::Attestation { key_id, .. } | Self::Assertion { key_id, .. } => Some(*key_id),
            Self::DeviceCheck { key_id, .. } => *key_id,
        }
    }
}

/// Parse the `type` field.
pub fn parse_kind(value: &str) -> Result<VerificationKind, ApiError> {
    match value {
        "attestation" => Ok(VerificationKind::Attestation),
        "assertion" => Ok(VerificationKind::Assertion),
        "device_check" => Ok(VerificationKind::DeviceCheck),
        other => Err(ApiError::bad_request(format!(
            "Unknown verification type: '{}'. Allowed types: attestation, assertion, device_check",
            other
        ))),
    }
}

pub fn validate_verify_request(request: &DeviceVerifyRequest) -> Result<VerifyInput<'_>, ApiError> {
    let kind = parse_kind(&request.kind)?;
    if request.timestamp == 0 {
        return Err(ApiError::bad_request("timestamp must be milliseconds since epoch"));
    }
    let key_id = request.key_id.as_deref().map(validate_key_id).transpose()?;

    match kind {
        VerificationKind::Attestation => Ok(VerifyInput::Attestation {
            key_id: key_id.ok_or_else(|| missing("keyId", kind))?,
            attestation: required(request.attestation.as_deref(), "attestation", kind)?,
            challenge: decode_field(required(request.challenge.as_deref(), "challenge", kind)?, "challenge")?,
            bundle_id: request.bundle_id.as_deref().filter(|b| !b.is_empty()),
        }),
        VerificationKind::Assertion => Ok(VerifyInput::Assertion {
            key_id: key_id.ok_or_else(|| missing("keyId", kind))?,
            assertion: required(request.assertion.as_deref(), "assertion", kind)?,
            client_data_hash: decode_field(
                required(request.client_data_hash.as_deref(), "clientDataHash", kind)?,
                "clientDataHash",
            )?,
        }),
        VerificationKind::DeviceCheck => Ok(VerifyInput::DeviceCheck {
            key_id,
            token: required(request.token.as_deref(), "token", kind)?,
        }),
    }
}

fn validate_key_id(key_id: &str) -> Result<&str, ApiError> {
    if key_id.is_empty() {
        return Err(ApiError::bad_request("keyId must not be empty"));
    }
    if key_id.len() > MAX_KEY_ID_LEN {
        return Err(ApiError::bad_request(format!(
            "keyId too long: {} characters exceeds maximum of {}",
            key_id.len(),
            MAX_KEY_ID_LEN
        )));
    }
    Ok(key_id)
}

fn required<'a>(value: Option<&'a str>, field: &str, kind: VerificationKind) -> Result<&'a str, ApiError> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| missing(field, kind))
}

fn missing(field: &str, kind: VerificationKind) -> ApiError {
    ApiError::bad_request(format!("{} is required for {} verification", field, kind.as_str()))
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, ApiError> {
    BASE64
        .decode(value)
        .map_err(|e| ApiError::bad_request(format!("Invalid base64 in {}: {}", field, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(kind: &str) -> DeviceVerifyRequest {
        DeviceVerifyRequest {
            kind: kind.into(),
            key_id: Some("a2V5LWlk".into()),
            attestation: None,
            assertion: None,
            client_data_hash: None,
            challenge: None,
            token: None,
            bundle_id: None,
            timestamp: 1_767_225_600_000,
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = validate_verify_request(&request("safety_net")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn test_attestation_requires_fields() {
        let mut req = request("attestation");
        req.attestation = Some("b2JqZWN0".into());
        let err = validate_verify_request(&req).unwrap_err();
        assert!(err.to_string().contains("challenge is required"));

        req.challenge = Some("Y2hhbGxlbmdl".into());
        req.key_id = None;
        let err = validate_verify_request(&req).unwrap_err();
        assert!(err.to_string().contains("keyId is required"));

        req.key_id = Some("a2V5".into());
        req.bundle_id = Some(String::new());
        match validate_verify_request(&req).unwrap() {
            VerifyInput::Attestation {
                challenge, bundle_id, ..
            } => {
                assert_eq!(challenge, b"challenge");
                assert!(bundle_id.is_none());
            }
            other => panic!("unexpected input {other:?}"),
        }
    }

    #[test]
    fn test_assertion_hash_must_be_base64() {
        let mut req = request("assertion");
        req.assertion = Some("YXNzZXJ0aW9u".into());
        req.client_data_hash = Some("not base64!".into());
        let err = validate_verify_request(&req).unwrap_err();
        assert!(err.to_string().contains("Invalid base64 in clientDataHash"));
    }

    #[test]
    fn test_device_check_key_is_optional() {
        let mut req = request("device_check");
        req.key_id = None;
        req.token = Some("dG9rZW4=".into());
        let input = validate_verify_request(&req).unwrap();
        assert_eq!(input.kind(), VerificationKind::DeviceCheck);
        assert!(input.key_id().is_none());
    }

    #[test]
    fn test_key_id_bounds() {
        let mut req = request("device_check");
        req.token = Some("dG9rZW4=".into());
        req.key_id = Some(String::new());
        assert!(validate_verify_request(&req).is_err());
        req.key_id = Some("k".repeat(MAX_KEY_ID_LEN + 1));
        assert!(validate_verify_request(&req).is_err());
    }

    #[test]
    fn test_timestamp_required() {
        let mut req = request("device_check");
        req.token = Some("dG9rZW4=".into());
        req.timestamp = 0;
        assert!(validate_verify_request(&req).is_err());
    }
}
