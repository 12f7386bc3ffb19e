//! Structural checks for the legacy opaque device token.
//!
//! The token cannot be validated locally; it is accepted on shape alone with
//! a fixed elevated risk so the hardware attestation path stays preferred.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use crate::error::AttestError;
use crate::result::{Condition, VerificationResult};

pub const MIN_TOKEN_LEN: usize = 50;
pub const RISK_TOKEN: u8 = 40;

pub fn verify_device_token(token: &str) -> VerificationResult {
    let bytes = match BASE64.decode(token) {
        Ok(bytes) => bytes,
        Err(_) => {
            return VerificationResult::failure(&AttestError::Decoding("Invalid token encoding".into()))
        }
    };
    if bytes.len() < MIN_TOKEN_LEN {
        return VerificationResult::failure(&AttestError::Format("Token data too short".into()));
    }

    tracing::warn!(token_len = bytes.len(), "Device token accepted without server-side validation");
    VerificationResult::success(
        RISK_TOKEN,
        "Device token accepted (server-side validation not performed)",
    )
    .with_condition(Condition::ServerValidationSkipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_token_fails() {
        let result = verify_device_token(&BASE64.encode([7u8; 40]));
        assert!(!result.verified);
        assert_eq!(result.risk_score.value(), 100);
        assert_eq!(result.message.as_deref(), Some("Token data too short"));
    }

    #[test]
    fn test_invalid_encoding_fails() {
        let result = verify_device_token("@@not-base64@@");
        assert!(!result.verified);
        assert_eq!(result.message.as_deref(), Some("Invalid token encoding"));
    }

    #[test]
    fn test_well_formed_token_has_fixed_risk() {
        let result = verify_device_token(&BASE64.encode([7u8; 50]));
        assert!(result.verified);
        assert_eq!(result.risk_score.value(), RISK_TOKEN);
        assert!(result.has_condition(Condition::ServerValidationSkipped));
        assert!(result.public_key_base64.is_none());
        assert!(result.new_counter.is_none());
    }
}
