//! First-contact attestation flow.
//!
//! `DecodeAttestation → ParseAuthData → CheckAppIdentity → DeriveNonce →
//! ValidateChain → Done`, in a single pass. Structural failures fail closed
//! with risk 100. A missing or invalid certificate chain is accepted with an
//! elevated risk score.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::authdata::AuthenticatorData;
use crate::cbor::{self, APP_ATTEST_FORMAT};
use crate::chain::ChainValidator;
use crate::cose;
use crate::error::AttestError;
use crate::result::{Condition, VerificationResult};

/// Smallest decoded attestation object accepted.
pub const MIN_ATTESTATION_LEN: usize = 500;

pub const RISK_CHAIN_VERIFIED: u8 = 10;
pub const RISK_NONCE_UNCHECKED: u8 = 20;
pub const RISK_CHAIN_UNAVAILABLE: u8 = 30;
pub const RISK_CHAIN_INVALID: u8 = 50;

/// Team and bundle id the rpIdHash must commit to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub team_id: String,
    pub bundle_id: String,
}

impl AppIdentity {
    pub fn new(team_id: impl Into<String>, bundle_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            bundle_id: bundle_id.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AttestationRequest<'a> {
    /// Base64 attestation object
    pub attestation: &'a str,
    /// Raw server challenge
    pub challenge: &'a [u8],
    pub key_id: Option<&'a str>,
    /// `None` skips the app identity check
    pub app_identity: Option<&'a AppIdentity>,
}

#[derive(Debug, Clone, Default)]
pub struct AttestationVerifier {
    chain_validator: ChainValidator,
}

impl AttestationVerifier {
    pub fn new(chain_validator: ChainValidator) -> Self {
        Self { chain_validator }
    }

    pub fn verify(&self, request: &AttestationRequest<'_>, now: DateTime<Utc>) -> VerificationResult {
        match self.run(request, now) {
            Ok(result) => result,
            Err(e) => {
                tracing::debug!(kind = e.kind().as_str(), error = %e, "Attestation rejected");
                VerificationResult::failure(&e)
            }
        }
    }

    fn run(
        &self,
        request: &AttestationRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<VerificationResult, AttestError> {
        let bytes = BASE64
            .decode(request.attestation)
            .map_err(|_| AttestError::Decoding("Invalid attestation encoding".into()))?;
        if bytes.len() < MIN_ATTESTATION_LEN {
            return Err(AttestError::Format("Attestation data too short".into()));
        }

        let object = cbor::decode_attestation_object(&bytes).map_err(|e| {
            tracing::debug!(error = %e, "CBOR decode failed");
            AttestError::Decoding("Failed to decode attestation object".into())
        })?;
        if object.fmt != APP_ATTEST_FORMAT {
            return Err(AttestError::Format("Unsupported attestation format".into()));
        }

        let auth_data = AuthenticatorData::parse(&object.auth_data)
            .ok_or_else(|| AttestError::Format("Invalid authenticator data".into()))?;
        let credential = auth_data
            .attested
            .as_ref()
            .ok_or_else(|| AttestError::Format("Invalid authenticator data".into()))?;

        let mut conditions = Vec::new();
        match request.app_identity {
            Some(app) => {
                if !auth_data.matches_app_id(&app.team_id, &app.bundle_id) {
                    return Err(AttestError::IdentityMismatch("App identity mismatch".into()));
                }
            }
            None => conditions.push(Condition::AppIdentityUnchecked),
        }

        if let Some(key_id) = request.key_id {
            if !key_id_matches(key_id, &credential.credential_id) {
                tracing::warn!(key_id = %key_id, "Key id does not match credential id");
                conditions.push(Condition::KeyIdMismatch);
            }
        }

        let nonce = expected_nonce(&object.auth_data, request.challenge);

        let chain = object
            .att_stmt
            .cert_chain
            .as_deref()
            .filter(|chain| !chain.is_empty());

        let (risk, message, leaf_key) = match chain {
            None => {
                tracing::warn!("Attestation carries no certificate chain");
                conditions.push(Condition::ChainUnavailable);
                (
                    RISK_CHAIN_UNAVAILABLE,
                    "Certificate chain not available".to_string(),
                    None,
                )
            }
            Some(chain) => match self.chain_validator.verify(chain, &nonce, now) {
                Ok(outcome) => {
                    let risk = if outcome.nonce_checked {
                        RISK_CHAIN_VERIFIED
                    } else {
                        conditions.push(Condition::NonceExtensionMissing);
                        RISK_NONCE_UNCHECKED
                    };
                    if outcome.leaf_public_key.is_none() {
                        conditions.push(Condition::LeafKeyNotImported);
                    }
                    (risk, "Attestation verified".to_string(), outcome.leaf_public_key)
                }
                Err(e) => {
                    tracing::warn!(error = %e, certs = chain.len(), "Certificate chain validation failed");
                    conditions.push(Condition::ChainInvalid);
                    (
                        RISK_CHAIN_INVALID,
                        format!("Certificate chain validation failed: {e}"),
                        None,
                    )
                }
            },
        };

        let public_key = leaf_key
            .or_else(|| cose::ec2_to_sec1(&credential.public_key_cose))
            .unwrap_or_else(|| credential.public_key_cose.clone());

        let mut result = VerificationResult::success(risk, message).with_public_key(BASE64.encode(public_key));
        for condition in conditions {
            result.push_condition(condition);
        }

        tracing::info!(
            risk = risk,
            sign_count = auth_data.sign_count,
            conditions = result.conditions.len(),
            "Attestation accepted"
        );
        Ok(result)
    }
}

/// `SHA256(auth_data ‖ SHA256(challenge))`.
pub fn expected_nonce(auth_data: &[u8], challenge: &[u8]) -> [u8; 32] {
    let client_data_hash = Sha256::digest(challenge);
    let mut hasher = Sha256::new();
    hasher.update(auth_data);
    hasher.update(client_data_hash);
    hasher.finalize().into()
}

/// Containment in either direction over base64 forms.
fn key_id_matches(key_id: &str, credential_id: &[u8]) -> bool {
    let credential = BASE64.encode(credential_id);
    credential.contains(key_id) || key_id.contains(credential.as_str())
}
