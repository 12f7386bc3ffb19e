//! Device verification handler
//!
//! Handles POST /device/verify for the attestation, assertion and device
//! check flows, and folds each result into the per-key device record.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use attestguard_core::{
    trust, verify_device_token, AssertionRequest, AttestError, AttestationRequest, DeviceRecord,
    StoredDevice, TrustLevel, VerificationKind, VerificationResult,
};

use crate::error::ApiError;
use crate::state::AppState;
use crate::store::{DeviceUpdate, StoreError};
use crate::validation::{validate_verify_request, VerifyInput};

/// Verify/write attempts before a counter race is reported as replay
pub const MAX_STORE_ATTEMPTS: u32 = 3;

/// Request body for device verification
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceVerifyRequest {
    /// One of `attestation`, `assertion`, `device_check`
    #[serde(rename = "type")]
    #[schema(example = "attestation")]
    pub kind: String,
    /// Hardware key id (base64)
    #[schema(example = "Mc7XGUA8DaRZ2d4Ud6ZFicWCv+VD7lrYBhmAQhDbHk4=")]
    pub key_id: Option<String>,
    /// Base64 CBOR attestation object
    pub attestation: Option<String>,
    /// Base64 CBOR assertion object
    pub assertion: Option<String>,
    /// Base64 SHA-256 of the client request data
    pub client_data_hash: Option<String>,
    /// Base64 server-issued challenge
    pub challenge: Option<String>,
    /// Base64 legacy device token
    pub token: Option<String>,
    #[schema(example = "com.example.app")]
    pub bundle_id: Option<String>,
    /// Client time in milliseconds since epoch
    #[schema(example = 1767225600000u64)]
    pub timestamp: u64,
}

/// Response for device verification
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceVerifyResponse {
    #[schema(example = true)]
    pub verified: bool,
    #[schema(value_type = String, example = "trusted")]
    pub trust_level: TrustLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Attestation verified")]
    pub message: Option<String>,
    /// Set only for verified results
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[schema(example = 10)]
    pub risk_score: u8,
    /// Device record id when the request carried a key id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<Uuid>,
    /// Degraded checks accepted for this verification
    #[schema(example = json!(["app_identity_unchecked"]))]
    pub conditions: Vec<String>,
}

impl DeviceVerifyResponse {
    fn new(
        kind: VerificationKind,
        result: &VerificationResult,
        record: Option<&DeviceRecord>,
        now: DateTime<Utc>,
    ) -> Self {
        let trust_level = match record {
            Some(record) => record.trust_level,
            None => trust::score(result.verified, result.risk_score, 0),
        };
        Self {
            verified: result.verified,
            trust_level,
            message: result.message.clone(),
            expires_at: result.verified.then(|| now + validity(kind)),
            risk_score: result.risk_score.value(),
            device_id: record.map(|r| r.id),
            conditions: result.conditions.iter().map(|c| c.as_str().to_string()).collect(),
        }
    }
}

/// How long a verified result may be relied on
fn validity(kind: VerificationKind) -> Duration {
    match kind {
        VerificationKind::Assertion => Duration::minutes(5),
        VerificationKind::Attestation | VerificationKind::DeviceCheck => Duration::hours(24),
    }
}

/// Verify a device attestation, assertion, or legacy token
///
/// Every completed verification returns 200 with `verified` set accordingly;
/// a failed verification is not an HTTP error. Requests carrying a key id
/// update that key's device record.
#[utoipa::path(
    post,
    path = "/device/verify",
    tag = "Verification",
    request_body = DeviceVerifyRequest,
    responses(
        (status = 200, description = "Verification completed", body = DeviceVerifyResponse),
        (status = 400, description = "Invalid request (unknown type, missing field, invalid base64)"),
        (status = 500, description = "Internal server error"),
        (status = 503, description = "Device store unavailable")
    )
)]
pub async fn verify_device_handler(
    State(state): State<AppState>,
    payload: Result<Json<DeviceVerifyRequest>, JsonRejection>,
) -> Result<Json<DeviceVerifyResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let input = validate_verify_request(&request)?;
    let kind = input.kind();
    let now = Utc::now();

    let Some(key_id) = input.key_id() else {
        let result = run_verification(&state, &input, StoredDevice::default(), now);
        log_result(kind, None, &result);
        return Ok(Json(DeviceVerifyResponse::new(kind, &result, None, now)));
    };

    let mut last_result = None;
    for attempt in 1..=MAX_STORE_ATTEMPTS {
        let existing = state.store.get(key_id).await?;
        let stored = existing.as_ref().map(DeviceRecord::stored_device).unwrap_or_default();
        let result = run_verification(&state, &input, stored, now);
        let record = DeviceRecord::apply(existing.as_ref(), key_id, kind, &result, now);

        match state.store.upsert(DeviceUpdate::new(record, existing.as_ref())).await {
            Ok(saved) => {
                log_result(kind, Some(key_id), &result);
                return Ok(Json(DeviceVerifyResponse::new(kind, &result, Some(&saved), now)));
            }
            Err(StoreError::VersionConflict { expected, .. }) => {
                tracing::warn!(
                    key_id = %key_id,
                    attempt,
                    expected_version = ?expected,
                    "Device record changed during verification, retrying"
                );
                last_result = Some((result, stored.counter));
            }
            Err(e) => return Err(e.into()),
        }
    }

    // Another request kept advancing the counter for this key
    let (result, stored) = last_result.ok_or_else(|| ApiError::internal("No verification attempt ran"))?;
    tracing::warn!(key_id = %key_id, attempts = MAX_STORE_ATTEMPTS, "Counter race not resolved, rejecting as replay");
    let replay = VerificationResult::failure(&AttestError::Replay {
        observed: result.new_counter.unwrap_or(stored),
        stored,
    })
    .with_counter(stored);
    log_result(kind, Some(key_id), &replay);
    Ok(Json(DeviceVerifyResponse::new(kind, &replay, None, now)))
}

fn run_verification(
    state: &AppState,
    input: &VerifyInput<'_>,
    stored: StoredDevice<'_>,
    now: DateTime<Utc>,
) -> VerificationResult {
    match input {
        VerifyInput::Attestation {
            key_id,
            attestation,
            challenge,
            bundle_id,
        } => {
            let app_identity = state.app_identity(*bundle_id);
            state.attestation_verifier.verify(
                &AttestationRequest {
                    attestation,
                    challenge,
                    key_id: Some(*key_id),
                    app_identity: app_identity.as_ref(),
                },
                now,
            )
        }
        VerifyInput::Assertion {
            assertion,
            client_data_hash,
            ..
        } => state.assertion_verifier.verify(
            &AssertionRequest {
                assertion,
                client_data_hash,
            },
            stored,
        ),
        VerifyInput::DeviceCheck { token, .. } => verify_device_token(token),
    }
}

fn log_result(kind: VerificationKind, key_id: Option<&str>, result: &VerificationResult) {
    if result.verified {
        tracing::info!(
            kind = kind.as_str(),
            key_id = ?key_id,
            risk = result.risk_score.value(),
            conditions = result.conditions.len(),
            "Device verification accepted"
        );
    } else {
        tracing::warn!(
            kind = kind.as_str(),
            key_id = ?key_id,
            failure = result.failure_kind().map(|k| k.as_str()).unwrap_or("unknown"),
            "Device verification rejected"
        );
    }
}
