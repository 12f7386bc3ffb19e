//! Per-key device record and the rules for folding a verification into it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assertion::StoredDevice;
use crate::result::{RiskScore, VerificationResult};
use crate::trust::{self, TrustLevel};

/// Which flow produced a verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationKind {
    Attestation,
    Assertion,
    DeviceCheck,
}

impl VerificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Attestation => "attestation",
            Self::Assertion => "assertion",
            Self::DeviceCheck => "device_check",
        }
    }
}

/// Persisted state for one hardware key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: Uuid,
    pub key_id: String,
    pub public_key_base64: Option<String>,
    pub trust_level: TrustLevel,
    pub attestation_verified: bool,
    pub assertion_counter: u32,
    pub verification_count: u32,
    pub risk_score: RiskScore,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Conditions seen on the latest verification
    pub flags: BTreeMap<String, bool>,
    /// Write generation, starting at 1 and bumped by every `apply`
    #[serde(default = "first_version")]
    pub version: u64,
}

fn first_version() -> u64 {
    1
}

impl DeviceRecord {
    /// Fold `result` into `existing`, or create the first record for `key_id`.
    ///
    /// Trust is scored against the verification count before this
    /// observation. Risk only ratchets down. The public key is written once,
    /// by a verified attestation.
    pub fn apply(
        existing: Option<&DeviceRecord>,
        key_id: &str,
        kind: VerificationKind,
        result: &VerificationResult,
        now: DateTime<Utc>,
    ) -> DeviceRecord {
        let flags = result
            .conditions
            .iter()
            .map(|c| (c.as_str().to_string(), true))
            .collect();
        let attested = kind == VerificationKind::Attestation && result.verified;

        let Some(existing) = existing else {
            let counter = match kind {
                VerificationKind::Assertion => result.new_counter.unwrap_or(0),
                _ => 0,
            };
            return DeviceRecord {
                id: Uuid::new_v4(),
                key_id: key_id.to_string(),
                public_key_base64: if attested {
                    result.public_key_base64.clone()
                } else {
                    None
                },
                trust_level: trust::score(result.verified, result.risk_score, 0),
                attestation_verified: attested,
                assertion_counter: counter,
                verification_count: 1,
                risk_score: result.risk_score,
                created_at: now,
                updated_at: now,
                last_seen: now,
                flags,
                version: first_version(),
            };
        };

        let mut record = existing.clone();
        record.trust_level = trust::score(result.verified, result.risk_score, existing.verification_count);
        record.risk_score = existing.risk_score.min(result.risk_score);
        record.verification_count = existing.verification_count.saturating_add(1);
        if let Some(counter) = result.new_counter {
            record.assertion_counter = counter;
        }
        if attested {
            record.attestation_verified = true;
            match (&existing.public_key_base64, &result.public_key_base64) {
                (None, Some(key)) => record.public_key_base64 = Some(key.clone()),
                (Some(stored), Some(key)) if stored != key => {
                    tracing::warn!(key_id = %key_id, "Re-attestation presented a different key, keeping the stored one");
                }
                _ => {}
            }
        }
        record.flags = flags;
        record.version = existing.version.saturating_add(1);
        record.updated_at = now;
        record.last_seen = now;
        record
    }

    /// View consumed by the assertion flow.
    pub fn stored_device(&self) -> StoredDevice<'_> {
        StoredDevice {
            counter: self.assertion_counter,
            public_key_base64: self.public_key_base64.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AttestError;
    use crate::result::Condition;
    use crate::testing::fixture_now;
    use chrono::Duration;

    fn attested(risk: u8) -> VerificationResult {
        VerificationResult::success(risk, "Attestation verified").with_public_key("S0VZMQ==")
    }

    #[test]
    fn test_first_attestation_creates_record() {
        let result = attested(10).with_condition(Condition::AppIdentityUnchecked);
        let record = DeviceRecord::apply(None, "key-1", VerificationKind::Attestation, &result, fixture_now());

        assert_eq!(record.key_id, "key-1");
        assert_eq!(record.assertion_counter, 0);
        assert_eq!(record.verification_count, 1);
        assert_eq!(record.public_key_base64.as_deref(), Some("S0VZMQ=="));
        assert!(record.attestation_verified);
        assert_eq!(record.trust_level, TrustLevel::Trusted);
        assert_eq!(record.flags.get("app_identity_unchecked"), Some(&true));
    }

    #[test]
    fn test_assertion_updates_counter_but_not_key() {
        let now = fixture_now();
        let record = DeviceRecord::apply(None, "k", VerificationKind::Attestation, &attested(30), now);

        let assertion = VerificationResult::success(5, "Assertion verified")
            .with_counter(11)
            .with_public_key("SU1QT1NUT1I=");
        let later = now + Duration::minutes(1);
        let updated = DeviceRecord::apply(Some(&record), "k", VerificationKind::Assertion, &assertion, later);

        assert_eq!(updated.id, record.id);
        assert_eq!(updated.assertion_counter, 11);
        assert_eq!(updated.verification_count, 2);
        assert_eq!(updated.risk_score.value(), 5);
        assert_eq!(updated.public_key_base64.as_deref(), Some("S0VZMQ=="));
        assert_eq!(updated.created_at, now);
        assert_eq!(updated.last_seen, later);
    }

    #[test]
    fn test_risk_only_ratchets_down() {
        let now = fixture_now();
        let record = DeviceRecord::apply(None, "k", VerificationKind::Attestation, &attested(10), now);

        let failure = VerificationResult::failure(&AttestError::Replay { observed: 1, stored: 4 }).with_counter(4);
        let updated = DeviceRecord::apply(Some(&record), "k", VerificationKind::Assertion, &failure, now);

        assert_eq!(updated.risk_score.value(), 10);
        assert_eq!(updated.trust_level, TrustLevel::Suspicious);
        assert_eq!(updated.assertion_counter, 4);
    }

    #[test]
    fn test_reattestation_keeps_stored_key() {
        let now = fixture_now();
        let record = DeviceRecord::apply(None, "k", VerificationKind::Attestation, &attested(10), now);
        let again = VerificationResult::success(10, "Attestation verified").with_public_key("T1RIRVI=");
        let updated = DeviceRecord::apply(Some(&record), "k", VerificationKind::Attestation, &again, now);
        assert_eq!(updated.public_key_base64.as_deref(), Some("S0VZMQ=="));
    }

    #[test]
    fn test_failed_attestation_stores_no_key() {
        let failure = VerificationResult::failure(&AttestError::Format("Invalid authenticator data".into()));
        let record = DeviceRecord::apply(None, "k", VerificationKind::Attestation, &failure, fixture_now());
        assert!(record.public_key_base64.is_none());
        assert!(!record.attestation_verified);
        assert_eq!(record.trust_level, TrustLevel::Suspicious);
    }

    #[test]
    fn test_trust_uses_historical_count() {
        let now = fixture_now();
        let mut record = DeviceRecord::apply(None, "k", VerificationKind::Attestation, &attested(10), now);
        for counter in 1..=5 {
            let result = VerificationResult::success(5, "Assertion verified").with_counter(counter);
            record = DeviceRecord::apply(Some(&record), "k", VerificationKind::Assertion, &result, now);
            assert_eq!(record.trust_level, TrustLevel::Trusted, "after {counter}");
        }
        // Six prior verifications
        let result = VerificationResult::success(5, "Assertion verified").with_counter(6);
        record = DeviceRecord::apply(Some(&record), "k", VerificationKind::Assertion, &result, now);
        assert_eq!(record.trust_level, TrustLevel::Verified);
        assert_eq!(record.verification_count, 7);
    }

    #[test]
    fn test_first_assertion_stores_counter() {
        let result = VerificationResult::success(20, "Assertion accepted without signature verification")
            .with_counter(3)
            .with_condition(Condition::SignatureNotVerified);
        let record = DeviceRecord::apply(None, "k", VerificationKind::Assertion, &result, fixture_now());
        assert_eq!(record.assertion_counter, 3);
        assert!(record.public_key_base64.is_none());

        let stored = record.stored_device();
        assert_eq!(stored.counter, 3);
        assert_eq!(stored.public_key_base64, None);
    }

    #[test]
    fn test_every_apply_bumps_version() {
        let now = fixture_now();
        let first = DeviceRecord::apply(None, "k", VerificationKind::Assertion, &attested(20), now);
        assert_eq!(first.version, 1);

        // Neither write moves the counter, both must still change the version
        let replay = VerificationResult::failure(&AttestError::Replay { observed: 0, stored: 0 }).with_counter(0);
        let rejected = DeviceRecord::apply(Some(&first), "k", VerificationKind::Assertion, &replay, now);
        let reattested = DeviceRecord::apply(Some(&rejected), "k", VerificationKind::Attestation, &attested(10), now);
        assert_eq!(rejected.assertion_counter, first.assertion_counter);
        assert_eq!(rejected.version, 2);
        assert_eq!(reattested.version, 3);
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = DeviceRecord::apply(None, "k", VerificationKind::Attestation, &attested(10), fixture_now());
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["keyId"], "k");
        assert_eq!(json["trustLevel"], "trusted");
        assert_eq!(json["riskScore"], 10);
        assert_eq!(json["assertionCounter"], 0);
        assert_eq!(json["version"], 1);
    }
}
