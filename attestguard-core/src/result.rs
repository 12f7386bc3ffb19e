use serde::{Deserialize, Serialize};

use crate::error::{AttestError, AttestErrorKind};

/// Risk heuristic in `[0, 100]`; lower is more trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct RiskScore(u8);

impl RiskScore {
    pub const MAX: RiskScore = RiskScore(100);

    /// Clamp into `[0, 100]`.
    pub const fn new(value: u8) -> Self {
        if value > 100 {
            Self(100)
        } else {
            Self(value)
        }
    }

    pub const fn value(self) -> u8 {
        self.0
    }
}

impl From<u8> for RiskScore {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<RiskScore> for u8 {
    fn from(score: RiskScore) -> Self {
        score.0
    }
}

impl std::fmt::Display for RiskScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named compatibility branch taken during an accepted verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Attestation statement carried no certificate chain
    ChainUnavailable,
    /// Certificate chain present but failed validation
    ChainInvalid,
    /// Leaf certificate has no nonce extension; challenge binding unchecked
    NonceExtensionMissing,
    /// Leaf public key could not be imported as a P-256 key
    LeafKeyNotImported,
    /// No team id configured; rpIdHash not compared
    AppIdentityUnchecked,
    /// Supplied key id does not match the credential id
    KeyIdMismatch,
    /// Assertion accepted with no stored key or in-band signature
    SignatureNotVerified,
    /// Fallback token accepted on structure alone
    ServerValidationSkipped,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChainUnavailable => "chain_unavailable",
            Self::ChainInvalid => "chain_invalid",
            Self::NonceExtensionMissing => "nonce_extension_missing",
            Self::LeafKeyNotImported => "leaf_key_not_imported",
            Self::AppIdentityUnchecked => "app_identity_unchecked",
            Self::KeyIdMismatch => "key_id_mismatch",
            Self::SignatureNotVerified => "signature_not_verified",
            Self::ServerValidationSkipped => "server_validation_skipped",
        }
    }
}

/// Outcome of one verification, as returned by every orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub verified: bool,
    pub risk_score: RiskScore,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Standard base64; attestation success only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_base64: Option<String>,
    /// Observed or retained counter; assertion only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_counter: Option<u32>,
    pub conditions: Vec<Condition>,
    #[serde(skip)]
    failure: Option<AttestErrorKind>,
}

impl VerificationResult {
    pub fn success(risk: u8, message: impl Into<String>) -> Self {
        Self {
            verified: true,
            risk_score: RiskScore::new(risk),
            message: Some(message.into()),
            public_key_base64: None,
            new_counter: None,
            conditions: Vec::new(),
            failure: None,
        }
    }

    /// Fail closed: `verified = false`, risk 100.
    pub fn failure(error: &AttestError) -> Self {
        Self {
            verified: false,
            risk_score: RiskScore::MAX,
            message: Some(error.detail()),
            public_key_base64: None,
            new_counter: None,
            conditions: Vec::new(),
            failure: Some(error.kind()),
        }
    }

    pub fn with_public_key(mut self, public_key_base64: impl Into<String>) -> Self {
        self.public_key_base64 = Some(public_key_base64.into());
        self
    }

    pub fn with_counter(mut self, counter: u32) -> Self {
        self.new_counter = Some(counter);
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.push_condition(condition);
        self
    }

    pub fn push_condition(&mut self, condition: Condition) {
        if !self.conditions.contains(&condition) {
            self.conditions.push(condition);
        }
    }

    pub fn has_condition(&self, condition: Condition) -> bool {
        self.conditions.contains(&condition)
    }

    /// Error category behind a fail-closed result.
    pub fn failure_kind(&self) -> Option<AttestErrorKind> {
        self.failure
    }
}
