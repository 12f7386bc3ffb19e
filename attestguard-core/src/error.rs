use thiserror::Error;

/// Failure raised while walking an untrusted byte buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected end of input: needed {needed} bytes at offset {offset}, {available} available")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("Unsupported encoding: {0}")]
    Unsupported(String),

    #[error("Unexpected type: expected {expected}, found {found}")]
    UnexpectedType {
        expected: &'static str,
        found: String,
    },

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid UTF-8 in text string")]
    InvalidUtf8,

    #[error("Nesting depth exceeds {0}")]
    TooDeep(usize),
}

/// Error taxonomy of the verification engine.
///
/// Orchestrators never return these across their boundary; each fail-closed
/// [`VerificationResult`](crate::VerificationResult) records the kind that
/// produced it so callers can log and classify outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttestError {
    /// Bad base64, CBOR or DER structure
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// Wrong format tag, missing attested-credential flag, chain too short
    #[error("Format error: {0}")]
    Format(String),

    /// App identity hash or nonce mismatch
    #[error("Identity mismatch: {0}")]
    IdentityMismatch(String),

    /// Non-increasing assertion counter
    #[error("Replay detected: counter {observed} is not greater than {stored}")]
    Replay { observed: u32, stored: u32 },

    /// Key import or signature verification failure
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl AttestError {
    /// Client-facing message, without the category prefix used by `Display`.
    pub fn detail(&self) -> String {
        match self {
            Self::Decoding(msg)
            | Self::Format(msg)
            | Self::IdentityMismatch(msg)
            | Self::Crypto(msg) => msg.clone(),
            Self::Replay { .. } => "Counter replay detected".to_string(),
        }
    }

    /// Coarse category, stable across message changes.
    pub fn kind(&self) -> AttestErrorKind {
        match self {
            Self::Decoding(_) => AttestErrorKind::Decoding,
            Self::Format(_) => AttestErrorKind::Format,
            Self::IdentityMismatch(_) => AttestErrorKind::IdentityMismatch,
            Self::Replay { .. } => AttestErrorKind::Replay,
            Self::Crypto(_) => AttestErrorKind::Crypto,
        }
    }
}

impl From<DecodeError> for AttestError {
    fn from(err: DecodeError) -> Self {
        Self::Decoding(err.to_string())
    }
}

/// Category of an [`AttestError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttestErrorKind {
    Decoding,
    Format,
    IdentityMismatch,
    Replay,
    Crypto,
}

impl AttestErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decoding => "decoding",
            Self::Format => "format",
            Self::IdentityMismatch => "identity_mismatch",
            Self::Replay => "replay",
            Self::Crypto => "crypto",
        }
    }
}
