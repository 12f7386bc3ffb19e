//! Certificate chain validation for attestation statements.
//!
//! The chain is `[leaf, intermediate, ...]`. Validation checks both validity
//! windows, the leaf-to-intermediate issuer link, the trust anchor and the
//! challenge nonce carried in the leaf. The default anchor is the platform's
//! App Attestation root, compiled into the crate. Certificate signatures are
//! not verified here; the TBS bytes are captured by the parser for that.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::der::{self, ParsedCertificate, TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE};
use crate::error::DecodeError;
use crate::reader::Reader;
use crate::signature;

/// Nonce extension OID `1.2.840.113635.100.8.2`, hex of the content bytes.
pub const APP_ATTEST_NONCE_OID: &str = "2a864886f763640802";

const PLATFORM_ROOT_PEM: &[u8] = include_bytes!("../certs/apple_app_attestation_root_ca.pem");

/// Context tag `[1]` wrapping the nonce in the platform's encoding.
const TAG_NONCE_CONTEXT: u8 = 0xa1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain needs a leaf and an intermediate, got {0} certificate(s)")]
    TooShort(usize),

    #[error("certificate {index} is malformed")]
    Malformed { index: usize },

    #[error("certificate {index} has expired")]
    Expired { index: usize },

    #[error("certificate {index} is not yet valid")]
    NotYetValid { index: usize },

    #[error("leaf is not issued by the intermediate")]
    BrokenLink,

    #[error("intermediate is not issued by the trust anchor")]
    UntrustedRoot,

    #[error("trust anchor is outside its validity window")]
    AnchorExpired,

    #[error("nonce extension is malformed")]
    MalformedNonce,

    #[error("nonce does not match the challenge")]
    NonceMismatch,
}

/// Root certificate the intermediate must chain to.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    certificate: ParsedCertificate,
}

impl TrustAnchor {
    pub fn from_der(der: &[u8]) -> Option<Self> {
        der::parse_certificate(der).map(|certificate| Self { certificate })
    }

    /// Accept DER or a PEM `CERTIFICATE` block.
    pub fn from_bytes(input: &[u8]) -> Option<Self> {
        Self::from_der(&der::certificate_bytes(input)?)
    }

    /// The App Attestation root CA shipped with the crate.
    pub fn platform_root() -> Option<Self> {
        Self::from_bytes(PLATFORM_ROOT_PEM)
    }

    pub fn certificate(&self) -> &ParsedCertificate {
        &self.certificate
    }
}

/// Result of a passing chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Leaf SEC1 point, when it imports as a P-256 key
    pub leaf_public_key: Option<Vec<u8>>,
    /// Whether the leaf carried the nonce extension
    pub nonce_checked: bool,
}

/// Validates chains against a single trust anchor.
///
/// `Default` anchors on [`TrustAnchor::platform_root`]. A validator with no
/// usable anchor rejects every chain as [`ChainError::UntrustedRoot`].
#[derive(Debug, Clone)]
pub struct ChainValidator {
    anchor: Option<TrustAnchor>,
}

impl Default for ChainValidator {
    fn default() -> Self {
        let anchor = TrustAnchor::platform_root();
        if anchor.is_none() {
            tracing::error!("Embedded platform root failed to parse, all chains will be untrusted");
        }
        Self { anchor }
    }
}

impl ChainValidator {
    pub fn new(anchor: TrustAnchor) -> Self {
        Self { anchor: Some(anchor) }
    }

    pub fn anchor(&self) -> Option<&TrustAnchor> {
        self.anchor.as_ref()
    }

    pub fn verify(
        &self,
        chain: &[Vec<u8>],
        expected_nonce: &[u8],
        now: DateTime<Utc>,
    ) -> Result<ChainOutcome, ChainError> {
        if chain.len() < 2 {
            return Err(ChainError::TooShort(chain.len()));
        }

        let leaf = der::parse_certificate(&chain[0]).ok_or(ChainError::Malformed { index: 0 })?;
        let intermediate =
            der::parse_certificate(&chain[1]).ok_or(ChainError::Malformed { index: 1 })?;

        check_window(&leaf, 0, now)?;
        check_window(&intermediate, 1, now)?;

        if leaf.issuer != intermediate.subject {
            return Err(ChainError::BrokenLink);
        }

        let anchor = self.anchor.as_ref().ok_or(ChainError::UntrustedRoot)?;
        if intermediate.issuer != anchor.certificate.subject {
            return Err(ChainError::UntrustedRoot);
        }
        if !anchor.certificate.is_valid_at(now) {
            return Err(ChainError::AnchorExpired);
        }

        let nonce_checked = match leaf.extension(APP_ATTEST_NONCE_OID) {
            Some(value) => {
                let nonce = decode_nonce(value).map_err(|e| {
                    tracing::debug!(error = %e, "Nonce extension decode failed");
                    ChainError::MalformedNonce
                })?;
                if nonce != expected_nonce {
                    return Err(ChainError::NonceMismatch);
                }
                true
            }
            None => {
                tracing::warn!("Leaf certificate has no nonce extension, challenge binding not checked");
                false
            }
        };

        let leaf_public_key = match signature::import_public_key(&leaf.public_key) {
            Some(_) => Some(leaf.public_key),
            None => {
                tracing::warn!(
                    key_len = leaf.public_key.len(),
                    "Leaf public key is not a P-256 point, accepting chain on format only"
                );
                None
            }
        };

        Ok(ChainOutcome {
            leaf_public_key,
            nonce_checked,
        })
    }
}

fn check_window(cert: &ParsedCertificate, index: usize, now: DateTime<Utc>) -> Result<(), ChainError> {
    if now < cert.not_before {
        Err(ChainError::NotYetValid { index })
    } else if now > cert.not_after {
        Err(ChainError::Expired { index })
    } else {
        Ok(())
    }
}

/// Decode the nonce from either `SEQUENCE { [1] { OCTET STRING } }` or
/// `SEQUENCE { SEQUENCE { OID, OCTET STRING } }`.
pub fn decode_nonce(value: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut outer = Reader::new(value);
    let mut body = Reader::new(der::expect(&mut outer, TAG_SEQUENCE)?);

    let nonce = match body.peek_u8()? {
        TAG_NONCE_CONTEXT => {
            let mut tagged = Reader::new(der::expect(&mut body, TAG_NONCE_CONTEXT)?);
            der::expect(&mut tagged, TAG_OCTET_STRING)?
        }
        TAG_SEQUENCE => {
            let mut entry = Reader::new(der::expect(&mut body, TAG_SEQUENCE)?);
            der::expect(&mut entry, TAG_OID)?;
            der::expect(&mut entry, TAG_OCTET_STRING)?
        }
        other => {
            return Err(DecodeError::UnexpectedType {
                expected: "[1] or SEQUENCE",
                found: format!("tag 0x{other:02x}"),
            })
        }
    };
    Ok(nonce.to_vec())
}
