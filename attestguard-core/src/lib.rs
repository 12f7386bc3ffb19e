//! AttestGuard Core - device attestation and assertion verification engine
//!
//! This crate proves that a request comes from a genuine device holding a
//! hardware-backed key, and detects replayed credentials.
//!
//! # Features
//!
//! - Minimal CBOR decoder for attestation and assertion objects
//! - Minimal X.509 DER parser and certificate chain validator
//! - Challenge nonce binding through the leaf certificate extension
//! - ECDSA P-256 / SHA-256 verification with DER and raw signatures
//! - Monotonic counter enforcement against replay
//! - Risk and trust scoring
//!
//! Every verification returns a [`VerificationResult`]. Structural and
//! cryptographic failures fail closed (`verified = false`, risk 100); a
//! missing or invalid certificate chain and an unsigned assertion are
//! accepted with an elevated risk and a named [`Condition`].
//!
//! # Example
//!
//! ```no_run
//! use attestguard_core::{
//!     AssertionRequest, AssertionVerifier, AttestationRequest, AttestationVerifier, StoredDevice,
//! };
//!
//! # fn example(attestation_b64: &str, assertion_b64: &str, challenge: &[u8], hash: &[u8]) {
//! let attestation = AttestationVerifier::default().verify(
//!     &AttestationRequest {
//!         attestation: attestation_b64,
//!         challenge,
//!         key_id: None,
//!         app_identity: None,
//!     },
//!     chrono::Utc::now(),
//! );
//! assert!(attestation.verified);
//!
//! let assertion = AssertionVerifier::new().verify(
//!     &AssertionRequest {
//!         assertion: assertion_b64,
//!         client_data_hash: hash,
//!     },
//!     StoredDevice {
//!         counter: 0,
//!         public_key_base64: attestation.public_key_base64.as_deref(),
//!     },
//! );
//! println!("risk {}", assertion.risk_score);
//! # }
//! ```

pub mod assertion;
pub mod attestation;
pub mod authdata;
pub mod cbor;
pub mod chain;
pub mod cose;
pub mod der;
pub mod device;
pub mod error;
pub mod fallback;
pub mod reader;
pub mod result;
pub mod signature;
pub mod trust;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

// Re-export main types for convenience
pub use assertion::{AssertionRequest, AssertionVerifier, StoredDevice};
pub use attestation::{expected_nonce, AppIdentity, AttestationRequest, AttestationVerifier};
pub use authdata::{AttestedCredential, AuthenticatorData};
pub use cbor::{AssertionObject, AttestationObject, AttestationStatement};
pub use chain::{ChainError, ChainOutcome, ChainValidator, TrustAnchor};
pub use der::{parse_certificate, ParsedCertificate};
pub use device::{DeviceRecord, VerificationKind};
pub use error::{AttestError, AttestErrorKind, DecodeError};
pub use fallback::verify_device_token;
pub use result::{Condition, RiskScore, VerificationResult};
pub use trust::TrustLevel;
