//! Fixture builders for tests.
//!
//! Produces DER certificates, CBOR attestation/assertion objects and P-256
//! signing keys with deterministic content. Available to downstream crates
//! through the `test-support` feature.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, Datelike, TimeZone, Utc};
use ciborium::Value as Cbor;
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use sha2::{Digest, Sha256};

use crate::attestation::{expected_nonce, AppIdentity, AttestationVerifier};
use crate::authdata::{app_id_hash, FLAG_ATTESTED_CREDENTIAL, FLAG_USER_PRESENT};
use crate::chain::{ChainValidator, TrustAnchor, APP_ATTEST_NONCE_OID};
use crate::der::{
    encode_tlv, TAG_BIT_STRING, TAG_BOOLEAN, TAG_EXTENSIONS, TAG_GENERALIZED_TIME, TAG_INTEGER,
    TAG_OCTET_STRING, TAG_OID, TAG_SEQUENCE, TAG_UTC_TIME, TAG_VERSION,
};
use crate::signature::{raw_to_der, RAW_SIGNATURE_LEN};

const OID_ECDSA_WITH_SHA256: [u8; 8] = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x04, 0x03, 0x02];
const OID_EC_PUBLIC_KEY: [u8; 7] = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x02, 0x01];
const OID_PRIME256V1: [u8; 8] = [0x2a, 0x86, 0x48, 0xce, 0x3d, 0x03, 0x01, 0x07];
const OID_COMMON_NAME: [u8; 3] = [0x55, 0x04, 0x03];
const TAG_SET: u8 = 0x31;
const TAG_UTF8_STRING: u8 = 0x0c;

pub const TEAM_ID: &str = "A1B2C3D4E5";
pub const BUNDLE_ID: &str = "com.example.attested";
pub const CHALLENGE: &[u8] = b"server-issued-challenge-0001";

/// Reference verification time; inside every default validity window.
pub fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

/// Content of a Name SEQUENCE holding one common name.
pub fn name(common_name: &str) -> Vec<u8> {
    let mut attribute = encode_tlv(TAG_OID, &OID_COMMON_NAME);
    attribute.extend(encode_tlv(TAG_UTF8_STRING, common_name.as_bytes()));
    encode_tlv(TAG_SET, &encode_tlv(TAG_SEQUENCE, &attribute))
}

#[derive(Debug, Clone)]
enum Extensions {
    Absent,
    List(Vec<(String, bool, Vec<u8>)>),
    Raw(Vec<u8>),
}

/// Description of one certificate to encode.
#[derive(Debug, Clone)]
pub struct CertificateSpec {
    pub public_key: Vec<u8>,
    /// Name SEQUENCE content
    pub subject: Vec<u8>,
    /// Name SEQUENCE content
    pub issuer: Vec<u8>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    pub signature: Vec<u8>,
    extensions: Extensions,
}

impl CertificateSpec {
    fn new(public_key: Vec<u8>, subject: &str, issuer: &str) -> Self {
        Self {
            public_key,
            subject: name(subject),
            issuer: name(issuer),
            not_before: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            not_after: Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap(),
            signature: vec![0x5a; 16],
            extensions: Extensions::List(Vec::new()),
        }
    }

    pub fn leaf(public_key: Vec<u8>) -> Self {
        Self::new(public_key, "Test Device Key", "Test Intermediate CA")
    }

    pub fn intermediate(public_key: Vec<u8>) -> Self {
        Self::new(public_key, "Test Intermediate CA", "Test Root CA")
    }

    pub fn root(public_key: Vec<u8>) -> Self {
        Self::new(public_key, "Test Root CA", "Test Root CA")
    }

    pub fn with_subject(mut self, subject: Vec<u8>) -> Self {
        self.subject = subject;
        self
    }

    pub fn with_issuer(mut self, issuer: Vec<u8>) -> Self {
        self.issuer = issuer;
        self
    }

    pub fn with_validity(mut self, not_before: DateTime<Utc>, not_after: DateTime<Utc>) -> Self {
        self.not_before = not_before;
        self.not_after = not_after;
        self
    }

    pub fn with_extension(self, oid_hex: &str, value: Vec<u8>) -> Self {
        self.push_extension(oid_hex, false, value)
    }

    pub fn with_critical_extension(self, oid_hex: &str, value: Vec<u8>) -> Self {
        self.push_extension(oid_hex, true, value)
    }

    /// Nonce in the platform shape `SEQUENCE { [1] { OCTET STRING } }`.
    pub fn with_nonce(self, nonce: &[u8]) -> Self {
        let value = encode_tlv(
            TAG_SEQUENCE,
            &encode_tlv(0xa1, &encode_tlv(TAG_OCTET_STRING, nonce)),
        );
        self.with_extension(APP_ATTEST_NONCE_OID, value)
    }

    /// Nonce in the shape `SEQUENCE { SEQUENCE { OID, OCTET STRING } }`.
    pub fn with_sequence_nonce(self, nonce: &[u8]) -> Self {
        let oid = hex::decode(APP_ATTEST_NONCE_OID).unwrap();
        let mut entry = encode_tlv(TAG_OID, &oid);
        entry.extend(encode_tlv(TAG_OCTET_STRING, nonce));
        let value = encode_tlv(TAG_SEQUENCE, &encode_tlv(TAG_SEQUENCE, &entry));
        self.with_extension(APP_ATTEST_NONCE_OID, value)
    }

    /// Replace the `[3]` content with arbitrary bytes.
    pub fn with_raw_extensions(mut self, content: Vec<u8>) -> Self {
        self.extensions = Extensions::Raw(content);
        self
    }

    pub fn without_extensions(mut self) -> Self {
        self.extensions = Extensions::Absent;
        self
    }

    fn push_extension(mut self, oid_hex: &str, critical: bool, value: Vec<u8>) -> Self {
        match &mut self.extensions {
            Extensions::List(list) => list.push((oid_hex.to_string(), critical, value)),
            _ => self.extensions = Extensions::List(vec![(oid_hex.to_string(), critical, value)]),
        }
        self
    }
}

/// Encode a certificate described by `spec`.
pub fn build_certificate(spec: &CertificateSpec) -> Vec<u8> {
    let algorithm = encode_tlv(TAG_SEQUENCE, &encode_tlv(TAG_OID, &OID_ECDSA_WITH_SHA256));

    let mut validity = encode_time(spec.not_before);
    validity.extend(encode_time(spec.not_after));

    let mut key_algorithm = encode_tlv(TAG_OID, &OID_EC_PUBLIC_KEY);
    key_algorithm.extend(encode_tlv(TAG_OID, &OID_PRIME256V1));
    let mut spki = encode_tlv(TAG_SEQUENCE, &key_algorithm);
    spki.extend(bit_string(&spec.public_key));

    let mut tbs = encode_tlv(TAG_VERSION, &encode_tlv(TAG_INTEGER, &[0x02]));
    tbs.extend(encode_tlv(TAG_INTEGER, &[0x01]));
    tbs.extend(&algorithm);
    tbs.extend(encode_tlv(TAG_SEQUENCE, &spec.issuer));
    tbs.extend(encode_tlv(TAG_SEQUENCE, &validity));
    tbs.extend(encode_tlv(TAG_SEQUENCE, &spec.subject));
    tbs.extend(encode_tlv(TAG_SEQUENCE, &spki));
    match &spec.extensions {
        Extensions::Absent => {}
        Extensions::Raw(content) => tbs.extend(encode_tlv(TAG_EXTENSIONS, content)),
        Extensions::List(list) => {
            let mut entries = Vec::new();
            for (oid_hex, critical, value) in list {
                let mut ext = encode_tlv(TAG_OID, &hex::decode(oid_hex).unwrap());
                if *critical {
                    ext.extend(encode_tlv(TAG_BOOLEAN, &[0xff]));
                }
                ext.extend(encode_tlv(TAG_OCTET_STRING, value));
                entries.extend(encode_tlv(TAG_SEQUENCE, &ext));
            }
            tbs.extend(encode_tlv(TAG_EXTENSIONS, &encode_tlv(TAG_SEQUENCE, &entries)));
        }
    }

    let mut cert = encode_tlv(TAG_SEQUENCE, &tbs);
    cert.extend(algorithm);
    cert.extend(bit_string(&spec.signature));
    encode_tlv(TAG_SEQUENCE, &cert)
}

fn bit_string(payload: &[u8]) -> Vec<u8> {
    let mut content = vec![0x00];
    content.extend_from_slice(payload);
    encode_tlv(TAG_BIT_STRING, &content)
}

fn encode_time(time: DateTime<Utc>) -> Vec<u8> {
    if (1950..2050).contains(&time.year()) {
        let text = time.format("%y%m%d%H%M%SZ").to_string();
        encode_tlv(TAG_UTC_TIME, text.as_bytes())
    } else {
        let text = time.format("%Y%m%d%H%M%SZ").to_string();
        encode_tlv(TAG_GENERALIZED_TIME, text.as_bytes())
    }
}

/// Deterministic P-256 key.
#[derive(Debug, Clone)]
pub struct TestKey(SigningKey);

impl TestKey {
    /// `seed` must be non-zero.
    pub fn from_seed(seed: u8) -> Self {
        Self(SigningKey::from_slice(&[seed; 32]).expect("valid P-256 scalar"))
    }

    /// Uncompressed SEC1 point `0x04‖x‖y`.
    pub fn public_sec1(&self) -> Vec<u8> {
        self.0
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// EC2 / P-256 COSE_Key map.
    pub fn cose_key(&self) -> Vec<u8> {
        let point = self.public_sec1();
        let map = Cbor::Map(vec![
            (Cbor::Integer(1.into()), Cbor::Integer(2.into())),
            (Cbor::Integer(3.into()), Cbor::Integer((-7).into())),
            (Cbor::Integer((-1).into()), Cbor::Integer(1.into())),
            (Cbor::Integer((-2).into()), Cbor::Bytes(point[1..33].to_vec())),
            (Cbor::Integer((-3).into()), Cbor::Bytes(point[33..65].to_vec())),
        ]);
        encode_cbor(&map)
    }

    pub fn sign_raw(&self, message: &[u8]) -> Vec<u8> {
        let signature: Signature = self.0.sign(message);
        signature.to_bytes().to_vec()
    }

    pub fn sign_der(&self, message: &[u8]) -> Vec<u8> {
        let mut raw = [0u8; RAW_SIGNATURE_LEN];
        raw.copy_from_slice(&self.sign_raw(message));
        raw_to_der(&raw)
    }
}

fn encode_cbor(value: &Cbor) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).expect("CBOR encoding to a Vec");
    out
}

fn text(s: &str) -> Cbor {
    Cbor::Text(s.to_string())
}

/// Authenticator data with an attested credential block.
pub fn attestation_auth_data(rp_id_hash: [u8; 32], credential_id: &[u8], cose_key: &[u8]) -> Vec<u8> {
    let mut out = rp_id_hash.to_vec();
    out.push(FLAG_ATTESTED_CREDENTIAL | FLAG_USER_PRESENT);
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(b"appattestdevelop");
    out.extend_from_slice(&(credential_id.len() as u16).to_be_bytes());
    out.extend_from_slice(credential_id);
    out.extend_from_slice(cose_key);
    out
}

/// 37-byte assertion authenticator data.
pub fn assertion_auth_data(rp_id_hash: [u8; 32], sign_count: u32) -> Vec<u8> {
    let mut out = rp_id_hash.to_vec();
    out.push(FLAG_USER_PRESENT);
    out.extend_from_slice(&sign_count.to_be_bytes());
    out
}

/// CBOR attestation object. `receipt_len` pads the statement so the
/// object clears the minimum attestation size.
pub fn attestation_object(
    fmt: &str,
    auth_data: &[u8],
    chain: Option<&[Vec<u8>]>,
    receipt_len: usize,
) -> Vec<u8> {
    let mut statement = Vec::new();
    if let Some(chain) = chain {
        let certs = chain.iter().cloned().map(Cbor::Bytes).collect();
        statement.push((text("x5c"), Cbor::Array(certs)));
    }
    statement.push((text("receipt"), Cbor::Bytes(vec![0x72; receipt_len])));

    encode_cbor(&Cbor::Map(vec![
        (text("fmt"), text(fmt)),
        (text("attStmt"), Cbor::Map(statement)),
        (text("authData"), Cbor::Bytes(auth_data.to_vec())),
    ]))
}

/// CBOR assertion object with a top-level signature.
pub fn assertion_object(auth_data: &[u8], signature: Option<&[u8]>) -> Vec<u8> {
    let mut entries = Vec::new();
    if let Some(signature) = signature {
        entries.push((text("signature"), Cbor::Bytes(signature.to_vec())));
    }
    entries.push((text("authenticatorData"), Cbor::Bytes(auth_data.to_vec())));
    encode_cbor(&Cbor::Map(entries))
}

/// Leaf, intermediate and root certificate descriptions for one device key.
#[derive(Debug, Clone)]
pub struct ChainFixture {
    pub leaf: CertificateSpec,
    pub intermediate: CertificateSpec,
    pub root: CertificateSpec,
}

impl ChainFixture {
    pub fn new(key: &TestKey, nonce: &[u8]) -> Self {
        Self {
            leaf: CertificateSpec::leaf(key.public_sec1()).with_nonce(nonce),
            intermediate: CertificateSpec::intermediate(TestKey::from_seed(0x7e).public_sec1()),
            root: CertificateSpec::root(TestKey::from_seed(0x7f).public_sec1()),
        }
    }

    /// `[leaf, intermediate]` as DER.
    pub fn der_chain(&self) -> Vec<Vec<u8>> {
        vec![build_certificate(&self.leaf), build_certificate(&self.intermediate)]
    }

    pub fn root_der(&self) -> Vec<u8> {
        build_certificate(&self.root)
    }

    pub fn anchor(&self) -> TrustAnchor {
        TrustAnchor::from_der(&self.root_der()).expect("fixture root parses")
    }

    /// Validator trusting this fixture's root in place of the platform root.
    pub fn validator(&self) -> ChainValidator {
        ChainValidator::new(self.anchor())
    }
}

/// A simulated device holding one hardware key for [`TEAM_ID`]/[`BUNDLE_ID`].
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub key: TestKey,
    pub app: AppIdentity,
}

impl DeviceFixture {
    pub fn new(seed: u8) -> Self {
        Self {
            key: TestKey::from_seed(seed),
            app: AppIdentity::new(TEAM_ID, BUNDLE_ID),
        }
    }

    /// `SHA256(public key)`, as the platform derives it.
    pub fn credential_id(&self) -> Vec<u8> {
        Sha256::digest(self.key.public_sec1()).to_vec()
    }

    pub fn key_id(&self) -> String {
        BASE64.encode(self.credential_id())
    }

    pub fn rp_id_hash(&self) -> [u8; 32] {
        app_id_hash(&self.app.team_id, &self.app.bundle_id)
    }

    pub fn auth_data(&self) -> Vec<u8> {
        attestation_auth_data(self.rp_id_hash(), &self.credential_id(), &self.key.cose_key())
    }

    /// Chain whose leaf nonce binds [`Self::auth_data`] to `challenge`.
    pub fn chain(&self, challenge: &[u8]) -> ChainFixture {
        ChainFixture::new(&self.key, &expected_nonce(&self.auth_data(), challenge))
    }

    /// Base64 attestation object carrying `chain`.
    pub fn attestation(&self, chain: Option<&[Vec<u8>]>) -> String {
        BASE64.encode(attestation_object(
            crate::cbor::APP_ATTEST_FORMAT,
            &self.auth_data(),
            chain,
            480,
        ))
    }

    /// Attestation verifier trusting the fixture root.
    pub fn verifier(&self) -> AttestationVerifier {
        AttestationVerifier::new(self.chain(CHALLENGE).validator())
    }

    /// Base64 attestation with a valid chain for [`CHALLENGE`].
    pub fn attestation_with_chain(&self) -> String {
        let chain = self.chain(CHALLENGE).der_chain();
        self.attestation(Some(chain.as_slice()))
    }

    /// Base64 assertion signed over `authData ‖ client_data_hash`.
    pub fn assertion(&self, sign_count: u32, client_data_hash: &[u8]) -> String {
        let auth_data = assertion_auth_data(self.rp_id_hash(), sign_count);
        let mut message = auth_data.clone();
        message.extend_from_slice(client_data_hash);
        let signature = self.key.sign_der(&message);
        BASE64.encode(assertion_object(&auth_data, Some(&signature)))
    }

    /// Base64 assertion with no signature.
    pub fn unsigned_assertion(&self, sign_count: u32) -> String {
        let auth_data = assertion_auth_data(self.rp_id_hash(), sign_count);
        BASE64.encode(assertion_object(&auth_data, None))
    }

    /// Public key as surfaced by a verified attestation.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.key.public_sec1())
    }
}

/// SHA-256 of arbitrary client data, for assertion requests.
pub fn client_data_hash(client_data: &[u8]) -> Vec<u8> {
    Sha256::digest(client_data).to_vec()
}
