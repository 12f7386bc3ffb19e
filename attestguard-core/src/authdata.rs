//! Authenticator data parser.
//!
//! Fixed layout:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0      | 32   | rpIdHash |
//! | 32     | 1    | flags |
//! | 33     | 4    | signCount (big-endian) |
//! | 37     | 16   | AAGUID (attested credential only) |
//! | 53     | 2    | credentialId length L |
//! | 55     | L    | credentialId |
//! | 55+L   | rest | COSE public key |

use sha2::{Digest, Sha256};

use crate::error::DecodeError;
use crate::reader::Reader;

pub const FLAG_USER_PRESENT: u8 = 0x01;
pub const FLAG_ATTESTED_CREDENTIAL: u8 = 0x40;

/// rpIdHash, flags and counter.
pub const FIXED_LEN: usize = 37;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestedCredential {
    pub aaguid: [u8; 16],
    pub credential_id: Vec<u8>,
    /// Platform-native COSE_Key encoding
    pub public_key_cose: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatorData {
    pub rp_id_hash: [u8; 32],
    pub flags: u8,
    pub sign_count: u32,
    pub attested: Option<AttestedCredential>,
}

impl AuthenticatorData {
    /// Parse attestation authenticator data.
    ///
    /// Returns `None` when the buffer is shorter than 37 bytes, when the
    /// attested-credential flag is unset, or when the credential block is
    /// truncated.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        match Self::parse_with_credential(bytes) {
            Ok(data) => data,
            Err(e) => {
                tracing::debug!(error = %e, len = bytes.len(), "Authenticator data parse failed");
                None
            }
        }
    }

    fn parse_with_credential(bytes: &[u8]) -> Result<Option<Self>, DecodeError> {
        let mut reader = Reader::new(bytes);
        let (rp_id_hash, flags, sign_count) = read_fixed(&mut reader)?;
        if flags & FLAG_ATTESTED_CREDENTIAL == 0 {
            return Ok(None);
        }

        let aaguid = reader.read_array::<16>()?;
        let id_len = usize::from(reader.read_u16_be()?);
        let credential_id = reader.read_bytes(id_len)?.to_vec();
        let public_key_cose = reader.read_rest().to_vec();

        Ok(Some(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested: Some(AttestedCredential {
                aaguid,
                credential_id,
                public_key_cose,
            }),
        }))
    }

    /// Parse only the 37-byte fixed prefix, as carried by assertions.
    ///
    /// Any bytes past the prefix (extensions) are ignored.
    pub fn parse_fixed(bytes: &[u8]) -> Option<Self> {
        let mut reader = Reader::new(bytes);
        let (rp_id_hash, flags, sign_count) = read_fixed(&mut reader).ok()?;
        Some(Self {
            rp_id_hash,
            flags,
            sign_count,
            attested: None,
        })
    }

    pub fn user_present(&self) -> bool {
        self.flags & FLAG_USER_PRESENT != 0
    }

    /// Whether `rpIdHash` equals `SHA256(team_id + "." + bundle_id)`.
    pub fn matches_app_id(&self, team_id: &str, bundle_id: &str) -> bool {
        self.rp_id_hash == app_id_hash(team_id, bundle_id)
    }
}

/// `SHA256(team_id + "." + bundle_id)`.
pub fn app_id_hash(team_id: &str, bundle_id: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(team_id.as_bytes());
    hasher.update(b".");
    hasher.update(bundle_id.as_bytes());
    hasher.finalize().into()
}

fn read_fixed(reader: &mut Reader<'_>) -> Result<([u8; 32], u8, u32), DecodeError> {
    let rp_id_hash = reader.read_array::<32>()?;
    let flags = reader.read_u8()?;
    let sign_count = reader.read_u32_be()?;
    Ok((rp_id_hash, flags, sign_count))
}
