//! Minimal CBOR decoder for attestation and assertion objects.
//!
//! Supports the subset the platform emits:
//! - Unsigned and negative integers (major types 0, 1)
//! - Byte strings and text strings (major types 2, 3)
//! - Arrays and maps (major types 4, 5)
//!
//! Lengths may be inline (0-23) or carried in 1, 2 or 4 big-endian bytes.
//! Indefinite lengths, 8-byte arguments, tags and simple values are
//! rejected. Decoded values borrow from the input buffer.

use crate::error::DecodeError;
use crate::reader::Reader;

const MT_UNSIGNED: u8 = 0;
const MT_NEGATIVE: u8 = 1;
const MT_BYTE_STRING: u8 = 2;
const MT_TEXT_STRING: u8 = 3;
const MT_ARRAY: u8 = 4;
const MT_MAP: u8 = 5;

/// Maximum container nesting accepted from untrusted input.
pub const MAX_DEPTH: usize = 16;

/// Attestation format marker for hardware-backed app attestation.
pub const APP_ATTEST_FORMAT: &str = "apple-appattest";

/// A decoded CBOR item borrowing from its source buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    Unsigned(u64),
    /// Holds the decoded value `-1 - n`
    Negative(i64),
    Bytes(&'a [u8]),
    Text(&'a str),
    Array(Vec<Value<'a>>),
    Map(Vec<(Value<'a>, Value<'a>)>),
}

impl<'a> Value<'a> {
    /// Either integer major type, when it fits an `i64`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Unsigned(n) => i64::try_from(*n).ok(),
            Value::Negative(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&'a str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value<'a>]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value<'a>, Value<'a>)]> {
        match self {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Look up a text key in a map. Entries with non-text keys are skipped.
    pub fn get(&self, key: &str) -> Option<&Value<'a>> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
    }

    pub(crate) fn type_name(&self) -> String {
        match self {
            Value::Unsigned(_) => "unsigned".into(),
            Value::Negative(_) => "negative".into(),
            Value::Bytes(_) => "bytes".into(),
            Value::Text(_) => "text".into(),
            Value::Array(_) => "array".into(),
            Value::Map(_) => "map".into(),
        }
    }
}

/// Decode a single CBOR item from the start of `bytes`.
///
/// Trailing bytes after the first complete item are ignored.
pub fn decode_value(bytes: &[u8]) -> Result<Value<'_>, DecodeError> {
    let mut reader = Reader::new(bytes);
    read_item(&mut reader, 0)
}

fn read_item<'a>(reader: &mut Reader<'a>, depth: usize) -> Result<Value<'a>, DecodeError> {
    if depth > MAX_DEPTH {
        return Err(DecodeError::TooDeep(MAX_DEPTH));
    }

    let initial = reader.read_u8()?;
    let major = initial >> 5;
    let arg = read_argument(reader, initial & 0x1f)?;

    match major {
        MT_UNSIGNED => Ok(Value::Unsigned(arg)),
        MT_NEGATIVE => i64::try_from(arg)
            .map(|n| Value::Negative(-1 - n))
            .map_err(|_| DecodeError::Unsupported(format!("negative integer -1-{arg}"))),
        MT_BYTE_STRING => Ok(Value::Bytes(reader.read_bytes(to_len(arg)?)?)),
        MT_TEXT_STRING => {
            let raw = reader.read_bytes(to_len(arg)?)?;
            let text = std::str::from_utf8(raw).map_err(|_| DecodeError::InvalidUtf8)?;
            Ok(Value::Text(text))
        }
        MT_ARRAY => {
            let count = to_len(arg)?;
            // Every item occupies at least one byte; cap the preallocation accordingly.
            let mut items = Vec::with_capacity(count.min(reader.remaining()));
            for _ in 0..count {
                items.push(read_item(reader, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        MT_MAP => {
            let count = to_len(arg)?;
            let mut entries = Vec::with_capacity(count.min(reader.remaining() / 2));
            for _ in 0..count {
                let key = read_item(reader, depth + 1)?;
                let value = read_item(reader, depth + 1)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
        other => Err(DecodeError::Unsupported(format!("CBOR major type {other}"))),
    }
}

fn read_argument(reader: &mut Reader<'_>, info: u8) -> Result<u64, DecodeError> {
    match info {
        0..=23 => Ok(u64::from(info)),
        24 => Ok(u64::from(reader.read_u8()?)),
        25 => Ok(u64::from(reader.read_u16_be()?)),
        26 => Ok(u64::from(reader.read_u32_be()?)),
        other => Err(DecodeError::Unsupported(format!(
            "CBOR additional info {other}"
        ))),
    }
}

fn to_len(arg: u64) -> Result<usize, DecodeError> {
    usize::try_from(arg).map_err(|_| DecodeError::Unsupported(format!("length {arg}")))
}

/// Attestation statement carried under `attStmt`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttestationStatement {
    /// DER certificates, leaf first (`x5c`, or `certChain` as an alias)
    pub cert_chain: Option<Vec<Vec<u8>>>,
    /// In-band signature, if the statement carries one
    pub signature: Option<Vec<u8>>,
    /// Opaque vendor receipt
    pub receipt: Option<Vec<u8>>,
}

/// Decoded first-contact attestation object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationObject {
    pub fmt: String,
    pub att_stmt: AttestationStatement,
    pub auth_data: Vec<u8>,
}

/// Decoded per-request assertion object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssertionObject {
    pub auth_data: Vec<u8>,
    pub signature: Option<Vec<u8>>,
}

/// Decode `{fmt, attStmt, authData}` from an attestation object.
pub fn decode_attestation_object(bytes: &[u8]) -> Result<AttestationObject, DecodeError> {
    let root = decode_value(bytes)?;
    expect_map(&root)?;

    let fmt = required(&root, "fmt")?;
    let fmt = fmt.as_text().ok_or_else(|| unexpected("text", fmt))?;

    let att_stmt = required(&root, "attStmt")?;
    expect_map(att_stmt)?;

    let auth_data = required(&root, "authData")?;
    let auth_data = auth_data
        .as_bytes()
        .ok_or_else(|| unexpected("bytes", auth_data))?;

    Ok(AttestationObject {
        fmt: fmt.to_string(),
        att_stmt: decode_statement(att_stmt)?,
        auth_data: auth_data.to_vec(),
    })
}

/// Decode an assertion object.
///
/// The authenticator data is read from `authenticatorData` (or `authData`);
/// the signature from a top-level `signature` or `attStmt.signature`.
pub fn decode_assertion_object(bytes: &[u8]) -> Result<AssertionObject, DecodeError> {
    let root = decode_value(bytes)?;
    expect_map(&root)?;

    let auth_data = root
        .get("authenticatorData")
        .or_else(|| root.get("authData"))
        .ok_or(DecodeError::MissingField("authenticatorData"))?;
    let auth_data = auth_data
        .as_bytes()
        .ok_or_else(|| unexpected("bytes", auth_data))?;

    let signature = match root.get("signature") {
        Some(value) => Some(value.as_bytes().ok_or_else(|| unexpected("bytes", value))?),
        None => match root.get("attStmt") {
            Some(stmt) => {
                expect_map(stmt)?;
                optional_bytes(stmt, "signature")?
            }
            None => None,
        },
    };

    Ok(AssertionObject {
        auth_data: auth_data.to_vec(),
        signature: signature.map(<[u8]>::to_vec),
    })
}

fn decode_statement(stmt: &Value<'_>) -> Result<AttestationStatement, DecodeError> {
    let cert_chain = match stmt.get("x5c").or_else(|| stmt.get("certChain")) {
        Some(chain) => {
            let items = chain.as_array().ok_or_else(|| unexpected("array", chain))?;
            let certs = items
                .iter()
                .map(|item| {
                    item.as_bytes()
                        .map(<[u8]>::to_vec)
                        .ok_or_else(|| unexpected("bytes", item))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Some(certs)
        }
        None => None,
    };

    Ok(AttestationStatement {
        cert_chain,
        signature: optional_bytes(stmt, "signature")?.map(<[u8]>::to_vec),
        receipt: optional_bytes(stmt, "receipt")?.map(<[u8]>::to_vec),
    })
}

fn required<'v, 'a>(map: &'v Value<'a>, key: &'static str) -> Result<&'v Value<'a>, DecodeError> {
    map.get(key).ok_or(DecodeError::MissingField(key))
}

fn optional_bytes<'a>(map: &Value<'a>, key: &str) -> Result<Option<&'a [u8]>, DecodeError> {
    match map.get(key) {
        Some(value) => value
            .as_bytes()
            .map(Some)
            .ok_or_else(|| unexpected("bytes", value)),
        None => Ok(None),
    }
}

fn expect_map(value: &Value<'_>) -> Result<(), DecodeError> {
    match value {
        Value::Map(_) => Ok(()),
        other => Err(unexpected("map", other)),
    }
}

fn unexpected(expected: &'static str, found: &Value<'_>) -> DecodeError {
    DecodeError::UnexpectedType {
        expected,
        found: found.type_name(),
    }
}
