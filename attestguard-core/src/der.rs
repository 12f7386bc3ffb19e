//! Minimal X.509 DER certificate parser.
//!
//! Walks exactly the structure needed for attestation chains:
//!
//! ```text
//! Certificate ::= SEQUENCE {
//!     tbsCertificate       SEQUENCE { [0] version?, serial, sigAlg, issuer,
//!                                     validity, subject, spki, ..., [3] extensions? }
//!     signatureAlgorithm   AlgorithmIdentifier
//!     signatureValue       BIT STRING }
//! ```
//!
//! Issuer and subject are kept as opaque byte ranges; only byte-identity
//! comparison is ever performed on them.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::DecodeError;
use crate::reader::Reader;

pub const TAG_BOOLEAN: u8 = 0x01;
pub const TAG_INTEGER: u8 = 0x02;
pub const TAG_BIT_STRING: u8 = 0x03;
pub const TAG_OCTET_STRING: u8 = 0x04;
pub const TAG_OID: u8 = 0x06;
pub const TAG_UTC_TIME: u8 = 0x17;
pub const TAG_GENERALIZED_TIME: u8 = 0x18;
pub const TAG_SEQUENCE: u8 = 0x30;
pub const TAG_VERSION: u8 = 0xa0;
pub const TAG_EXTENSIONS: u8 = 0xa3;

/// One decoded certificate. Built purely from DER bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCertificate {
    /// Full TBSCertificate TLV, verbatim, for signature verification
    pub tbs_certificate: Vec<u8>,
    /// Full AlgorithmIdentifier TLV of the outer signature
    pub signature_algorithm: Vec<u8>,
    /// Signature bytes with the unused-bits octet removed
    pub signature_value: Vec<u8>,
    /// Subject public key (uncompressed EC point for P-256 keys)
    pub public_key: Vec<u8>,
    /// Issuer Name TLV
    pub issuer: Vec<u8>,
    /// Subject Name TLV
    pub subject: Vec<u8>,
    /// Extension OID (hex of the OID content bytes) to extnValue contents
    pub extensions: BTreeMap<String, Vec<u8>>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

impl ParsedCertificate {
    /// Whether `now` falls inside the validity window (inclusive).
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.not_before <= now && now <= self.not_after
    }

    pub fn extension(&self, oid_hex: &str) -> Option<&[u8]> {
        self.extensions.get(oid_hex).map(Vec::as_slice)
    }
}

/// Parse a DER certificate. Any structural mismatch returns `None`.
pub fn parse_certificate(der: &[u8]) -> Option<ParsedCertificate> {
    match parse_certificate_inner(der) {
        Ok(cert) => Some(cert),
        Err(e) => {
            tracing::debug!(error = %e, len = der.len(), "Certificate parse failed");
            None
        }
    }
}

fn parse_certificate_inner(der: &[u8]) -> Result<ParsedCertificate, DecodeError> {
    let mut outer = Reader::new(der);
    let cert = expect(&mut outer, TAG_SEQUENCE)?;
    let mut cert = Reader::new(cert);

    let (tbs, tbs_raw) = expect_raw(&mut cert, TAG_SEQUENCE)?;
    let (_, signature_algorithm) = expect_raw(&mut cert, TAG_SEQUENCE)?;
    let signature_value = bit_string_payload(expect(&mut cert, TAG_BIT_STRING)?)?;

    let mut tbs = Reader::new(tbs);
    if tbs.peek_u8()? == TAG_VERSION {
        read_tlv(&mut tbs)?;
    }
    expect(&mut tbs, TAG_INTEGER)?; // serialNumber
    expect(&mut tbs, TAG_SEQUENCE)?; // signature
    let (_, issuer) = expect_raw(&mut tbs, TAG_SEQUENCE)?;

    let mut validity = Reader::new(expect(&mut tbs, TAG_SEQUENCE)?);
    let not_before = read_time(&mut validity)?;
    let not_after = read_time(&mut validity)?;

    let (_, subject) = expect_raw(&mut tbs, TAG_SEQUENCE)?;

    let mut spki = Reader::new(expect(&mut tbs, TAG_SEQUENCE)?);
    expect(&mut spki, TAG_SEQUENCE)?; // algorithm
    let public_key = bit_string_payload(expect(&mut spki, TAG_BIT_STRING)?)?;

    // issuerUniqueID [1], subjectUniqueID [2], extensions [3]. Anything
    // malformed past the key is tolerated.
    let mut extensions = BTreeMap::new();
    while !tbs.is_empty() {
        match read_tlv(&mut tbs) {
            Ok((TAG_EXTENSIONS, content)) => {
                extensions = parse_extensions(content);
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed trailing TBS fields");
                break;
            }
        }
    }

    Ok(ParsedCertificate {
        tbs_certificate: tbs_raw.to_vec(),
        signature_algorithm: signature_algorithm.to_vec(),
        signature_value: signature_value.to_vec(),
        public_key: public_key.to_vec(),
        issuer: issuer.to_vec(),
        subject: subject.to_vec(),
        extensions,
        not_before,
        not_after,
    })
}

/// Best-effort extension walk; entries decoded before a malformed one are kept.
fn parse_extensions(explicit: &[u8]) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    let mut outer = Reader::new(explicit);
    let Ok(list) = expect(&mut outer, TAG_SEQUENCE) else {
        return map;
    };

    let mut list = Reader::new(list);
    while !list.is_empty() {
        let parsed = expect(&mut list, TAG_SEQUENCE).and_then(|ext| {
            let mut ext = Reader::new(ext);
            let oid = expect(&mut ext, TAG_OID)?;
            if ext.peek_u8()? == TAG_BOOLEAN {
                read_tlv(&mut ext)?; // critical
            }
            let value = expect(&mut ext, TAG_OCTET_STRING)?;
            Ok((hex::encode(oid), value.to_vec()))
        });

        match parsed {
            Ok((oid, value)) => {
                map.insert(oid, value);
            }
            Err(e) => {
                tracing::debug!(error = %e, kept = map.len(), "Stopping at malformed extension");
                break;
            }
        }
    }
    map
}

/// Read one TLV, returning its tag and content.
pub fn read_tlv<'a>(reader: &mut Reader<'a>) -> Result<(u8, &'a [u8]), DecodeError> {
    let tag = reader.read_u8()?;
    let len = read_length(reader)?;
    Ok((tag, reader.read_bytes(len)?))
}

/// Read one TLV that must carry `tag`, returning its content.
pub fn expect<'a>(reader: &mut Reader<'a>, tag: u8) -> Result<&'a [u8], DecodeError> {
    expect_raw(reader, tag).map(|(content, _)| content)
}

/// Like [`expect`], also returning the full encoded TLV.
pub fn expect_raw<'a>(
    reader: &mut Reader<'a>,
    tag: u8,
) -> Result<(&'a [u8], &'a [u8]), DecodeError> {
    let start = reader.position();
    let found = reader.peek_u8()?;
    if found != tag {
        return Err(DecodeError::UnexpectedType {
            expected: tag_name(tag),
            found: format!("tag 0x{found:02x}"),
        });
    }
    let (_, content) = read_tlv(reader)?;
    Ok((content, reader.consumed_since(start)))
}

/// Short form, or long form with one or two length octets.
fn read_length(reader: &mut Reader<'_>) -> Result<usize, DecodeError> {
    match reader.read_u8()? {
        len @ 0x00..=0x7f => Ok(usize::from(len)),
        0x81 => Ok(usize::from(reader.read_u8()?)),
        0x82 => Ok(usize::from(reader.read_u16_be()?)),
        other => Err(DecodeError::Unsupported(format!(
            "DER length octet 0x{other:02x}"
        ))),
    }
}

fn bit_string_payload(content: &[u8]) -> Result<&[u8], DecodeError> {
    match content.split_first() {
        Some((_unused_bits, payload)) => Ok(payload),
        None => Err(DecodeError::MissingField("bit string unused-bits octet")),
    }
}

fn read_time(reader: &mut Reader<'_>) -> Result<DateTime<Utc>, DecodeError> {
    let (tag, content) = read_tlv(reader)?;
    let text = std::str::from_utf8(content).map_err(|_| DecodeError::InvalidUtf8)?;
    match tag {
        TAG_UTC_TIME => parse_utc_time(text),
        TAG_GENERALIZED_TIME => parse_generalized_time(text),
        other => Err(DecodeError::UnexpectedType {
            expected: "UTCTime or GeneralizedTime",
            found: format!("tag 0x{other:02x}"),
        }),
    }
}

/// `YYMMDDHHMMSSZ`; two-digit years >= 50 are 19xx, otherwise 20xx.
pub fn parse_utc_time(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    let digits = time_digits(text, 12)?;
    let yy = number(&digits[0..2]);
    let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
    build_time(year, &digits[2..])
}

/// `YYYYMMDDHHMMSSZ`.
pub fn parse_generalized_time(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    let digits = time_digits(text, 14)?;
    build_time(number(&digits[0..4]), &digits[4..])
}

fn time_digits(text: &str, count: usize) -> Result<&[u8], DecodeError> {
    let bytes = text.as_bytes();
    let valid = bytes.len() == count + 1
        && bytes[count] == b'Z'
        && bytes[..count].iter().all(u8::is_ascii_digit);
    if valid {
        Ok(&bytes[..count])
    } else {
        Err(DecodeError::Unsupported(format!("time value {text:?}")))
    }
}

fn number(digits: &[u8]) -> i32 {
    digits
        .iter()
        .fold(0, |acc, d| acc * 10 + i32::from(d - b'0'))
}

/// `rest` is `MMDDHHMMSS`.
fn build_time(year: i32, rest: &[u8]) -> Result<DateTime<Utc>, DecodeError> {
    let field = |i: usize| number(&rest[i..i + 2]) as u32;
    NaiveDate::from_ymd_opt(year, field(0), field(2))
        .and_then(|date| date.and_hms_opt(field(4), field(6), field(8)))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| DecodeError::Unsupported("calendar value out of range".into()))
}

/// Encode one TLV using the shortest length form for `content`.
///
/// Lengths past two octets are written in full; [`read_tlv`] rejects them.
pub fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let len = content.len();
    let mut out = Vec::with_capacity(len + 10);
    out.push(tag);
    match u8::try_from(len) {
        Ok(short) if short <= 0x7f => out.push(short),
        _ => {
            let octets = len.to_be_bytes();
            let skip = octets.iter().take_while(|&&b| b == 0).count();
            let width = octets.len() - skip;
            out.push(0x80 | width as u8);
            out.extend_from_slice(&octets[skip..]);
        }
    }
    out.extend_from_slice(content);
    out
}

/// Render OID content bytes in dotted notation.
pub fn oid_to_string(oid: &[u8]) -> Option<String> {
    let (first, rest) = oid.split_first()?;
    let mut arcs = vec![u64::from(first / 40), u64::from(first % 40)];
    let mut acc: u64 = 0;
    for byte in rest {
        acc = acc.checked_mul(128)? | u64::from(byte & 0x7f);
        if byte & 0x80 == 0 {
            arcs.push(acc);
            acc = 0;
        }
    }
    if rest.last().is_some_and(|b| b & 0x80 != 0) {
        return None;
    }
    Some(
        arcs.iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join("."),
    )
}

/// Accept either raw DER or a PEM `CERTIFICATE` block.
pub fn certificate_bytes(input: &[u8]) -> Option<Vec<u8>> {
    if input.first() == Some(&TAG_SEQUENCE) {
        return Some(input.to_vec());
    }
    let text = std::str::from_utf8(input).ok()?;
    if !text.contains("-----BEGIN") {
        return None;
    }
    let body: String = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("-----"))
        .collect();
    BASE64.decode(body).ok()
}

fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_BOOLEAN => "BOOLEAN",
        TAG_INTEGER => "INTEGER",
        TAG_BIT_STRING => "BIT STRING",
        TAG_OCTET_STRING => "OCTET STRING",
        TAG_OID => "OBJECT IDENTIFIER",
        TAG_SEQUENCE => "SEQUENCE",
        TAG_VERSION => "[0] version",
        TAG_EXTENSIONS => "[3] extensions",
        _ => "tag",
    }
}
