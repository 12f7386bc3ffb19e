//! Certificate inspection command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use attestguard_core::chain::{decode_nonce, APP_ATTEST_NONCE_OID};
use attestguard_core::der::{self, TAG_OID, TAG_SEQUENCE};
use attestguard_core::reader::Reader;
use attestguard_core::ParsedCertificate;
use colored::Colorize;
use serde_json::json;

const TAG_SET: u8 = 0x31;

/// Execute the inspect-cert command.
pub fn execute(file: PathBuf, json: bool, quiet: bool) -> Result<()> {
    let bytes = std::fs::read(&file).with_context(|| format!("Failed to read file: {}", file.display()))?;
    let der = der::certificate_bytes(&bytes)
        .with_context(|| format!("Invalid input: {} is not DER or PEM", file.display()))?;
    let cert = der::parse_certificate(&der)
        .with_context(|| format!("Invalid input: {} is not a parseable certificate", file.display()))?;

    let now = chrono::Utc::now();
    let nonce = cert
        .extension(APP_ATTEST_NONCE_OID)
        .map(|value| decode_nonce(value).map(hex::encode).map_err(|e| e.to_string()));

    if json {
        let value = json!({
            "subject": describe_name(&cert.subject),
            "issuer": describe_name(&cert.issuer),
            "notBefore": cert.not_before.to_rfc3339(),
            "notAfter": cert.not_after.to_rfc3339(),
            "validNow": cert.is_valid_at(now),
            "publicKey": hex::encode(&cert.public_key),
            "extensions": extension_oids(&cert),
            "nonce": nonce.as_ref().and_then(|n| n.as_ref().ok()),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else if !quiet {
        println!();
        println!("   {} {}", "Subject:".dimmed(), describe_name(&cert.subject));
        println!("   {} {}", "Issuer:".dimmed(), describe_name(&cert.issuer));
        let validity = format!(
            "{} .. {}",
            cert.not_before.format("%Y-%m-%d %H:%M:%S UTC"),
            cert.not_after.format("%Y-%m-%d %H:%M:%S UTC")
        );
        if cert.is_valid_at(now) {
            println!("   {} {}", "Validity:".dimmed(), validity.green());
        } else {
            println!("   {} {} {}", "Validity:".dimmed(), validity.red(), "(not valid now)".red());
        }
        println!("   {} {}", "Public key:".dimmed(), hex::encode(&cert.public_key));
        for oid in extension_oids(&cert) {
            println!("   {} {}", "Extension:".dimmed(), oid);
        }
        match &nonce {
            Some(Ok(value)) => println!("   {} {}", "Nonce:".dimmed(), value),
            Some(Err(e)) => println!("   {} {}", "Nonce:".dimmed(), format!("undecodable ({e})").red()),
            None => {}
        }
    }
    Ok(())
}

fn extension_oids(cert: &ParsedCertificate) -> Vec<String> {
    cert.extensions
        .keys()
        .map(|oid_hex| {
            hex::decode(oid_hex)
                .ok()
                .and_then(|oid| der::oid_to_string(&oid))
                .unwrap_or_else(|| oid_hex.clone())
        })
        .collect()
}

/// Render a Name as `CN=..., O=...`. Unreadable names render as hex.
pub fn describe_name(name: &[u8]) -> String {
    read_name(name).unwrap_or_else(|| hex::encode(name))
}

fn read_name(name: &[u8]) -> Option<String> {
    let mut outer = Reader::new(name);
    let mut rdns = Reader::new(der::expect(&mut outer, TAG_SEQUENCE).ok()?);
    let mut parts = Vec::new();
    while !rdns.is_empty() {
        let mut set = Reader::new(der::expect(&mut rdns, TAG_SET).ok()?);
        while !set.is_empty() {
            let mut attribute = Reader::new(der::expect(&mut set, TAG_SEQUENCE).ok()?);
            let oid = der::oid_to_string(der::expect(&mut attribute, TAG_OID).ok()?)?;
            let (_, value) = der::read_tlv(&mut attribute).ok()?;
            let label = match oid.as_str() {
                "2.5.4.3" => "CN",
                "2.5.4.6" => "C",
                "2.5.4.7" => "L",
                "2.5.4.8" => "ST",
                "2.5.4.10" => "O",
                "2.5.4.11" => "OU",
                other => other,
            };
            parts.push(format!("{}={}", label, String::from_utf8_lossy(value)));
        }
    }
    Some(parts.join(", "))
}
