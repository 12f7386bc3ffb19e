//! Common utility functions shared across CLI commands.

use std::path::Path;

use anyhow::{bail, Context, Result};
use attestguard_core::{trust, VerificationResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use colored::Colorize;
use tracing::debug;

use crate::OutputArgs;

/// Read a payload file as base64 text.
///
/// Files that are not base64 text are treated as raw bytes and encoded.
pub fn read_payload(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read file: {}", path.display()))?;
    Ok(payload_to_base64(&bytes))
}

pub fn payload_to_base64(bytes: &[u8]) -> String {
    if let Ok(text) = std::str::from_utf8(bytes) {
        let compact: String = text.split_whitespace().collect();
        if !compact.is_empty() && BASE64.decode(&compact).is_ok() {
            debug!(format = "base64", chars = compact.len(), "Read payload");
            return compact;
        }
    }
    debug!(format = "raw", bytes = bytes.len(), "Read payload");
    BASE64.encode(bytes)
}

pub fn decode_base64_arg(value: &str, name: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(value.trim())
        .with_context(|| format!("Invalid input: {name} is not valid base64"))
}

/// Print `result` and turn a rejection into an error.
pub fn report(title: &str, result: &VerificationResult, output: OutputArgs, quiet: bool) -> Result<()> {
    if output.json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else if !quiet {
        print_result(title, result);
    }

    if !result.verified {
        bail!(
            "Verification failed: {}",
            result.message.as_deref().unwrap_or("rejected")
        );
    }
    Ok(())
}

fn print_result(title: &str, result: &VerificationResult) {
    let level = trust::score(result.verified, result.risk_score, 0);
    println!();
    if result.verified {
        println!("   {} {}", title.bold(), "VERIFIED".green().bold());
    } else {
        println!("   {} {}", title.bold(), "REJECTED".red().bold());
    }
    println!();
    if let Some(message) = &result.message {
        println!("   {} {}", "Message:".dimmed(), message);
    }
    let risk = result.risk_score.value();
    let risk_text = match risk {
        0..=19 => risk.to_string().green(),
        20..=49 => risk.to_string().yellow(),
        _ => risk.to_string().red(),
    };
    println!("   {} {}", "Risk score:".dimmed(), risk_text);
    println!("   {} {}", "Trust level:".dimmed(), level);
    if let Some(counter) = result.new_counter {
        println!("   {} {}", "Counter:".dimmed(), counter);
    }
    if let Some(key) = &result.public_key_base64 {
        println!("   {} {}", "Public key:".dimmed(), key);
    }
    for condition in &result.conditions {
        println!("   {} {}", "Condition:".dimmed(), condition.as_str().yellow());
    }
}
