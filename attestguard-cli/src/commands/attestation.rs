//! Attestation command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use attestguard_core::{AppIdentity, AttestationRequest, AttestationVerifier, ChainValidator, TrustAnchor};
use tracing::info;

use crate::utils::{decode_base64_arg, read_payload, report};
use crate::OutputArgs;

pub struct Options {
    pub file: PathBuf,
    pub challenge: Option<String>,
    pub challenge_base64: Option<String>,
    pub key_id: Option<String>,
    pub team_id: Option<String>,
    pub bundle_id: Option<String>,
    pub root: Option<PathBuf>,
    pub output: OutputArgs,
    pub quiet: bool,
}

/// Execute the attestation command.
pub fn execute(options: Options) -> Result<()> {
    let attestation = read_payload(&options.file)?;
    info!(path = %options.file.display(), chars = attestation.len(), "Read attestation");

    let challenge = match (&options.challenge, &options.challenge_base64) {
        (_, Some(encoded)) => decode_base64_arg(encoded, "challenge")?,
        (Some(text), None) => text.as_bytes().to_vec(),
        (None, None) => Vec::new(),
    };

    let validator = match &options.root {
        Some(path) => {
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read root certificate: {}", path.display()))?;
            let anchor = TrustAnchor::from_bytes(&bytes)
                .with_context(|| format!("Invalid input: {} is not a DER or PEM certificate", path.display()))?;
            info!(path = %path.display(), "Using root certificate override");
            ChainValidator::new(anchor)
        }
        None => ChainValidator::default(),
    };

    let app_identity = match (&options.team_id, &options.bundle_id) {
        (Some(team), Some(bundle)) => Some(AppIdentity::new(team.as_str(), bundle.as_str())),
        _ => None,
    };

    let verifier = AttestationVerifier::new(validator);
    let result = verifier.verify(
        &AttestationRequest {
            attestation: &attestation,
            challenge: &challenge,
            key_id: options.key_id.as_deref(),
            app_identity: app_identity.as_ref(),
        },
        chrono::Utc::now(),
    );

    report("Attestation", &result, options.output, options.quiet)
}
