//! Assertion command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use attestguard_core::{AssertionRequest, AssertionVerifier, StoredDevice};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::utils::{decode_base64_arg, read_payload, report};
use crate::OutputArgs;

pub struct Options {
    pub file: PathBuf,
    pub client_data_hash: Option<String>,
    pub client_data: Option<PathBuf>,
    pub public_key: Option<String>,
    pub counter: u32,
    pub output: OutputArgs,
    pub quiet: bool,
}

/// Execute the assertion command.
pub fn execute(options: Options) -> Result<()> {
    let assertion = read_payload(&options.file)?;
    info!(path = %options.file.display(), chars = assertion.len(), "Read assertion");

    let client_data_hash = match (&options.client_data_hash, &options.client_data) {
        (Some(encoded), _) => decode_base64_arg(encoded, "client data hash")?,
        (None, Some(path)) => {
            let data = std::fs::read(path)
                .with_context(|| format!("Failed to read client data: {}", path.display()))?;
            Sha256::digest(&data).to_vec()
        }
        (None, None) => Vec::new(),
    };

    if options.public_key.is_none() {
        tracing::warn!("No public key supplied, signature will not be verified");
    }
    let result = AssertionVerifier::new().verify(
        &AssertionRequest {
            assertion: &assertion,
            client_data_hash: &client_data_hash,
        },
        StoredDevice {
            counter: options.counter,
            public_key_base64: options.public_key.as_deref().map(str::trim),
        },
    );

    report("Assertion", &result, options.output, options.quiet)
}
