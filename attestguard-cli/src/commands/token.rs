//! Token command implementation.

use std::path::PathBuf;

use anyhow::Result;
use attestguard_core::verify_device_token;

use crate::utils::{read_payload, report};
use crate::OutputArgs;

/// Execute the token command.
pub fn execute(file: PathBuf, output: OutputArgs, quiet: bool) -> Result<()> {
    let token = read_payload(&file)?;
    report("Device token", &verify_device_token(&token), output, quiet)
}
