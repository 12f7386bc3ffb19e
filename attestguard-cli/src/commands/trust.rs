//! Trust command implementation.

use anyhow::Result;
use attestguard_core::{trust, RiskScore};

/// Execute the trust command.
pub fn execute(risk: u8, count: u32, failed: bool, quiet: bool) -> Result<()> {
    let level = trust::score(!failed, RiskScore::new(risk), count);
    if !quiet {
        println!("{level}");
    }
    Ok(())
}
