//! AttestGuard CLI - offline device attestation verifier.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod exit_codes;
mod utils;

use exit_codes::ExitCode;

#[derive(Parser)]
#[command(name = "attestguard")]
#[command(author, version, about = "Device attestation and assertion verifier", long_about = None)]
#[command(after_help = "Exit codes:\n  0   Verified\n  65  Verification failed\n  66  Input file missing or not decodable\n  1   Other error")]
struct Cli {
    /// Suppress human-readable output (exit code only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Output options shared by the verification commands
#[derive(Args, Clone, Copy)]
pub struct OutputArgs {
    /// Print the verification result as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a first-contact attestation object
    Attestation {
        /// File holding the attestation (base64 text or raw CBOR)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Server-issued challenge, as text
        #[arg(short, long, required_unless_present = "challenge_base64", conflicts_with = "challenge_base64")]
        challenge: Option<String>,

        /// Server-issued challenge, as base64
        #[arg(long, value_name = "BASE64")]
        challenge_base64: Option<String>,

        /// Expected key id (base64)
        #[arg(long)]
        key_id: Option<String>,

        /// Developer team id; enables the app identity check
        #[arg(long, requires = "bundle_id")]
        team_id: Option<String>,

        /// App bundle id
        #[arg(long)]
        bundle_id: Option<String>,

        /// Root certificate (DER or PEM) replacing the embedded App Attestation root
        #[arg(long, value_name = "CERT")]
        root: Option<PathBuf>,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Verify a per-request assertion against a stored key and counter
    Assertion {
        /// File holding the assertion (base64 text or raw CBOR)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// SHA-256 of the client data, as base64
        #[arg(long, value_name = "BASE64", required_unless_present = "client_data")]
        client_data_hash: Option<String>,

        /// File whose SHA-256 is the client data hash
        #[arg(long, value_name = "FILE", conflicts_with = "client_data_hash")]
        client_data: Option<PathBuf>,

        /// Stored public key (base64 SEC1)
        #[arg(long, value_name = "BASE64")]
        public_key: Option<String>,

        /// Stored assertion counter
        #[arg(long, default_value_t = 0)]
        counter: u32,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Check the structure of a legacy device token
    Token {
        /// File holding the token (base64 text)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        output: OutputArgs,
    },

    /// Compute the trust level for a verification outcome
    Trust {
        /// Risk score (0 best, 100 worst)
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        risk: u8,

        /// Prior verifications for the key
        #[arg(long, default_value_t = 0)]
        count: u32,

        /// Score a failed verification
        #[arg(long)]
        failed: bool,
    },

    /// Print the fields of a DER or PEM certificate
    InspectCert {
        /// Certificate file
        #[arg(value_name = "CERT")]
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("attestguard_core=debug,attestguard_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let exit = match run(cli) {
        Ok(()) => ExitCode::success(),
        Err(err) => {
            let exit = ExitCode::from_anyhow(&err);
            if let Some(message) = &exit.message {
                eprintln!("Error: {message}");
            }
            exit
        }
    };
    std::process::ExitCode::from(exit.code as u8)
}

fn run(cli: Cli) -> Result<()> {
    let quiet = cli.quiet;
    match cli.command {
        Commands::Attestation {
            file,
            challenge,
            challenge_base64,
            key_id,
            team_id,
            bundle_id,
            root,
            output,
        } => commands::attestation::execute(commands::attestation::Options {
            file,
            challenge,
            challenge_base64,
            key_id,
            team_id,
            bundle_id,
            root,
            output,
            quiet,
        }),
        Commands::Assertion {
            file,
            client_data_hash,
            client_data,
            public_key,
            counter,
            output,
        } => commands::assertion::execute(commands::assertion::Options {
            file,
            client_data_hash,
            client_data,
            public_key,
            counter,
            output,
            quiet,
        }),
        Commands::Token { file, output } => commands::token::execute(file, output, quiet),
        Commands::Trust { risk, count, failed } => commands::trust::execute(risk, count, failed, quiet),
        Commands::InspectCert { file, json } => commands::inspect::execute(file, json, quiet),
    }
}
