//! Subcommand implementations.

pub mod assertion;
pub mod attestation;
pub mod inspect;
pub mod token;
pub mod trust;
