//! CLI integration tests for attestguard-cli.
//!
//! These tests run the actual binary against generated attestation,
//! assertion and certificate files and check outputs and exit codes.

use assert_cmd::Command;
use attestguard_core::testing::{client_data_hash, DeviceFixture, BUNDLE_ID, CHALLENGE, TEAM_ID};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// Get a Command for the attestguard binary.
fn attestguard() -> Command {
    Command::cargo_bin("attestguard").unwrap()
}

fn write(temp: &TempDir, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
    let path = temp.path().join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn challenge_text() -> &'static str {
    std::str::from_utf8(CHALLENGE).unwrap()
}

/// Write the fixture root so chains can be verified against it.
fn fixture_root(temp: &TempDir) -> String {
    let root = DeviceFixture::new(1).chain(CHALLENGE).root_der();
    write(temp, "root.der", root).to_str().unwrap().to_string()
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    attestguard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Device attestation and assertion verifier"))
        .stdout(predicate::str::contains("attestation"))
        .stdout(predicate::str::contains("assertion"))
        .stdout(predicate::str::contains("inspect-cert"));
}

#[test]
fn test_help_shows_exit_codes() {
    attestguard()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Exit codes:"))
        .stdout(predicate::str::contains("65"))
        .stdout(predicate::str::contains("66"));
}

#[test]
fn test_version_displays_version() {
    attestguard()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("attestguard"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn test_missing_file_returns_input_error() {
    // Exit code 66 = EX_NOINPUT
    attestguard()
        .args(["attestation", "nonexistent.b64", "--challenge", "x"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Failed to read file"));
}

#[test]
fn test_invalid_hash_returns_input_error() {
    let temp = TempDir::new().unwrap();
    let file = write(&temp, "assertion.b64", "AAAA");
    attestguard()
        .args(["assertion", file.to_str().unwrap(), "--client-data-hash", "***"])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("not valid base64"));
}

#[test]
fn test_truncated_attestation_returns_verification_failed() {
    let temp = TempDir::new().unwrap();
    let file = write(&temp, "short.b64", BASE64.encode([0u8; 100]));
    attestguard()
        .args(["attestation", file.to_str().unwrap(), "--challenge", "x"])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Attestation data too short"));
}

// ============================================================================
// Attestation
// ============================================================================

#[test]
fn test_attestation_with_chain_verifies() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(41);
    let file = write(&temp, "attestation.b64", device.attestation_with_chain());

    attestguard()
        .args([
            "attestation",
            file.to_str().unwrap(),
            "--challenge",
            challenge_text(),
            "--key-id",
            &device.key_id(),
            "--root",
            &fixture_root(&temp),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("VERIFIED"))
        .stdout(predicate::str::contains("Attestation verified"))
        .stdout(predicate::str::contains(device.public_key_base64()));
}

#[test]
fn test_attestation_accepts_raw_cbor_file() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(42);
    let raw = BASE64.decode(device.attestation_with_chain()).unwrap();
    let file = write(&temp, "attestation.cbor", raw);

    attestguard()
        .args([
            "attestation",
            file.to_str().unwrap(),
            "--challenge-base64",
            &BASE64.encode(CHALLENGE),
            "--root",
            &fixture_root(&temp),
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"riskScore\": 10"));
}

#[test]
fn test_attestation_defaults_to_platform_root() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(42);
    let file = write(&temp, "attestation.b64", device.attestation_with_chain());

    attestguard()
        .args(["attestation", file.to_str().unwrap(), "--challenge", challenge_text(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"riskScore\": 50"))
        .stdout(predicate::str::contains("not issued by the trust anchor"));
}

#[test]
fn test_attestation_wrong_challenge_is_invalid_chain() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(43);
    let file = write(&temp, "attestation.b64", device.attestation_with_chain());

    // Chain failures are accepted with elevated risk
    attestguard()
        .args(["attestation", file.to_str().unwrap(), "--challenge", "other", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"riskScore\": 50"))
        .stdout(predicate::str::contains("chain_invalid"));
}

#[test]
fn test_attestation_app_identity_mismatch_fails() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(44);
    let file = write(&temp, "attestation.b64", device.attestation_with_chain());

    attestguard()
        .args([
            "attestation",
            file.to_str().unwrap(),
            "--challenge",
            challenge_text(),
            "--team-id",
            TEAM_ID,
            "--bundle-id",
            "com.example.other",
        ])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("App identity mismatch"));

    attestguard()
        .args([
            "-q",
            "attestation",
            file.to_str().unwrap(),
            "--challenge",
            challenge_text(),
            "--team-id",
            TEAM_ID,
            "--bundle-id",
            BUNDLE_ID,
        ])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_attestation_with_root_anchor() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(45);
    let file = write(&temp, "attestation.b64", device.attestation_with_chain());
    let root = write(&temp, "root.der", device.chain(CHALLENGE).root_der());

    attestguard()
        .args([
            "attestation",
            file.to_str().unwrap(),
            "--challenge",
            challenge_text(),
            "--root",
            root.to_str().unwrap(),
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"verified\": true"))
        .stdout(predicate::str::contains("\"riskScore\": 10"));

    let bogus = write(&temp, "bogus.der", b"not a certificate");
    attestguard()
        .args([
            "attestation",
            file.to_str().unwrap(),
            "--challenge",
            challenge_text(),
            "--root",
            bogus.to_str().unwrap(),
        ])
        .assert()
        .code(66);
}

// ============================================================================
// Assertion
// ============================================================================

#[test]
fn test_assertion_verifies_with_stored_key() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(46);
    let client_data = write(&temp, "request.json", b"{\"action\":\"post\"}");
    let hash = client_data_hash(b"{\"action\":\"post\"}");
    let file = write(&temp, "assertion.b64", device.assertion(8, &hash));

    attestguard()
        .args([
            "assertion",
            file.to_str().unwrap(),
            "--client-data",
            client_data.to_str().unwrap(),
            "--public-key",
            &device.public_key_base64(),
            "--counter",
            "7",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Assertion verified"))
        .stdout(predicate::str::contains("Counter:"));
}

#[test]
fn test_assertion_replay_returns_verification_failed() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(47);
    let hash = client_data_hash(b"GET /feed");
    let file = write(&temp, "assertion.b64", device.assertion(3, &hash));

    attestguard()
        .args([
            "assertion",
            file.to_str().unwrap(),
            "--client-data-hash",
            &BASE64.encode(&hash),
            "--public-key",
            &device.public_key_base64(),
            "--counter",
            "3",
        ])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Counter replay detected"));
}

#[test]
fn test_assertion_without_key_degrades() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(48);
    let hash = client_data_hash(b"GET /feed");
    let file = write(&temp, "assertion.b64", device.assertion(1, &hash));

    attestguard()
        .args([
            "assertion",
            file.to_str().unwrap(),
            "--client-data-hash",
            &BASE64.encode(&hash),
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"riskScore\": 20"))
        .stdout(predicate::str::contains("signature_not_verified"));
}

// ============================================================================
// Token, Trust, Certificates
// ============================================================================

#[test]
fn test_token_structure_check() {
    let temp = TempDir::new().unwrap();
    let good = write(&temp, "token.b64", BASE64.encode([9u8; 64]));
    let short = write(&temp, "short.b64", BASE64.encode([9u8; 10]));

    attestguard()
        .args(["token", good.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"riskScore\": 40"));

    attestguard()
        .args(["token", short.to_str().unwrap()])
        .assert()
        .code(65)
        .stderr(predicate::str::contains("Token data too short"));
}

#[test]
fn test_trust_levels() {
    attestguard()
        .args(["trust", "--risk", "5", "--count", "10"])
        .assert()
        .success()
        .stdout(predicate::str::contains("verified"));

    attestguard()
        .args(["trust", "--risk", "60"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unknown"));

    attestguard()
        .args(["trust", "--risk", "5", "--failed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("suspicious"));

    attestguard().args(["trust", "--risk", "101"]).assert().failure();
}

#[test]
fn test_inspect_cert_shows_fields() {
    let temp = TempDir::new().unwrap();
    let device = DeviceFixture::new(49);
    let chain = device.chain(CHALLENGE).der_chain();
    let leaf = write(&temp, "leaf.der", &chain[0]);

    attestguard()
        .args(["inspect-cert", leaf.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("CN=Test Device Key"))
        .stdout(predicate::str::contains("CN=Test Intermediate CA"))
        .stdout(predicate::str::contains("1.2.840.113635.100.8.2"))
        .stdout(predicate::str::contains("Nonce:"));

    let pem = format!(
        "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
        BASE64.encode(&chain[1])
    );
    let intermediate = write(&temp, "intermediate.pem", pem);
    attestguard()
        .args(["inspect-cert", intermediate.to_str().unwrap(), "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"subject\": \"CN=Test Intermediate CA\""))
        .stdout(predicate::str::contains("\"validNow\": true"));
}

#[test]
fn test_inspect_cert_rejects_garbage() {
    let temp = TempDir::new().unwrap();
    let file = write(&temp, "garbage.der", [0x30, 0x03, 0x01, 0x01]);
    attestguard()
        .args(["inspect-cert", file.to_str().unwrap()])
        .assert()
        .code(66)
        .stderr(predicate::str::contains("Invalid input"));
}
