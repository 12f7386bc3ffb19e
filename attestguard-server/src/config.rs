//! Server configuration module
//!
//! Handles loading configuration from environment variables with sensible defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

use attestguard_core::TrustAnchor;

/// Errors raised while resolving configuration that points at external material
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read trust anchor {path}: {source}")]
    AnchorRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Trust anchor {0} is not a DER or PEM certificate")]
    AnchorInvalid(String),
}

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port (default: 3000)
    pub port: u16,
    /// Server host (default: 127.0.0.1)
    pub host: [u8; 4],
    /// Allowed CORS origins, comma-separated (default: allow all in dev)
    pub allowed_origins: Option<Vec<String>>,
    /// Request body limit in KB (default: 256)
    pub body_limit_kb: usize,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Enable rate limiting (default: false for tests, true when loaded from env)
    pub rate_limit_enabled: bool,
    /// Rate limit: requests per second (default: 10)
    pub rate_limit_per_sec: u64,
    /// Rate limit: burst size (default: 20)
    pub rate_limit_burst: u32,
    /// Developer team id; enables the app identity check when set
    pub apple_team_id: Option<String>,
    /// Bundle id used when a request does not carry one
    pub apple_bundle_id: Option<String>,
    /// Path to the attestation root certificate (DER or PEM)
    pub attestation_root_cert: Option<PathBuf>,
    /// PostgreSQL connection string; in-memory store when unset
    pub database_url: Option<String>,
    /// Database connection pool maximum connections (default: 10)
    pub database_max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            allowed_origins: None, // None = allow all (dev mode)
            body_limit_kb: 256,
            timeout_secs: 30,
            rate_limit_enabled: false, // Disabled by default (for tests)
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
            apple_team_id: None,
            apple_bundle_id: None,
            attestation_root_cert: None,
            database_url: None,
            database_max_connections: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let allowed_origins = std::env::var("ALLOWED_ORIGINS").ok().map(|origins| {
            origins
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        });

        let body_limit_kb = std::env::var("BODY_LIMIT_KB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(256);

        let timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let rate_limit_per_sec = std::env::var("RATE_LIMIT_PER_SEC")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        let rate_limit_burst = std::env::var("RATE_LIMIT_BURST")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20);

        // Enabled unless RATE_LIMIT_ENABLED=false
        let rate_limit_enabled = std::env::var("RATE_LIMIT_ENABLED")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        let database_max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Self {
            port,
            host,
            allowed_origins,
            body_limit_kb,
            timeout_secs,
            rate_limit_enabled,
            rate_limit_per_sec,
            rate_limit_burst,
            apple_team_id: non_empty_var("APPLE_TEAM_ID"),
            apple_bundle_id: non_empty_var("APPLE_BUNDLE_ID"),
            attestation_root_cert: non_empty_var("ATTESTATION_ROOT_CERT").map(PathBuf::from),
            database_url: non_empty_var("DATABASE_URL"),
            database_max_connections,
        }
    }

    /// Get socket address from config
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }

    /// Read and parse the configured root certificate override, if any.
    ///
    /// `None` leaves the embedded platform root in place.
    pub fn load_trust_anchor(&self) -> Result<Option<TrustAnchor>, ConfigError> {
        let Some(path) = &self.attestation_root_cert else {
            return Ok(None);
        };
        let shown = path.display().to_string();
        let bytes = std::fs::read(path).map_err(|source| ConfigError::AnchorRead {
            path: shown.clone(),
            source,
        })?;
        let anchor = TrustAnchor::from_bytes(&bytes).ok_or_else(|| ConfigError::AnchorInvalid(shown.clone()))?;
        tracing::info!(path = %shown, "Loaded attestation trust anchor override");
        Ok(Some(anchor))
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attestguard_core::testing::{DeviceFixture, CHALLENGE};
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.body_limit_kb, 256);
        assert!(!config.rate_limit_enabled);
        assert!(config.apple_team_id.is_none());
        assert!(config.database_url.is_none());
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_no_anchor_configured() {
        assert!(Config::default().load_trust_anchor().unwrap().is_none());
    }

    #[test]
    fn test_missing_anchor_file_is_an_error() {
        let config = Config {
            attestation_root_cert: Some(PathBuf::from("/nonexistent/attestguard-root.der")),
            ..Config::default()
        };
        assert!(matches!(
            config.load_trust_anchor(),
            Err(ConfigError::AnchorRead { .. })
        ));
    }

    #[test]
    fn test_garbage_anchor_is_rejected() {
        let path = std::env::temp_dir().join(format!("attestguard-anchor-{}.der", std::process::id()));
        std::fs::write(&path, b"not a certificate").unwrap();
        let config = Config {
            attestation_root_cert: Some(path.clone()),
            ..Config::default()
        };
        let result = config.load_trust_anchor();
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::AnchorInvalid(_))));
    }

    #[test]
    fn test_pem_anchor_override_loads() {
        let root = DeviceFixture::new(1).chain(CHALLENGE).root_der();
        let pem = format!(
            "-----BEGIN CERTIFICATE-----\n{}\n-----END CERTIFICATE-----\n",
            BASE64.encode(&root)
        );
        let path = std::env::temp_dir().join(format!("attestguard-anchor-{}.pem", std::process::id()));
        std::fs::write(&path, pem).unwrap();
        let config = Config {
            attestation_root_cert: Some(path.clone()),
            ..Config::default()
        };
        let result = config.load_trust_anchor();
        std::fs::remove_file(&path).ok();

        let anchor = result.unwrap().expect("anchor configured");
        let expected = TrustAnchor::from_der(&root).unwrap();
        assert_eq!(anchor.certificate().subject, expected.certificate().subject);
    }
}
