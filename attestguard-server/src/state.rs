//! Application state module
//!
//! Defines shared state accessible across all request handlers.

use std::sync::Arc;

use attestguard_core::{AppIdentity, AssertionVerifier, AttestationVerifier, ChainValidator, TrustAnchor};

use crate::config::Config;
use crate::store::{DeviceRecordStore, MemoryDeviceStore};

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// Device record storage (PostgreSQL or memory)
    pub store: Arc<dyn DeviceRecordStore>,
    pub attestation_verifier: Arc<AttestationVerifier>,
    pub assertion_verifier: AssertionVerifier,
    /// App identity check runs only when a team id is configured
    pub team_id: Option<String>,
    pub default_bundle_id: Option<String>,
}

impl AppState {
    pub fn new(config: &Config, store: Arc<dyn DeviceRecordStore>) -> Self {
        if config.apple_team_id.is_none() {
            tracing::warn!("APPLE_TEAM_ID not set, app identity check disabled");
        }
        Self {
            store,
            attestation_verifier: Arc::new(AttestationVerifier::default()),
            assertion_verifier: AssertionVerifier::new(),
            team_id: config.apple_team_id.clone(),
            default_bundle_id: config.apple_bundle_id.clone(),
        }
    }

    /// In-memory state for tests and local development
    pub fn in_memory(config: &Config) -> Self {
        Self::new(config, Arc::new(MemoryDeviceStore::new()))
    }

    /// Bind attestation chains to `anchor` in place of the platform root.
    pub fn with_trust_anchor(mut self, anchor: TrustAnchor) -> Self {
        self.attestation_verifier = Arc::new(AttestationVerifier::new(ChainValidator::new(anchor)));
        self
    }

    /// Identity to check for a request, if a team id is configured and a
    /// bundle id is known.
    pub fn app_identity(&self, bundle_id: Option<&str>) -> Option<AppIdentity> {
        let team_id = self.team_id.as_deref()?;
        let bundle_id = bundle_id.or(self.default_bundle_id.as_deref())?;
        Some(AppIdentity::new(team_id, bundle_id))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("persistent_store", &self.store.is_persistent())
            .field("team_id", &self.team_id)
            .field("default_bundle_id", &self.default_bundle_id)
            .finish()
    }
}
