//! AttestGuard Server Library - REST API components for device verification
//!
//! This library exposes the server components for use in integration tests.
//! The main binary uses these same components.

pub mod config;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use handlers::{DeviceVerifyRequest, DeviceVerifyResponse};
pub use openapi::ApiDoc;
pub use routes::{create_router, create_router_with_state};
pub use state::AppState;
pub use store::{DeviceRecordStore, DeviceUpdate, MemoryDeviceStore, PostgresDeviceStore, StoreError};
