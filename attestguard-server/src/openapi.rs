//! OpenAPI documentation configuration
//!
//! Generates the OpenAPI 3 document for the AttestGuard API.

use utoipa::OpenApi;

use crate::handlers::{DeviceVerifyRequest, DeviceVerifyResponse, HealthResponse, ReadyResponse};

/// AttestGuard API - OpenAPI Documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "AttestGuard API",
        version = "0.1.0",
        description = r#"
## Device Attestation Verification API

AttestGuard checks that a request comes from a genuine device holding a
hardware-backed key.

### Flows

1. **Attestation**: on first contact the device sends an attestation object
   bound to a server challenge. The public key is stored for the key id.
2. **Assertion**: later requests carry a signed assertion. The signature is
   checked against the stored key and the counter must increase.
3. **Device check**: a legacy opaque token accepted with elevated risk.

Completed verifications return 200 with `verified`, `trustLevel` and
`riskScore` (0 best, 100 worst).
"#,
        license(name = "MIT OR Apache-2.0")
    ),
    servers(
        (url = "http://localhost:3000", description = "Local development server")
    ),
    tags(
        (name = "Verification", description = "Verify device attestations, assertions and tokens"),
        (name = "Health", description = "Service health and readiness endpoints")
    ),
    paths(
        crate::handlers::health::health,
        crate::handlers::health::ready,
        crate::handlers::verify::verify_device_handler,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            DeviceVerifyRequest,
            DeviceVerifyResponse,
        )
    )
)]
pub struct ApiDoc;
