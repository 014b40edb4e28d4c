//! Bouncer Gateway - device-integrity edge filter
//!
//! Fronts the mobile API's sensitive auth endpoints and only forwards
//! requests from attested genuine clients. Protected requests either
//! receive a cryptographic challenge (HTTP 480) or have their signed
//! challenge response verified (Apple App Attest on iOS, Google Play
//! Integrity on Android) before being proxied upstream.
//!
//! This library exposes the gateway components for use in integration
//! tests; the binary wires the same pieces together.

pub mod config;
pub mod device_error;
pub mod error;
pub mod filter;
pub mod google;
pub mod localize;
pub mod nonce;
pub mod platform;
pub mod routes;
pub mod state;
pub mod store;
pub mod upstream;

pub use config::{Config, Environment};
pub use error::ApiError;
pub use filter::{attestation_filter, CHALLENGE_STATUS};
pub use platform::Platform;
pub use routes::create_router;
pub use state::GatewayState;
pub use store::{AttestationRecord, AttestationStore, StoreError};
pub use upstream::upstream_router;
