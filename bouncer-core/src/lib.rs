//! Bouncer Core - device-integrity attestation verification
//!
//! This crate owns the cryptographic half of the integrity gateway: parsing
//! and checking Apple App Attest attestations and assertions, and evaluating
//! Google Play Integrity verdicts. It performs no I/O beyond what the
//! caller hands it. The gateway supplies challenges, decoded tokens, and a
//! pinned root certificate, and projects the results into its session
//! records.
//!
//! # Example
//!
//! ```no_run
//! use bouncer_core::ios::attestation::AttestationVerifier;
//! use bouncer_core::ios::APPLE_APP_ATTEST_ROOT_CA_PEM;
//!
//! # fn example(encoded_attestation: &str, challenge: &[u8], key_id: &str)
//! #     -> bouncer_core::Result<()> {
//! let verifier = AttestationVerifier::new(APPLE_APP_ATTEST_ROOT_CA_PEM);
//! let attested = verifier.verify(encoded_attestation, challenge, key_id)?;
//! // Persist attested.public_key and attested.counter for the assertion
//! // rounds that follow.
//! # Ok(())
//! # }
//! ```

pub mod android;
pub mod authenticator;
pub mod error;
pub mod ios;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use android::{evaluate, AndroidOutcome, AndroidPolicy, AndroidVerdict, TokenPayload};
pub use authenticator::{AttestedCredentialData, AuthenticatorData};
pub use error::{ErrorKind, IntegrityError, Result};
pub use ios::assertion::verify_assertion;
pub use ios::attestation::{AttestationVerifier, AttestedKey};
