//! Apple App Attest verification.
//!
//! Two protocols over the same device key: the one-time attestation
//! ([`attestation::AttestationVerifier`]) that binds a fresh P-256 key to a
//! server challenge via Apple's certificate chain, and the per-request
//! assertion ([`assertion::verify_assertion`]) proving the same key is still
//! present.

pub mod assertion;
pub mod attestation;

use sha2::{Digest, Sha256};

/// Apple's public App Attest root CA; every attestation chain must
/// terminate here.
pub const APPLE_APP_ATTEST_ROOT_CA_PEM: &[u8] =
    include_bytes!("apple_app_attestation_root_ca.pem");

/// Fully-qualified App IDs (team ID + bundle ID) accepted as the relying
/// party. The RP-ID hash in authenticator data must be the SHA-256 of one
/// of these.
pub const APP_IDS: [&str; 2] = [
    "5MRWH833JE.com.muzmatch.muzmatch",
    "5MRWH833JE.com.muzmatch.muzmatch.alpha",
];

pub(crate) fn rp_id_matches(rp_id_hash: &[u8; 32]) -> bool {
    APP_IDS.iter().any(|app_id| {
        let digest: [u8; 32] = Sha256::digest(app_id.as_bytes()).into();
        digest == *rp_id_hash
    })
}
