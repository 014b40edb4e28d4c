//! App Attest assertion verification.
//!
//! After attestation has bound a device key, each protected request carries
//! an assertion: a CBOR map `{signature, authenticatorData}` (not
//! ZLIB-compressed) signed by that key. The signed material is
//! `SHA256(authenticatorData || SHA256(clientData))`, where the client data
//! is the request-bound nonce both sides derive independently.

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use serde::Deserialize;
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};

use crate::authenticator::AuthenticatorData;
use crate::error::{IntegrityError, Result};
use crate::ios::rp_id_matches;

#[derive(Debug, Deserialize)]
struct AssertionEnvelope {
    signature: ByteBuf,
    #[serde(rename = "authenticatorData")]
    authenticator_data: ByteBuf,
}

/// Verify an assertion against the key and counter persisted at
/// attestation time.
///
/// `public_key_sec1` is the uncompressed SEC1 point stored by the
/// attestation check; `client_data` is the server-derived request nonce.
/// Returns the assertion's counter, which the caller must persist.
pub fn verify_assertion(
    encoded_assertion: &str,
    encoded_key_id: &str,
    public_key_sec1: &[u8],
    previous_counter: u32,
    client_data: &[u8],
) -> Result<u32> {
    let raw = URL_SAFE.decode(encoded_assertion).map_err(|e| {
        IntegrityError::Malformed(format!("assertion is not URL-safe base64: {e}"))
    })?;
    let key_id = STANDARD
        .decode(encoded_key_id)
        .map_err(|e| IntegrityError::Malformed(format!("key id is not base64: {e}")))?;

    let envelope: AssertionEnvelope = ciborium::from_reader(raw.as_slice())
        .map_err(|e| IntegrityError::Malformed(format!("assertion is not valid CBOR: {e}")))?;

    let auth_data = AuthenticatorData::parse(&envelope.authenticator_data)?;

    // The key the client claims to be using must be the one we stored.
    let key_hash: [u8; 32] = Sha256::digest(public_key_sec1).into();
    if key_hash != key_id.as_slice() {
        return Err(IntegrityError::Policy(
            "key id does not match the stored public key".into(),
        ));
    }

    let client_data_hash = Sha256::digest(client_data);
    let nonce: [u8; 32] = {
        let mut hasher = Sha256::new();
        hasher.update(&envelope.authenticator_data);
        hasher.update(client_data_hash);
        hasher.finalize().into()
    };

    let verifying_key = VerifyingKey::from_sec1_bytes(public_key_sec1)
        .map_err(|e| IntegrityError::Crypto(format!("stored public key is not P-256: {e}")))?;
    let signature = Signature::from_der(&envelope.signature)
        .map_err(|e| IntegrityError::Malformed(format!("signature is not DER ECDSA: {e}")))?;

    // The device signs SHA256(nonce); p256 hashes the message internally.
    verifying_key
        .verify(&nonce, &signature)
        .map_err(|_| IntegrityError::Crypto("assertion signature does not verify".into()))?;

    if !rp_id_matches(&auth_data.rp_id_hash) {
        return Err(IntegrityError::Policy(
            "RP-ID hash does not match a known app ID".into(),
        ));
    }

    if auth_data.counter <= previous_counter {
        return Err(IntegrityError::Policy(format!(
            "assertion counter {} is not greater than stored counter {}",
            auth_data.counter, previous_counter
        )));
    }

    Ok(auth_data.counter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ios::APP_IDS;
    use crate::testing::{build_assertion, build_attestation};

    const CHALLENGE: &[u8] = b"c3RvcmVkLWNoYWxsZW5nZQ==";
    const CLIENT_DATA: &[u8] = b"server-derived-request-nonce";

    #[test]
    fn valid_assertion_verifies_and_advances_counter() {
        let built = build_attestation(CHALLENGE, APP_IDS[0]);
        let assertion = build_assertion(APP_IDS[0], CLIENT_DATA, 0, &built.device_key);

        let counter = verify_assertion(
            &assertion,
            &built.encoded_key_id,
            &built.public_key_sec1,
            0,
            CLIENT_DATA,
        )
        .unwrap();
        assert_eq!(counter, 1);
    }

    #[test]
    fn stale_counter_is_rejected() {
        let built = build_attestation(CHALLENGE, APP_IDS[0]);
        let assertion = build_assertion(APP_IDS[0], CLIENT_DATA, 4, &built.device_key);

        // Assertion carries counter 5; stored counter has already moved on.
        let err = verify_assertion(
            &assertion,
            &built.encoded_key_id,
            &built.public_key_sec1,
            5,
            CLIENT_DATA,
        )
        .unwrap_err();
        assert!(err.to_string().contains("counter"));
    }

    #[test]
    fn tampered_client_data_fails_signature() {
        let built = build_attestation(CHALLENGE, APP_IDS[0]);
        let assertion = build_assertion(APP_IDS[0], CLIENT_DATA, 0, &built.device_key);

        let err = verify_assertion(
            &assertion,
            &built.encoded_key_id,
            &built.public_key_sec1,
            0,
            b"a different request body",
        )
        .unwrap_err();
        assert!(err.to_string().contains("signature"));
    }

    #[test]
    fn wrong_device_key_fails() {
        let built = build_attestation(CHALLENGE, APP_IDS[0]);
        let other = build_attestation(CHALLENGE, APP_IDS[0]);
        let assertion = build_assertion(APP_IDS[0], CLIENT_DATA, 0, &other.device_key);

        assert!(verify_assertion(
            &assertion,
            &built.encoded_key_id,
            &built.public_key_sec1,
            0,
            CLIENT_DATA,
        )
        .is_err());
    }

    #[test]
    fn key_id_mismatch_is_rejected() {
        let built = build_attestation(CHALLENGE, APP_IDS[0]);
        let other = build_attestation(CHALLENGE, APP_IDS[0]);
        let assertion = build_assertion(APP_IDS[0], CLIENT_DATA, 0, &built.device_key);

        let err = verify_assertion(
            &assertion,
            &other.encoded_key_id,
            &built.public_key_sec1,
            0,
            CLIENT_DATA,
        )
        .unwrap_err();
        assert!(err.to_string().contains("key id"));
    }

    #[test]
    fn garbage_assertion_is_malformed() {
        let built = build_attestation(CHALLENGE, APP_IDS[0]);
        let err = verify_assertion(
            &URL_SAFE.encode(b"not cbor"),
            &built.encoded_key_id,
            &built.public_key_sec1,
            0,
            CLIENT_DATA,
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedInput);
    }
}
