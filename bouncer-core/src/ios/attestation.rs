//! App Attest attestation verification.
//!
//! The client sends a ZLIB-compressed CBOR envelope (with the two-byte
//! stream header stripped) carrying an X.509 chain rooted at Apple's App
//! Attest CA. Verification follows Apple's published nine-step procedure:
//! certificate chain, challenge-bound nonce in a custom extension, key-ID
//! binding, RP-ID, counter, AAGUID, and credential-ID checks, in that
//! order, failing closed on the first violation.

use std::io::Read;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use flate2::read::ZlibDecoder;
use openssl::stack::Stack;
use openssl::x509::store::X509StoreBuilder;
use openssl::x509::{X509StoreContext, X509StoreContextRef, X509};
use serde::Deserialize;
use serde_bytes::ByteBuf;
use sha2::{Digest, Sha256};
use x509_parser::der_parser::ber::parse_ber_octetstring;
use x509_parser::der_parser::{oid, parse_der};
use x509_parser::prelude::{FromDer, X509Certificate};

use crate::authenticator::AuthenticatorData;
use crate::error::{IntegrityError, Result};
use crate::ios::rp_id_matches;

/// ZLIB stream header for compression level 5, which iOS omits.
const ZLIB_HEADER: [u8; 2] = [0x78, 0x5E];

const AAGUID_DEVELOPMENT: &[u8; 16] = b"appattestdevelop";
const AAGUID_PRODUCTION: &[u8; 16] = b"appattest\0\0\0\0\0\0\0";

#[derive(Debug, Deserialize)]
struct AttestationEnvelope {
    fmt: String,
    #[serde(rename = "attStmt")]
    att_stmt: AttestationStatement,
    #[serde(rename = "authData")]
    auth_data: ByteBuf,
}

#[derive(Debug, Deserialize)]
struct AttestationStatement {
    x5c: Vec<ByteBuf>,
    #[serde(default)]
    #[allow(dead_code)]
    receipt: ByteBuf,
}

/// The device key bound by a successful attestation.
#[derive(Debug, Clone)]
pub struct AttestedKey {
    /// Uncompressed SEC1 point (`0x04 || X || Y`) of the P-256 public key.
    /// Its SHA-256 equals the client-supplied key ID.
    pub public_key: Vec<u8>,
    /// Counter from the authenticator data; always 0 at attestation time.
    pub counter: u32,
}

/// Verifies App Attest attestations against a pinned root certificate.
///
/// Construct once with the Apple App Attest root CA PEM and reuse across
/// requests; tests substitute their own root.
pub struct AttestationVerifier {
    root_ca_pem: Vec<u8>,
}

impl AttestationVerifier {
    pub fn new(root_ca_pem: impl Into<Vec<u8>>) -> Self {
        Self {
            root_ca_pem: root_ca_pem.into(),
        }
    }

    /// Run the full attestation check.
    ///
    /// `encoded_attestation` is URL-safe base64, `challenge` the raw bytes
    /// the server issued in round 1, `encoded_key_id` standard base64.
    pub fn verify(
        &self,
        encoded_attestation: &str,
        challenge: &[u8],
        encoded_key_id: &str,
    ) -> Result<AttestedKey> {
        let compressed = URL_SAFE.decode(encoded_attestation).map_err(|e| {
            IntegrityError::Malformed(format!("attestation is not URL-safe base64: {e}"))
        })?;
        let key_id = STANDARD
            .decode(encoded_key_id)
            .map_err(|e| IntegrityError::Malformed(format!("key id is not base64: {e}")))?;

        let envelope = decode_envelope(&compressed)?;
        let auth_data = AuthenticatorData::parse(&envelope.auth_data)?;

        if envelope.fmt != "apple-appattest" {
            return Err(IntegrityError::Policy(format!(
                "attestation format is {:?}, not \"apple-appattest\"",
                envelope.fmt
            )));
        }
        if envelope.att_stmt.x5c.len() != 2 {
            return Err(IntegrityError::Policy(format!(
                "x5c must hold exactly two certificates, got {}",
                envelope.att_stmt.x5c.len()
            )));
        }

        let leaf_der = envelope.att_stmt.x5c[0].as_ref();
        self.verify_chain(leaf_der, envelope.att_stmt.x5c[1].as_ref())?;

        // expectedNonce = SHA256(authData || SHA256(challenge))
        let client_data_hash = Sha256::digest(challenge);
        let expected_nonce: [u8; 32] = {
            let mut hasher = Sha256::new();
            hasher.update(&envelope.auth_data);
            hasher.update(client_data_hash);
            hasher.finalize().into()
        };

        let (_, leaf) = X509Certificate::from_der(leaf_der).map_err(|e| {
            IntegrityError::Malformed(format!("cannot parse credential certificate: {e}"))
        })?;

        let cert_nonce = extract_nonce_extension(&leaf)?;
        if cert_nonce != expected_nonce {
            return Err(IntegrityError::Crypto(
                "credential certificate does not contain the expected nonce".into(),
            ));
        }

        // The raw BIT STRING of an EC SubjectPublicKeyInfo is the
        // uncompressed SEC1 point.
        let public_key = leaf.public_key().subject_public_key.data.to_vec();
        let key_hash: [u8; 32] = Sha256::digest(&public_key).into();
        if key_hash != key_id.as_slice() {
            return Err(IntegrityError::Crypto(
                "public key hash does not match the key identifier".into(),
            ));
        }

        if !rp_id_matches(&auth_data.rp_id_hash) {
            return Err(IntegrityError::Policy(
                "RP-ID hash does not match a known app ID".into(),
            ));
        }

        if auth_data.counter != 0 {
            return Err(IntegrityError::Policy(format!(
                "attestation counter must be 0, got {}",
                auth_data.counter
            )));
        }

        let attested = auth_data.attested_credential.as_ref().ok_or_else(|| {
            IntegrityError::Malformed("attestation carries no attested credential data".into())
        })?;

        if &attested.aaguid != AAGUID_DEVELOPMENT && &attested.aaguid != AAGUID_PRODUCTION {
            return Err(IntegrityError::Policy("unrecognised AAGUID".into()));
        }

        if attested.credential_id != key_id {
            return Err(IntegrityError::Policy(
                "credential id does not match the key identifier".into(),
            ));
        }

        Ok(AttestedKey {
            public_key,
            counter: auth_data.counter,
        })
    }

    fn verify_chain(&self, leaf_der: &[u8], intermediate_der: &[u8]) -> Result<()> {
        let root = X509::from_pem(&self.root_ca_pem)
            .map_err(|e| IntegrityError::Crypto(format!("cannot parse root certificate: {e}")))?;
        let leaf = X509::from_der(leaf_der)
            .map_err(|e| IntegrityError::Malformed(format!("cannot parse leaf certificate: {e}")))?;
        let intermediate = X509::from_der(intermediate_der).map_err(|e| {
            IntegrityError::Malformed(format!("cannot parse intermediate certificate: {e}"))
        })?;

        let mut store = X509StoreBuilder::new()
            .map_err(|e| IntegrityError::Crypto(format!("cannot build certificate store: {e}")))?;
        store
            .add_cert(root)
            .map_err(|e| IntegrityError::Crypto(format!("cannot pin root certificate: {e}")))?;
        let store = store.build();

        let mut chain = Stack::new()
            .map_err(|e| IntegrityError::Crypto(format!("cannot build certificate chain: {e}")))?;
        chain
            .push(intermediate)
            .map_err(|e| IntegrityError::Crypto(format!("cannot build certificate chain: {e}")))?;

        let mut context = X509StoreContext::new()
            .map_err(|e| IntegrityError::Crypto(format!("cannot create verify context: {e}")))?;
        let verified = context
            .init(&store, &leaf, &chain, X509StoreContextRef::verify_cert)
            .map_err(|e| IntegrityError::Crypto(format!("certificate verification errored: {e}")))?;

        if !verified {
            return Err(IntegrityError::Crypto(
                "certificate chain does not verify against the pinned root".into(),
            ));
        }
        Ok(())
    }
}

fn decode_envelope(compressed: &[u8]) -> Result<AttestationEnvelope> {
    // Restore the stream header the client strips before inflating.
    let mut stream = Vec::with_capacity(compressed.len() + ZLIB_HEADER.len());
    stream.extend_from_slice(&ZLIB_HEADER);
    stream.extend_from_slice(compressed);

    let mut cbor = Vec::new();
    ZlibDecoder::new(stream.as_slice())
        .read_to_end(&mut cbor)
        .map_err(|e| IntegrityError::Malformed(format!("attestation does not inflate: {e}")))?;

    ciborium::from_reader(cbor.as_slice())
        .map_err(|e| IntegrityError::Malformed(format!("attestation is not valid CBOR: {e}")))
}

/// Pull the 32-byte nonce out of the credential certificate's
/// `1.2.840.113635.100.8.2` extension, encoded as
/// `SEQUENCE { [1] EXPLICIT { OCTET STRING } }`.
fn extract_nonce_extension(cert: &X509Certificate<'_>) -> Result<Vec<u8>> {
    let nonce_oid = oid!(1.2.840 .113635 .100 .8 .2);
    let ext = cert
        .get_extension_unique(&nonce_oid)
        .map_err(|e| IntegrityError::Malformed(format!("duplicate nonce extension: {e}")))?
        .ok_or_else(|| {
            IntegrityError::Policy(
                "credential certificate is missing extension 1.2.840.113635.100.8.2".into(),
            )
        })?;

    let (_, obj) = parse_der(ext.value)
        .map_err(|e| IntegrityError::Malformed(format!("nonce extension is not DER: {e}")))?;
    let seq = obj
        .as_sequence()
        .map_err(|e| IntegrityError::Malformed(format!("nonce extension is not a sequence: {e}")))?;
    let tagged = seq.first().ok_or_else(|| {
        IntegrityError::Malformed("nonce extension sequence is empty".into())
    })?;
    let inner = tagged.as_slice().map_err(|e| {
        IntegrityError::Malformed(format!("nonce extension tag has no content: {e}"))
    })?;
    let (_, octets) = parse_ber_octetstring(inner).map_err(|e| {
        IntegrityError::Malformed(format!("nonce extension does not hold an octet string: {e}"))
    })?;
    let nonce = octets.as_slice().map_err(|e| {
        IntegrityError::Malformed(format!("nonce extension octet string is opaque: {e}"))
    })?;

    Ok(nonce.to_vec())
}
