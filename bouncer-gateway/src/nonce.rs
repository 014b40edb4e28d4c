//! Request-nonce derivation.
//!
//! The device and the gateway independently canonicalize the protected
//! request and hash it together with the round-1 challenge; the resulting
//! nonce is what the client signs (iOS) or feeds to Play Integrity
//! (Android). Derivation never touches the live request; it builds its own
//! URL copy, so downstream filters see the request unmodified.

use axum::http::Uri;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::Environment;

/// Canonical form of the request URL: forced https scheme and the
/// per-environment host, with the original path and query.
pub fn canonical_url(uri: &Uri, environment: Environment) -> Result<Url, url::ParseError> {
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
    Url::parse(&format!(
        "https://{}{}",
        environment.canonical_host(),
        path_and_query
    ))
}

/// Derive the nonce binding a request to its session challenge.
///
/// `challenge` is the URL-safe base64 challenge string issued in round 1.
/// Hashes the body when present, the canonical URL otherwise:
///
/// ```text
/// inner = BASE64URL(SHA256(body | url))
/// outer = BASE64URL(SHA256(BASE64URL(challenge) || inner))
/// ```
pub fn compute_request_nonce(
    uri: &Uri,
    body: &[u8],
    challenge: &str,
    environment: Environment,
) -> Result<String, url::ParseError> {
    let url = canonical_url(uri, environment)?;

    let data_to_hash: &[u8] = if body.is_empty() {
        url.as_str().as_bytes()
    } else {
        body
    };

    let inner = URL_SAFE.encode(Sha256::digest(data_to_hash));
    let outer_input = format!("{}{}", URL_SAFE.encode(challenge.as_bytes()), inner);
    Ok(URL_SAFE.encode(Sha256::digest(outer_input.as_bytes())))
}
