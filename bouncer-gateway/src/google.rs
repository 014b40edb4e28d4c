//! Google Play Integrity API client.
//!
//! Decodes opaque integrity tokens via
//! `POST /v1/{package}:decodeIntegrityToken`, authenticating with a
//! service-account OAuth2 flow: a short-lived RS256 JWT assertion is
//! exchanged for an access token, which is cached until shortly before
//! expiry. Credentials are parsed once at construction and never re-read.
//!
//! The [`IntegrityTokenDecoder`] trait is the seam the orchestrator calls
//! through; tests substitute a canned decoder.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bouncer_core::TokenPayload;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const OAUTH_SCOPE: &str = "https://www.googleapis.com/auth/playintegrity";
const PLAY_INTEGRITY_ENDPOINT: &str = "https://playintegrity.googleapis.com/v1";
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
/// Refresh the cached token this long before Google's stated expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum GoogleError {
    #[error("Invalid Google credentials: {0}")]
    Credentials(String),

    #[error("Cannot sign OAuth assertion: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Google API transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Google API returned {status}: {body}")]
    Api { status: u16, body: String },
}

/// Trait the orchestrator dispatches Android round-2 tokens through.
#[async_trait]
pub trait IntegrityTokenDecoder: Send + Sync {
    async fn decode(
        &self,
        package_name: &str,
        integrity_token: &str,
    ) -> Result<TokenPayload, GoogleError>;
}

#[derive(Debug, Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    #[serde(default = "default_token_uri")]
    token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".into()
}

#[derive(Serialize)]
struct OauthClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct OauthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DecodeRequest<'a> {
    integrity_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecodeResponse {
    #[serde(default)]
    token_payload_external: TokenPayload,
}

/// Play Integrity client backed by a Google service account.
pub struct GooglePlayClient {
    http: reqwest::Client,
    key: ServiceAccountKey,
    signing_key: EncodingKey,
    token: RwLock<Option<CachedToken>>,
}

impl GooglePlayClient {
    /// Build from the service-account credentials JSON.
    pub fn new(credentials_json: &str) -> Result<Self, GoogleError> {
        let key: ServiceAccountKey = serde_json::from_str(credentials_json)
            .map_err(|e| GoogleError::Credentials(e.to_string()))?;
        let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| GoogleError::Credentials(format!("bad private key: {e}")))?;

        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .expect("reqwest client");

        Ok(Self {
            http,
            key,
            signing_key,
            token: RwLock::new(None),
        })
    }

    /// Get a bearer token, minting a new one when the cache is cold or
    /// about to expire.
    async fn access_token(&self) -> Result<String, GoogleError> {
        {
            let cache = self.token.read().await;
            if let Some(ref cached) = *cache {
                if cached.expires_at > Instant::now() {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let mut cache = self.token.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(ref cached) = *cache {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_secs();
        let claims = OauthClaims {
            iss: &self.key.client_email,
            scope: OAUTH_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, "OAuth token exchange failed");
            return Err(GoogleError::Api { status, body });
        }

        let token: OauthTokenResponse = response.json().await?;
        let ttl = Duration::from_secs(token.expires_in.max(60));
        let access_token = token.access_token.clone();

        tracing::debug!(ttl_secs = ttl.as_secs(), "Refreshed Google access token");
        *cache = Some(CachedToken {
            access_token: token.access_token,
            expires_at: Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_MARGIN),
        });

        Ok(access_token)
    }
}

#[async_trait]
impl IntegrityTokenDecoder for GooglePlayClient {
    async fn decode(
        &self,
        package_name: &str,
        integrity_token: &str,
    ) -> Result<TokenPayload, GoogleError> {
        let bearer = self.access_token().await?;

        let url = format!("{PLAY_INTEGRITY_ENDPOINT}/{package_name}:decodeIntegrityToken");
        let response = self
            .http
            .post(&url)
            .bearer_auth(bearer)
            .json(&DecodeRequest { integrity_token })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status, package_name, "decodeIntegrityToken failed");
            return Err(GoogleError::Api { status, body });
        }

        let decoded: DecodeResponse = response.json().await?;
        Ok(decoded.token_payload_external)
    }
}

/// Decoder used when no Google credentials are configured; every Android
/// verification lands on the transport-failure path.
pub struct UnconfiguredDecoder;

#[async_trait]
impl IntegrityTokenDecoder for UnconfiguredDecoder {
    async fn decode(&self, _: &str, _: &str) -> Result<TokenPayload, GoogleError> {
        Err(GoogleError::Credentials(
            "Google credentials are not configured".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_credentials() {
        assert!(matches!(
            GooglePlayClient::new("not json"),
            Err(GoogleError::Credentials(_))
        ));
        assert!(matches!(
            GooglePlayClient::new(r#"{"client_email":"a@b","private_key":"nope"}"#),
            Err(GoogleError::Credentials(_))
        ));
    }

    #[test]
    fn decode_response_tolerates_missing_payload() {
        let decoded: DecodeResponse = serde_json::from_str("{}").unwrap();
        assert!(decoded
            .token_payload_external
            .app_integrity
            .app_recognition_verdict
            .is_empty());
    }

    #[test]
    fn decode_response_parses_google_shape() {
        let json = r#"{
            "tokenPayloadExternal": {
                "appIntegrity": {
                    "appRecognitionVerdict": "PLAY_RECOGNIZED",
                    "certificateSha256Digest": ["digest"],
                    "packageName": "com.muzmatch.muzmatchapp"
                },
                "deviceIntegrity": {
                    "deviceRecognitionVerdict": ["MEETS_DEVICE_INTEGRITY"]
                },
                "requestDetails": {
                    "requestPackageName": "com.muzmatch.muzmatchapp",
                    "nonce": "abc"
                }
            }
        }"#;
        let decoded: DecodeResponse = serde_json::from_str(json).unwrap();
        let payload = decoded.token_payload_external;
        assert_eq!(payload.request_details.nonce, "abc");
        assert_eq!(
            payload.device_integrity.device_recognition_verdict,
            vec!["MEETS_DEVICE_INTEGRITY"]
        );
    }

    #[tokio::test]
    async fn unconfigured_decoder_fails_closed() {
        let err = UnconfiguredDecoder.decode("pkg", "token").await.unwrap_err();
        assert!(matches!(err, GoogleError::Credentials(_)));
    }
}
