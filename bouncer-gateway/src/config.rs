//! Gateway configuration.
//!
//! Loaded from environment variables with sensible defaults; everything a
//! request handler needs is resolved once here, never re-read per request.

use std::net::SocketAddr;

/// Deployment environment, selecting the canonical host used when deriving
/// request nonces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Dev,
    Local,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT").as_deref() {
            Ok("production") => Environment::Production,
            Ok("dev") => Environment::Dev,
            _ => Environment::Local,
        }
    }

    /// Host both client and server substitute into the request URL before
    /// hashing, so the nonce is stable across proxies.
    pub fn canonical_host(&self) -> &'static str {
        match self {
            Environment::Production => "api.muzzapi.com",
            Environment::Dev => "api.dev.muzzapi.com",
            Environment::Local => "localhost",
        }
    }
}

/// Gateway configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port (default: 3000)
    pub port: u16,
    /// Listen host (default: 127.0.0.1; "0.0.0.0" to expose)
    pub host: [u8; 4],
    /// Deployment environment (ENVIRONMENT: production | dev | other→local)
    pub environment: Environment,
    /// Upstream application requests are forwarded to (UPSTREAM_URL)
    pub upstream_url: Option<String>,
    /// Request timeout in seconds (default: 30)
    pub timeout_secs: u64,
    /// Whether Android requests go through attestation. Off at this
    /// release: Android clients are version-gated only.
    pub enforce_android_attestation: bool,
    /// Google service-account credentials JSON, from GOOGLE_CREDENTIALS_JSON
    /// (inline) or GOOGLE_APPLICATION_CREDENTIALS (file path).
    pub google_credentials_json: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            host: [127, 0, 0, 1],
            environment: Environment::Local,
            upstream_url: None,
            timeout_secs: 30,
            enforce_android_attestation: false,
            google_credentials_json: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let port = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3000);

        let host = std::env::var("HOST")
            .ok()
            .map(|h| {
                if h == "0.0.0.0" {
                    [0, 0, 0, 0]
                } else {
                    [127, 0, 0, 1]
                }
            })
            .unwrap_or([127, 0, 0, 1]);

        let timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let enforce_android_attestation = std::env::var("ENFORCE_ANDROID_ATTESTATION")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let google_credentials_json = std::env::var("GOOGLE_CREDENTIALS_JSON").ok().or_else(|| {
            let path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").ok()?;
            match std::fs::read_to_string(&path) {
                Ok(json) => Some(json),
                Err(e) => {
                    tracing::error!(path = %path, error = %e, "Cannot read Google credentials file");
                    None
                }
            }
        });

        Self {
            port,
            host,
            environment: Environment::from_env(),
            upstream_url: std::env::var("UPSTREAM_URL").ok(),
            timeout_secs,
            enforce_android_attestation,
            google_credentials_json,
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_hosts() {
        assert_eq!(Environment::Production.canonical_host(), "api.muzzapi.com");
        assert_eq!(Environment::Dev.canonical_host(), "api.dev.muzzapi.com");
        assert_eq!(Environment::Local.canonical_host(), "localhost");
    }

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.environment, Environment::Local);
        assert!(!config.enforce_android_attestation);
    }
}
