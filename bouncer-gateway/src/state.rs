//! Shared gateway state.
//!
//! Everything the filter needs per request, constructed once at startup:
//! config, session store, the Apple verifier with its pinned root, the
//! Play Integrity decoder, and the localized message table.

use std::sync::Arc;

use bouncer_core::ios::APPLE_APP_ATTEST_ROOT_CA_PEM;
use bouncer_core::{AndroidPolicy, AttestationVerifier};

use crate::config::Config;
use crate::google::{GooglePlayClient, IntegrityTokenDecoder, UnconfiguredDecoder};
use crate::localize::UpgradeMessages;
use crate::store::{AttestationStore, StoreError};

pub struct GatewayState {
    pub config: Config,
    pub store: AttestationStore,
    pub apple: AttestationVerifier,
    pub google: Arc<dyn IntegrityTokenDecoder>,
    pub android_policy: AndroidPolicy,
    pub messages: UpgradeMessages,
}

impl GatewayState {
    /// Assemble production state: store per `DATABASE_URL`, Apple verifier
    /// pinned to the embedded root, Google client from the configured
    /// credentials.
    pub async fn from_env(config: Config) -> Result<Self, StoreError> {
        let store = AttestationStore::from_env().await?;

        let google: Arc<dyn IntegrityTokenDecoder> = match &config.google_credentials_json {
            Some(json) => match GooglePlayClient::new(json) {
                Ok(client) => Arc::new(client),
                Err(e) => {
                    tracing::error!(error = %e, "Google credentials rejected, Android attestation will fail closed");
                    Arc::new(UnconfiguredDecoder)
                }
            },
            None => {
                tracing::warn!("No Google credentials configured, Android attestation will fail closed");
                Arc::new(UnconfiguredDecoder)
            }
        };

        Ok(Self::new(config, store, google))
    }

    pub fn new(
        config: Config,
        store: AttestationStore,
        google: Arc<dyn IntegrityTokenDecoder>,
    ) -> Self {
        Self {
            config,
            store,
            apple: AttestationVerifier::new(APPLE_APP_ATTEST_ROOT_CA_PEM),
            google,
            android_policy: AndroidPolicy::default(),
            messages: UpgradeMessages::load(),
        }
    }

    /// Swap the pinned Apple root, for tests that sign with their own CA.
    pub fn with_apple_root(mut self, root_ca_pem: impl Into<Vec<u8>>) -> Self {
        self.apple = AttestationVerifier::new(root_ca_pem);
        self
    }
}
