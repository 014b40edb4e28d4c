//! Attestation session store.
//!
//! One record per device UDID carries the protocol state across the two
//! challenge-response rounds, plus verdict diagnostics for offline
//! analysis. Backed by PostgreSQL when `DATABASE_URL` is set, otherwise an
//! in-memory map (development and tests).
//!
//! Records expire [`RECORD_TTL_MINUTES`] minutes after their last write; an expired record
//! is treated as absent, which makes the gateway issue a fresh challenge.

mod memory;
mod postgres;

use chrono::{DateTime, Duration, Utc};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::platform::Platform;

/// How long an untouched record stays live, in minutes. A device that
/// never completes round 2 re-enters the protocol from scratch after this.
pub const RECORD_TTL_MINUTES: i64 = 10;

pub(crate) fn record_ttl() -> Duration {
    Duration::minutes(RECORD_TTL_MINUTES)
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database connection error: {0}")]
    Connection(String),

    #[error("Database migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(String),
}

/// Per-device protocol state, keyed by UDID.
#[derive(Debug, Clone)]
pub struct AttestationRecord {
    pub udid: String,
    /// URL-safe base64 of the 128 random challenge bytes. Immutable after
    /// create.
    pub challenge: String,
    pub platform: Platform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Diagnostic snapshot of the round-1 request.
    pub headers: String,
    pub request_body: String,
    /// Round-2 token as received, before any validation.
    pub challenge_response: Option<String>,
    /// Standard base64 of the attested SEC1 public key; written once by the
    /// first successful attestation, input to every later assertion.
    pub public_key: Option<String>,
    pub counter: u32,
    pub key_id: Option<String>,
    pub platform_success: bool,
    pub nonce_success: bool,
    /// Set only when the client self-reports an SDK error.
    pub device_error_code: Option<String>,
    pub google_response: Option<String>,
    pub muzz_error: Option<String>,
}

impl AttestationRecord {
    pub fn new(
        udid: impl Into<String>,
        challenge: impl Into<String>,
        platform: Platform,
        headers: impl Into<String>,
        request_body: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            udid: udid.into(),
            challenge: challenge.into(),
            platform,
            created_at: now,
            updated_at: now,
            headers: headers.into(),
            request_body: request_body.into(),
            challenge_response: None,
            public_key: None,
            counter: 0,
            key_id: None,
            platform_success: false,
            nonce_success: false,
            device_error_code: None,
            google_response: None,
            muzz_error: None,
        }
    }

    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.updated_at > record_ttl()
    }
}

enum Backend {
    Memory(MemoryStore),
    Postgres(PostgresStore),
}

/// Unified session store over the configured backend.
pub struct AttestationStore {
    backend: Backend,
}

impl AttestationStore {
    /// In-memory store; state is lost on restart.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(MemoryStore::new()),
        }
    }

    pub async fn with_postgres(database_url: &str) -> Result<Self, StoreError> {
        let store = PostgresStore::new(database_url).await?;
        store.migrate().await?;
        Ok(Self {
            backend: Backend::Postgres(store),
        })
    }

    /// PostgreSQL if `DATABASE_URL` is set, in-memory otherwise.
    pub async fn from_env() -> Result<Self, StoreError> {
        match std::env::var("DATABASE_URL") {
            Ok(url) if !url.is_empty() => {
                tracing::info!("Using PostgreSQL session store");
                Self::with_postgres(&url).await
            }
            _ => {
                tracing::warn!("DATABASE_URL not set, session records will not survive restarts");
                Ok(Self::in_memory())
            }
        }
    }

    /// Fetch the live record for a device. Absent or expired → `None`.
    pub async fn get(&self, udid: &str) -> Result<Option<AttestationRecord>, StoreError> {
        match &self.backend {
            Backend::Memory(store) => Ok(store.get(udid)),
            Backend::Postgres(store) => store.get(udid).await,
        }
    }

    /// Insert a fresh record, overwriting any prior state for the UDID.
    pub async fn create(&self, record: AttestationRecord) -> Result<(), StoreError> {
        match &self.backend {
            Backend::Memory(store) => {
                store.put(record);
                Ok(())
            }
            Backend::Postgres(store) => store.create(&record).await,
        }
    }

    /// Write back a mutated record, bumping `updated_at`.
    pub async fn update(&self, record: &mut AttestationRecord) -> Result<(), StoreError> {
        record.updated_at = Utc::now();
        match &self.backend {
            Backend::Memory(store) => {
                store.put(record.clone());
                Ok(())
            }
            Backend::Postgres(store) => store.update(record).await,
        }
    }
}

impl std::fmt::Debug for AttestationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Memory(_) => "Memory",
            Backend::Postgres(_) => "PostgreSQL",
        };
        f.debug_struct("AttestationStore")
            .field("backend", &backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_update_round_trip() {
        let store = AttestationStore::in_memory();
        let record = AttestationRecord::new("udid-1", "challenge", Platform::Ios, "", "");
        store.create(record).await.unwrap();

        let mut fetched = store.get("udid-1").await.unwrap().unwrap();
        assert_eq!(fetched.platform, Platform::Ios);
        assert_eq!(fetched.counter, 0);

        fetched.counter = 3;
        fetched.platform_success = true;
        store.update(&mut fetched).await.unwrap();

        let again = store.get("udid-1").await.unwrap().unwrap();
        assert_eq!(again.counter, 3);
        assert!(again.platform_success);
        assert!(again.updated_at >= again.created_at);
    }

    #[tokio::test]
    async fn absent_udid_yields_none() {
        let store = AttestationStore::in_memory();
        assert!(store.get("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_overwrites_prior_record() {
        let store = AttestationStore::in_memory();
        store
            .create(AttestationRecord::new("u", "first", Platform::Ios, "", ""))
            .await
            .unwrap();
        store
            .create(AttestationRecord::new("u", "second", Platform::Android, "", ""))
            .await
            .unwrap();

        let record = store.get("u").await.unwrap().unwrap();
        assert_eq!(record.challenge, "second");
        assert_eq!(record.platform, Platform::Android);
    }

    #[tokio::test]
    async fn expired_record_is_treated_as_absent() {
        let store = AttestationStore::in_memory();
        let mut record = AttestationRecord::new("u", "c", Platform::Ios, "", "");
        record.updated_at = Utc::now() - record_ttl() - Duration::seconds(1);
        store.create(record).await.unwrap();

        assert!(store.get("u").await.unwrap().is_none());
    }
}
