//! PostgreSQL session store.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;

use super::{record_ttl, AttestationRecord, StoreError};
use crate::platform::Platform;

pub struct PostgresStore {
    pool: PgPool,
}

#[derive(FromRow)]
struct RecordRow {
    udid: String,
    challenge: String,
    platform: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    headers: String,
    request_body: String,
    challenge_response: Option<String>,
    public_key: Option<String>,
    counter: i64,
    key_id: Option<String>,
    platform_success: bool,
    nonce_success: bool,
    device_error_code: Option<String>,
    google_response: Option<String>,
    muzz_error: Option<String>,
}

impl RecordRow {
    fn into_record(self) -> Result<AttestationRecord, StoreError> {
        let platform = Platform::from_str(&self.platform).ok_or_else(|| {
            StoreError::Query(format!("unknown platform in store: {}", self.platform))
        })?;
        Ok(AttestationRecord {
            udid: self.udid,
            challenge: self.challenge,
            platform,
            created_at: self.created_at,
            updated_at: self.updated_at,
            headers: self.headers,
            request_body: self.request_body,
            challenge_response: self.challenge_response,
            public_key: self.public_key,
            counter: self.counter as u32,
            key_id: self.key_id,
            platform_success: self.platform_success,
            nonce_success: self.nonce_success,
            device_error_code: self.device_error_code,
            google_response: self.google_response,
            muzz_error: self.muzz_error,
        })
    }
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tracing::info!("Connected to PostgreSQL session store");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        tracing::info!("Session store migrations completed");
        Ok(())
    }

    pub async fn get(&self, udid: &str) -> Result<Option<AttestationRecord>, StoreError> {
        let cutoff = Utc::now() - record_ttl();
        let row = sqlx::query_as::<_, RecordRow>(
            r#"
            SELECT udid, challenge, platform, created_at, updated_at,
                   headers, request_body, challenge_response, public_key,
                   counter, key_id, platform_success, nonce_success,
                   device_error_code, google_response, muzz_error
            FROM attestation_records
            WHERE udid = $1 AND updated_at > $2
            "#,
        )
        .bind(udid)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        row.map(RecordRow::into_record).transpose()
    }

    pub async fn create(&self, record: &AttestationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO attestation_records
                (udid, challenge, platform, created_at, updated_at,
                 headers, request_body, challenge_response, public_key,
                 counter, key_id, platform_success, nonce_success,
                 device_error_code, google_response, muzz_error)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (udid) DO UPDATE SET
                challenge = EXCLUDED.challenge,
                platform = EXCLUDED.platform,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at,
                headers = EXCLUDED.headers,
                request_body = EXCLUDED.request_body,
                challenge_response = EXCLUDED.challenge_response,
                public_key = EXCLUDED.public_key,
                counter = EXCLUDED.counter,
                key_id = EXCLUDED.key_id,
                platform_success = EXCLUDED.platform_success,
                nonce_success = EXCLUDED.nonce_success,
                device_error_code = EXCLUDED.device_error_code,
                google_response = EXCLUDED.google_response,
                muzz_error = EXCLUDED.muzz_error
            "#,
        )
        .bind(&record.udid)
        .bind(&record.challenge)
        .bind(record.platform.as_str())
        .bind(record.created_at)
        .bind(record.updated_at)
        .bind(&record.headers)
        .bind(&record.request_body)
        .bind(&record.challenge_response)
        .bind(&record.public_key)
        .bind(record.counter as i64)
        .bind(&record.key_id)
        .bind(record.platform_success)
        .bind(record.nonce_success)
        .bind(&record.device_error_code)
        .bind(&record.google_response)
        .bind(&record.muzz_error)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }

    pub async fn update(&self, record: &AttestationRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE attestation_records SET
                updated_at = $2,
                challenge_response = $3,
                public_key = $4,
                counter = $5,
                key_id = $6,
                platform_success = $7,
                nonce_success = $8,
                device_error_code = $9,
                google_response = $10,
                muzz_error = $11
            WHERE udid = $1
            "#,
        )
        .bind(&record.udid)
        .bind(record.updated_at)
        .bind(&record.challenge_response)
        .bind(&record.public_key)
        .bind(record.counter as i64)
        .bind(&record.key_id)
        .bind(record.platform_success)
        .bind(record.nonce_success)
        .bind(&record.device_error_code)
        .bind(&record.google_response)
        .bind(&record.muzz_error)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(())
    }
}
