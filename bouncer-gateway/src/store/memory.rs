//! In-memory session store.
//!
//! Development and test fallback; the production deployment points
//! `DATABASE_URL` at PostgreSQL. Expiry is enforced on read.

use chrono::Utc;
use dashmap::DashMap;

use super::AttestationRecord;

#[derive(Default)]
pub struct MemoryStore {
    records: DashMap<String, AttestationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, udid: &str) -> Option<AttestationRecord> {
        // Clone out before any removal; holding a shard guard across
        // remove() would deadlock.
        let record = self.records.get(udid).map(|entry| entry.value().clone())?;
        if record.is_expired(Utc::now()) {
            self.records.remove(udid);
            return None;
        }
        Some(record)
    }

    pub fn put(&self, record: AttestationRecord) {
        self.records.insert(record.udid.clone(), record);
    }

    /// Drop expired records; callable from a maintenance task.
    pub fn cleanup_expired(&self) {
        let now = Utc::now();
        self.records.retain(|_, record| !record.is_expired(now));
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.records.len())
            .finish()
    }
}
