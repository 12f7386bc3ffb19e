//! In-memory device record store

use async_trait::async_trait;
use attestguard_core::DeviceRecord;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{DeviceRecordStore, DeviceUpdate, StoreError};

/// DashMap-backed store. The entry lock covers the version compare and the write.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    records: DashMap<String, DeviceRecord>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        tracing::warn!("Using in-memory device storage - records will be lost on restart!");
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl DeviceRecordStore for MemoryDeviceStore {
    async fn get(&self, key_id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self.records.get(key_id).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, update: DeviceUpdate) -> Result<DeviceRecord, StoreError> {
        let conflict = update.conflict();
        let DeviceUpdate {
            record,
            expected_version,
        } = update;

        match (self.records.entry(record.key_id.clone()), expected_version) {
            (Entry::Occupied(mut entry), Some(expected)) if entry.get().version == expected => {
                entry.insert(record.clone());
                Ok(record)
            }
            (Entry::Vacant(entry), None) => {
                entry.insert(record.clone());
                Ok(record)
            }
            _ => Err(conflict),
        }
    }

    async fn check_health(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use attestguard_core::{AttestError, Condition, VerificationKind, VerificationResult};
    use chrono::Utc;

    fn record(key_id: &str, previous: Option<&DeviceRecord>, counter: u32) -> DeviceRecord {
        let result = VerificationResult::success(5, "Assertion verified").with_counter(counter);
        DeviceRecord::apply(previous, key_id, VerificationKind::Assertion, &result, Utc::now())
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let store = MemoryDeviceStore::new();
        assert!(store.get("k").await.unwrap().is_none());

        let first = record("k", None, 1);
        let saved = store.upsert(DeviceUpdate::new(first.clone(), None)).await.unwrap();
        assert_eq!(saved, first);
        assert_eq!(store.get("k").await.unwrap(), Some(first));
        assert_eq!(store.len(), 1);
        assert!(!store.is_persistent());
    }

    #[tokio::test]
    async fn test_update_requires_matching_version() {
        let store = MemoryDeviceStore::new();
        let first = record("k", None, 1);
        store.upsert(DeviceUpdate::new(first.clone(), None)).await.unwrap();

        let second = record("k", Some(&first), 2);
        store.upsert(DeviceUpdate::new(second.clone(), Some(&first))).await.unwrap();

        // Derived from the stale first record
        let stale = record("k", Some(&first), 2);
        let err = store.upsert(DeviceUpdate::new(stale, Some(&first))).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::VersionConflict { expected: Some(1), .. }
        ));
        assert_eq!(store.get("k").await.unwrap().unwrap().assertion_counter, 2);
    }

    #[tokio::test]
    async fn test_attestation_and_assertion_from_same_snapshot_conflict() {
        let store = MemoryDeviceStore::new();
        let now = Utc::now();
        let unsigned = VerificationResult::success(20, "Assertion accepted without signature verification")
            .with_counter(10)
            .with_condition(Condition::SignatureNotVerified);
        let base = DeviceRecord::apply(None, "k", VerificationKind::Assertion, &unsigned, now);
        store.upsert(DeviceUpdate::new(base.clone(), None)).await.unwrap();

        let attested = VerificationResult::success(10, "Attestation verified").with_public_key("S0VZ");
        let attestation = DeviceRecord::apply(Some(&base), "k", VerificationKind::Attestation, &attested, now);
        let assertion = record("k", Some(&base), 11);

        store.upsert(DeviceUpdate::new(attestation, Some(&base))).await.unwrap();
        let err = store.upsert(DeviceUpdate::new(assertion, Some(&base))).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: Some(1), .. }));

        let stored = store.get("k").await.unwrap().unwrap();
        assert_eq!(stored.public_key_base64.as_deref(), Some("S0VZ"));
        assert!(stored.attestation_verified);
        assert_eq!(stored.verification_count, 2);
        assert_eq!(stored.version, 2);

        // A retry from the fresh record keeps the attested key
        let retried = record("k", Some(&stored), 11);
        let saved = store.upsert(DeviceUpdate::new(retried, Some(&stored))).await.unwrap();
        assert_eq!(saved.public_key_base64.as_deref(), Some("S0VZ"));
        assert_eq!(saved.assertion_counter, 11);
        assert_eq!(saved.verification_count, 3);
    }

    #[tokio::test]
    async fn test_non_counter_writes_conflict() {
        let store = MemoryDeviceStore::new();
        let base = record("k", None, 4);
        store.upsert(DeviceUpdate::new(base.clone(), None)).await.unwrap();

        // Two replay rejections leave the counter at 4
        let replay = VerificationResult::failure(&AttestError::Replay { observed: 4, stored: 4 }).with_counter(4);
        let first = DeviceRecord::apply(Some(&base), "k", VerificationKind::Assertion, &replay, Utc::now());
        let second = first.clone();
        store.upsert(DeviceUpdate::new(first, Some(&base))).await.unwrap();
        assert!(store.upsert(DeviceUpdate::new(second, Some(&base))).await.is_err());
        assert_eq!(store.get("k").await.unwrap().unwrap().verification_count, 2);
    }

    #[tokio::test]
    async fn test_second_create_conflicts() {
        let store = MemoryDeviceStore::new();
        store.upsert(DeviceUpdate::new(record("k", None, 1), None)).await.unwrap();
        let err = store.upsert(DeviceUpdate::new(record("k", None, 1), None)).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: None, .. }));
    }

    #[tokio::test]
    async fn test_update_of_missing_record_conflicts() {
        let store = MemoryDeviceStore::new();
        let phantom = record("k", None, 1);
        let next = record("k", Some(&phantom), 2);
        let err = store.upsert(DeviceUpdate::new(next, Some(&phantom))).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers_single_winner() {
        let store = Arc::new(MemoryDeviceStore::new());
        let base = record("k", None, 1);
        store.upsert(DeviceUpdate::new(base.clone(), None)).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let base = base.clone();
            handles.push(tokio::spawn(async move {
                let next = record("k", Some(&base), 2);
                store.upsert(DeviceUpdate::new(next, Some(&base))).await.is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.get("k").await.unwrap().unwrap().verification_count, 2);
    }
}
