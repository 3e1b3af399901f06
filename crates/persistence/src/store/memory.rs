//! In-memory record store — ephemeral runs and test fixtures

use super::{RecordStore, VersionedRecord};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

/// Record store backed by a process-local map, with the same versioning
/// semantics as the durable backends.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, VersionedRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &str) -> StorageResult<Option<VersionedRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(key).cloned())
    }

    async fn put(
        &self,
        key: &str,
        payload: &str,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        let mut records = self.records.lock().unwrap();
        match (records.get(key), expected_version) {
            (None, None) => {
                records.insert(
                    key.to_string(),
                    VersionedRecord {
                        payload: payload.to_string(),
                        version: 1,
                    },
                );
                Ok(1)
            }
            (Some(current), Some(version)) if current.version == version => {
                let next = version + 1;
                records.insert(
                    key.to_string(),
                    VersionedRecord {
                        payload: payload.to_string(),
                        version: next,
                    },
                );
                Ok(next)
            }
            _ => Err(StorageError::Conflict),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.records.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_versioning_matches_sqlite_semantics() {
        let store = MemoryRecordStore::new();
        assert!(store.get("global").await.unwrap().is_none());

        assert_eq!(store.put("global", "a", None).await.unwrap(), 1);
        assert!(matches!(
            store.put("global", "b", None).await.unwrap_err(),
            StorageError::Conflict
        ));
        assert_eq!(store.put("global", "b", Some(1)).await.unwrap(), 2);
        assert!(matches!(
            store.put("global", "c", Some(1)).await.unwrap_err(),
            StorageError::Conflict
        ));

        let record = store.get("global").await.unwrap().unwrap();
        assert_eq!(record.payload, "b");
        assert_eq!(record.version, 2);
    }
}
