//! Fallback decorator — remote primary with a local read fallback
//!
//! Reads stay usable when the remote backend is unreachable by serving the
//! local copy; writes never pretend to succeed when the primary is down.

use super::{RecordStore, VersionedRecord};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct FallbackRecordStore {
    primary: Arc<dyn RecordStore>,
    secondary: Arc<dyn RecordStore>,
}

impl FallbackRecordStore {
    pub fn new(primary: Arc<dyn RecordStore>, secondary: Arc<dyn RecordStore>) -> Self {
        Self { primary, secondary }
    }

    /// Best-effort copy of a committed write into the secondary so offline
    /// reads stay reasonably fresh. Failures are logged, never surfaced.
    async fn mirror(&self, key: &str, payload: &str) {
        let current = match self.secondary.get(key).await {
            Ok(record) => record,
            Err(e) => {
                debug!(key, error = %e, "Skipping mirror write, secondary read failed");
                return;
            }
        };
        let expected = current.map(|r| r.version);
        if let Err(e) = self.secondary.put(key, payload, expected).await {
            debug!(key, error = %e, "Mirror write to secondary failed");
        }
    }
}

#[async_trait]
impl RecordStore for FallbackRecordStore {
    async fn get(&self, key: &str) -> StorageResult<Option<VersionedRecord>> {
        match self.primary.get(key).await {
            Ok(record) => Ok(record),
            Err(StorageError::Unavailable(reason)) => {
                warn!(key, %reason, "Remote store unreachable, reading local copy (may be stale)");
                self.secondary.get(key).await
            }
            Err(e) => Err(e),
        }
    }

    async fn put(
        &self,
        key: &str,
        payload: &str,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        // Writes go to the primary only: reporting a local-only write as a
        // success would silently fork the two copies.
        let version = self.primary.put(key, payload, expected_version).await?;
        self.mirror(key, payload).await;
        Ok(version)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.primary.delete(key).await?;
        if let Err(e) = self.secondary.delete(key).await {
            debug!(key, error = %e, "Mirror delete on secondary failed");
        }
        Ok(())
    }
}
