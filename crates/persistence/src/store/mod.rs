//! Record store backends
//!
//! One namespaced JSON blob per identity key, behind a single versioned
//! `get`/`put`/`delete` contract so the favorites logic never branches on
//! where the data actually lives.

pub mod fallback;
pub mod memory;
pub mod remote;
pub mod sqlite;

pub use fallback::FallbackRecordStore;
pub use memory::MemoryRecordStore;
pub use remote::RemoteRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::StorageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A stored payload together with the version observed at read time.
///
/// The version is opaque to callers; it only needs to be echoed back into
/// `put` to make the write conditional on the snapshot it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedRecord {
    pub payload: String,
    pub version: i64,
}

/// Versioned key-value contract shared by all backends.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch the record for a namespace. Absent namespace is `None`, not an
    /// error.
    async fn get(&self, key: &str) -> StorageResult<Option<VersionedRecord>>;

    /// Compare-and-swap write. `expected_version: None` creates the record
    /// and fails with `Conflict` if it already exists; `Some(v)` replaces the
    /// record only if its current version is still `v`. Returns the new
    /// version on success.
    async fn put(
        &self,
        key: &str,
        payload: &str,
        expected_version: Option<i64>,
    ) -> StorageResult<i64>;

    /// Delete the record for a namespace. Deleting an absent namespace is ok.
    async fn delete(&self, key: &str) -> StorageResult<()>;
}
