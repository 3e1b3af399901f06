//! Favorite entity store — ordered, wallet-scoped, optimistic-retry writes
//!
//! Every mutation is read-modify-write against the latest persisted snapshot:
//! load the record with its version, recompute positions, write back with
//! compare-and-swap, and retry on a lost race. Two tabs adding concurrently
//! therefore never both land on the same position.

use crate::identity::resolve_key;
use crate::types::{DAppRecord, FavoriteEntry};
use chrono::Utc;
use persistence::{RecordStore, StorageError};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Write attempts before giving up on a contended namespace. Contention is a
/// same-user two-tabs situation, so a small budget is plenty.
const MAX_WRITE_ATTEMPTS: usize = 3;

#[derive(Error, Debug)]
pub enum FavoritesError {
    #[error("favorites storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("favorites were modified concurrently, try again")]
    ConcurrentModification,

    #[error("reorder ids do not match the current favorites")]
    InvalidReorder,

    #[error("stored favorites payload is corrupt: {0}")]
    Corrupt(String),
}

impl From<StorageError> for FavoritesError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Conflict => FavoritesError::ConcurrentModification,
            StorageError::Serialization(msg) => FavoritesError::Corrupt(msg),
            other => FavoritesError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Ordered favorites collection, namespaced by wallet identity
pub struct FavoritesStore {
    store: Arc<dyn RecordStore>,
}

impl FavoritesStore {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// List favorites in display order. An empty namespace is an empty list,
    /// never an error.
    pub async fn list(&self, address: Option<&str>) -> Result<Vec<FavoriteEntry>, FavoritesError> {
        let key = resolve_key(address);
        let (entries, _) = self.load(&key).await?;
        Ok(entries)
    }

    /// Add a dApp to the favorites. Idempotent: adding an already-saved dApp
    /// returns the collection unchanged.
    pub async fn add(
        &self,
        address: Option<&str>,
        dapp: DAppRecord,
    ) -> Result<Vec<FavoriteEntry>, FavoritesError> {
        let key = resolve_key(address);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut entries, version) = self.load(&key).await?;

            if entries.iter().any(|e| e.dapp_id == dapp.id) {
                debug!(key, dapp_id = %dapp.id, "Already favorited, no-op");
                return Ok(entries);
            }

            let next_position = entries.iter().map(|e| e.position).max().unwrap_or(0) + 1;
            entries.push(FavoriteEntry {
                dapp_id: dapp.id.clone(),
                dapp: dapp.clone(),
                position: next_position,
                added_at: Utc::now(),
            });

            match self.persist(&key, &entries, version).await {
                Ok(()) => {
                    info!(key, dapp_id = %dapp.id, position = next_position, "Favorite added");
                    sort_entries(&mut entries);
                    return Ok(entries);
                }
                Err(StorageError::Conflict) => {
                    debug!(key, attempt, "Add lost a write race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FavoritesError::ConcurrentModification)
    }

    /// Remove a favorite by dApp id. A missing id returns the collection
    /// unchanged without writing. Survivors are renumbered densely 1..N in
    /// their previous relative order.
    pub async fn remove(
        &self,
        address: Option<&str>,
        dapp_id: &str,
    ) -> Result<Vec<FavoriteEntry>, FavoritesError> {
        let key = resolve_key(address);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut entries, version) = self.load(&key).await?;

            let before = entries.len();
            entries.retain(|e| e.dapp_id != dapp_id);
            if entries.len() == before {
                debug!(key, dapp_id, "Not favorited, no-op");
                return Ok(entries);
            }

            renumber(&mut entries);

            match self.persist(&key, &entries, version).await {
                Ok(()) => {
                    info!(key, dapp_id, remaining = entries.len(), "Favorite removed");
                    return Ok(entries);
                }
                Err(StorageError::Conflict) => {
                    debug!(key, attempt, "Remove lost a write race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FavoritesError::ConcurrentModification)
    }

    /// Rewrite every position to match the supplied order. The supplied ids
    /// must be exactly the current set — partial or foreign ids are rejected
    /// with `InvalidReorder` and nothing is written.
    pub async fn reorder(
        &self,
        address: Option<&str>,
        order: &[String],
    ) -> Result<Vec<FavoriteEntry>, FavoritesError> {
        let key = resolve_key(address);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (entries, version) = self.load(&key).await?;

            let current: HashSet<&str> = entries.iter().map(|e| e.dapp_id.as_str()).collect();
            let supplied: HashSet<&str> = order.iter().map(String::as_str).collect();
            if supplied.len() != order.len() || supplied != current {
                return Err(FavoritesError::InvalidReorder);
            }

            let mut reordered: Vec<FavoriteEntry> = order
                .iter()
                .filter_map(|id| entries.iter().find(|e| &e.dapp_id == id).cloned())
                .collect();
            for (index, entry) in reordered.iter_mut().enumerate() {
                entry.position = index as i64 + 1;
            }

            match self.persist(&key, &reordered, version).await {
                Ok(()) => {
                    info!(key, count = reordered.len(), "Favorites reordered");
                    return Ok(reordered);
                }
                Err(StorageError::Conflict) => {
                    debug!(key, attempt, "Reorder lost a write race, re-reading");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(FavoritesError::ConcurrentModification)
    }

    /// Load and order the persisted collection, with the version to CAS
    /// against (`None` for a fresh namespace).
    async fn load(
        &self,
        key: &str,
    ) -> Result<(Vec<FavoriteEntry>, Option<i64>), FavoritesError> {
        let record = self.store.get(key).await.map_err(FavoritesError::from)?;

        match record {
            None => Ok((Vec::new(), None)),
            Some(record) => {
                let mut entries: Vec<FavoriteEntry> = serde_json::from_str(&record.payload)
                    .map_err(|e| FavoritesError::Corrupt(e.to_string()))?;
                sort_entries(&mut entries);
                Ok((entries, Some(record.version)))
            }
        }
    }

    async fn persist(
        &self,
        key: &str,
        entries: &[FavoriteEntry],
        expected_version: Option<i64>,
    ) -> Result<(), StorageError> {
        let payload = serde_json::to_string(entries)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.store.put(key, &payload, expected_version).await?;
        Ok(())
    }
}

/// Display order: ascending position, with a deterministic tie-break on
/// insertion time then id so colliding positions never flap between reads.
fn sort_entries(entries: &mut [FavoriteEntry]) {
    entries.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then(a.added_at.cmp(&b.added_at))
            .then(a.dapp_id.cmp(&b.dapp_id))
    });
}

/// Rewrite positions densely 1..N in current order to bound position growth
fn renumber(entries: &mut [FavoriteEntry]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.position = index as i64 + 1;
    }
}
