//! SQLite-backed record store — the local/offline backend

use super::{RecordStore, VersionedRecord};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use sqlx::SqlitePool;

/// Local record store over the `records` table.
///
/// CAS is done with `WHERE version = ?` + rows-affected; the PRIMARY KEY on
/// `namespace` turns a create/create race into a `Conflict` for the loser.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn get(&self, key: &str) -> StorageResult<Option<VersionedRecord>> {
        let row: Option<(String, i64)> =
            sqlx::query_as("SELECT payload, version FROM records WHERE namespace = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(payload, version)| VersionedRecord { payload, version }))
    }

    async fn put(
        &self,
        key: &str,
        payload: &str,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        match expected_version {
            None => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO records (namespace, payload, version, updated_at)
                    VALUES (?, ?, 1, strftime('%s', 'now'))
                    "#,
                )
                .bind(key)
                .bind(payload)
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => Ok(1),
                    Err(e) if e.to_string().contains("UNIQUE constraint failed") => {
                        Err(StorageError::Conflict)
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Some(version) => {
                let result = sqlx::query(
                    r#"
                    UPDATE records
                    SET payload = ?, version = version + 1, updated_at = strftime('%s', 'now')
                    WHERE namespace = ? AND version = ?
                    "#,
                )
                .bind(payload)
                .bind(key)
                .bind(version)
                .execute(&self.pool)
                .await?;

                if result.rows_affected() == 0 {
                    return Err(StorageError::Conflict);
                }
                Ok(version + 1)
            }
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM records WHERE namespace = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
