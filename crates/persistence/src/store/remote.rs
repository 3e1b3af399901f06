//! Remote record API client — per-user key-value persistence over HTTP
//!
//! Minimal REST contract: `GET/PUT/DELETE {base}/records/{key}`, api key in
//! the `x-api-key` header, record version carried in the JSON body. 404 means
//! "no record yet", 409 means a lost CAS race; anything network-shaped is
//! `Unavailable`.

use super::{RecordStore, VersionedRecord};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RemoteRecordBody {
    payload: String,
    version: i64,
}

#[derive(Debug, Serialize)]
struct RemotePutBody<'a> {
    payload: &'a str,
    expected_version: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RemotePutResponse {
    version: i64,
}

/// Client for the remote record API
#[derive(Clone)]
pub struct RemoteRecordStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl RemoteRecordStore {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn record_url(&self, key: &str) -> String {
        format!("{}/records/{}", self.base_url, key)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => builder.header("x-api-key", api_key),
            None => builder,
        }
    }
}

#[async_trait]
impl RecordStore for RemoteRecordStore {
    async fn get(&self, key: &str) -> StorageResult<Option<VersionedRecord>> {
        let url = self.record_url(key);
        debug!(key, "Fetching remote record");

        let resp = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Unavailable(format!(
                "record API error {status}: {body}"
            )));
        }

        let body: RemoteRecordBody = resp
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(VersionedRecord {
            payload: body.payload,
            version: body.version,
        }))
    }

    async fn put(
        &self,
        key: &str,
        payload: &str,
        expected_version: Option<i64>,
    ) -> StorageResult<i64> {
        let url = self.record_url(key);
        debug!(key, ?expected_version, "Writing remote record");

        let resp = self
            .request(self.client.put(&url))
            .json(&RemotePutBody {
                payload,
                expected_version,
            })
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        if resp.status() == StatusCode::CONFLICT {
            return Err(StorageError::Conflict);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StorageError::Unavailable(format!(
                "record API error {status}: {body}"
            )));
        }

        let body: RemotePutResponse = resp
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(body.version)
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let url = self.record_url(key);
        debug!(key, "Deleting remote record");

        let resp = self
            .request(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        // Deleting an absent record is fine
        if resp.status() == StatusCode::NOT_FOUND || resp.status().is_success() {
            return Ok(());
        }

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        Err(StorageError::Unavailable(format!(
            "record API error {status}: {body}"
        )))
    }
}
