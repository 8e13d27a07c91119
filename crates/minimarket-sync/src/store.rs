//! # Document Store
//!
//! The cloud side of sync: a store of JSON documents grouped in
//! collections, written in atomic batches.
//!
//! ```text
//! ┌──────────────────────────┐        ┌──────────────────────────────────┐
//! │  OutboxProcessor         │ commit │  DocumentStore                   │
//! │  Vec<DocumentWrite> ≤ 500├───────►│  MemoryDocumentStore  (tests)    │
//! │                          │        │  HttpDocumentStore               │
//! └──────────────────────────┘        │    POST {endpoint}/batch         │
//!                                     └──────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::{SyncConfig, MAX_OPS_PER_BATCH};
use crate::error::{SyncError, SyncResult};

/// One document upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentWrite {
    /// Collection path, e.g. `stores/bodega-rosita/sales`.
    pub collection: String,
    pub document_id: String,
    pub data: serde_json::Value,
}

/// A document database that accepts atomic batches of upserts.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Commits every write or none. Batches larger than
    /// [`MAX_OPS_PER_BATCH`] are rejected.
    async fn commit(&self, writes: &[DocumentWrite]) -> SyncResult<()>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

fn ensure_batch_size(writes: &[DocumentWrite]) -> SyncResult<()> {
    if writes.len() > MAX_OPS_PER_BATCH {
        return Err(SyncError::BatchTooLarge {
            size: writes.len(),
            max: MAX_OPS_PER_BATCH,
        });
    }
    Ok(())
}

// =============================================================================
// In-memory store
// =============================================================================

/// Keeps documents in memory. Used in tests and when no endpoint is set.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<String, BTreeMap<String, serde_json::Value>>>>,
    commits: Arc<RwLock<Vec<usize>>>,
    failures: Arc<RwLock<Vec<SyncError>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next commits fail with these errors, in order.
    pub async fn fail_next(&self, errors: Vec<SyncError>) {
        let mut failures = self.failures.write().await;
        failures.extend(errors);
    }

    pub async fn get(&self, collection: &str, document_id: &str) -> Option<serde_json::Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(document_id))
            .cloned()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Size of each successful commit, in order.
    pub async fn commit_sizes(&self) -> Vec<usize> {
        self.commits.read().await.clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn commit(&self, writes: &[DocumentWrite]) -> SyncResult<()> {
        ensure_batch_size(writes)?;

        {
            let mut failures = self.failures.write().await;
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        let mut collections = self.collections.write().await;
        for write in writes {
            collections
                .entry(write.collection.clone())
                .or_default()
                .insert(write.document_id.clone(), write.data.clone());
        }
        self.commits.write().await.push(writes.len());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// HTTP store
// =============================================================================

#[derive(Serialize)]
struct BatchRequest<'a> {
    store_id: &'a str,
    device_id: &'a str,
    writes: &'a [DocumentWrite],
}

/// Talks to a JSON batch endpoint: `POST {endpoint}/batch` with
/// `{ store_id, device_id, writes: [...] }`. Any 2xx commits the batch.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    client: reqwest::Client,
    batch_url: url::Url,
    api_key: Option<String>,
    store_id: String,
    device_id: String,
    timeout_secs: u64,
}

impl HttpDocumentStore {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let endpoint = config
            .endpoint()
            .ok_or_else(|| SyncError::InvalidConfig("sync.endpoint is required".into()))?;

        let mut base = url::Url::parse(endpoint)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let batch_url = base.join("batch")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.sync.request_timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client: {}", e)))?;

        Ok(HttpDocumentStore {
            client,
            batch_url,
            api_key: config.sync.api_key.clone(),
            store_id: config.store_id().to_string(),
            device_id: config.device_id().to_string(),
            timeout_secs: config.sync.request_timeout_secs,
        })
    }

    pub fn batch_url(&self) -> &url::Url {
        &self.batch_url
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn commit(&self, writes: &[DocumentWrite]) -> SyncResult<()> {
        ensure_batch_size(writes)?;

        let body = BatchRequest {
            store_id: &self.store_id,
            device_id: &self.device_id,
            writes,
        };

        let mut request = self.client.post(self.batch_url.clone()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(url = %self.batch_url, writes = writes.len(), "Posting batch");

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SyncError::Timeout(self.timeout_secs)
            } else {
                SyncError::from(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response.text().await.unwrap_or_default();
        Err(SyncError::from_status(status.as_u16(), message))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write(id: &str) -> DocumentWrite {
        DocumentWrite {
            collection: "stores/s1/sales".to_string(),
            document_id: id.to_string(),
            data: json!({ "id": id }),
        }
    }

    #[tokio::test]
    async fn test_memory_store_commits_and_upserts() {
        let store = MemoryDocumentStore::new();
        store.commit(&[write("a"), write("b")]).await.unwrap();
        store.commit(&[write("a")]).await.unwrap();

        assert_eq!(store.count("stores/s1/sales").await, 2);
        assert_eq!(store.commit_sizes().await, vec![2, 1]);
        assert_eq!(store.get("stores/s1/sales", "a").await, Some(json!({ "id": "a" })));
    }

    #[tokio::test]
    async fn test_memory_store_rejects_oversized_batch() {
        let store = MemoryDocumentStore::new();
        let writes: Vec<_> = (0..501).map(|i| write(&i.to_string())).collect();
        let err = store.commit(&writes).await.unwrap_err();
        assert!(matches!(err, SyncError::BatchTooLarge { size: 501, max: 500 }));
        assert_eq!(store.count("stores/s1/sales").await, 0);
    }

    #[tokio::test]
    async fn test_injected_failure_is_all_or_nothing() {
        let store = MemoryDocumentStore::new();
        store
            .fail_next(vec![SyncError::ConnectionFailed("offline".into())])
            .await;

        assert!(store.commit(&[write("a")]).await.is_err());
        assert_eq!(store.count("stores/s1/sales").await, 0);
        store.commit(&[write("a")]).await.unwrap();
        assert_eq!(store.count("stores/s1/sales").await, 1);
    }

    #[test]
    fn test_http_store_batch_url() {
        let mut config = SyncConfig::default();
        config.sync.endpoint = Some("https://sync.example.com/v1".to_string());
        let store = HttpDocumentStore::new(&config).unwrap();
        assert_eq!(store.batch_url().as_str(), "https://sync.example.com/v1/batch");

        config.sync.endpoint = None;
        assert!(HttpDocumentStore::new(&config).is_err());
    }
}
