//! Key-value cache on top of a document store

use crate::backend::DocumentBackend;
use crate::codec::ValueCodec;
use crate::config::CacheConfig;
use crate::elastic::ElasticBackend;
use crate::error::{CacheError, Result};
use crate::retry::with_retry;
use crate::types::{Entry, ScanPage, StoredDocument};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// `strftime` pattern of default timestamps, e.g. `2026-10-16 09:30:00 +0200`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";

/// Current local time rendered with [`TIMESTAMP_FORMAT`]
pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Persistent key-value cache
///
/// Every entry is one document in the configured index, addressed by its
/// key, with body `{value, timestamp}`. All backend calls except the
/// health probe run under the configured retry policy.
///
/// The store keeps no mutable state of its own; clones share the backend
/// and may be used concurrently. Concurrent writes to one key are
/// last-write-wins.
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn DocumentBackend>,
    config: Arc<CacheConfig>,
    codec: ValueCodec,
}

impl CacheStore {
    /// Create a store talking to the Elasticsearch endpoint in `config`
    ///
    /// # Example
    /// ```no_run
    /// # use persistent_cache::{CacheConfig, CacheStore};
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = CacheStore::new(CacheConfig::new("http://localhost:9200"))?;
    /// store.save("user:1", "John Doe", None).await?;
    /// let entry = store.lookup::<_, String>("user:1").await?;
    /// assert_eq!(entry.map(|e| e.value), Some("John Doe".to_string()));
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(config: CacheConfig) -> Result<Self> {
        let backend = ElasticBackend::new(&config)?;
        Self::with_backend(config, Arc::new(backend))
    }

    /// Create a store on an explicit backend
    pub fn with_backend(config: CacheConfig, backend: Arc<dyn DocumentBackend>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            codec: ValueCodec::new(config.encode_values),
            config: Arc::new(config),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get the value codec
    pub fn codec(&self) -> ValueCodec {
        self.codec
    }

    fn index(&self) -> &str {
        &self.config.index
    }

    async fn retry<T, F, Fut>(&self, operation: &str, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_retry(&self.config.retry, operation, op).await
    }

    /// Store `value` under `key`, replacing any previous entry
    ///
    /// `timestamp` defaults to [`now_timestamp`].
    #[instrument(skip_all, fields(index = %self.config.index, key = %key))]
    pub async fn save<K, V>(&self, key: K, value: V, timestamp: Option<&str>) -> Result<()>
    where
        K: Display,
        V: Serialize,
    {
        let id = document_id(&key)?;
        let doc = StoredDocument {
            value: self.codec.encode(&value)?,
            timestamp: timestamp.map_or_else(now_timestamp, str::to_owned),
        };

        match self.write(&id, &doc).await {
            Err(e) if e.is_not_found() => {}
            other => return other,
        }

        // The index is gone and the cluster does not create it on write.
        debug!("collection missing, creating it before writing again");
        self.ensure_collection().await?;
        match self.write(&id, &doc).await {
            Err(e) if e.is_not_found() => Err(CacheError::StorageUnavailable {
                attempts: 2,
                source: Box::new(e),
            }),
            other => other,
        }
    }

    async fn write(&self, id: &str, doc: &StoredDocument) -> Result<()> {
        let backend = self.backend.as_ref();
        let index = self.index();

        if backend.supports_upsert() {
            return self
                .retry("save", || async move { backend.upsert(index, id, doc).await })
                .await;
        }

        // Delete and create form one unit: a retry starts over with the delete.
        self.retry("save", || async move {
            match backend.delete(index, id).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            backend.create(index, id, doc).await
        })
        .await
    }

    /// Fetch the entry stored under `key`, `None` if absent
    #[instrument(skip_all, fields(index = %self.config.index, key = %key))]
    pub async fn lookup<K, V>(&self, key: K) -> Result<Option<Entry<V>>>
    where
        K: Display,
        V: DeserializeOwned,
    {
        let Some(doc) = self.fetch(&key).await? else {
            debug!("cache miss");
            return Ok(None);
        };

        Ok(Some(Entry {
            value: self.codec.decode(&doc.value)?,
            timestamp: doc.timestamp,
        }))
    }

    /// Whether an entry exists under `key`, without decoding it
    #[instrument(skip_all, fields(index = %self.config.index, key = %key))]
    pub async fn contains<K: Display>(&self, key: K) -> Result<bool> {
        Ok(self.fetch(&key).await?.is_some())
    }

    async fn fetch<K: Display>(&self, key: &K) -> Result<Option<StoredDocument>> {
        let id = document_id(key)?;
        let backend = self.backend.as_ref();
        let (index, id) = (self.index(), id.as_str());

        match self
            .retry("lookup", || async move { backend.get(index, id).await })
            .await
        {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove the entry under `key`; absent keys are not an error
    #[instrument(skip_all, fields(index = %self.config.index, key = %key))]
    pub async fn delete<K: Display>(&self, key: K) -> Result<()> {
        let id = document_id(&key)?;
        let backend = self.backend.as_ref();
        let (index, id) = (self.index(), id.as_str());

        match self
            .retry("delete", || async move { backend.delete(index, id).await })
            .await
        {
            Err(e) if e.is_not_found() => Ok(()),
            other => other,
        }
    }

    /// Number of entries in the collection
    #[instrument(skip_all, fields(index = %self.config.index))]
    pub async fn size(&self) -> Result<u64> {
        let backend = self.backend.as_ref();
        let index = self.index();

        match self
            .retry("size", || async move { backend.count(index).await })
            .await
        {
            Err(e) if e.is_not_found() => Ok(0),
            other => other,
        }
    }

    /// All keys, grouped by the scroll page they arrived in
    ///
    /// Each inner vector is one backend page. A failed page request is
    /// retried with the same cursor; the scan is never restarted.
    #[instrument(skip_all, fields(index = %self.config.index))]
    pub async fn keys(&self) -> Result<Vec<Vec<String>>> {
        let mut cursor = None;
        let result = self.scan(&mut cursor).await;

        if let Some(cursor) = cursor {
            if let Err(e) = self.backend.close_scan(&cursor).await {
                debug!(error = %e, "failed to release scroll cursor");
            }
        }

        result
    }

    /// All keys as one sequence
    #[instrument(skip_all, fields(index = %self.config.index))]
    pub async fn keys_flat(&self) -> Result<Vec<String>> {
        Ok(self.keys().await?.into_iter().flatten().collect())
    }

    async fn scan(&self, cursor: &mut Option<String>) -> Result<Vec<Vec<String>>> {
        let backend = self.backend.as_ref();
        let index = self.index();
        let page_size = self.config.scan_page_size;
        let keep_alive = self.config.scroll_keep_alive;

        let opened = self
            .retry("open_scan", || async move {
                backend.open_scan(index, page_size, keep_alive).await
            })
            .await;

        let mut page: ScanPage = match opened {
            Ok(page) => page,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut batches = Vec::new();
        loop {
            if let Some(next) = page.cursor.take() {
                *cursor = Some(next);
            }
            if page.is_empty() {
                break;
            }
            batches.push(page.ids);

            let Some(current) = cursor.as_deref() else {
                break;
            };
            page = self
                .retry("advance_scan", || async move {
                    backend.advance_scan(current, keep_alive).await
                })
                .await?;
        }

        Ok(batches)
    }

    /// Drop the collection and recreate it empty
    #[instrument(skip_all, fields(index = %self.config.index))]
    pub async fn clear(&self) -> Result<()> {
        let backend = self.backend.as_ref();
        let index = self.index();

        self.retry("clear", || async move {
            backend.drop_collection(index).await?;
            backend.create_collection(index).await
        })
        .await
    }

    /// Create the collection unless it already exists
    #[instrument(skip_all, fields(index = %self.config.index))]
    pub async fn ensure_collection(&self) -> Result<()> {
        let backend = self.backend.as_ref();
        let index = self.index();

        let result = self
            .retry("ensure_collection", || async move {
                if backend.collection_exists(index).await? {
                    return Ok(());
                }
                backend.create_collection(index).await
            })
            .await;

        match result {
            // created concurrently by someone else
            Err(CacheError::Conflict(_)) => Ok(()),
            other => other,
        }
    }

    /// Liveness probe; `false` only for a red or unreachable cluster
    pub async fn is_available(&self) -> bool {
        match self.backend.health().await {
            Ok(status) => status.is_available(),
            Err(e) => {
                warn!(error = %e, "health check failed");
                false
            }
        }
    }
}

fn document_id<K: Display>(key: &K) -> Result<String> {
    let id = key.to_string();
    if id.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".into()));
    }
    Ok(id)
}
