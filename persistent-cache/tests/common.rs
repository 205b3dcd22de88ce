//! Common test utilities

use async_trait::async_trait;
use mockito::{Server, ServerGuard};
use parking_lot::Mutex;
use persistent_cache::{
    CacheConfig, CacheError, CacheStore, DocumentBackend, HealthStatus, MemoryBackend,
    RetryConfig, ScanPage, StoredDocument,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Retry policy without noticeable delays
#[allow(dead_code)] // Used by other test modules
pub fn fast_retry(max_attempts: usize) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

/// Setup a store pointing to a mock Elasticsearch server
#[allow(dead_code)] // Used by other test modules
pub async fn setup_test_store(
    configure: impl FnOnce(CacheConfig) -> CacheConfig,
) -> (CacheStore, ServerGuard) {
    let server = Server::new_async().await;
    let config = configure(
        CacheConfig::new(server.url())
            .with_index("cache")
            .with_timeout(Duration::from_secs(5))
            .with_retry(fast_retry(3)),
    );
    let store = CacheStore::new(config).unwrap();
    (store, server)
}

/// Setup a store on an in-memory backend
#[allow(dead_code)] // Used by other test modules
pub fn setup_memory_store(backend: Arc<dyn DocumentBackend>, encode: bool) -> CacheStore {
    let config = CacheConfig::default()
        .with_encoding(encode)
        .with_scan_page_size(2)
        .with_retry(fast_retry(3));
    CacheStore::with_backend(config, backend).unwrap()
}

/// Setup a store against a running cluster (requires ELASTICSEARCH_URL or localhost:9200)
#[allow(dead_code)] // Used by live test modules
pub fn setup_live_store(index: &str, encode: bool) -> CacheStore {
    let url = std::env::var("ELASTICSEARCH_URL")
        .unwrap_or_else(|_| "http://localhost:9200/".to_string());
    let config = CacheConfig::new(url)
        .with_index(index)
        .with_encoding(encode)
        .with_refresh_on_write(true)
        .with_timeout(Duration::from_secs(10));
    CacheStore::new(config).expect("Failed to create live store")
}

/// Backend operations that [`FlakyBackend`] can fail on purpose
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Upsert,
    Get,
    Delete,
    Count,
    OpenScan,
    AdvanceScan,
    DropCollection,
    CreateCollection,
}

/// Wraps a [`MemoryBackend`], counts calls and fails selected operations
/// a configured number of times, either with a retryable error or with
/// `NotFound` for the collection.
#[allow(dead_code)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    failures: Mutex<HashMap<Op, usize>>,
    missing: Mutex<HashMap<Op, usize>>,
    calls: Mutex<HashMap<Op, usize>>,
}

#[allow(dead_code)]
impl FlakyBackend {
    pub fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            failures: Mutex::new(HashMap::new()),
            missing: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Fail the next `times` calls of `op`
    pub fn fail(&self, op: Op, times: usize) {
        self.failures.lock().insert(op, times);
    }

    /// Answer the next `times` calls of `op` as if the collection did not exist
    pub fn missing(&self, op: Op, times: usize) {
        self.missing.lock().insert(op, times);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.calls.lock().get(&op).copied().unwrap_or(0)
    }

    fn enter(&self, op: Op) -> Result<(), CacheError> {
        *self.calls.lock().entry(op).or_insert(0) += 1;
        if let Some(left) = self.missing.lock().get_mut(&op).filter(|left| **left > 0) {
            *left -= 1;
            return Err(CacheError::NotFound(format!("collection missing in {op:?}")));
        }
        let mut failures = self.failures.lock();
        match failures.get_mut(&op) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(CacheError::Backend {
                    status: 503,
                    body: format!("injected failure in {op:?}"),
                })
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentBackend for FlakyBackend {
    async fn create(&self, c: &str, id: &str, doc: &StoredDocument) -> Result<(), CacheError> {
        self.enter(Op::Create)?;
        self.inner.create(c, id, doc).await
    }

    async fn upsert(&self, c: &str, id: &str, doc: &StoredDocument) -> Result<(), CacheError> {
        self.enter(Op::Upsert)?;
        self.inner.upsert(c, id, doc).await
    }

    fn supports_upsert(&self) -> bool {
        self.inner.supports_upsert()
    }

    async fn get(&self, c: &str, id: &str) -> Result<StoredDocument, CacheError> {
        self.enter(Op::Get)?;
        self.inner.get(c, id).await
    }

    async fn delete(&self, c: &str, id: &str) -> Result<(), CacheError> {
        self.enter(Op::Delete)?;
        self.inner.delete(c, id).await
    }

    async fn count(&self, c: &str) -> Result<u64, CacheError> {
        self.enter(Op::Count)?;
        self.inner.count(c).await
    }

    async fn open_scan(
        &self,
        c: &str,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScanPage, CacheError> {
        self.enter(Op::OpenScan)?;
        self.inner.open_scan(c, page_size, keep_alive).await
    }

    async fn advance_scan(&self, cursor: &str, keep_alive: Duration) -> Result<ScanPage, CacheError> {
        self.enter(Op::AdvanceScan)?;
        self.inner.advance_scan(cursor, keep_alive).await
    }

    async fn close_scan(&self, cursor: &str) -> Result<(), CacheError> {
        self.inner.close_scan(cursor).await
    }

    async fn drop_collection(&self, c: &str) -> Result<(), CacheError> {
        self.enter(Op::DropCollection)?;
        self.inner.drop_collection(c).await
    }

    async fn create_collection(&self, c: &str) -> Result<(), CacheError> {
        self.enter(Op::CreateCollection)?;
        self.inner.create_collection(c).await
    }

    async fn collection_exists(&self, c: &str) -> Result<bool, CacheError> {
        self.inner.collection_exists(c).await
    }

    async fn health(&self) -> Result<HealthStatus, CacheError> {
        self.inner.health().await
    }
}
