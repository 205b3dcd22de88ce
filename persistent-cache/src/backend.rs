//! Document store protocol consumed by [`crate::CacheStore`]

use crate::error::Result;
use crate::types::{HealthStatus, ScanPage, StoredDocument};
use async_trait::async_trait;
use std::time::Duration;

/// Operations the cache needs from a document store.
///
/// Implementations report absence with [`crate::CacheError::NotFound`] and
/// an existing id on `create` with [`crate::CacheError::Conflict`]; the
/// store relies on that distinction.
#[async_trait]
pub trait DocumentBackend: Send + Sync + 'static {
    /// Create a document; fails with `Conflict` if the id exists.
    async fn create(&self, collection: &str, id: &str, doc: &StoredDocument) -> Result<()>;

    /// Create or replace a document in one call.
    ///
    /// Only called when [`DocumentBackend::supports_upsert`] is true.
    async fn upsert(&self, collection: &str, id: &str, doc: &StoredDocument) -> Result<()> {
        let _ = (collection, id, doc);
        Err(crate::CacheError::Config(
            "backend does not support upsert".into(),
        ))
    }

    /// Whether [`DocumentBackend::upsert`] is implemented.
    fn supports_upsert(&self) -> bool {
        false
    }

    async fn get(&self, collection: &str, id: &str) -> Result<StoredDocument>;

    async fn delete(&self, collection: &str, id: &str) -> Result<()>;

    async fn count(&self, collection: &str) -> Result<u64>;

    /// Open a scroll cursor and return it with the first page.
    async fn open_scan(
        &self,
        collection: &str,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScanPage>;

    /// Fetch the page after `cursor`. An empty page ends the scan.
    async fn advance_scan(&self, cursor: &str, keep_alive: Duration) -> Result<ScanPage>;

    /// Release a cursor before it expires.
    async fn close_scan(&self, cursor: &str) -> Result<()> {
        let _ = cursor;
        Ok(())
    }

    /// Drop the collection; a missing collection is not an error.
    async fn drop_collection(&self, collection: &str) -> Result<()>;

    async fn create_collection(&self, collection: &str) -> Result<()>;

    async fn collection_exists(&self, collection: &str) -> Result<bool>;

    async fn health(&self) -> Result<HealthStatus>;
}
