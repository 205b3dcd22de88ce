//! In-process document backend
//!
//! Mirrors the Elasticsearch behavior the cache depends on: collections
//! are created on first write, absent documents and collections report
//! `NotFound`, and scroll cursors snapshot the id set when opened.

use crate::backend::DocumentBackend;
use crate::error::{CacheError, Result};
use crate::types::{HealthStatus, ScanPage, StoredDocument};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

type Collection = BTreeMap<String, StoredDocument>;

struct Cursor {
    remaining: Vec<String>,
    page_size: usize,
}

#[derive(Default)]
struct State {
    collections: HashMap<String, Collection>,
    cursors: HashMap<String, Cursor>,
    health: Option<HealthStatus>,
}

/// Document backend kept in memory; clones share the same data
#[derive(Clone)]
pub struct MemoryBackend {
    state: Arc<RwLock<State>>,
    upsert: bool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend with upsert support
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(State::default())),
            upsert: true,
        }
    }

    /// Same data, but writes go through delete-then-create
    pub fn without_upsert(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            upsert: false,
        }
    }

    /// Override the reported cluster health
    pub fn set_health(&self, status: HealthStatus) {
        self.state.write().health = Some(status);
    }

    /// Number of scroll cursors not yet closed
    ///
    /// An exhausted cursor stays open until [`DocumentBackend::close_scan`]
    /// releases it, as a server-side scroll context would.
    pub fn open_cursors(&self) -> usize {
        self.state.read().cursors.len()
    }

    fn next_page(state: &mut State, cursor: &str) -> Result<ScanPage> {
        let entry = state
            .cursors
            .get_mut(cursor)
            .ok_or_else(|| CacheError::Backend {
                status: 404,
                body: format!("search_context_missing_exception: {cursor}"),
            })?;

        let take = entry.page_size.min(entry.remaining.len());
        let ids: Vec<String> = entry.remaining.drain(..take).collect();

        Ok(ScanPage {
            cursor: Some(cursor.to_string()),
            ids,
        })
    }
}

#[async_trait]
impl DocumentBackend for MemoryBackend {
    async fn create(&self, collection: &str, id: &str, doc: &StoredDocument) -> Result<()> {
        let mut state = self.state.write();
        let docs = state.collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id) {
            return Err(CacheError::Conflict(id.to_string()));
        }
        docs.insert(id.to_string(), doc.clone());
        Ok(())
    }

    async fn upsert(&self, collection: &str, id: &str, doc: &StoredDocument) -> Result<()> {
        let mut state = self.state.write();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }

    fn supports_upsert(&self) -> bool {
        self.upsert
    }

    async fn get(&self, collection: &str, id: &str) -> Result<StoredDocument> {
        self.state
            .read()
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
            .ok_or_else(|| CacheError::NotFound(id.to_string()))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.state
            .write()
            .collections
            .get_mut(collection)
            .and_then(|docs| docs.remove(id))
            .map(|_| ())
            .ok_or_else(|| CacheError::NotFound(id.to_string()))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|docs| docs.len() as u64)
            .ok_or_else(|| CacheError::NotFound(collection.to_string()))
    }

    async fn open_scan(
        &self,
        collection: &str,
        page_size: usize,
        _keep_alive: Duration,
    ) -> Result<ScanPage> {
        let mut state = self.state.write();
        let remaining: Vec<String> = state
            .collections
            .get(collection)
            .ok_or_else(|| CacheError::NotFound(collection.to_string()))?
            .keys()
            .cloned()
            .collect();

        let cursor = uuid::Uuid::new_v4().to_string();
        state.cursors.insert(
            cursor.clone(),
            Cursor {
                remaining,
                page_size: page_size.max(1),
            },
        );
        Self::next_page(&mut state, &cursor)
    }

    async fn advance_scan(&self, cursor: &str, _keep_alive: Duration) -> Result<ScanPage> {
        Self::next_page(&mut self.state.write(), cursor)
    }

    async fn close_scan(&self, cursor: &str) -> Result<()> {
        self.state.write().cursors.remove(cursor);
        Ok(())
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        self.state.write().collections.remove(collection);
        Ok(())
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.collections.contains_key(collection) {
            return Err(CacheError::Conflict(collection.to_string()));
        }
        state
            .collections
            .insert(collection.to_string(), Collection::new());
        Ok(())
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        Ok(self.state.read().collections.contains_key(collection))
    }

    async fn health(&self) -> Result<HealthStatus> {
        Ok(self.state.read().health.unwrap_or(HealthStatus::Healthy))
    }
}
