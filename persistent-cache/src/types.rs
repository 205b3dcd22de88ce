//! Common types for the persistent cache

use serde::{Deserialize, Serialize};

/// A stored value with the time it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry<V> {
    pub value: V,
    pub timestamp: String,
}

/// Document body as the backend stores it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Encoded value (see [`crate::ValueCodec`])
    pub value: String,
    pub timestamp: String,
}

/// Cluster health as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    #[serde(rename = "green")]
    Healthy,
    #[serde(rename = "yellow")]
    Degraded,
    #[serde(rename = "red")]
    Unavailable,
}

impl HealthStatus {
    /// Degraded clusters still serve reads and writes.
    pub fn is_available(self) -> bool {
        !matches!(self, HealthStatus::Unavailable)
    }
}

/// One page of a scroll scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    /// Cursor to pass to the next advance call
    pub cursor: Option<String>,
    /// Document ids on this page
    pub ids: Vec<String>,
}

impl ScanPage {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
