//! # Persistent Cache
//!
//! Key-value cache persisted in an Elasticsearch-compatible document store.
//!
//! ## Features
//!
//! - 💾 **Key-Value contract**: save, lookup, delete, size, keys, clear
//! - 🔁 **Retries**: every backend call runs under a bounded backoff policy
//! - 🛡️ **Transport-safe values**: values are stored as JSON text, optionally base64'd
//! - 🔌 **Pluggable backend**: [`ElasticBackend`] over HTTP or the in-process [`MemoryBackend`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use persistent_cache::{CacheConfig, CacheStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CacheConfig::new("http://localhost:9200").with_index("sessions");
//!     let store = CacheStore::new(config)?;
//!
//!     store.save("user:1", "John Doe", None).await?;
//!     let entry = store.lookup::<_, String>("user:1").await?;
//!     println!("Entry: {:?}", entry);
//!
//!     println!("{} entries", store.size().await?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod codec;
pub mod config;
pub mod elastic;
pub mod error;
pub mod memory;
pub mod retry;
pub mod store;
pub mod types;

pub use backend::DocumentBackend;
pub use codec::ValueCodec;
pub use config::{Auth, CacheConfig, RetryConfig};
pub use elastic::ElasticBackend;
pub use error::{CacheError, Result};
pub use memory::MemoryBackend;
pub use store::{CacheStore, TIMESTAMP_FORMAT, now_timestamp};
pub use types::{Entry, HealthStatus, ScanPage, StoredDocument};
