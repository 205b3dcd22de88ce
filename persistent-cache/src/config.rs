//! Cache configuration

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default initial backoff between attempts.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(200);

/// Retry policy applied to every backend call except the health probe.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetryConfig {
    /// Total attempts per call, first one included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Delay before the first retry. Doubles with jitter afterwards.
    #[serde(default = "default_initial_backoff", with = "humantime_serde")]
    pub initial_backoff: Duration,

    /// Upper bound for a single delay.
    #[serde(default = "default_max_backoff", with = "humantime_serde")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: default_max_backoff(),
        }
    }
}

fn default_max_attempts() -> usize {
    3
}

fn default_initial_backoff() -> Duration {
    DEFAULT_INITIAL_BACKOFF
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(5)
}

/// Credentials sent with every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Auth {
    Basic { username: String, password: String },
    ApiKey(String),
}

/// Persistent cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Base URL of the document store
    pub endpoint: String,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Collection (index) holding the entries
    pub index: String,
    /// Document kind label; `_doc` selects typeless paths
    pub document_kind: String,
    /// Retry policy
    pub retry: RetryConfig,
    /// Base64 the serialized value before storing it
    pub encode_values: bool,
    /// Documents per scroll page
    pub scan_page_size: usize,
    /// Lifetime of a scroll cursor between page requests
    #[serde(with = "humantime_serde")]
    pub scroll_keep_alive: Duration,
    /// Ask the backend to refresh after each write
    pub refresh_on_write: bool,
    /// Optional credentials
    pub auth: Option<Auth>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9200/".to_string(),
            timeout: Duration::from_secs(5),
            index: "persistent_cache".to_string(),
            document_kind: "_doc".to_string(),
            retry: RetryConfig::default(),
            encode_values: true,
            scan_page_size: 10,
            scroll_keep_alive: Duration::from_secs(300),
            refresh_on_write: false,
            auth: None,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| CacheError::Config(format!("{}: {e}", path.as_ref().display())))?;
        let config: CacheConfig =
            serde_yaml::from_str(&content).map_err(|e| CacheError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the collection name
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = index.into();
        self
    }

    /// Set the document kind label
    pub fn with_document_kind(mut self, kind: impl Into<String>) -> Self {
        self.document_kind = kind.into();
        self
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the total number of attempts per backend call
    pub fn with_max_retries(mut self, max_attempts: usize) -> Self {
        self.retry.max_attempts = max_attempts;
        self
    }

    /// Enable or disable base64 value encoding
    pub fn with_encoding(mut self, enabled: bool) -> Self {
        self.encode_values = enabled;
        self
    }

    /// Set the scroll page size
    pub fn with_scan_page_size(mut self, size: usize) -> Self {
        self.scan_page_size = size;
        self
    }

    /// Set the scroll cursor lifetime
    pub fn with_scroll_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.scroll_keep_alive = keep_alive;
        self
    }

    /// Refresh the collection after every write
    pub fn with_refresh_on_write(mut self, refresh: bool) -> Self {
        self.refresh_on_write = refresh;
        self
    }

    /// Use HTTP basic authentication
    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.auth = Some(Auth::Basic {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Use an API key
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.auth = Some(Auth::ApiKey(key.into()));
        self
    }

    /// Reject settings no backend call could work with.
    pub fn validate(&self) -> Result<()> {
        if self.index.is_empty() {
            return Err(CacheError::Config("index must not be empty".into()));
        }
        if self.document_kind.is_empty() {
            return Err(CacheError::Config("document_kind must not be empty".into()));
        }
        if self.scan_page_size == 0 {
            return Err(CacheError::Config("scan_page_size must be at least 1".into()));
        }
        if self.retry.max_attempts == 0 {
            return Err(CacheError::Config("retry.max_attempts must be at least 1".into()));
        }
        Ok(())
    }
}
