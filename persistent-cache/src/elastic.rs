//! Elasticsearch backend over the REST API

use crate::backend::DocumentBackend;
use crate::config::{Auth, CacheConfig};
use crate::error::{CacheError, Result};
use crate::types::{HealthStatus, ScanPage, StoredDocument};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;
use url::Url;

const TYPELESS_KIND: &str = "_doc";

/// Document store client for Elasticsearch-compatible clusters
///
/// Holds one pooled HTTP client; clones share it.
#[derive(Debug, Clone)]
pub struct ElasticBackend {
    http_client: Client,
    base_url: Url,
    document_kind: String,
    refresh_on_write: bool,
}

#[derive(Deserialize)]
struct GetResponse {
    #[serde(rename = "_source")]
    source: Option<Value>,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
}

#[derive(Deserialize)]
struct HealthResponse {
    status: HealthStatus,
}

impl ElasticBackend {
    /// Create a backend from the connection part of `config`
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let base_url = Url::parse(&config.endpoint)?;
        if base_url.cannot_be_a_base() {
            return Err(CacheError::Config(format!(
                "endpoint is not a base URL: {}",
                config.endpoint
            )));
        }

        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(ref auth) = config.auth {
            let mut headers = HeaderMap::new();
            let raw = match auth {
                Auth::Basic { username, password } => {
                    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
                }
                Auth::ApiKey(key) => format!("ApiKey {key}"),
            };
            let mut value = HeaderValue::from_str(&raw)
                .map_err(|e| CacheError::Config(format!("invalid credentials: {e}")))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
            builder = builder.default_headers(headers);
        }

        Ok(Self {
            http_client: builder.build()?,
            base_url,
            document_kind: config.document_kind.clone(),
            refresh_on_write: config.refresh_on_write,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CacheError::Config(format!("endpoint is not a base URL: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, collection: &str, id: &str) -> Result<Url> {
        self.url(&[collection, &self.document_kind, id])
    }

    fn create_url(&self, collection: &str, id: &str) -> Result<Url> {
        if self.document_kind == TYPELESS_KIND {
            self.url(&[collection, "_create", id])
        } else {
            self.url(&[collection, &self.document_kind, id, "_create"])
        }
    }

    fn write_request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.http_client.request(method, url);
        if self.refresh_on_write {
            request.query(&[("refresh", "true")])
        } else {
            request
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = request.build()?;
        debug!(method = %request.method(), url = %request.url(), "elasticsearch request");
        self.http_client.execute(request).await.map_err(transport)
    }
}

fn transport(err: reqwest::Error) -> CacheError {
    if err.is_timeout() {
        CacheError::Timeout
    } else {
        CacheError::HttpError(err)
    }
}

async fn unexpected(response: Response) -> CacheError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    CacheError::Backend { status, body }
}

async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await.map_err(transport)?;
    serde_json::from_slice(&bytes).map_err(|e| CacheError::InvalidResponse(e.to_string()))
}

fn keep_alive_param(keep_alive: Duration) -> String {
    if keep_alive.subsec_millis() == 0 {
        format!("{}s", keep_alive.as_secs().max(1))
    } else {
        format!("{}ms", keep_alive.as_millis())
    }
}

fn scan_page(response: SearchResponse) -> ScanPage {
    ScanPage {
        cursor: response.scroll_id,
        ids: response.hits.hits.into_iter().map(|hit| hit.id).collect(),
    }
}

#[async_trait]
impl DocumentBackend for ElasticBackend {
    async fn create(&self, collection: &str, id: &str, doc: &StoredDocument) -> Result<()> {
        let url = self.create_url(collection, id)?;
        let response = self.send(self.write_request(Method::PUT, url).json(doc)).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CacheError::Conflict(id.to_string())),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(collection.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn upsert(&self, collection: &str, id: &str, doc: &StoredDocument) -> Result<()> {
        let url = self.document_url(collection, id)?;
        let response = self.send(self.write_request(Method::PUT, url).json(doc)).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(collection.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    fn supports_upsert(&self) -> bool {
        true
    }

    async fn get(&self, collection: &str, id: &str) -> Result<StoredDocument> {
        let url = self.document_url(collection, id)?;
        let response = self.send(self.http_client.get(url)).await?;

        match response.status() {
            s if s.is_success() => {
                let body: GetResponse = parse(response).await?;
                let source = body
                    .source
                    .ok_or_else(|| CacheError::InvalidResponse("document without _source".into()))?;
                serde_json::from_value(source)
                    .map_err(|e| CacheError::Decode(format!("document {id}: {e}")))
            }
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(id.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.document_url(collection, id)?;
        let response = self.send(self.write_request(Method::DELETE, url)).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(id.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let url = self.url(&[collection, "_count"])?;
        let response = self.send(self.http_client.get(url)).await?;

        match response.status() {
            s if s.is_success() => Ok(parse::<CountResponse>(response).await?.count),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(collection.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn open_scan(
        &self,
        collection: &str,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<ScanPage> {
        let url = self.url(&[collection, "_search"])?;
        let body = json!({
            "size": page_size,
            "sort": ["_doc"],
            "_source": false,
            "query": {"match_all": {}},
        });
        let request = self
            .http_client
            .post(url)
            .query(&[("scroll", keep_alive_param(keep_alive))])
            .json(&body);
        let response = self.send(request).await?;

        match response.status() {
            s if s.is_success() => Ok(scan_page(parse(response).await?)),
            StatusCode::NOT_FOUND => Err(CacheError::NotFound(collection.to_string())),
            _ => Err(unexpected(response).await),
        }
    }

    async fn advance_scan(&self, cursor: &str, keep_alive: Duration) -> Result<ScanPage> {
        let url = self.url(&["_search", "scroll"])?;
        let body = json!({
            "scroll": keep_alive_param(keep_alive),
            "scroll_id": cursor,
        });
        let response = self.send(self.http_client.post(url).json(&body)).await?;

        // A 404 here means the cursor expired, which is a failure of the
        // scan and not an absent document.
        if response.status().is_success() {
            Ok(scan_page(parse(response).await?))
        } else {
            Err(unexpected(response).await)
        }
    }

    async fn close_scan(&self, cursor: &str) -> Result<()> {
        let url = self.url(&["_search", "scroll"])?;
        let body = json!({ "scroll_id": [cursor] });
        let response = self.send(self.http_client.delete(url).json(&body)).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected(response).await),
        }
    }

    async fn drop_collection(&self, collection: &str) -> Result<()> {
        let url = self.url(&[collection])?;
        let response = self.send(self.http_client.delete(url)).await?;

        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            _ => Err(unexpected(response).await),
        }
    }

    async fn create_collection(&self, collection: &str) -> Result<()> {
        let url = self.url(&[collection])?;
        let response = self.send(self.http_client.put(url)).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::BAD_REQUEST && body.contains("resource_already_exists_exception") {
            Err(CacheError::Conflict(collection.to_string()))
        } else {
            Err(CacheError::Backend {
                status: status.as_u16(),
                body,
            })
        }
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let url = self.url(&[collection])?;
        let response = self.send(self.http_client.head(url)).await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(unexpected(response).await),
        }
    }

    async fn health(&self) -> Result<HealthStatus> {
        let url = self.url(&["_cluster", "health"])?;
        let response = self.send(self.http_client.get(url)).await?;

        if response.status().is_success() {
            Ok(parse::<HealthResponse>(response).await?.status)
        } else {
            Err(unexpected(response).await)
        }
    }
}
