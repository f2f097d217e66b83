//! HTTP fetch layer.
//!
//! Everything that goes over the network (manifests, tiles, style and
//! TileJSON documents) goes through the [`HttpSource`] trait, so the engine
//! can run against a real HTTP client or an in-memory fake.
//!
//! ### Limits
//! - Per-request timeout (default 30s). A hung tile would otherwise stall
//!   its whole batch.
//! - Max redirects: 5
//! - Max body bytes: 10MB (configurable)

pub mod url;

use bytes::Bytes;
use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};

pub use self::url::{ACCESS_TOKEN_PARAM, UrlError, canonicalize, with_access_token};

use tilesync_core::{AppConfig, Error};

/// Source of remote bytes.
#[async_trait::async_trait]
pub trait HttpSource: Send + Sync {
    /// GET a URL. Non-2xx responses are errors.
    async fn get(&self, url: &str) -> Result<FetchResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "tilesync/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 10MB)
    pub max_bytes: usize,

    /// Request timeout (default: 30s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "tilesync/0.1".to_string(),
            max_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(30_000),
            max_redirects: 5,
        }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Content-Type header
    pub content_type: Option<String>,
    /// Response body bytes
    pub bytes: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

/// reqwest-backed [`HttpSource`].
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl HttpSource for FetchClient {
    async fn get(&self, url_str: &str) -> Result<FetchResponse, Error> {
        let start = Instant::now();
        let url = canonicalize(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let response = self.http.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Network(format!("timeout after {:?}", self.config.timeout))
            } else {
                Error::Network(format!("network error: {}", e.without_url()))
            }
        })?;

        let status = response.status();

        if !status.is_success() {
            return Err(Error::HttpStatus { url: redact(&url), status: status.as_u16() });
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {}", e.without_url())))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!("fetched {} in {}ms ({} bytes)", redact(&url), fetch_ms, bytes.len());

        Ok(FetchResponse { status, content_type, bytes, fetch_ms })
    }
}

/// URL with the access token value masked, for logs and error messages.
fn redact(url: &::url::Url) -> String {
    if !url.query_pairs().any(|(k, _)| k == ACCESS_TOKEN_PARAM) {
        return url.to_string();
    }
    let mut masked = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == ACCESS_TOKEN_PARAM { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    masked.query_pairs_mut().clear().extend_pairs(pairs);
    masked.to_string()
}
