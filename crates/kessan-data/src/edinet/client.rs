//! EDINET API v2 client with rate limiting.

use crate::edinet::documents::extract_document_array;
use crate::error::{DataError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep};

/// EDINET API v2 base URL
pub const EDINET_BASE_URL: &str = "https://api.edinet-fsa.go.jp/api/v2";

/// Default minimum interval between requests
pub const DEFAULT_RATE_LIMIT: Duration = Duration::from_millis(100);

/// Default per-request timeout; archives can be several megabytes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// User agent sent with every request
const USER_AGENT: &str = concat!("kessan/", env!("CARGO_PKG_VERSION"));

/// Listing type returning document metadata (as opposed to counts only)
const LIST_TYPE_METADATA: &str = "2";

/// Download type returning the XBRL archive
const DOWNLOAD_TYPE_XBRL: &str = "1";

/// Upstream source of disclosure listings and XBRL archives.
///
/// The pipeline only talks to this trait, so tests can substitute an
/// in-process source for the HTTP client.
#[async_trait]
pub trait DisclosureSource: Send + Sync {
    /// Raw document-metadata records filed on `date`.
    async fn list_documents(&self, date: NaiveDate) -> Result<Vec<Value>>;

    /// The XBRL archive (ZIP bytes) for one document.
    async fn download_archive(&self, doc_id: &str) -> Result<Vec<u8>>;
}

/// Client connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API base URL without trailing slash
    pub base_url: String,
    /// Minimum duration between requests
    pub min_interval: Duration,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: EDINET_BASE_URL.to_string(),
            min_interval: DEFAULT_RATE_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Rate limiter shared by every request made through one client
struct RateLimiter {
    last_request: Instant,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Instant::now() - min_interval,
            min_interval,
        }
    }

    async fn wait(&mut self) {
        let elapsed = self.last_request.elapsed();
        if elapsed < self.min_interval {
            sleep(self.min_interval - elapsed).await;
        }
        self.last_request = Instant::now();
    }
}

/// EDINET API client with rate limiting
pub struct EdinetClient {
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
    base_url: String,
    api_key: String,
}

impl EdinetClient {
    /// Create a client with default settings
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_config(api_key, ClientConfig::default())
    }

    /// Create a client with a custom rate limit
    ///
    /// # Example
    /// ```no_run
    /// use kessan_data::edinet::EdinetClient;
    /// use std::time::Duration;
    ///
    /// # fn example() -> kessan_data::Result<()> {
    /// // at most 5 requests per second
    /// let client = EdinetClient::with_rate_limit("my-key", Duration::from_millis(200))?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn with_rate_limit(api_key: impl Into<String>, min_interval: Duration) -> Result<Self> {
        Self::with_config(
            api_key,
            ClientConfig {
                min_interval,
                ..ClientConfig::default()
            },
        )
    }

    /// Create a client from explicit settings
    pub fn with_config(api_key: impl Into<String>, config: ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout)
            .build()
            .map_err(DataError::Network)?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(config.min_interval))),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the document listing for one day
    ///
    /// # Errors
    /// `Authentication` on 401/403, `HttpStatus` on other non-success
    /// statuses, `EdinetApi` when the payload metadata reports an error.
    pub async fn fetch_listing(&self, date: NaiveDate) -> Result<Vec<Value>> {
        let url = format!("{}/documents.json", self.base_url);
        let date_param = date.format("%Y-%m-%d").to_string();

        self.rate_limiter.lock().await.wait().await;
        tracing::debug!(date = %date_param, "requesting document listing");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("date", date_param.as_str()),
                ("type", LIST_TYPE_METADATA),
                ("Subscription-Key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DataError::Network(e.without_url()))?;

        let response = check_status(response, &url)?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| DataError::Network(e.without_url()))?;

        check_payload_status(&body)?;
        Ok(extract_document_array(&body))
    }

    /// Download the XBRL archive for one document
    ///
    /// EDINET answers some failures with a JSON body and HTTP 200, so the
    /// body is checked for the ZIP signature before it is returned.
    pub async fn fetch_archive(&self, doc_id: &str) -> Result<Vec<u8>> {
        if doc_id.trim().is_empty() {
            return Err(DataError::Parse("Empty document id".to_string()));
        }

        let url = format!("{}/documents/{}", self.base_url, doc_id);

        self.rate_limiter.lock().await.wait().await;
        tracing::debug!(doc_id, "downloading XBRL archive");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("type", DOWNLOAD_TYPE_XBRL),
                ("Subscription-Key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| DataError::Network(e.without_url()))?;

        let response = check_status(response, &url)?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| DataError::Network(e.without_url()))?;

        if bytes.starts_with(b"PK") {
            return Ok(bytes.to_vec());
        }

        match serde_json::from_slice::<Value>(&bytes) {
            Ok(body) => {
                check_payload_status(&body)?;
                Err(DataError::Archive(format!(
                    "JSON body returned instead of an archive for {}",
                    doc_id
                )))
            }
            Err(_) => Err(DataError::Archive(format!(
                "Response for {} is not a ZIP archive",
                doc_id
            ))),
        }
    }
}

#[async_trait]
impl DisclosureSource for EdinetClient {
    async fn list_documents(&self, date: NaiveDate) -> Result<Vec<Value>> {
        self.fetch_listing(date).await
    }

    async fn download_archive(&self, doc_id: &str) -> Result<Vec<u8>> {
        self.fetch_archive(doc_id).await
    }
}

impl std::fmt::Debug for EdinetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdinetClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

/// Map HTTP failures onto the error taxonomy. `url` never carries the key.
fn check_status(response: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let code = status.as_u16();
    if code == 401 || code == 403 {
        return Err(DataError::Authentication(code));
    }

    Err(DataError::HttpStatus {
        status: code,
        url: url.to_string(),
    })
}

/// Inspect the status EDINET embeds in JSON bodies.
///
/// v2 listings carry `metadata.status`; error bodies carry a top-level
/// `StatusCode`. Either may be a string or a number.
fn check_payload_status(body: &Value) -> Result<()> {
    let (status, message) = if let Some(metadata) = body.get("metadata") {
        (
            metadata.get("status").and_then(status_code),
            metadata.get("message").and_then(Value::as_str),
        )
    } else {
        (
            body.get("StatusCode").and_then(status_code),
            body.get("message").and_then(Value::as_str),
        )
    };

    match status {
        None | Some(200) => Ok(()),
        Some(code @ (401 | 403)) => Err(DataError::Authentication(code)),
        Some(code) => Err(DataError::EdinetApi {
            status: code,
            message: message.unwrap_or("unknown error").to_string(),
        }),
    }
}

fn status_code(value: &Value) -> Option<u16> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
