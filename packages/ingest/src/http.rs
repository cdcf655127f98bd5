//! HTTP client wrapper for downloading feed files.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{ETAG, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED};
use reqwest::StatusCode;

use crate::error::{IngestError, Result};

/// User agent string identifying this service.
const USER_AGENT: &str = concat!("trafficflow-ingest/", env!("CARGO_PKG_VERSION"));

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Status code of a conditional request whose file did not change.
pub const NOT_MODIFIED: u16 = 304;

/// Create a configured HTTP client.
///
/// # Arguments
/// * `timeout` - Request timeout, covering connect and body transfer
pub fn create_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}

/// Validators from an earlier download, sent to skip unchanged files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditional {
    /// Sent as `If-None-Match`.
    pub etag: Option<String>,
    /// Sent as `If-Modified-Since`.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Conditional {
    /// No validators: always download.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Validators taken from a previous response.
    #[must_use]
    pub fn from_response(response: &FileResponse) -> Self {
        Self {
            etag: response.etag.clone(),
            last_modified: response.last_modified,
        }
    }

    fn apply(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(etag) = &self.etag {
            request = request.header(IF_NONE_MATCH, etag.as_str());
        }
        if let Some(last_modified) = self.last_modified {
            request = request.header(IF_MODIFIED_SINCE, format_http_date(last_modified));
        }
        request
    }
}

/// A downloaded feed file, or the answer that it did not change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileResponse {
    /// HTTP status code.
    pub status: u16,
    /// Raw (still compressed) file contents; empty for 304.
    pub body: Vec<u8>,
    /// `ETag` header, if sent.
    pub etag: Option<String>,
    /// Parsed `Last-Modified` header, if sent and valid.
    pub last_modified: Option<DateTime<Utc>>,
}

impl FileResponse {
    /// Whether the server reported the file as unchanged.
    #[must_use]
    pub fn is_not_modified(&self) -> bool {
        self.status == NOT_MODIFIED
    }

    fn from_response(response: Response) -> Result<Self> {
        let status = response.status().as_u16();
        let etag = header_text(&response, ETAG);
        let last_modified = header_text(&response, LAST_MODIFIED)
            .as_deref()
            .and_then(parse_http_date);
        let body = if status == NOT_MODIFIED {
            Vec::new()
        } else {
            response.bytes()?.to_vec()
        };
        Ok(Self {
            status,
            body,
            etag,
            last_modified,
        })
    }
}

fn header_text(response: &Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

/// Parse an HTTP date such as `Fri, 01 Mar 2024 12:00:05 GMT`.
///
/// # Examples
/// ```
/// use trafficflow_ingest::http::parse_http_date;
///
/// let parsed = parse_http_date("Fri, 01 Mar 2024 12:00:05 GMT").unwrap();
/// assert_eq!(parsed.to_rfc3339(), "2024-03-01T12:00:05+00:00");
/// assert!(parse_http_date("yesterday").is_none());
/// ```
pub fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp as an HTTP date.
pub fn format_http_date(value: DateTime<Utc>) -> String {
    value.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Download a feed file with retry logic.
///
/// Uses exponential backoff for transient failures (network errors, 5xx
/// responses). A 304 answer to a conditional request is returned as a
/// [`FileResponse`] with an empty body.
///
/// # Arguments
/// * `client` - HTTP client to use
/// * `url` - URL to download from
/// * `feed` - Feed name, for error reporting
/// * `conditional` - Validators from an earlier download
pub fn download_file(
    client: &Client,
    url: &str,
    feed: &str,
    conditional: &Conditional,
) -> Result<FileResponse> {
    let mut last_error: Option<String> = None;

    for attempt in 0..MAX_RETRIES {
        if attempt > 0 {
            // Exponential backoff: 500ms, 1000ms
            let delay = RETRY_BASE_DELAY_MS * (1 << (attempt - 1));
            tracing::debug!(feed, attempt, delay_ms = delay, "Retrying after delay");
            thread::sleep(Duration::from_millis(delay));
        }

        match conditional.apply(client.get(url)).send() {
            Ok(response) => {
                let status = response.status();

                if status.is_server_error() {
                    tracing::warn!(
                        feed,
                        status = %status,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Server error, will retry"
                    );
                    last_error = Some(format!("Server error: {status}"));
                    continue;
                }

                if !status.is_success() && status != StatusCode::NOT_MODIFIED {
                    return Err(IngestError::UnexpectedStatus {
                        feed: feed.to_string(),
                        status: status.as_u16(),
                    });
                }

                return FileResponse::from_response(response).map_err(|err| match err {
                    IngestError::Http(source) => IngestError::Download {
                        feed: feed.to_string(),
                        source,
                    },
                    other => other,
                });
            }
            Err(e) => {
                if e.is_connect() || e.is_timeout() {
                    tracing::warn!(
                        feed,
                        error = %e,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        "Connection error, will retry"
                    );
                    last_error = Some(e.to_string());
                    continue;
                }
                return Err(IngestError::Download {
                    feed: feed.to_string(),
                    source: e,
                });
            }
        }
    }

    Err(IngestError::RetriesExhausted {
        attempts: MAX_RETRIES,
        message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
    })
}
