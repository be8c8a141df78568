//! Shared HTTP plumbing for REST-based sources.
//!
//! Maps transport outcomes and HTTP status codes onto the `FetchError`
//! taxonomy so every source classifies failures the same way.

use crate::error::{FetchError, FetchResult, SourceError, SourceResult};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Default timeout for API requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest body excerpt carried in error messages.
const MAX_BODY_EXCERPT: usize = 200;

/// Build the HTTP client used by a source.
pub fn build_client(timeout: Duration) -> SourceResult<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::HttpClient(format!("Failed to create HTTP client: {e}")))
}

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Classify a non-success reply.
    pub fn status_error(&self) -> FetchError {
        classify_status(self.status, self.retry_after, &self.body)
    }

    /// Deserialize the body, failing on non-success status first.
    pub fn json<T: DeserializeOwned>(&self) -> FetchResult<T> {
        if !self.is_success() {
            return Err(self.status_error());
        }
        serde_json::from_str(&self.body).map_err(|e| {
            FetchError::MalformedResponse(format!(
                "Failed to parse response: {e} (body: {})",
                excerpt(&self.body)
            ))
        })
    }
}

/// Send a request and read the whole body.
pub async fn send(request: RequestBuilder) -> FetchResult<HttpReply> {
    let response = request.send().await?;
    let status = response.status();
    let retry_after = parse_retry_after(response.headers());
    let body = response.text().await?;
    Ok(HttpReply {
        status,
        retry_after,
        body,
    })
}

/// Map an HTTP status to the fetch error taxonomy.
///
/// 2xx is not expected here; callers only classify failed replies.
pub fn classify_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> FetchError {
    let detail = format!("HTTP {status}: {}", excerpt(body));
    match status.as_u16() {
        401 | 403 => FetchError::Unauthorized(detail),
        // 418 is Binance's escalation after ignoring 429s
        418 | 429 => FetchError::RateLimited { retry_after },
        408 => FetchError::Unreachable(detail),
        s if s >= 500 => FetchError::Unreachable(detail),
        _ => FetchError::MalformedResponse(detail),
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

pub(crate) fn excerpt(body: &str) -> String {
    body.chars().take(MAX_BODY_EXCERPT).collect()
}
