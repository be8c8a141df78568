//! Deribit perpetual funding rate source.
//!
//! Uses the public JSON-RPC-over-HTTP `public/ticker` method. Responses are an
//! envelope carrying either `result` or `error`; Deribit also signals errors
//! with a 400 status and the same envelope, so the body is inspected first.

use crate::error::{FetchError, FetchResult, SourceResult};
use crate::http::{self, HttpReply, DEFAULT_TIMEOUT};
use crate::normalizer::{normalize_deribit, DeribitTicker};
use crate::source::{BoxFuture, ExchangeSource};
use chrono::Utc;
use fundrate_core::{Exchange, RateObservation};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://www.deribit.com";

const TICKER_PATH: &str = "/api/v2/public/ticker";

/// `too_many_requests`
const RATE_LIMIT_CODE: i64 = 10028;
/// `not_enough_rights` / `unauthorized`
const UNAUTHORIZED_CODES: [i64; 2] = [13004, 13009];

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<DeribitTicker>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    #[serde(default)]
    message: String,
}

impl RpcError {
    fn into_fetch_error(self, retry_after: Option<Duration>) -> FetchError {
        let detail = format!("deribit error {}: {}", self.code, self.message);
        match self.code {
            RATE_LIMIT_CODE => FetchError::RateLimited { retry_after },
            c if UNAUTHORIZED_CODES.contains(&c) => FetchError::Unauthorized(detail),
            _ => FetchError::MalformedResponse(detail),
        }
    }
}

/// Polls the ticker of one perpetual and reads its `funding_8h`.
pub struct DeribitSource {
    client: Client,
    base_url: String,
}

impl DeribitSource {
    /// Create a source against `base_url` (e.g., "https://www.deribit.com").
    pub fn new(base_url: impl Into<String>) -> SourceResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: http::build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_ticker(&self, instrument: &str) -> FetchResult<RateObservation> {
        let url = format!("{}{}", self.base_url, TICKER_PATH);
        let request = self
            .client
            .get(&url)
            .query(&[("instrument_name", instrument)]);

        let reply = http::send(request).await?;
        let ticker = unwrap_envelope(&reply)?;
        debug!(instrument, funding_8h = ?ticker.funding_8h, "Deribit ticker");
        normalize_deribit(&ticker, instrument, Utc::now())
    }
}

fn unwrap_envelope(reply: &HttpReply) -> FetchResult<DeribitTicker> {
    let envelope = match serde_json::from_str::<RpcEnvelope>(&reply.body) {
        Ok(envelope) => envelope,
        // Not an RPC body at all: fall back to the status code
        Err(_) if !reply.is_success() => return Err(reply.status_error()),
        Err(e) => {
            return Err(FetchError::MalformedResponse(format!(
                "invalid JSON-RPC envelope: {e}"
            )))
        }
    };

    if let Some(error) = envelope.error {
        let error = error.into_fetch_error(reply.retry_after);
        // An outage reported with an unrecognized RPC code is still an outage
        if reply.status.is_server_error() && matches!(error, FetchError::MalformedResponse(_)) {
            return Err(reply.status_error());
        }
        return Err(error);
    }
    if !reply.is_success() {
        return Err(reply.status_error());
    }
    envelope
        .result
        .ok_or_else(|| FetchError::MalformedResponse("envelope has neither result nor error".into()))
}

impl ExchangeSource for DeribitSource {
    fn exchange(&self) -> Exchange {
        Exchange::Deribit
    }

    fn fetch<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, FetchResult<RateObservation>> {
        Box::pin(self.fetch_ticker(instrument))
    }
}
