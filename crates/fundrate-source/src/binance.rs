//! Binance USDⓈ-M futures funding rate source.

use crate::error::{FetchError, FetchResult, SourceError, SourceResult};
use crate::http::{self, HttpReply, DEFAULT_TIMEOUT};
use crate::normalizer::{normalize_binance, BinanceApiError, BinancePremiumIndex};
use crate::source::{BoxFuture, ExchangeSource};
use chrono::Utc;
use fundrate_core::{Exchange, RateObservation, MAX_SETTLEMENT_INTERVAL_HOURS};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use zeroize::Zeroizing;

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

const PREMIUM_INDEX_PATH: &str = "/fapi/v1/premiumIndex";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Binance error codes for rejected API keys.
const INVALID_API_KEY_CODES: [i64; 2] = [-2014, -2015];
/// "Too many requests" when returned in a 4xx body.
const TOO_MANY_REQUESTS_CODE: i64 = -1003;

/// Polls `premiumIndex` for the predicted funding rate of one symbol.
pub struct BinanceSource {
    client: Client,
    base_url: String,
    api_key: Option<Zeroizing<String>>,
    settlement_interval_hours: u32,
}

impl BinanceSource {
    /// Create a source against `base_url` (e.g., "https://fapi.binance.com").
    pub fn new(base_url: impl Into<String>) -> SourceResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        Ok(Self {
            client: http::build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            settlement_interval_hours: Exchange::Binance.default_settlement_interval_hours(),
        })
    }

    /// Send `X-MBX-APIKEY` with every request. Public endpoints work without it.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Zeroizing<String>) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Override the native settlement cadence (some symbols settle every 4h).
    pub fn with_settlement_interval(mut self, hours: u32) -> SourceResult<Self> {
        if hours == 0 || hours > MAX_SETTLEMENT_INTERVAL_HOURS {
            return Err(SourceError::InvalidConfig(format!(
                "binance settlement interval must be 1..={MAX_SETTLEMENT_INTERVAL_HOURS}h, got {hours}"
            )));
        }
        self.settlement_interval_hours = hours;
        Ok(self)
    }

    async fn fetch_premium_index(&self, symbol: &str) -> FetchResult<RateObservation> {
        let url = format!("{}{}", self.base_url, PREMIUM_INDEX_PATH);
        let mut request = self.client.get(&url).query(&[("symbol", symbol)]);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key.as_str());
        }

        let reply = http::send(request).await?;
        if !reply.is_success() {
            return Err(classify_error(&reply));
        }

        let raw: BinancePremiumIndex = reply.json()?;
        debug!(symbol, rate = ?raw.last_funding_rate, time = raw.time, "Binance premium index");
        normalize_binance(&raw, symbol, self.settlement_interval_hours, Utc::now())
    }
}

/// Binance reports key problems as 400 with a code in the body.
fn classify_error(reply: &HttpReply) -> FetchError {
    match serde_json::from_str::<BinanceApiError>(&reply.body) {
        Ok(api) if INVALID_API_KEY_CODES.contains(&api.code) => {
            FetchError::Unauthorized(format!("code {}: {}", api.code, api.msg))
        }
        Ok(api) if api.code == TOO_MANY_REQUESTS_CODE => FetchError::RateLimited {
            retry_after: reply.retry_after,
        },
        _ => reply.status_error(),
    }
}

impl ExchangeSource for BinanceSource {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn fetch<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, FetchResult<RateObservation>> {
        Box::pin(self.fetch_premium_index(instrument))
    }
}
