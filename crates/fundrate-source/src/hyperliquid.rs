//! Hyperliquid perpetual funding rate source.
//!
//! The info endpoint only offers a full-universe snapshot
//! (`{"type": "metaAndAssetCtxs"}`), so each fetch downloads every asset
//! context and picks the requested one by index.

use crate::error::{FetchResult, SourceResult};
use crate::http::{self, DEFAULT_TIMEOUT};
use crate::normalizer::{normalize_hyperliquid, HyperliquidSnapshot};
use crate::source::{BoxFuture, ExchangeSource};
use chrono::Utc;
use fundrate_core::{Exchange, RateObservation};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.hyperliquid.xyz";

const INFO_PATH: &str = "/info";

/// Request type for info endpoint.
#[derive(Debug, Serialize)]
struct InfoRequest {
    #[serde(rename = "type")]
    request_type: &'static str,
}

pub struct HyperliquidSource {
    client: Client,
    info_url: String,
}

impl HyperliquidSource {
    /// Create a source against `base_url` (e.g., "https://api.hyperliquid.xyz").
    pub fn new(base_url: impl Into<String>) -> SourceResult<Self> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> SourceResult<Self> {
        let base_url = base_url.into();
        Ok(Self {
            client: http::build_client(timeout)?,
            info_url: format!("{}{}", base_url.trim_end_matches('/'), INFO_PATH),
        })
    }

    async fn fetch_asset_ctx(&self, coin: &str) -> FetchResult<RateObservation> {
        let request = self.client.post(&self.info_url).json(&InfoRequest {
            request_type: "metaAndAssetCtxs",
        });

        let reply = http::send(request).await?;
        let snapshot: HyperliquidSnapshot = reply.json()?;
        debug!(coin, assets = snapshot.0.universe.len(), "Hyperliquid snapshot");
        normalize_hyperliquid(&snapshot, coin, Utc::now())
    }
}

impl ExchangeSource for HyperliquidSource {
    fn exchange(&self) -> Exchange {
        Exchange::Hyperliquid
    }

    fn fetch<'a>(&'a self, instrument: &'a str) -> BoxFuture<'a, FetchResult<RateObservation>> {
        Box::pin(self.fetch_asset_ctx(instrument))
    }
}
