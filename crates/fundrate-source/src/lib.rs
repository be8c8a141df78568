//! Funding rate sources for supported exchanges.
//!
//! Each exchange gets one `ExchangeSource` implementation that owns its request
//! shape, authentication and response parsing. Raw payloads are turned into
//! canonical `RateObservation`s by the pure functions in [`normalizer`], so no
//! exchange-specific type crosses this crate's boundary.

pub mod binance;
pub mod deribit;
pub mod error;
pub mod http;
pub mod hyperliquid;
pub mod mock;
pub mod normalizer;
pub mod source;

pub use binance::BinanceSource;
pub use deribit::DeribitSource;
pub use error::{FetchError, FetchResult, SourceError, SourceResult};
pub use hyperliquid::HyperliquidSource;
pub use mock::MockSource;
pub use source::{BoxFuture, DynExchangeSource, ExchangeSource};
