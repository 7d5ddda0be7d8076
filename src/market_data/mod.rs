// =============================================================================
// Market Data — candle model and the provider capability interface
// =============================================================================
//
// The monitor never talks to an exchange directly; everything flows through
// the `MarketDataProvider` trait so the snapshot builder can be exercised
// against mock feeds in tests and against the Binance/Bybit fallback feed in
// production.

pub mod binance;
pub mod bybit;
pub mod feed;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use feed::FuturesFeed;

/// A single OHLC candle, oldest-first in every series the providers return.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// Capability interface over an exchange's public market data.
///
/// Implementations may return fewer candles than requested, or none at all
/// when the venue has no data for the symbol. An `Err` means the fetch itself
/// failed (transport or decode); the caller turns that into an `ERROR` row.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Latest traded price for `pair`, or `None` when no venue has a quote.
    async fn current_price(&self, pair: &str) -> Result<Option<f64>>;

    /// Up to `limit` closed candles for `pair` at `interval` ("1h" / "4h"),
    /// ascending by open time.
    async fn candles(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Candle>>;
}

/// Normalise a pair from the operations feed into an exchange symbol:
/// trim, uppercase, strip any existing `USDT` / `-` / `_`, append `USDT`.
///
/// `"btc"`, `"BTC-USDT"` and `"BTC_USDT"` all become `"BTCUSDT"`.
pub fn clean_symbol(pair: &str) -> String {
    let p = pair
        .trim()
        .to_uppercase()
        .replace("USDT", "")
        .replace(['-', '_'], "");
    format!("{p}USDT")
}
