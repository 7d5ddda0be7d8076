// =============================================================================
// Binance USDT-M Futures REST client (public endpoints only)
// =============================================================================
//
// Only unauthenticated market-data endpoints are used: the monitor never
// places orders, so no API keys or request signing are involved.
// =============================================================================

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::{clean_symbol, Candle};

const BASE_URL: &str = "https://fapi.binance.com";

/// Thin client over the Binance FAPI public market-data endpoints.
#[derive(Debug, Clone)]
pub struct BinanceFutures {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceFutures {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            client,
        }
    }

    /// GET /fapi/v1/ticker/price — latest traded price.
    ///
    /// Returns `Ok(None)` when the response carries no positive price.
    pub async fn ticker_price(&self, pair: &str) -> Result<Option<f64>> {
        let symbol = clean_symbol(pair);
        let url = format!("{}/fapi/v1/ticker/price?symbol={symbol}", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/ticker/price request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse ticker response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /fapi/v1/ticker/price returned {status}: {body}");
        }

        let price = body
            .get("price")
            .map(parse_str_f64)
            .transpose()?
            .filter(|p| *p > 0.0);

        debug!(symbol, ?price, "ticker price fetched");
        Ok(price)
    }

    /// GET /fapi/v1/klines — historical candles, ascending by open time.
    ///
    /// Binance replies with an array of arrays:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, ...
    /// Malformed rows are skipped rather than failing the whole series.
    pub async fn klines(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let symbol = clean_symbol(pair);
        let url = format!(
            "{}/fapi/v1/klines?symbol={symbol}&interval={interval}&limit={limit}",
            self.base_url
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /fapi/v1/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /fapi/v1/klines returned {status}: {body}");
        }

        let raw = body.as_array().context("klines response is not an array")?;

        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            let Some(arr) = entry.as_array() else {
                warn!("skipping non-array kline entry");
                continue;
            };
            if arr.len() < 5 {
                warn!("skipping malformed kline entry with {} elements", arr.len());
                continue;
            }
            let Some(open_time) = arr[0].as_i64() else {
                continue;
            };
            match (
                parse_str_f64(&arr[1]),
                parse_str_f64(&arr[2]),
                parse_str_f64(&arr[3]),
                parse_str_f64(&arr[4]),
            ) {
                (Ok(open), Ok(high), Ok(low), Ok(close)) => candles.push(Candle {
                    open_time,
                    open,
                    high,
                    low,
                    close,
                }),
                _ => warn!(symbol, "skipping kline entry with unparsable prices"),
            }
        }

        candles.sort_by_key(|c| c.open_time);
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

/// Parse a JSON value that may be either a string or a number into `f64`.
pub(super) fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}
