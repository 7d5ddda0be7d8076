// =============================================================================
// Bybit V5 linear-futures REST client (public endpoints only)
// =============================================================================
//
// Serves as the fallback venue when Binance has no usable data for a symbol.
// Bybit expresses intervals as minute codes ("60", "240") and returns kline
// rows newest-first; both quirks are normalised here.
// =============================================================================

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::binance::parse_str_f64;
use super::{clean_symbol, Candle};

const BASE_URL: &str = "https://api.bybit.com";

/// Thin client over the Bybit V5 public market-data endpoints
/// (`category=linear`).
#[derive(Debug, Clone)]
pub struct BybitLinear {
    base_url: String,
    client: reqwest::Client,
}

impl BybitLinear {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            client,
        }
    }

    /// Map a monitor interval ("1h" / "4h") onto Bybit's minute codes.
    pub fn interval_code(interval: &str) -> &str {
        match interval {
            "1h" => "60",
            "4h" => "240",
            other => other,
        }
    }

    /// GET /v5/market/tickers — latest traded price.
    pub async fn ticker_price(&self, pair: &str) -> Result<Option<f64>> {
        let symbol = clean_symbol(pair);
        let url = format!(
            "{}/v5/market/tickers?category=linear&symbol={symbol}",
            self.base_url
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /v5/market/tickers request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse tickers response")?;

        if !status.is_success() {
            anyhow::bail!("Bybit GET /v5/market/tickers returned {status}: {body}");
        }

        let price = body
            .pointer("/result/list/0/lastPrice")
            .map(parse_str_f64)
            .transpose()?
            .filter(|p| *p > 0.0);

        debug!(symbol, ?price, "ticker price fetched");
        Ok(price)
    }

    /// GET /v5/market/kline — historical candles, re-sorted ascending.
    ///
    /// Row layout: [startTime, open, high, low, close, volume, turnover].
    pub async fn klines(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let symbol = clean_symbol(pair);
        let code = Self::interval_code(interval);
        let url = format!(
            "{}/v5/market/kline?category=linear&symbol={symbol}&interval={code}&limit={limit}",
            self.base_url
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /v5/market/kline request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse kline response")?;

        if !status.is_success() {
            anyhow::bail!("Bybit GET /v5/market/kline returned {status}: {body}");
        }

        let empty = Vec::new();
        let rows = body
            .pointer("/result/list")
            .and_then(|v| v.as_array())
            .unwrap_or(&empty);

        let mut candles = Vec::with_capacity(rows.len());
        for entry in rows {
            let Some(arr) = entry.as_array() else {
                continue;
            };
            if arr.len() < 5 {
                warn!("skipping malformed kline row with {} elements", arr.len());
                continue;
            }
            let Ok(open_time) = parse_str_f64(&arr[0]).map(|t| t as i64) else {
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
                _ => warn!(symbol, "skipping kline row with unparsable prices"),
            }
        }

        // Bybit returns newest-first; every consumer expects oldest-first.
        candles.sort_by_key(|c| c.open_time);
        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_codes() {
        assert_eq!(BybitLinear::interval_code("1h"), "60");
        assert_eq!(BybitLinear::interval_code("4h"), "240");
        assert_eq!(BybitLinear::interval_code("15"), "15");
    }
}
