// =============================================================================
// FuturesFeed — Binance-primary / Bybit-fallback market data provider
// =============================================================================
//
// Fallback rules (mirroring what the monitor needs, not a generic router):
//   price:   Binance ticker, then Bybit ticker; a venue error falls through
//            to the next venue, Err only when every venue errored.
//   candles: Binance klines; when the series comes back shorter than
//            MIN_USABLE_CANDLES, retry on Bybit and keep whichever is longer.
// =============================================================================

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::binance::BinanceFutures;
use super::bybit::BybitLinear;
use super::{Candle, MarketDataProvider};

/// A candle series shorter than this is considered unusable for the engine
/// (EMA-50 plus warm-up) and triggers the fallback venue.
const MIN_USABLE_CANDLES: usize = 60;

/// Production market-data provider combining both venues.
#[derive(Debug, Clone)]
pub struct FuturesFeed {
    binance: BinanceFutures,
    bybit: BybitLinear,
}

impl FuturesFeed {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            binance: BinanceFutures::new(client.clone()),
            bybit: BybitLinear::new(client),
        })
    }
}

#[async_trait]
impl MarketDataProvider for FuturesFeed {
    async fn current_price(&self, pair: &str) -> Result<Option<f64>> {
        match self.binance.ticker_price(pair).await {
            Ok(Some(p)) => return Ok(Some(p)),
            Ok(None) => debug!(pair, "no Binance quote, trying Bybit"),
            Err(e) => warn!(pair, error = %e, "Binance ticker failed, trying Bybit"),
        }

        match self.bybit.ticker_price(pair).await {
            Ok(p) => Ok(p),
            Err(e) => {
                warn!(pair, error = %e, "Bybit ticker failed");
                Err(e)
            }
        }
    }

    async fn candles(&self, pair: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let primary = match self.binance.klines(pair, interval, limit).await {
            Ok(c) if c.len() >= MIN_USABLE_CANDLES => return Ok(c),
            Ok(c) => {
                debug!(
                    pair,
                    interval,
                    count = c.len(),
                    "short Binance series, trying Bybit"
                );
                Ok(c)
            }
            Err(e) => {
                warn!(pair, interval, error = %e, "Binance klines failed, trying Bybit");
                Err(e)
            }
        };

        match self.bybit.klines(pair, interval, limit).await {
            Ok(fallback) => match primary {
                Ok(c) if c.len() >= fallback.len() => Ok(c),
                _ => Ok(fallback),
            },
            // A short primary series still beats a hard failure.
            Err(e) => primary.map_err(|_| e),
        }
    }
}
