// =============================================================================
// Average True Range (ATR) — Wilder's Smoothing Method
// =============================================================================
//
// ATR measures market volatility by decomposing the entire range of a bar.
//
// True Range (TR) for each bar:
//   TR = max(H - L, |H - prevClose|, |L - prevClose|)
//
// ATR is then the smoothed average of TR using Wilder's method:
//   ATR_0   = SMA of first `period` TR values
//   ATR_t   = (ATR_{t-1} * (period - 1) + TR_t) / period
//
// Default period: 14
// =============================================================================

use crate::market_data::Candle;

/// Compute the most recent ATR value from a slice of OHLC candles using
/// Wilder's smoothing method.
///
/// # Arguments
/// - `candles` — slice of OHLC candles (oldest first).
/// - `period`  — look-back window for the ATR calculation.
///
/// # Returns
/// `None` when:
/// - `period` is zero.
/// - There are fewer than `period + 2` candles (we need `period` TR values
///   for the seed plus at least one smoothed step, each TR requiring a
///   previous candle).
/// - Any intermediate value is non-finite.
pub fn atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 2 {
        return None;
    }

    // --- Step 1: True Range for each consecutive pair ------------------------
    let mut tr_values: Vec<f64> = Vec::with_capacity(candles.len() - 1);
    for i in 1..candles.len() {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_close = candles[i - 1].close;

        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();

        tr_values.push(hl.max(hc).max(lc));
    }

    // --- Step 2: Seed with SMA of first `period` TR values -------------------
    let seed: f64 = tr_values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    // --- Step 3: Wilder's smoothing for remaining TR values ------------------
    let period_f = period as f64;
    let mut a = seed;
    for &tr in &tr_values[period..] {
        a = (a * (period_f - 1.0) + tr) / period_f;
        if !a.is_finite() {
            return None;
        }
    }

    Some(a)
}
