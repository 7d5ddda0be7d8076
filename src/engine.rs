// =============================================================================
// Target / ETA Engine
// =============================================================================
//
// Turns recent volatility (Wilder ATR on the 4h timeframe) and dual-timeframe
// EMA crossover strength into a projected exit price, a qualitative
// time-to-target label, and a normalised trend score.
//
// The projected distance scales with trend conviction:
//   mult = 0.90 + 0.70 * trend_score            (stronger trend, farther target)
// and is dampened by 15% when short-term volatility is unusually choppy
// (1h ATR above 3% of price). The distance is floored at 0.5% of price so a
// dead market never produces a sub-noise target.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Side;

/// EMA crossover readings on the two timeframes the engine consumes.
/// Derived fresh each cycle, never persisted.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TrendSignal {
    pub ema20_1h: Option<f64>,
    pub ema50_1h: Option<f64>,
    pub ema20_4h: Option<f64>,
    pub ema50_4h: Option<f64>,
}

/// Output of [`compute_target`]. The canonical rejection value is
/// `{ target_price: 0.0, eta: "", trend_score: 0.0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetEstimate {
    pub target_price: f64,
    /// `"~Nh"` / `"~Nd"`, or empty when the 1h ATR is unavailable.
    pub eta: String,
    /// Combined EMA-separation strength and alignment, clamped to [0, 1].
    pub trend_score: f64,
}

impl TargetEstimate {
    fn rejected() -> Self {
        Self {
            target_price: 0.0,
            eta: String::new(),
            trend_score: 0.0,
        }
    }
}

/// EMA-separation normaliser: a ~0.6% gap between the 4h EMAs saturates
/// trend strength at 1.0.
const STRENGTH_SCALE: f64 = 160.0;
/// Weighting of separation strength vs directional alignment.
const STRENGTH_WEIGHT: f64 = 0.65;
const ALIGNMENT_WEIGHT: f64 = 0.35;
/// 1h-ATR/price ratio above which the target distance is dampened.
const CHOPPY_VOL_RATIO: f64 = 0.03;
const CHOPPY_DAMPING: f64 = 0.85;
/// Minimum target distance as a fraction of price.
const MIN_DIST_PCT: f64 = 0.005;
/// ETA bounds in hours.
const ETA_MIN_HOURS: f64 = 1.0;
const ETA_MAX_HOURS: f64 = 96.0;

/// Compute the target price, ETA label and trend score for a position.
///
/// Rejects with the canonical `(0.0, "", 0.0)` triple when `price` or
/// `atr_4h` is non-positive or any input is non-finite; callers treat that as
/// "no target this cycle", not as an error.
pub fn compute_target(
    side: Side,
    price: f64,
    atr_4h: f64,
    atr_1h: Option<f64>,
    trend: &TrendSignal,
) -> TargetEstimate {
    if !price.is_finite() || !atr_4h.is_finite() || price <= 0.0 || atr_4h <= 0.0 {
        return TargetEstimate::rejected();
    }
    let atr_1h = match atr_1h {
        Some(a) if !a.is_finite() => return TargetEstimate::rejected(),
        other => other,
    };
    if [trend.ema20_1h, trend.ema50_1h, trend.ema20_4h, trend.ema50_4h]
        .iter()
        .flatten()
        .any(|e| !e.is_finite())
    {
        return TargetEstimate::rejected();
    }

    let trend_score = trend_score(side, price, trend);

    // --- Distance multiplier -------------------------------------------------
    let mut mult = 0.90 + 0.70 * trend_score;
    if let Some(a1) = atr_1h {
        if a1 > 0.0 && a1 / price > CHOPPY_VOL_RATIO {
            mult *= CHOPPY_DAMPING;
        }
    }

    let dist = (atr_4h * mult).max(price * MIN_DIST_PCT);

    let target_price = match side {
        Side::Long => price + dist,
        Side::Short => price - dist,
    };

    // --- ETA -----------------------------------------------------------------
    let eta = match atr_1h {
        Some(a1) if a1 > 0.0 => {
            let eta_h =
                (dist / a1 * (1.10 - 0.25 * trend_score)).clamp(ETA_MIN_HOURS, ETA_MAX_HOURS);
            if eta_h < 24.0 {
                format!("~{}h", eta_h.round() as i64)
            } else {
                format!("~{}d", (eta_h / 24.0).round() as i64)
            }
        }
        _ => String::new(),
    };

    TargetEstimate {
        target_price,
        eta,
        trend_score,
    }
}

/// Combined trend score in [0, 1]: 65% EMA-separation strength on the 4h
/// timeframe, 35% directional alignment across both timeframes.
///
/// Returns 0.0 when either 4h EMA is missing — the 1h crossover alone never
/// produces conviction.
fn trend_score(side: Side, price: f64, trend: &TrendSignal) -> f64 {
    let (Some(e20_4), Some(e50_4)) = (trend.ema20_4h, trend.ema50_4h) else {
        return 0.0;
    };

    let strength = ((e20_4 - e50_4).abs() / price * STRENGTH_SCALE).clamp(0.0, 1.0);

    let ok4 = aligned(side, e20_4, e50_4);
    let ok1 = match (trend.ema20_1h, trend.ema50_1h) {
        (Some(e20_1), Some(e50_1)) => aligned(side, e20_1, e50_1),
        _ => false,
    };

    let alignment = if ok1 && ok4 {
        1.0
    } else if ok4 {
        0.6
    } else if ok1 {
        0.3
    } else {
        0.0
    };

    (STRENGTH_WEIGHT * strength + ALIGNMENT_WEIGHT * alignment).clamp(0.0, 1.0)
}

/// Fast-over-slow for longs, fast-under-slow for shorts.
fn aligned(side: Side, fast: f64, slow: f64) -> bool {
    match side {
        Side::Long => fast > slow,
        Side::Short => fast < slow,
    }
}
