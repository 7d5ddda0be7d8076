// =============================================================================
// Position Evaluator — gain computation, target-hit detection, status rules
// =============================================================================
//
// Two named strategies, selected per run by `EvalMode`:
//
//   engine-driven        price is compared against a target recomputed every
//                        cycle by the target/ETA engine; a hit in a strong
//                        trend recommends holding instead of exiting.
//
//   direct-gain-compare  the live leveraged gain is compared against a
//                        precomputed target gain percentage; no candles, no
//                        engine, and a hit always recommends exiting (there
//                        is no trend information to justify holding).
//
// Both strategies are pure over their inputs; all fetching lives in the
// snapshot builder.
// =============================================================================

use thiserror::Error;

use crate::engine::TargetEstimate;
use crate::positions::Position;
use crate::types::{PositionStatus, Side};

/// Per-position failure. Failures never abort the batch; the snapshot
/// builder converts them into an `ERROR` row.
///
/// Insufficient indicator data and degenerate numeric inputs degrade to
/// neutral results upstream (`Option::None` indicators, the engine's
/// rejection triple), so the only hard per-position failure is the fetch.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The external price/candle fetch failed for this position.
    #[error("market data unavailable: {0}")]
    MarketDataUnavailable(String),
}

/// Everything the snapshot builder needs to render one output row.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub current_price: f64,
    pub target_price: f64,
    pub eta: String,
    /// Present only in engine-driven mode.
    pub trend_score: Option<f64>,
    pub pnl_pct: f64,
    pub status: PositionStatus,
}

/// Leveraged ROE% relative to entry (no fees).
///
/// `LONG -> (current/entry - 1)`, `SHORT -> (entry/current - 1)`, each
/// `* 100 * leverage`. Returns `0.0` when any input is non-positive.
pub fn pnl_pct(side: Side, entry: f64, current: f64, leverage: f64) -> f64 {
    if entry <= 0.0 || current <= 0.0 || leverage <= 0.0 {
        return 0.0;
    }
    let raw = match side {
        Side::Long => current / entry - 1.0,
        Side::Short => entry / current - 1.0,
    };
    raw * 100.0 * leverage
}

/// Target-hit predicate: `current >= target` for longs, `current <= target`
/// for shorts, and never for a zero/rejected target.
pub fn target_hit(side: Side, current: f64, target: f64) -> bool {
    if target <= 0.0 {
        return false;
    }
    match side {
        Side::Long => current >= target,
        Side::Short => current <= target,
    }
}

/// Engine-driven evaluation: the estimate comes from
/// [`crate::engine::compute_target`] run against fresh candles.
///
/// `hold_threshold` is the trend score at or above which a hit target turns
/// into a hold recommendation rather than an exit.
pub fn evaluate_engine_driven(
    position: &Position,
    current_price: f64,
    estimate: &TargetEstimate,
    hold_threshold: f64,
) -> Evaluation {
    let pnl = pnl_pct(
        position.side,
        position.entry_price,
        current_price,
        position.leverage,
    );

    let status = if target_hit(position.side, current_price, estimate.target_price) {
        if estimate.trend_score >= hold_threshold {
            PositionStatus::TargetHitHold
        } else {
            PositionStatus::TargetHitExit
        }
    } else {
        PositionStatus::InProgress
    };

    Evaluation {
        current_price,
        target_price: estimate.target_price,
        eta: estimate.eta.clone(),
        trend_score: Some(estimate.trend_score),
        pnl_pct: pnl,
        status,
    }
}

/// Direct-gain-compare evaluation: hit when the live leveraged gain reaches
/// `target_gain_pct`. The reported target price is the implied price at which
/// that gain is reached.
pub fn evaluate_direct_gain(
    position: &Position,
    current_price: f64,
    target_gain_pct: f64,
) -> Evaluation {
    let pnl = pnl_pct(
        position.side,
        position.entry_price,
        current_price,
        position.leverage,
    );

    let target_price = implied_target_price(
        position.side,
        position.entry_price,
        position.leverage,
        target_gain_pct,
    );

    let status = if current_price > 0.0 && target_gain_pct > 0.0 && pnl >= target_gain_pct {
        PositionStatus::TargetHitExit
    } else {
        PositionStatus::InProgress
    };

    Evaluation {
        current_price,
        target_price,
        eta: String::new(),
        trend_score: None,
        pnl_pct: pnl,
        status,
    }
}

/// Invert the ROE formula: the price at which a position reaches `gain_pct`.
///
/// `LONG: entry * (1 + g/(100*lev))`, `SHORT: entry / (1 + g/(100*lev))`.
/// Returns `0.0` for degenerate inputs.
pub fn implied_target_price(side: Side, entry: f64, leverage: f64, gain_pct: f64) -> f64 {
    if entry <= 0.0 || leverage <= 0.0 || gain_pct <= 0.0 {
        return 0.0;
    }
    let raw = 1.0 + gain_pct / (100.0 * leverage);
    match side {
        Side::Long => entry * raw,
        Side::Short => entry / raw,
    }
}
