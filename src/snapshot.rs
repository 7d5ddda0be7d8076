// =============================================================================
// Snapshot Builder — one monitoring cycle, one output document
// =============================================================================
//
// Orchestrates a full run: read the position book, resolve market data per
// position, run the evaluator, and write the aggregated monitor document
// atomically (tmp + rename) so a reader never observes a partial snapshot.
//
// Failure containment: every position is processed independently. A fetch or
// parse failure for one position becomes an `ERROR` row with zeroed numeric
// fields — the output always carries exactly one row per input position.
// Only a failure to write the final document is surfaced as a run failure.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::engine::{compute_target, TrendSignal};
use crate::evaluator::{self, EvalError, Evaluation};
use crate::indicators::{atr, ema};
use crate::market_data::{Candle, MarketDataProvider};
use crate::positions::Position;
use crate::types::{EvalMode, PositionStatus, Side};

/// One output row per monitored position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub id: String,
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    pub leverage: f64,
    pub current_price: f64,
    pub target_price: f64,
    pub pnl_pct: f64,
    #[serde(rename = "eta_label")]
    pub eta: String,
    pub status: PositionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trend_score: Option<f64>,
    pub date: String,
    pub time: String,
}

/// The aggregated monitor document. `generated_at` is always a string;
/// the pre-first-cycle empty document carries `""`, never null.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorSnapshot {
    #[serde(default)]
    pub generated_at: String,
    pub positions: Vec<PositionReport>,
}

/// Builds and persists monitor snapshots for a fixed configuration.
pub struct SnapshotBuilder {
    cfg: MonitorConfig,
}

impl SnapshotBuilder {
    pub fn new(cfg: MonitorConfig) -> Self {
        Self { cfg }
    }

    /// Evaluate every position and assemble the output document.
    ///
    /// Never fails: per-position errors are captured as `ERROR` rows.
    pub async fn build(
        &self,
        positions: &[Position],
        provider: &dyn MarketDataProvider,
    ) -> MonitorSnapshot {
        let offset = self.wall_clock_offset();
        let now = Utc::now().with_timezone(&offset);
        let date = now.format("%Y-%m-%d").to_string();
        let time = now.format("%H:%M").to_string();

        let mut reports = Vec::with_capacity(positions.len());
        for position in positions {
            let report = match self.evaluate(position, provider).await {
                Ok(eval) => report_from(position, &eval, &date, &time),
                Err(e) => {
                    warn!(id = %position.id, pair = %position.pair, error = %e, "position evaluation failed");
                    error_report(position, &date, &time)
                }
            };
            reports.push(report);
        }

        MonitorSnapshot {
            generated_at: now.format("%Y-%m-%d %H:%M").to_string(),
            positions: reports,
        }
    }

    /// Full cycle: build from the given positions and persist to
    /// `monitor.json`. The write is the only fatal step.
    pub async fn run(
        &self,
        positions: &[Position],
        provider: &dyn MarketDataProvider,
    ) -> Result<MonitorSnapshot> {
        let snapshot = self.build(positions, provider).await;
        write_snapshot(&self.cfg.monitor_path(), &snapshot)?;
        info!(
            positions = snapshot.positions.len(),
            path = %self.cfg.monitor_path().display(),
            "monitor snapshot written"
        );
        Ok(snapshot)
    }

    // -------------------------------------------------------------------------
    // Per-position evaluation
    // -------------------------------------------------------------------------

    async fn evaluate(
        &self,
        position: &Position,
        provider: &dyn MarketDataProvider,
    ) -> Result<Evaluation, EvalError> {
        match self.cfg.eval_mode {
            EvalMode::EngineDriven => self.evaluate_engine(position, provider).await,
            EvalMode::DirectGainCompare => self.evaluate_direct(position, provider).await,
        }
    }

    async fn evaluate_engine(
        &self,
        position: &Position,
        provider: &dyn MarketDataProvider,
    ) -> Result<Evaluation, EvalError> {
        let pair = position.pair.as_str();
        let limit = self.cfg.candle_limit;

        let ticker = provider
            .current_price(pair)
            .await
            .map_err(|e| EvalError::MarketDataUnavailable(e.to_string()))?;

        let candles_1h = provider
            .candles(pair, "1h", limit)
            .await
            .map_err(|e| EvalError::MarketDataUnavailable(e.to_string()))?;
        let candles_4h = provider
            .candles(pair, "4h", limit)
            .await
            .map_err(|e| EvalError::MarketDataUnavailable(e.to_string()))?;

        // No quote anywhere is not an error: the row degrades to a zero
        // current price and stays IN_PROGRESS.
        let current_price = ticker
            .or_else(|| candles_1h.last().map(|c| c.close))
            .unwrap_or(0.0);

        let atr_1h = atr(&candles_1h, self.cfg.atr_period);
        let atr_4h = atr(&candles_4h, self.cfg.atr_period).unwrap_or(0.0);

        let trend = self.trend_signal(&candles_1h, &candles_4h);

        // The target is anchored on the entry price, not the live price: the
        // projected exit is where this trade was expected to go when opened.
        let estimate = compute_target(
            position.side,
            position.entry_price,
            atr_4h,
            atr_1h,
            &trend,
        );

        debug!(
            pair,
            target = estimate.target_price,
            trend_score = estimate.trend_score,
            eta = %estimate.eta,
            "target recomputed"
        );

        Ok(evaluator::evaluate_engine_driven(
            position,
            current_price,
            &estimate,
            self.cfg.hold_threshold,
        ))
    }

    async fn evaluate_direct(
        &self,
        position: &Position,
        provider: &dyn MarketDataProvider,
    ) -> Result<Evaluation, EvalError> {
        let pair = position.pair.as_str();

        let ticker = provider
            .current_price(pair)
            .await
            .map_err(|e| EvalError::MarketDataUnavailable(e.to_string()))?;

        let current_price = match ticker {
            Some(p) => p,
            // Fall back to the last 1h close before giving up on a quote.
            None => provider
                .candles(pair, "1h", 2)
                .await
                .map_err(|e| EvalError::MarketDataUnavailable(e.to_string()))?
                .last()
                .map(|c| c.close)
                .unwrap_or(0.0),
        };

        let target_gain = position
            .target_gain_pct
            .unwrap_or(self.cfg.default_target_gain_pct);

        Ok(evaluator::evaluate_direct_gain(
            position,
            current_price,
            target_gain,
        ))
    }

    fn trend_signal(&self, candles_1h: &[Candle], candles_4h: &[Candle]) -> TrendSignal {
        let closes_1h: Vec<f64> = candles_1h.iter().map(|c| c.close).collect();
        let closes_4h: Vec<f64> = candles_4h.iter().map(|c| c.close).collect();
        TrendSignal {
            ema20_1h: ema(&closes_1h, self.cfg.ema_fast_period),
            ema50_1h: ema(&closes_1h, self.cfg.ema_slow_period),
            ema20_4h: ema(&closes_4h, self.cfg.ema_fast_period),
            ema50_4h: ema(&closes_4h, self.cfg.ema_slow_period),
        }
    }

    fn wall_clock_offset(&self) -> FixedOffset {
        // Clamp keeps the offset inside chrono's valid range, so east_opt
        // cannot fail here.
        let secs = self.cfg.utc_offset_hours.clamp(-23, 23) * 3600;
        FixedOffset::east_opt(secs).unwrap_or(Utc.fix())
    }
}

// -------------------------------------------------------------------------
// Row assembly
// -------------------------------------------------------------------------

fn report_from(position: &Position, eval: &Evaluation, date: &str, time: &str) -> PositionReport {
    PositionReport {
        id: position.id.clone(),
        pair: position.pair.clone(),
        side: position.side,
        entry_price: round6(position.entry_price),
        leverage: position.leverage,
        current_price: round6(eval.current_price),
        target_price: round6(eval.target_price),
        pnl_pct: round2(eval.pnl_pct),
        eta: eval.eta.clone(),
        status: eval.status,
        trend_score: eval.trend_score,
        date: date.to_string(),
        time: time.to_string(),
    }
}

/// Fallback row for a position whose evaluation failed: numeric fields are
/// zeroed but the position never disappears from the document.
fn error_report(position: &Position, date: &str, time: &str) -> PositionReport {
    PositionReport {
        id: position.id.clone(),
        pair: position.pair.clone(),
        side: position.side,
        entry_price: round6(position.entry_price),
        leverage: position.leverage,
        current_price: 0.0,
        target_price: 0.0,
        pnl_pct: 0.0,
        eta: String::new(),
        status: PositionStatus::Error,
        trend_score: None,
        date: date.to_string(),
        time: time.to_string(),
    }
}

fn round6(x: f64) -> f64 {
    (x * 1e6).round() / 1e6
}

fn round2(x: f64) -> f64 {
    (x * 1e2).round() / 1e2
}

// -------------------------------------------------------------------------
// Persistence
// -------------------------------------------------------------------------

/// Atomic snapshot write: serialise to a temporary sibling file, then rename
/// over the target. A failed write leaves the previous snapshot untouched.
pub fn write_snapshot(path: &Path, snapshot: &MonitorSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let content =
        serde_json::to_string_pretty(snapshot).context("failed to serialise monitor snapshot")?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &content)
        .with_context(|| format!("failed to write tmp snapshot to {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to rename tmp snapshot to {}", path.display()))?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::positions::Position;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use std::collections::{HashMap, HashSet};

    /// In-memory provider for exercising the builder without a network.
    #[derive(Default)]
    struct MockProvider {
        prices: RwLock<HashMap<String, f64>>,
        candles: RwLock<HashMap<(String, String), Vec<Candle>>>,
        failing: RwLock<HashSet<String>>,
    }

    impl MockProvider {
        fn set_price(&self, pair: &str, price: f64) {
            self.prices.write().insert(pair.to_string(), price);
        }

        fn set_candles(&self, pair: &str, interval: &str, candles: Vec<Candle>) {
            self.candles
                .write()
                .insert((pair.to_string(), interval.to_string()), candles);
        }

        fn fail(&self, pair: &str) {
            self.failing.write().insert(pair.to_string());
        }
    }

    #[async_trait]
    impl MarketDataProvider for MockProvider {
        async fn current_price(&self, pair: &str) -> Result<Option<f64>> {
            if self.failing.read().contains(pair) {
                return Err(anyhow!("simulated fetch failure for {pair}"));
            }
            Ok(self.prices.read().get(pair).copied())
        }

        async fn candles(&self, pair: &str, interval: &str, _limit: u32) -> Result<Vec<Candle>> {
            if self.failing.read().contains(pair) {
                return Err(anyhow!("simulated fetch failure for {pair}"));
            }
            Ok(self
                .candles
                .read()
                .get(&(pair.to_string(), interval.to_string()))
                .cloned()
                .unwrap_or_default())
        }
    }

    /// `n` identical candles around `base` with a constant true range of 2.
    fn flat_candles(n: usize, base: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| Candle {
                open_time: i as i64 * 3_600_000,
                open: base,
                high: base + 1.0,
                low: base - 1.0,
                close: base,
            })
            .collect()
    }

    fn long_position(id: &str, pair: &str, entry: f64, leverage: f64) -> Position {
        Position {
            id: id.to_string(),
            pair: pair.to_string(),
            side: Side::Long,
            entry_price: entry,
            leverage,
            target_gain_pct: None,
            created_at: None,
        }
    }

    fn builder(mode: EvalMode) -> SnapshotBuilder {
        let mut cfg = MonitorConfig::default();
        cfg.eval_mode = mode;
        SnapshotBuilder::new(cfg)
    }

    #[tokio::test]
    async fn n_positions_in_n_reports_out() {
        let provider = MockProvider::default();
        provider.set_price("BTC", 102.0);
        provider.set_candles("BTC", "1h", flat_candles(60, 100.0));
        provider.set_candles("BTC", "4h", flat_candles(60, 100.0));
        provider.set_price("ETH", 200.0);
        provider.set_candles("ETH", "1h", flat_candles(60, 200.0));
        provider.set_candles("ETH", "4h", flat_candles(60, 200.0));
        provider.fail("SOL"); // one position fails, the batch must not

        let positions = vec![
            long_position("BTC-1", "BTC", 100.0, 2.0),
            long_position("ETH-1", "ETH", 210.0, 3.0),
            long_position("SOL-1", "SOL", 50.0, 5.0),
        ];

        let snapshot = builder(EvalMode::EngineDriven)
            .build(&positions, &provider)
            .await;

        assert_eq!(snapshot.positions.len(), 3);
        assert!(!snapshot.generated_at.is_empty());

        let sol = &snapshot.positions[2];
        assert_eq!(sol.status, PositionStatus::Error);
        assert_eq!(sol.current_price, 0.0);
        assert_eq!(sol.target_price, 0.0);
        assert_eq!(sol.pnl_pct, 0.0);
        assert_eq!(sol.eta, "");
        assert_eq!(sol.id, "SOL-1");
    }

    #[tokio::test]
    async fn engine_mode_hit_with_flat_trend_exits() {
        // Constant-range candles: ATR = 2 on both timeframes, no EMA-50
        // (60 closes >= 50, so ema50 exists and equals the base; separation 0
        // and no strict alignment -> trend_score 0).
        // dist = 2 * 0.90 = 1.8 from entry 100 -> target 101.8; price 102 hits.
        let provider = MockProvider::default();
        provider.set_price("BTC", 102.0);
        provider.set_candles("BTC", "1h", flat_candles(60, 100.0));
        provider.set_candles("BTC", "4h", flat_candles(60, 100.0));

        let positions = vec![long_position("BTC-1", "BTC", 100.0, 2.0)];
        let snapshot = builder(EvalMode::EngineDriven)
            .build(&positions, &provider)
            .await;

        let row = &snapshot.positions[0];
        assert!((row.target_price - 101.8).abs() < 1e-9);
        assert_eq!(row.status, PositionStatus::TargetHitExit);
        assert_eq!(row.trend_score, Some(0.0));
        // pnl = (102/100 - 1) * 100 * 2 = 4.0
        assert!((row.pnl_pct - 4.0).abs() < 1e-9);
        // dist/atr_1h * 1.10 = 0.9 * 1.10 = 0.99 -> clamped to 1h.
        assert_eq!(row.eta, "~1h");
    }

    #[tokio::test]
    async fn engine_mode_below_target_in_progress() {
        let provider = MockProvider::default();
        provider.set_price("BTC", 100.5);
        provider.set_candles("BTC", "1h", flat_candles(60, 100.0));
        provider.set_candles("BTC", "4h", flat_candles(60, 100.0));

        let positions = vec![long_position("BTC-1", "BTC", 100.0, 2.0)];
        let snapshot = builder(EvalMode::EngineDriven)
            .build(&positions, &provider)
            .await;

        assert_eq!(snapshot.positions[0].status, PositionStatus::InProgress);
    }

    #[tokio::test]
    async fn missing_ticker_falls_back_to_last_close() {
        let provider = MockProvider::default();
        provider.set_candles("BTC", "1h", flat_candles(60, 100.0));
        provider.set_candles("BTC", "4h", flat_candles(60, 100.0));

        let positions = vec![long_position("BTC-1", "BTC", 90.0, 1.0)];
        let snapshot = builder(EvalMode::EngineDriven)
            .build(&positions, &provider)
            .await;

        let row = &snapshot.positions[0];
        // Last 1h close is 100.0.
        assert!((row.current_price - 100.0).abs() < 1e-9);
        assert_ne!(row.status, PositionStatus::Error);
    }

    #[tokio::test]
    async fn no_quote_anywhere_degrades_to_zero_price() {
        let provider = MockProvider::default(); // no price, no candles

        let positions = vec![long_position("BTC-1", "BTC", 90.0, 1.0)];
        let snapshot = builder(EvalMode::EngineDriven)
            .build(&positions, &provider)
            .await;

        let row = &snapshot.positions[0];
        assert_eq!(row.current_price, 0.0);
        assert_eq!(row.pnl_pct, 0.0);
        // ATR undefined -> engine rejection -> no target, still in progress.
        assert_eq!(row.target_price, 0.0);
        assert_eq!(row.status, PositionStatus::InProgress);
        assert_eq!(row.eta, "");
    }

    #[tokio::test]
    async fn direct_mode_uses_default_gain() {
        let provider = MockProvider::default();
        // Long 100 @ 5x, price 101 -> pnl 5% >= default 3% -> exit.
        provider.set_price("BTC", 101.0);

        let positions = vec![long_position("BTC-1", "BTC", 100.0, 5.0)];
        let snapshot = builder(EvalMode::DirectGainCompare)
            .build(&positions, &provider)
            .await;

        let row = &snapshot.positions[0];
        assert_eq!(row.status, PositionStatus::TargetHitExit);
        assert_eq!(row.trend_score, None);
        assert_eq!(row.eta, "");
        assert!((row.target_price - 100.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn direct_mode_respects_position_gain() {
        let provider = MockProvider::default();
        provider.set_price("BTC", 101.0);

        let mut pos = long_position("BTC-1", "BTC", 100.0, 5.0);
        pos.target_gain_pct = Some(10.0); // pnl 5% < 10% -> still in progress
        let snapshot = builder(EvalMode::DirectGainCompare)
            .build(&[pos], &provider)
            .await;

        assert_eq!(snapshot.positions[0].status, PositionStatus::InProgress);
    }

    #[tokio::test]
    async fn empty_book_yields_empty_snapshot() {
        let provider = MockProvider::default();
        let snapshot = builder(EvalMode::EngineDriven).build(&[], &provider).await;
        assert!(snapshot.positions.is_empty());
        assert!(!snapshot.generated_at.is_empty());
    }

    #[tokio::test]
    async fn run_writes_snapshot_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = MonitorConfig::default();
        cfg.data_dir = dir.path().to_string_lossy().to_string();
        cfg.eval_mode = EvalMode::DirectGainCompare;

        let provider = MockProvider::default();
        provider.set_price("BTC", 101.0);

        let b = SnapshotBuilder::new(cfg.clone());
        let positions = vec![long_position("BTC-1", "BTC", 100.0, 5.0)];
        let written = b.run(&positions, &provider).await.unwrap();

        let content = std::fs::read_to_string(cfg.monitor_path()).unwrap();
        let read_back: MonitorSnapshot = serde_json::from_str(&content).unwrap();
        assert_eq!(read_back, written);
        // No tmp file left behind after the rename.
        assert!(!cfg.monitor_path().with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn run_fails_when_data_dir_cannot_be_created() {
        let dir = tempfile::tempdir().unwrap();
        // A regular file where the data dir should go makes create_dir_all fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();

        let mut cfg = MonitorConfig::default();
        cfg.data_dir = blocker.join("data").to_string_lossy().to_string();
        cfg.eval_mode = EvalMode::DirectGainCompare;

        let provider = MockProvider::default();
        provider.set_price("BTC", 101.0);

        let b = SnapshotBuilder::new(cfg);
        let positions = vec![long_position("BTC-1", "BTC", 100.0, 5.0)];
        assert!(b.run(&positions, &provider).await.is_err());
    }

    #[tokio::test]
    async fn failed_write_keeps_prior_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = MonitorConfig::default();
        cfg.data_dir = dir.path().to_string_lossy().to_string();
        cfg.eval_mode = EvalMode::DirectGainCompare;

        let prior = r#"{"generated_at":"2026-01-01 00:00","positions":[]}"#;
        std::fs::write(cfg.monitor_path(), prior).unwrap();
        // A directory squatting on the tmp sibling makes the write step fail
        // before the rename can touch the real document.
        std::fs::create_dir(cfg.monitor_path().with_extension("json.tmp")).unwrap();

        let provider = MockProvider::default();
        provider.set_price("BTC", 101.0);

        let b = SnapshotBuilder::new(cfg.clone());
        let positions = vec![long_position("BTC-1", "BTC", 100.0, 5.0)];
        assert!(b.run(&positions, &provider).await.is_err());

        let content = std::fs::read_to_string(cfg.monitor_path()).unwrap();
        assert_eq!(content, prior);
    }

    #[test]
    fn empty_document_serialises_string_timestamp() {
        // The pre-first-cycle document the API serves must carry a string
        // timestamp, never null.
        let doc = serde_json::to_value(MonitorSnapshot::default()).unwrap();
        assert_eq!(doc["generated_at"], serde_json::json!(""));
    }

    #[test]
    fn rounding_helpers() {
        assert_eq!(round6(1.234_567_89), 1.234_568);
        assert_eq!(round2(10.204_081), 10.2);
        assert_eq!(round2(10.205), 10.21);
    }
}
