// =============================================================================
// Monitor Configuration — JSON settings with atomic save
// =============================================================================
//
// Every tunable lives here so the monitor can be redeployed against another
// data directory or evaluation mode without a code change. All fields carry
// `#[serde(default)]` so adding new fields never breaks loading an older
// config file.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::EvalMode;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_target_gain_pct() -> f64 {
    3.0
}

fn default_candle_limit() -> u32 {
    220
}

fn default_atr_period() -> usize {
    14
}

fn default_ema_fast_period() -> usize {
    20
}

fn default_ema_slow_period() -> usize {
    50
}

fn default_hold_threshold() -> f64 {
    0.75
}

fn default_utc_offset_hours() -> i32 {
    -3
}

fn default_http_timeout_secs() -> u64 {
    12
}

/// The fixed universe of supported base symbols (77 USDT-margined pairs).
fn default_universe() -> Vec<String> {
    [
        "AAVE", "ADA", "APE", "APT", "AR", "ARB", "ATOM", "AVAX", "AXS", "BAT", "BCH", "BLUR",
        "BNB", "BONK", "BTC", "COMP", "CRV", "DASH", "DENT", "DGB", "DOGE", "DOT", "EGLD", "SUI",
        "ETC", "ETH", "FET", "FIL", "FLOKI", "FLOW", "S", "GALA", "GLM", "GRT", "HBAR", "ICP",
        "IMX", "INJ", "IOST", "KAS", "KAVA", "KSM", "LINK", "LTC", "MANA", "POL", "SKY", "NEAR",
        "NEO", "OMG", "ONT", "OP", "ORDI", "PEPE", "QNT", "QTUM", "RENDER", "ROSE", "RUNE",
        "SAND", "SEI", "SHIB", "SNX", "SOL", "STX", "SUSHI", "THETA", "TIA", "TRX", "UNI", "VET",
        "XEM", "XLM", "XRP", "XVS", "ZEC", "ZRX",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// =============================================================================
// MonitorConfig
// =============================================================================

/// Top-level configuration for the exit monitor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Directory holding the position book and the monitor snapshot.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Seconds between monitoring cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Which target-hit strategy to run.
    #[serde(default)]
    pub eval_mode: EvalMode,

    /// Default target gain% for direct-gain-compare mode, used when a
    /// position carries no target of its own.
    #[serde(default = "default_target_gain_pct")]
    pub default_target_gain_pct: f64,

    /// How many candles to request per timeframe.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: u32,

    /// Wilder ATR look-back.
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    /// Fast/slow EMA look-backs for the crossover signal.
    #[serde(default = "default_ema_fast_period")]
    pub ema_fast_period: usize,
    #[serde(default = "default_ema_slow_period")]
    pub ema_slow_period: usize,

    /// Trend score at or above which a hit target recommends holding.
    #[serde(default = "default_hold_threshold")]
    pub hold_threshold: f64,

    /// Wall-clock offset for snapshot timestamps (default UTC-3).
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// HTTP timeout for exchange requests.
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Supported base symbols; positions on anything else are filtered out.
    #[serde(default = "default_universe")]
    pub universe: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            poll_interval_secs: default_poll_interval_secs(),
            eval_mode: EvalMode::default(),
            default_target_gain_pct: default_target_gain_pct(),
            candle_limit: default_candle_limit(),
            atr_period: default_atr_period(),
            ema_fast_period: default_ema_fast_period(),
            ema_slow_period: default_ema_slow_period(),
            hold_threshold: default_hold_threshold(),
            utc_offset_hours: default_utc_offset_hours(),
            http_timeout_secs: default_http_timeout_secs(),
            universe: default_universe(),
        }
    }
}

impl MonitorConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// A missing file is an error so the caller can fall back to defaults
    /// with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read monitor config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse monitor config from {}", path.display()))?;

        info!(
            path = %path.display(),
            eval_mode = %config.eval_mode,
            poll_interval_secs = config.poll_interval_secs,
            universe = config.universe.len(),
            "monitor config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration using an atomic write (write to `.tmp`,
    /// then rename) so a crash mid-write never corrupts it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise monitor config")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "monitor config saved (atomic)");
        Ok(())
    }

    /// Path of the position book inside the data dir.
    pub fn positions_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("positions.json")
    }

    /// Path of the monitor snapshot inside the data dir.
    pub fn monitor_path(&self) -> PathBuf {
        Path::new(&self.data_dir).join("monitor.json")
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = MonitorConfig::default();
        assert_eq!(cfg.eval_mode, EvalMode::EngineDriven);
        assert_eq!(cfg.poll_interval_secs, 60);
        assert!((cfg.default_target_gain_pct - 3.0).abs() < f64::EPSILON);
        assert_eq!(cfg.candle_limit, 220);
        assert_eq!(cfg.atr_period, 14);
        assert_eq!(cfg.ema_fast_period, 20);
        assert_eq!(cfg.ema_slow_period, 50);
        assert!((cfg.hold_threshold - 0.75).abs() < f64::EPSILON);
        assert_eq!(cfg.utc_offset_hours, -3);
        assert_eq!(cfg.universe.len(), 77);
        assert!(cfg.universe.iter().any(|s| s == "BTC"));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: MonitorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.eval_mode, EvalMode::EngineDriven);
        assert_eq!(cfg.universe.len(), 77);
        assert_eq!(cfg.poll_interval_secs, 60);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "eval_mode": "direct-gain-compare", "universe": ["BTC"] }"#;
        let cfg: MonitorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.eval_mode, EvalMode::DirectGainCompare);
        assert_eq!(cfg.universe, vec!["BTC"]);
        assert_eq!(cfg.candle_limit, 220);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = MonitorConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: MonitorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.universe, cfg2.universe);
        assert_eq!(cfg.eval_mode, cfg2.eval_mode);
        assert_eq!(cfg.poll_interval_secs, cfg2.poll_interval_secs);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor_config.json");

        let mut cfg = MonitorConfig::default();
        cfg.poll_interval_secs = 30;
        cfg.save(&path).unwrap();

        let loaded = MonitorConfig::load(&path).unwrap();
        assert_eq!(loaded.poll_interval_secs, 30);
    }

    #[test]
    fn data_paths_derive_from_dir() {
        let mut cfg = MonitorConfig::default();
        cfg.data_dir = "/tmp/sentinel".into();
        assert_eq!(
            cfg.positions_path(),
            PathBuf::from("/tmp/sentinel/positions.json")
        );
        assert_eq!(cfg.monitor_path(), PathBuf::from("/tmp/sentinel/monitor.json"));
    }
}
