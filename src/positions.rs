// =============================================================================
// Position Book — the monitored-operations file
// =============================================================================
//
// Positions are created and removed through the REST surface and read back by
// the snapshot builder every cycle. The backing store is a flat JSON file
// (`positions.json`) written atomically (tmp + rename) so a crash mid-write
// never corrupts the book.
//
// Malformed rows (missing id, pair outside the configured universe, invalid
// side, non-positive entry/leverage) are filtered at load time and never
// reach the core.
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::Side;

/// A monitored leveraged position. Immutable input per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub pair: String,
    pub side: Side,
    pub entry_price: f64,
    pub leverage: f64,
    /// Precomputed target gain% for direct-gain-compare mode; the config
    /// default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_gain_pct: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

/// Failures surfaced to the REST layer.
#[derive(Debug, Error)]
pub enum BookError {
    #[error("{0}")]
    Invalid(String),
    #[error("pair {0} is already being monitored — remove it first")]
    Duplicate(String),
    #[error(transparent)]
    Io(#[from] anyhow::Error),
}

/// On-disk document shape.
#[derive(Debug, Default, Serialize, Deserialize)]
struct BookFile {
    #[serde(default)]
    positions: Vec<RawPosition>,
}

/// Loosely-typed row as found on disk; validation happens in `validate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawPosition {
    #[serde(default)]
    id: String,
    #[serde(default)]
    pair: String,
    #[serde(default)]
    side: String,
    #[serde(default)]
    entry_price: f64,
    #[serde(default)]
    leverage: f64,
    #[serde(default)]
    target_gain_pct: Option<f64>,
    #[serde(default)]
    created_at: Option<String>,
}

/// File-backed book of monitored positions.
pub struct PositionBook {
    path: PathBuf,
    universe: Vec<String>,
    /// Serialises read-modify-write mutations from concurrent API handlers.
    write_lock: Mutex<()>,
}

impl PositionBook {
    pub fn new(path: impl Into<PathBuf>, universe: Vec<String>) -> Self {
        Self {
            path: path.into(),
            universe,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load and validate the book. A missing or unreadable file yields an
    /// empty book rather than an error — the monitor must keep running.
    pub fn load(&self) -> Vec<Position> {
        let raw = self.read_raw();
        let total = raw.positions.len();

        let positions: Vec<Position> = raw
            .positions
            .into_iter()
            .filter_map(|r| self.validate(r))
            .collect();

        if positions.len() < total {
            debug!(
                kept = positions.len(),
                dropped = total - positions.len(),
                "filtered malformed position rows"
            );
        }
        positions
    }

    /// Validate one raw row into a `Position`, or drop it.
    fn validate(&self, raw: RawPosition) -> Option<Position> {
        let id = raw.id.trim().to_string();
        let pair = raw.pair.trim().to_uppercase();
        if id.is_empty() || !self.universe.iter().any(|u| u == &pair) {
            return None;
        }
        let side = Side::parse(&raw.side)?;
        if raw.entry_price <= 0.0 || raw.leverage <= 0.0 {
            return None;
        }
        Some(Position {
            id,
            pair,
            side,
            entry_price: raw.entry_price,
            leverage: raw.leverage,
            target_gain_pct: raw.target_gain_pct.filter(|g| *g > 0.0),
            created_at: raw.created_at,
        })
    }

    /// Add a new position and persist the book.
    ///
    /// The id is `{PAIR}-{unix_millis}`; a pair already present in the book
    /// is rejected so the panel never shows the same coin twice.
    pub fn add(
        &self,
        pair: &str,
        side: &str,
        entry_price: f64,
        leverage: f64,
        target_gain_pct: Option<f64>,
    ) -> Result<Position, BookError> {
        let pair = pair.trim().to_uppercase();
        if pair.is_empty() {
            return Err(BookError::Invalid("pair must not be empty".into()));
        }
        if !self.universe.iter().any(|u| u == &pair) {
            return Err(BookError::Invalid(format!("unsupported pair: {pair}")));
        }
        let side = Side::parse(side)
            .ok_or_else(|| BookError::Invalid("side must be LONG or SHORT".into()))?;
        if !entry_price.is_finite() || entry_price <= 0.0 {
            return Err(BookError::Invalid("entry_price must be positive".into()));
        }
        if !leverage.is_finite() || leverage <= 0.0 {
            return Err(BookError::Invalid("leverage must be positive".into()));
        }

        let _guard = self.write_lock.lock();
        let mut raw = self.read_raw();

        if raw
            .positions
            .iter()
            .any(|p| p.pair.trim().to_uppercase() == pair)
        {
            return Err(BookError::Duplicate(pair));
        }

        let position = Position {
            id: format!("{pair}-{}", Utc::now().timestamp_millis()),
            pair,
            side,
            entry_price,
            leverage,
            target_gain_pct: target_gain_pct.filter(|g| *g > 0.0),
            created_at: Some(Utc::now().to_rfc3339()),
        };

        raw.positions.push(RawPosition {
            id: position.id.clone(),
            pair: position.pair.clone(),
            side: position.side.to_string(),
            entry_price: position.entry_price,
            leverage: position.leverage,
            target_gain_pct: position.target_gain_pct,
            created_at: position.created_at.clone(),
        });
        self.write_raw(&raw)?;

        info!(id = %position.id, pair = %position.pair, side = %position.side, "position added");
        Ok(position)
    }

    /// Remove a position by id; returns how many rows were removed.
    pub fn remove(&self, id: &str) -> Result<usize, BookError> {
        let id = id.trim();
        if id.is_empty() {
            return Err(BookError::Invalid("id must not be empty".into()));
        }

        let _guard = self.write_lock.lock();
        let mut raw = self.read_raw();
        let before = raw.positions.len();
        raw.positions.retain(|p| p.id != id);
        let removed = before - raw.positions.len();
        self.write_raw(&raw)?;

        if removed > 0 {
            info!(id, removed, "position removed");
        }
        Ok(removed)
    }

    // -------------------------------------------------------------------------
    // File I/O
    // -------------------------------------------------------------------------

    fn read_raw(&self) -> BookFile {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => BookFile::default(),
        }
    }

    /// Atomic write: write to a temporary sibling file, then rename.
    fn write_raw(&self, file: &BookFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let content =
            serde_json::to_string_pretty(file).context("failed to serialise position book")?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp book to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("failed to rename tmp book to {}", self.path.display()))?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Vec<String> {
        vec!["BTC".into(), "ETH".into(), "SOL".into()]
    }

    fn temp_book() -> (tempfile::TempDir, PositionBook) {
        let dir = tempfile::tempdir().unwrap();
        let book = PositionBook::new(dir.path().join("positions.json"), universe());
        (dir, book)
    }

    #[test]
    fn missing_file_loads_empty() {
        let (_dir, book) = temp_book();
        assert!(book.load().is_empty());
    }

    #[test]
    fn add_then_load_roundtrip() {
        let (_dir, book) = temp_book();
        let pos = book.add("btc", "long", 50_000.0, 5.0, None).unwrap();
        assert_eq!(pos.pair, "BTC");
        assert_eq!(pos.side, Side::Long);
        assert!(pos.id.starts_with("BTC-"));

        let loaded = book.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].entry_price, 50_000.0);
        assert!(loaded[0].created_at.is_some());
    }

    #[test]
    fn add_rejects_invalid_inputs() {
        let (_dir, book) = temp_book();
        assert!(matches!(
            book.add("", "LONG", 1.0, 1.0, None),
            Err(BookError::Invalid(_))
        ));
        assert!(matches!(
            book.add("DOGE", "LONG", 1.0, 1.0, None),
            Err(BookError::Invalid(_))
        ));
        assert!(matches!(
            book.add("BTC", "SIDEWAYS", 1.0, 1.0, None),
            Err(BookError::Invalid(_))
        ));
        assert!(matches!(
            book.add("BTC", "LONG", 0.0, 1.0, None),
            Err(BookError::Invalid(_))
        ));
        assert!(matches!(
            book.add("BTC", "LONG", 1.0, -3.0, None),
            Err(BookError::Invalid(_))
        ));
    }

    #[test]
    fn add_rejects_duplicate_pair() {
        let (_dir, book) = temp_book();
        book.add("BTC", "LONG", 100.0, 2.0, None).unwrap();
        assert!(matches!(
            book.add("btc", "SHORT", 200.0, 3.0, None),
            Err(BookError::Duplicate(_))
        ));
    }

    #[test]
    fn remove_by_id() {
        let (_dir, book) = temp_book();
        let a = book.add("BTC", "LONG", 100.0, 2.0, None).unwrap();
        book.add("ETH", "SHORT", 200.0, 3.0, None).unwrap();

        assert_eq!(book.remove(&a.id).unwrap(), 1);
        assert_eq!(book.remove(&a.id).unwrap(), 0);

        let left = book.load();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].pair, "ETH");
    }

    #[test]
    fn load_filters_malformed_rows() {
        let (_dir, book) = temp_book();
        let doc = serde_json::json!({
            "positions": [
                { "id": "BTC-1", "pair": "BTC", "side": "LONG", "entry_price": 100.0, "leverage": 2.0 },
                { "id": "",      "pair": "ETH", "side": "LONG", "entry_price": 100.0, "leverage": 2.0 },
                { "id": "X-1",   "pair": "XYZ", "side": "LONG", "entry_price": 100.0, "leverage": 2.0 },
                { "id": "E-1",   "pair": "ETH", "side": "FLAT", "entry_price": 100.0, "leverage": 2.0 },
                { "id": "E-2",   "pair": "ETH", "side": "SHORT", "entry_price": 0.0,  "leverage": 2.0 },
                { "id": "E-3",   "pair": "ETH", "side": "SHORT", "entry_price": 10.0, "leverage": 0.0 }
            ]
        });
        std::fs::write(book.path(), doc.to_string()).unwrap();

        let loaded = book.load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "BTC-1");
    }

    #[test]
    fn corrupt_file_loads_empty() {
        let (_dir, book) = temp_book();
        std::fs::write(book.path(), "{not json").unwrap();
        assert!(book.load().is_empty());
    }

    #[test]
    fn non_positive_target_gain_is_dropped() {
        let (_dir, book) = temp_book();
        let pos = book.add("BTC", "LONG", 100.0, 2.0, Some(-4.0)).unwrap();
        assert_eq!(pos.target_gain_pct, None);
        let pos2 = book.add("ETH", "LONG", 100.0, 2.0, Some(5.0)).unwrap();
        assert_eq!(pos2.target_gain_pct, Some(5.0));
    }
}
