// =============================================================================
// Application State — shared between the monitor loop and the REST surface
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::MonitorConfig;
use crate::positions::PositionBook;
use crate::snapshot::MonitorSnapshot;

/// Shared state behind an `Arc`, cloned into every task and handler.
pub struct AppState {
    pub config: RwLock<MonitorConfig>,
    pub book: Arc<PositionBook>,
    /// Result of the most recent monitoring cycle, if any.
    pub last_snapshot: RwLock<Option<MonitorSnapshot>>,
    /// Completed monitoring cycles since startup.
    pub cycles: AtomicU64,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(config: MonitorConfig) -> Arc<Self> {
        let book = Arc::new(PositionBook::new(
            config.positions_path(),
            config.universe.clone(),
        ));
        Arc::new(Self {
            config: RwLock::new(config),
            book,
            last_snapshot: RwLock::new(None),
            cycles: AtomicU64::new(0),
            start_time: Utc::now(),
        })
    }

    /// Record the outcome of one monitoring cycle.
    pub fn record_snapshot(&self, snapshot: MonitorSnapshot) {
        *self.last_snapshot.write() = Some(snapshot);
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
