// =============================================================================
// Shared types used across the exit-sentinel monitor
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a leveraged futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Parse from the loose string form found in the operations file.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LONG" => Some(Self::Long),
            "SHORT" => Some(Self::Short),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// How a position is judged against its target.
///
/// `EngineDriven` recomputes the target from live volatility and trend every
/// cycle. `DirectGainCompare` skips the engine and compares the live leveraged
/// gain against a precomputed target gain percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvalMode {
    EngineDriven,
    DirectGainCompare,
}

impl Default for EvalMode {
    fn default() -> Self {
        Self::EngineDriven
    }
}

impl std::fmt::Display for EvalMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EngineDriven => write!(f, "engine-driven"),
            Self::DirectGainCompare => write!(f, "direct-gain-compare"),
        }
    }
}

/// Situational status assigned to a position each monitoring cycle.
///
/// There is no persisted state machine: every cycle starts from `InProgress`
/// and at most one transition is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    InProgress,
    /// Target reached but the trend is still strong — recommend staying in.
    TargetHitHold,
    /// Target reached — recommend taking profit.
    TargetHitExit,
    /// Evaluation failed for this position this cycle.
    Error,
}

impl Default for PositionStatus {
    fn default() -> Self {
        Self::InProgress
    }
}

impl std::fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::TargetHitHold => write!(f, "TARGET_HIT_HOLD"),
            Self::TargetHitExit => write!(f, "TARGET_HIT_EXIT"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}
