// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the target engine
// consumes. Every public function returns `Option<f64>` so callers are forced
// to handle insufficient-data and numerical-edge-case scenarios.

pub mod atr;
pub mod ema;

pub use atr::atr;
pub use ema::ema;
