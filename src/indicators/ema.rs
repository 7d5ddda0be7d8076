// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = value_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period`
// values.
// =============================================================================

/// Compute the most recent EMA value for `values` with look-back `period`.
///
/// # Returns
/// `None` when:
/// - `period` is zero (division-by-zero guard).
/// - There are fewer than `period` values — a value is never fabricated from
///   insufficient data.
/// - Any intermediate value is non-finite.
///
/// When `values.len() == period` the result is exactly the SMA seed.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let seed: f64 = values[..period].iter().sum::<f64>() / period as f64;
    if !seed.is_finite() {
        return None;
    }

    let mut e = seed;
    for &v in &values[period..] {
        e = v * multiplier + e * (1.0 - multiplier);
        if !e.is_finite() {
            return None;
        }
    }

    Some(e)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(ema(&[], 5).is_none());
    }

    #[test]
    fn ema_period_zero() {
        assert!(ema(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(ema(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn ema_period_equals_length_is_sma() {
        // Seed only: (2+4+6)/3 = 4.0
        let result = ema(&[2.0, 4.0, 6.0], 3).unwrap();
        assert!((result - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: SMA of first 5 = 3.0, multiplier = 2/6.
        let values: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let result = ema(&values, 5).unwrap();

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        for &v in &values[5..] {
            expected = v * mult + expected * (1.0 - mult);
        }
        assert!(
            (result - expected).abs() < 1e-10,
            "got {result}, expected {expected}"
        );
    }

    #[test]
    fn ema_tracks_rising_series() {
        let values: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let e20 = ema(&values, 20).unwrap();
        let e50 = ema(&values, 50).unwrap();
        // Faster EMA sits closer to the latest price on a steady up-trend.
        assert!(e20 > e50);
        assert!(e20 < 100.0);
    }

    #[test]
    fn ema_nan_returns_none() {
        let values = vec![1.0, 2.0, 3.0, f64::NAN, 5.0];
        assert!(ema(&values, 3).is_none());
    }
}
