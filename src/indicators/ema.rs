// =============================================================================
// Exponential Moving Average (EMA) + trend-position filter
// =============================================================================
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The very first EMA value is seeded with the SMA of the first `period` closes.
// =============================================================================

use crate::types::Candle;

/// Compute the EMA series for the given `closes` slice and look-back `period`.
///
/// Returns an empty `Vec` when the input is too short or the period is zero.
/// Output is chronological; each element corresponds to a close starting at
/// index `period - 1`.
pub fn calculate_ema(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period + 1) as f64;

    // Seed: SMA of the first `period` values.
    let sma: f64 = closes[..period].iter().sum::<f64>() / period as f64;
    if !sma.is_finite() {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(closes.len() - period + 1);
    result.push(sma);

    let mut prev_ema = sma;
    for &close in &closes[period..] {
        let ema = (close - prev_ema) * multiplier + prev_ema;
        if !ema.is_finite() {
            // Downstream consumers should not trust a broken series.
            break;
        }
        result.push(ema);
        prev_ema = ema;
    }

    result
}

/// EMA over the close prices of a chronological candle series, returned
/// **newest first** (`[0]` is the EMA at the latest candle).
pub fn compute_ema(candles: &[Candle], period: usize) -> Vec<f64> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    let mut ema = calculate_ema(&closes, period);
    ema.reverse();
    ema
}

/// Trend confirmation: the latest candle's low must sit at or above the latest
/// EMA value.
///
/// `proximity` is the optional refinement toggle. `None` leaves the filter as
/// a plain above-the-line check; `Some(t)` additionally requires
/// `|low - ema| <= ema * t`.
pub fn passes_trend_position(candles: &[Candle], period: usize, proximity: Option<f64>) -> bool {
    let ema = compute_ema(candles, period);
    let (Some(&latest_ema), Some(latest)) = (ema.first(), candles.last()) else {
        return false;
    };

    let above = latest.low >= latest_ema;
    match proximity {
        Some(threshold) => above && (latest.low - latest_ema).abs() <= latest_ema * threshold,
        None => above,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn candles_from_closes(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle::new(c, c, c, c, i as i64 * 60_000))
            .collect()
    }

    // ---- calculate_ema ---------------------------------------------------

    #[test]
    fn ema_empty_input() {
        assert!(calculate_ema(&[], 5).is_empty());
    }

    #[test]
    fn ema_period_zero() {
        assert!(calculate_ema(&[1.0, 2.0, 3.0], 0).is_empty());
    }

    #[test]
    fn ema_insufficient_data() {
        assert!(calculate_ema(&[1.0, 2.0], 5).is_empty());
    }

    #[test]
    fn ema_period_equals_length() {
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert_eq!(ema.len(), 1);
        assert!((ema[0] - 4.0).abs() < 1e-10);
    }

    #[test]
    fn ema_known_values() {
        // 5-period EMA of [1..=10]: SMA seed 3.0, multiplier 1/3.
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5);
        assert_eq!(ema.len(), 6);

        let mult = 2.0 / 6.0;
        let mut expected = 3.0;
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = (c - expected) * mult + expected;
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_handles_nan_in_input() {
        let ema = calculate_ema(&[1.0, 2.0, 3.0, f64::NAN, 5.0], 3);
        assert_eq!(ema.len(), 1);
    }

    // ---- compute_ema -----------------------------------------------------

    #[test]
    fn compute_ema_is_newest_first() {
        let candles = candles_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let ema = compute_ema(&candles, 3);
        assert_eq!(ema.len(), 4);
        // Seed (oldest) is SMA(1,2,3) = 2.0 and lands last.
        assert!((ema[3] - 2.0).abs() < 1e-10);
        assert!(ema[0] > ema[3]);
    }

    #[test]
    fn compute_ema_short_window_is_empty() {
        let candles = candles_from_closes(&[1.0; 10]);
        assert!(compute_ema(&candles, 200).is_empty());
    }

    // ---- passes_trend_position -------------------------------------------

    #[test]
    fn trend_rising_series_passes() {
        let closes: Vec<f64> = (1..=60).map(|x| x as f64).collect();
        let candles = candles_from_closes(&closes);
        assert!(passes_trend_position(&candles, 20, None));
    }

    #[test]
    fn trend_falling_series_fails() {
        let closes: Vec<f64> = (1..=60).rev().map(|x| x as f64).collect();
        let candles = candles_from_closes(&closes);
        assert!(!passes_trend_position(&candles, 20, None));
    }

    #[test]
    fn trend_insufficient_history_fails_closed() {
        let candles = candles_from_closes(&[5.0; 10]);
        assert!(!passes_trend_position(&candles, 200, None));
    }

    #[test]
    fn proximity_refinement_rejects_far_above() {
        // Flat at 100 then a jump to 200: low is far above the EMA.
        let mut closes = vec![100.0; 30];
        closes.push(200.0);
        let candles = candles_from_closes(&closes);
        assert!(passes_trend_position(&candles, 20, None));
        assert!(!passes_trend_position(&candles, 20, Some(0.035)));
    }

    #[test]
    fn proximity_refinement_accepts_near_line() {
        let mut closes = vec![100.0; 30];
        closes.push(101.0);
        let candles = candles_from_closes(&closes);
        assert!(passes_trend_position(&candles, 20, Some(0.035)));
    }
}
