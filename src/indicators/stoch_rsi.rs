// =============================================================================
// Stochastic RSI with %K / %D smoothing
// =============================================================================
//
//   rsi_t   = RSI(close, rsi_period)
//   stoch_t = (rsi_t - min(rsi, stoch_period)) / (max - min) * 100
//   %K      = SMA(stoch, k_smoothing)
//   %D      = SMA(%K, d_smoothing)
//
// A flat RSI window (max == min) yields 50.0, mirroring the neutral value the
// RSI itself reports for a motionless market.
// =============================================================================

use crate::types::Candle;

/// %K must sit below this level for the oscillator stage to pass.
pub const OVERSOLD_K: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochRsiPoint {
    pub stoch_rsi: f64,
    pub k: f64,
    pub d: f64,
}

/// Stochastic-RSI series over chronological `closes`.
///
/// Returns an empty `Vec` when any period is zero or there are fewer than
/// `rsi_period + stoch_period` closes, and also when the smoothing windows
/// leave nothing to report.
pub fn calculate_stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    k_smoothing: usize,
    d_smoothing: usize,
) -> Vec<StochRsiPoint> {
    if rsi_period == 0 || stoch_period == 0 || k_smoothing == 0 || d_smoothing == 0 {
        return Vec::new();
    }
    if closes.len() < rsi_period + stoch_period {
        return Vec::new();
    }

    let rsi = super::rsi::wilder_rsi(closes, rsi_period);
    if rsi.len() < stoch_period {
        return Vec::new();
    }

    let stoch: Vec<f64> = rsi
        .windows(stoch_period)
        .map(|w| {
            let lo = w.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = w.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let last = w[w.len() - 1];
            if hi > lo {
                (last - lo) / (hi - lo) * 100.0
            } else {
                50.0
            }
        })
        .collect();

    let k = sma(&stoch, k_smoothing);
    let d = sma(&k, d_smoothing);

    // d[i] is aligned with k[i + d_smoothing - 1], which is aligned with
    // stoch[i + d_smoothing - 1 + k_smoothing - 1].
    d.iter()
        .enumerate()
        .map(|(i, &d)| StochRsiPoint {
            stoch_rsi: stoch[i + d_smoothing - 1 + k_smoothing - 1],
            k: k[i + d_smoothing - 1],
            d,
        })
        .collect()
}

/// Stochastic-RSI over the close prices of a chronological candle series.
pub fn compute_stochastic_rsi(
    candles: &[Candle],
    rsi_period: usize,
    stoch_period: usize,
    k_smoothing: usize,
    d_smoothing: usize,
) -> Vec<StochRsiPoint> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    calculate_stoch_rsi(&closes, rsi_period, stoch_period, k_smoothing, d_smoothing)
}

/// Oversold turn-up: latest `%K < 20` and `%K > %D`. Fails closed on a short
/// series.
pub fn passes_oscillator(
    candles: &[Candle],
    rsi_period: usize,
    stoch_period: usize,
    k_smoothing: usize,
    d_smoothing: usize,
) -> bool {
    compute_stochastic_rsi(candles, rsi_period, stoch_period, k_smoothing, d_smoothing)
        .last()
        .is_some_and(|p| p.k < OVERSOLD_K && p.k > p.d)
}

fn sma(values: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect()
}
