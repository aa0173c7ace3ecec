// =============================================================================
// Wilder RSI — feeds the Stochastic RSI stage
// =============================================================================
//
// The first `period` close-to-close changes seed plain averages of gains and
// losses; each later change is folded in with Wilder's smoothing
//
//   avg = (avg * (period - 1) + change) / period
//
// and RSI = 100 - 100 / (1 + avg_gain / avg_loss).
//
// Output alignment: `rsi[i]` describes `closes[i + period]`, so a series of
// `n` closes yields `n - period` values and its last value always belongs to
// the latest close.
// =============================================================================

/// Running Wilder averages of gains and losses.
#[derive(Debug, Clone, Copy)]
struct WilderAverages {
    period: f64,
    gain: f64,
    loss: f64,
}

impl WilderAverages {
    fn seed(changes: &[f64]) -> Self {
        let period = changes.len() as f64;
        let gain: f64 = changes.iter().map(|c| c.max(0.0)).sum();
        let loss: f64 = changes.iter().map(|c| (-c).max(0.0)).sum();
        Self {
            period,
            gain: gain / period,
            loss: loss / period,
        }
    }

    fn push(&mut self, change: f64) {
        self.gain = (self.gain * (self.period - 1.0) + change.max(0.0)) / self.period;
        self.loss = (self.loss * (self.period - 1.0) + (-change).max(0.0)) / self.period;
    }

    /// 50 for a motionless window, 100 when nothing was lost.
    fn rsi(&self) -> f64 {
        match (self.gain == 0.0, self.loss == 0.0) {
            (true, true) => 50.0,
            (_, true) => 100.0,
            _ => 100.0 - 100.0 / (1.0 + self.gain / self.loss),
        }
    }
}

/// RSI series over chronological `closes`. Empty when `period` is zero or
/// fewer than `period + 1` closes are given. Stops at the first non-finite
/// value.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || closes.len() <= period {
        return Vec::new();
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let (seed, rest) = changes.split_at(period);

    let mut averages = WilderAverages::seed(seed);
    let mut out = Vec::with_capacity(rest.len() + 1);
    out.push(averages.rsi());
    for &change in rest {
        averages.push(change);
        out.push(averages.rsi());
    }

    match out.iter().position(|v| !v.is_finite()) {
        Some(cut) => {
            out.truncate(cut);
            out
        }
        None => out,
    }
}
