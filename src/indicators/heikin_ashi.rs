// =============================================================================
// Heikin-Ashi synthetic candles + three-candle reversal pattern
// =============================================================================
//
//   syn_close = (open + high + low + close) / 4
//   syn_open  = (prev_syn_open + prev_syn_close) / 2
//   syn_high  = max(high, syn_open, syn_close)
//   syn_low   = min(low, syn_open, syn_close)
//
// The first candle uses its own open / close as the "previous" pair. Because
// every open depends on the candle before it, the series must be built in
// chronological order in one pass.
// =============================================================================

use crate::types::Candle;

/// Minimum synthetic candles the pattern filter looks at.
const PATTERN_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticCandle {
    pub syn_open: f64,
    pub syn_close: f64,
    pub syn_high: f64,
    pub syn_low: f64,
    pub source: Candle,
}

impl SyntheticCandle {
    pub fn body(&self) -> f64 {
        (self.syn_close - self.syn_open).abs()
    }

    pub fn range(&self) -> f64 {
        self.syn_high - self.syn_low
    }

    pub fn upper_wick(&self) -> f64 {
        self.syn_high - self.syn_open.max(self.syn_close)
    }

    pub fn lower_wick(&self) -> f64 {
        self.syn_open.min(self.syn_close) - self.syn_low
    }

    pub fn is_bullish(&self) -> bool {
        self.syn_close > self.syn_open
    }

    /// Small body with long wicks on both sides.
    fn is_indecision(&self) -> bool {
        let body = self.body();
        body < self.range() * 0.5 && self.upper_wick() > body * 1.5 && self.lower_wick() > body * 1.5
    }

    /// Large body with a short lower wick. Direction is deliberately not
    /// checked here; only the final candle must close up.
    fn is_strong(&self) -> bool {
        let body = self.body();
        body > self.range() * 0.3 && self.lower_wick() < body * 0.3
    }

    fn is_strong_bullish(&self) -> bool {
        self.is_bullish() && self.lower_wick() < self.body() * 0.1
    }
}

/// Build the synthetic series from a chronological candle slice. The input
/// order is taken as-is.
pub fn build_synthetic_candles(candles: &[Candle]) -> Vec<SyntheticCandle> {
    let mut out: Vec<SyntheticCandle> = Vec::with_capacity(candles.len());

    for candle in candles {
        let syn_close = (candle.open + candle.high + candle.low + candle.close) / 4.0;
        let (prev_open, prev_close) = match out.last() {
            Some(prev) => (prev.syn_open, prev.syn_close),
            None => (candle.open, candle.close),
        };
        let syn_open = (prev_open + prev_close) / 2.0;

        out.push(SyntheticCandle {
            syn_open,
            syn_close,
            syn_high: candle.high.max(syn_open).max(syn_close),
            syn_low: candle.low.min(syn_open).min(syn_close),
            source: *candle,
        });
    }

    out
}

/// Indecision, then strong, then strong-bullish, over the three most recent
/// synthetic candles. `false` when fewer than three exist.
pub fn pattern_matches(synthetic: &[SyntheticCandle]) -> bool {
    if synthetic.len() < PATTERN_LEN {
        return false;
    }
    let tail = &synthetic[synthetic.len() - PATTERN_LEN..];
    let (oldest, middle, newest) = (&tail[0], &tail[1], &tail[2]);

    oldest.is_indecision() && middle.is_strong() && newest.is_strong_bullish()
}

/// Synthetic-candle reversal filter over a chronological candle series.
pub fn passes_pattern_filter(candles: &[Candle]) -> bool {
    pattern_matches(&build_synthetic_candles(candles))
}
