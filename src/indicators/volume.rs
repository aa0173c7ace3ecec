// =============================================================================
// 24h traded-value gate
// =============================================================================

use crate::types::Ticker;

/// `true` iff the trailing-24h quote volume is at least `min_volume`.
pub fn passes_volume(ticker: &Ticker, min_volume: f64) -> bool {
    ticker.trailing_24h_quote_volume >= min_volume
}
