// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators behind the
// selection filters. Series functions return an empty `Vec` on insufficient
// data; filter predicates fail closed (`false`) in the same situation, so no
// caller ever has to handle a panic from a short candle window.
//
// All candle inputs are chronological (oldest first).

pub mod ema;
pub mod heikin_ashi;
pub mod rsi;
pub mod stoch_rsi;
pub mod volume;
