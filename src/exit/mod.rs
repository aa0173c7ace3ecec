// =============================================================================
// Exit Management Module
// =============================================================================
//
// Polls the single open position and closes it at market once its
// fee-adjusted value crosses the target or the stop.

pub mod monitor;
