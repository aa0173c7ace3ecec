// =============================================================================
// Position Monitor — one-second poll until target or stop is crossed
// =============================================================================
//
// State machine per position:
//
//   HOLDING ──value >= target──> TARGET_HIT ──sell ok──> CLOSED
//   HOLDING ──value <= stop────> STOP_HIT ────sell ok──> CLOSED
//   TARGET_HIT / STOP_HIT ──sell failed──> HOLDING (retried next tick)
//
// The value compared against the thresholds is the fee-adjusted proceeds of
// selling the whole position at the last traded price. Target is checked
// before stop.
//
// A failed price read triggers a best-effort safety sell and polling carries
// on. Once a safety sell is accepted the holding is gone: no further sells are
// submitted and the next crossed threshold closes the position as is. After a
// configurable run of consecutive exit failures an escalation hook fires.
// =============================================================================

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::TradeError;
use crate::exchange::ExchangeClient;
use crate::execution::{adjust_for_fee, OrderExecutor};
use crate::types::{ExitReason, OrderSide, Position, TradeRecord};

/// Poll cadence.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Ticks between periodic status lines.
const DIAGNOSTIC_EVERY: u64 = 1000;

/// Zero-based tick index; the first tick reports.
fn is_diagnostic_tick(tick: u64) -> bool {
    tick % DIAGNOSTIC_EVERY == 0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Holding,
    TargetHit,
    StopHit,
    Closed,
}

impl From<ExitReason> for MonitorState {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::TargetHit => Self::TargetHit,
            ExitReason::StopHit => Self::StopHit,
        }
    }
}

/// Threshold check for one observed fee-adjusted value. Target wins ties.
pub fn evaluate_exit(position: &Position, adjusted_value: f64) -> Option<ExitReason> {
    if adjusted_value >= position.target_price {
        Some(ExitReason::TargetHit)
    } else if adjusted_value <= position.stop_price {
        Some(ExitReason::StopHit)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// Notified when exits keep failing for an open position.
pub trait EscalationHook: Send + Sync {
    fn exits_failing(&self, position: &Position, consecutive_failures: u32, last_error: &TradeError);
}

/// Default hook: an `error!` line an operator can alert on.
pub struct LogEscalation;

impl EscalationHook for LogEscalation {
    fn exits_failing(&self, position: &Position, consecutive_failures: u32, last_error: &TradeError) {
        error!(
            instrument = %position.instrument_id,
            quantity = position.quantity,
            consecutive_failures,
            error = %last_error,
            "exit orders keep failing; position still open"
        );
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct PositionMonitor {
    client: Arc<dyn ExchangeClient>,
    executor: Arc<OrderExecutor>,
    escalation_threshold: u32,
    escalation: Arc<dyn EscalationHook>,
}

impl PositionMonitor {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        executor: Arc<OrderExecutor>,
        escalation_threshold: u32,
        escalation: Arc<dyn EscalationHook>,
    ) -> Self {
        Self {
            client,
            executor,
            escalation_threshold,
            escalation,
        }
    }

    /// Poll until the position closes and return its record. Does not return
    /// while the position is still held.
    pub async fn run(&self, position: Position) -> TradeRecord {
        info!(
            instrument = %position.instrument_id,
            quantity = position.quantity,
            target = position.target_price,
            stop = position.stop_price,
            "monitoring position"
        );

        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks: u64 = 0;
        let mut consecutive_failures: u32 = 0;
        let mut safety_exit: Option<String> = None;

        loop {
            ticker.tick().await;
            let tick = ticks;
            ticks += 1;

            let quote = match self.client.get_ticker(&position.instrument_id).await {
                Ok(quote) => quote,
                Err(e) if safety_exit.is_some() => {
                    warn!(instrument = %position.instrument_id, error = %e, "price read failed; already liquidated");
                    continue;
                }
                Err(e) => {
                    error!(
                        instrument = %position.instrument_id,
                        error = %e,
                        "price read failed; attempting safety exit"
                    );
                    match self.executor.exit(&position.instrument_id, position.quantity).await {
                        Ok(ack) => {
                            consecutive_failures = 0;
                            warn!(order_id = %ack.order_id, "safety exit submitted; still polling");
                            safety_exit = Some(ack.order_id);
                        }
                        Err(e) => {
                            self.record_failure(&position, &mut consecutive_failures, &e);
                        }
                    }
                    continue;
                }
            };

            let value = adjust_for_fee(quote.last_price * position.quantity, OrderSide::Sell);

            if is_diagnostic_tick(tick) {
                info!(
                    instrument = %position.instrument_id,
                    tick,
                    value,
                    target = position.target_price,
                    stop = position.stop_price,
                    "position status"
                );
            }

            let Some(reason) = evaluate_exit(&position, value) else {
                continue;
            };

            let mut state = MonitorState::from(reason);
            debug!(instrument = %position.instrument_id, ?state, value, "threshold crossed");

            if let Some(order_id) = &safety_exit {
                state = MonitorState::Closed;
                info!(
                    instrument = %position.instrument_id,
                    order_id = %order_id,
                    %reason,
                    value,
                    ?state,
                    "position already liquidated by safety exit"
                );
                return Self::record(&position, reason, value);
            }

            match self.executor.exit(&position.instrument_id, position.quantity).await {
                Ok(ack) => {
                    state = MonitorState::Closed;
                    info!(
                        instrument = %position.instrument_id,
                        order_id = %ack.order_id,
                        %reason,
                        value,
                        ?state,
                        "position closed"
                    );
                    return Self::record(&position, reason, value);
                }
                Err(e) => {
                    state = MonitorState::Holding;
                    debug!(?state, "exit failed; back to holding");
                    self.record_failure(&position, &mut consecutive_failures, &e);
                }
            }
        }
    }

    fn record(position: &Position, reason: ExitReason, exit_value: f64) -> TradeRecord {
        TradeRecord {
            instrument_id: position.instrument_id.clone(),
            entry_timestamp: position.entry_timestamp,
            exit_timestamp: Utc::now(),
            entry_price_adjusted: adjust_for_fee(position.entry_price, OrderSide::Buy),
            exit_price_adjusted: exit_value,
            exit_reason: reason,
        }
    }

    fn record_failure(&self, position: &Position, consecutive_failures: &mut u32, err: &TradeError) {
        *consecutive_failures += 1;
        error!(
            instrument = %position.instrument_id,
            consecutive_failures = *consecutive_failures,
            error = %err,
            "exit order failed"
        );
        if self.escalation_threshold > 0 && *consecutive_failures % self.escalation_threshold == 0 {
            self.escalation.exits_failing(position, *consecutive_failures, err);
        }
    }
}
