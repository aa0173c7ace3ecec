// =============================================================================
// Order Executor — market entries and exits with fee-adjusted sizing
// =============================================================================
//
// Entries are market buys sized in quote currency. The requested notional is
// grossed up by the fee rate so the position is worth the committed capital
// once the exchange takes its cut. After submission the executor reads the
// order back until it is done or cancelled and sums its trades to learn the
// filled base quantity. An accepted buy is never abandoned: read-back
// failures and open orders are retried indefinitely.
//
// Exits are market sells of the full filled quantity. A failed exit is
// reported to the caller; the position stays open.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::error::TradeError;
use crate::exchange::{ExchangeClient, OrderAck, OrderRequest};
use crate::types::OrderSide;

/// Proportional exchange fee applied to each side of a trade.
pub const FEE_RATE: f64 = 0.0005;

/// Read-backs made at the configured delay before slowing down.
const FAST_READBACK_ATTEMPTS: u32 = 5;

/// Read-back spacing once the order is slow to settle.
const SLOW_READBACK_DELAY: Duration = Duration::from_secs(1);

/// Read-backs between reminders that an entry is still unsettled.
const STALLED_WARN_EVERY: u32 = 60;

/// Apply the fee to a quote amount: buys cost more, sells yield less.
pub fn adjust_for_fee(amount: f64, side: OrderSide) -> f64 {
    match side {
        OrderSide::Buy => amount * (1.0 + FEE_RATE),
        OrderSide::Sell => amount * (1.0 - FEE_RATE),
    }
}

// ---------------------------------------------------------------------------
// Result type
// ---------------------------------------------------------------------------

/// A completed market entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryFill {
    pub order_id: String,
    /// Base quantity actually bought.
    pub filled_quantity: f64,
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct OrderExecutor {
    client: Arc<dyn ExchangeClient>,
    fill_readback_delay: Duration,
}

impl OrderExecutor {
    pub fn new(client: Arc<dyn ExchangeClient>, fill_readback_delay: Duration) -> Self {
        Self {
            client,
            fill_readback_delay,
        }
    }

    /// Buy `instrument_id` for `quote_amount` of quote currency (before fees)
    /// and return the filled quantity. Fails without holding anything when
    /// the buy is rejected or closes with no trades.
    #[instrument(skip(self), name = "executor::enter")]
    pub async fn enter(&self, instrument_id: &str, quote_amount: f64) -> Result<EntryFill, TradeError> {
        let gross = adjust_for_fee(quote_amount, OrderSide::Buy);
        let request = OrderRequest::market_buy(instrument_id, gross);

        let ack = self
            .client
            .submit_order(&request)
            .await
            .map_err(|source| TradeError::OrderSubmission {
                instrument: instrument_id.to_string(),
                side: OrderSide::Buy,
                source,
            })?;

        info!(
            instrument = instrument_id,
            order_id = %ack.order_id,
            quote_amount,
            gross,
            "entry order accepted"
        );

        // The buy is live from here on. Keep reading until the exchange
        // reports a terminal state so the holding is never lost.
        let mut attempt: u32 = 0;
        loop {
            let delay = if attempt < FAST_READBACK_ATTEMPTS {
                self.fill_readback_delay
            } else {
                SLOW_READBACK_DELAY
            };
            tokio::time::sleep(delay).await;
            attempt += 1;

            let detail = match self.client.get_order(&ack.order_id).await {
                Ok(detail) => detail,
                Err(e) => {
                    warn!(order_id = %ack.order_id, attempt, error = %e, "order read-back failed, retrying");
                    continue;
                }
            };

            let filled = detail.filled_volume();
            if !detail.state.is_terminal() {
                debug!(order_id = %ack.order_id, attempt, filled, "entry order still open");
                if attempt % STALLED_WARN_EVERY == 0 {
                    error!(
                        instrument = instrument_id,
                        order_id = %ack.order_id,
                        attempt,
                        "entry order has not settled"
                    );
                }
                continue;
            }

            if filled > 0.0 {
                info!(
                    instrument = instrument_id,
                    order_id = %ack.order_id,
                    state = ?detail.state,
                    filled_quantity = filled,
                    "entry filled"
                );
                return Ok(EntryFill {
                    order_id: ack.order_id,
                    filled_quantity: filled,
                });
            }

            warn!(
                instrument = instrument_id,
                order_id = %ack.order_id,
                state = ?detail.state,
                "entry order closed without trades"
            );
            return Err(TradeError::EntryUnfilled {
                instrument: instrument_id.to_string(),
                order_id: ack.order_id,
            });
        }
    }

    /// Sell `quantity` of `instrument_id` at market.
    #[instrument(skip(self), name = "executor::exit")]
    pub async fn exit(&self, instrument_id: &str, quantity: f64) -> Result<OrderAck, TradeError> {
        let request = OrderRequest::market_sell(instrument_id, quantity);
        match self.client.submit_order(&request).await {
            Ok(ack) => {
                info!(instrument = instrument_id, order_id = %ack.order_id, quantity, "exit order accepted");
                Ok(ack)
            }
            Err(source) => {
                warn!(instrument = instrument_id, quantity, error = %source, "exit order rejected");
                Err(TradeError::OrderSubmission {
                    instrument: instrument_id.to_string(),
                    side: OrderSide::Sell,
                    source,
                })
            }
        }
    }
}
