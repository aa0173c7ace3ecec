// =============================================================================
// Exchange boundary
// =============================================================================
//
// `ExchangeClient` is the only way the trading core talks to the venue. Every
// endpoint returns an explicit, already-validated result type; raw JSON never
// leaks past this module.

pub mod rate_limit;
pub mod retry;
pub mod upbit;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ExchangeResult;
use crate::types::{Candle, OrderKind, OrderSide, Ticker};

/// Candle period requested from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandleInterval {
    Minutes(u32),
}

impl CandleInterval {
    /// Path segment under `/candles/`.
    pub fn path(&self) -> String {
        match self {
            Self::Minutes(unit) => format!("minutes/{unit}"),
        }
    }
}

/// A market order as submitted by the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument_id: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    /// Quote amount for `MarketByQuote`, base volume for `MarketByVolume`.
    pub amount: f64,
}

impl OrderRequest {
    pub fn market_buy(instrument_id: impl Into<String>, quote_amount: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            side: OrderSide::Buy,
            kind: OrderKind::MarketByQuote,
            amount: quote_amount,
        }
    }

    pub fn market_sell(instrument_id: impl Into<String>, volume: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            side: OrderSide::Sell,
            kind: OrderKind::MarketByVolume,
            amount: volume,
        }
    }
}

/// Acknowledgement of an accepted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
}

/// One execution against an order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub volume: f64,
}

/// Lifecycle of an order on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Still resting or being matched; more trades may arrive.
    Open,
    /// Fully executed.
    Done,
    /// Closed by the exchange or the user. Market buys sized in quote
    /// currency usually end here once the leftover quote is released.
    Cancelled,
}

impl OrderState {
    /// No further trades will be added.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Open)
    }
}

/// Order state as read back from the exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order_id: String,
    pub state: OrderState,
    pub trades: Vec<Fill>,
}

impl OrderDetail {
    /// Total base quantity filled so far.
    pub fn filled_volume(&self) -> f64 {
        self.trades.iter().map(|t| t.volume).sum()
    }
}

/// Authenticated access to a single spot exchange.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Markets quoted in the configured quote currency.
    async fn list_instruments(&self) -> ExchangeResult<Vec<String>>;

    async fn get_ticker(&self, instrument_id: &str) -> ExchangeResult<Ticker>;

    /// Up to `count` most recent candles. Order is exchange-defined; callers
    /// normalise before use.
    async fn get_candles(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
        count: usize,
    ) -> ExchangeResult<Vec<Candle>>;

    async fn submit_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck>;

    async fn get_order(&self, order_id: &str) -> ExchangeResult<OrderDetail>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filled_volume_sums_trades() {
        let detail = OrderDetail {
            order_id: "o-1".into(),
            state: OrderState::Done,
            trades: vec![Fill { volume: 0.25 }, Fill { volume: 0.5 }, Fill { volume: 0.125 }],
        };
        assert!((detail.filled_volume() - 0.875).abs() < 1e-12);
    }

    #[test]
    fn no_trades_means_nothing_filled() {
        let detail = OrderDetail {
            order_id: "o-2".into(),
            state: OrderState::Open,
            trades: Vec::new(),
        };
        assert_eq!(detail.filled_volume(), 0.0);
    }

    #[test]
    fn only_open_orders_can_still_fill() {
        assert!(!OrderState::Open.is_terminal());
        assert!(OrderState::Done.is_terminal());
        assert!(OrderState::Cancelled.is_terminal());
    }

    #[test]
    fn interval_paths() {
        assert_eq!(CandleInterval::Minutes(30).path(), "minutes/30");
    }

    #[test]
    fn order_request_constructors() {
        let buy = OrderRequest::market_buy("KRW-BTC", 10_005.0);
        assert_eq!(buy.side, OrderSide::Buy);
        assert_eq!(buy.kind, OrderKind::MarketByQuote);
        let sell = OrderRequest::market_sell("KRW-BTC", 0.01);
        assert_eq!(sell.side, OrderSide::Sell);
        assert_eq!(sell.kind, OrderKind::MarketByVolume);
    }
}
