// =============================================================================
// In-memory exchange and sink doubles for unit tests
// =============================================================================

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{ExchangeError, ExchangeResult, TradeError};
use crate::exchange::{
    CandleInterval, ExchangeClient, Fill, OrderAck, OrderDetail, OrderRequest, OrderState,
};
use crate::execution::{adjust_for_fee, FEE_RATE};
use crate::sink::ResultSink;
use crate::types::{Candle, OrderSide, Ticker, TradeRecord};

/// Last price that values `quantity` at exactly `adjusted` after the sell fee.
pub fn price_for_adjusted_value(adjusted: f64, quantity: f64) -> f64 {
    adjusted / (1.0 - FEE_RATE) / quantity
}

/// Scripted exchange. Ticker prices are served from a queue; once it runs
/// dry the last served price repeats.
pub struct MockExchange {
    instruments: Vec<String>,
    candles: HashMap<String, Vec<Candle>>,
    prices: Mutex<VecDeque<ExchangeResult<f64>>>,
    last_price: Mutex<f64>,
    submit_results: Mutex<VecDeque<ExchangeResult<()>>>,
    fill_volume: f64,
    order_reads: Mutex<VecDeque<ExchangeResult<(OrderState, f64)>>>,
    pub submitted: Mutex<Vec<OrderRequest>>,
    pub ticker_calls: AtomicUsize,
    pub candle_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub order_calls: AtomicUsize,
}

impl MockExchange {
    pub fn new() -> Self {
        Self {
            instruments: Vec::new(),
            candles: HashMap::new(),
            prices: Mutex::new(VecDeque::new()),
            last_price: Mutex::new(1.0),
            submit_results: Mutex::new(VecDeque::new()),
            fill_volume: 1.0,
            order_reads: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            ticker_calls: AtomicUsize::new(0),
            candle_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            order_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_instruments(mut self, instruments: &[&str]) -> Self {
        self.instruments = instruments.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Candles served newest-first, the way the exchange delivers them.
    pub fn with_candles(mut self, instrument: &str, mut chronological: Vec<Candle>) -> Self {
        chronological.reverse();
        self.candles.insert(instrument.to_string(), chronological);
        self
    }

    pub fn with_prices(self, prices: impl IntoIterator<Item = ExchangeResult<f64>>) -> Self {
        self.prices.lock().extend(prices);
        self
    }

    pub fn with_submit_results(self, results: impl IntoIterator<Item = ExchangeResult<()>>) -> Self {
        self.submit_results.lock().extend(results);
        self
    }

    /// Volume every order reports once its scripted reads run out. Zero
    /// means the order stays open with no trades.
    pub fn with_fill_volume(mut self, volume: f64) -> Self {
        self.fill_volume = volume;
        self
    }

    /// Order read-backs served before falling back to `fill_volume`.
    pub fn with_order_reads(
        self,
        reads: impl IntoIterator<Item = ExchangeResult<(OrderState, f64)>>,
    ) -> Self {
        self.order_reads.lock().extend(reads);
        self
    }

    pub fn sells(&self) -> Vec<OrderRequest> {
        self.submitted
            .lock()
            .iter()
            .filter(|o| o.side == OrderSide::Sell)
            .cloned()
            .collect()
    }

    pub fn buys(&self) -> Vec<OrderRequest> {
        self.submitted
            .lock()
            .iter()
            .filter(|o| o.side == OrderSide::Buy)
            .cloned()
            .collect()
    }
}

/// A handful of flat candles, enough for stage doubles that ignore them.
pub fn flat_candles(n: usize) -> Vec<Candle> {
    (0..n)
        .map(|i| Candle::new(100.0, 101.0, 99.0, 100.0, i as i64 * 1_800_000))
        .collect()
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn list_instruments(&self) -> ExchangeResult<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.instruments.clone())
    }

    async fn get_ticker(&self, instrument_id: &str) -> ExchangeResult<Ticker> {
        self.ticker_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.prices.lock().pop_front();
        let price = match next {
            Some(Ok(p)) => {
                *self.last_price.lock() = p;
                p
            }
            Some(Err(e)) => return Err(e),
            None => *self.last_price.lock(),
        };
        Ok(Ticker {
            instrument_id: instrument_id.to_string(),
            last_price: price,
            trailing_24h_quote_volume: f64::MAX,
        })
    }

    async fn get_candles(
        &self,
        instrument_id: &str,
        _interval: CandleInterval,
        count: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        self.candle_calls.fetch_add(1, Ordering::SeqCst);
        let mut candles = self.candles.get(instrument_id).cloned().unwrap_or_default();
        candles.truncate(count);
        Ok(candles)
    }

    async fn submit_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        if let Some(Err(e)) = self.submit_results.lock().pop_front() {
            return Err(e);
        }
        let mut submitted = self.submitted.lock();
        submitted.push(order.clone());
        Ok(OrderAck {
            order_id: format!("order-{}", submitted.len()),
        })
    }

    async fn get_order(&self, order_id: &str) -> ExchangeResult<OrderDetail> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.order_reads.lock().pop_front();
        let (state, volume) = match scripted {
            Some(read) => read?,
            None if self.fill_volume > 0.0 => (OrderState::Done, self.fill_volume),
            None => (OrderState::Open, 0.0),
        };
        let trades = if volume > 0.0 {
            vec![Fill { volume: volume / 2.0 }, Fill { volume: volume / 2.0 }]
        } else {
            Vec::new()
        };
        Ok(OrderDetail {
            order_id: order_id.to_string(),
            state,
            trades,
        })
    }
}

/// Sink that keeps records in memory.
#[derive(Default)]
pub struct MemorySink {
    pub records: Mutex<Vec<TradeRecord>>,
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn append(&self, record: &TradeRecord) -> Result<(), TradeError> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Sink that always fails.
pub struct FailingSink;

#[async_trait]
impl ResultSink for FailingSink {
    async fn append(&self, _record: &TradeRecord) -> Result<(), TradeError> {
        Err(TradeError::Sink("disk full".into()))
    }
}

pub fn network_error() -> ExchangeError {
    ExchangeError::Network("connection reset".into())
}

#[test]
fn price_helper_inverts_sell_fee() {
    let price = price_for_adjusted_value(100.6, 1.0);
    assert!((adjust_for_fee(price, OrderSide::Sell) - 100.6).abs() < 1e-9);
}
