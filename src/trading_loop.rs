// =============================================================================
// Trading Loop — select, enter, monitor, record, compound
// =============================================================================
//
// One cycle:
//   1. List the quote-currency universe.
//   2. Ask the selector for the first passing instrument.
//   3. Market-buy it with the current capital.
//   4. Hand the position to the monitor until it closes.
//   5. Append the trade record to the result sink (best-effort).
//   6. Next capital = floor(fee-adjusted exit value).
//
// At most one position exists at a time. Capital only changes when a
// position closes. Shutdown is honoured between cycles, never while a
// position is held.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::TradeError;
use crate::exchange::ExchangeClient;
use crate::execution::OrderExecutor;
use crate::exit::monitor::PositionMonitor;
use crate::runtime_config::RuntimeConfig;
use crate::selector::CandidateSelector;
use crate::sink::ResultSink;
use crate::types::{Position, TradeRecord};

/// Capital carried between cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleContext {
    pub capital: f64,
    pub cycle: u64,
}

impl CycleContext {
    pub fn new(seed: f64) -> Self {
        Self {
            capital: seed,
            cycle: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    NoCandidate,
    Closed(TradeRecord),
}

/// Thresholds and pacing used by the loop.
#[derive(Debug, Clone, Copy)]
pub struct LoopSettings {
    pub profit_ratio: f64,
    pub loss_ratio: f64,
    pub idle_backoff: Duration,
    pub error_backoff: Duration,
}

impl LoopSettings {
    pub fn from_config(config: &RuntimeConfig) -> Self {
        Self {
            profit_ratio: config.profit_ratio,
            loss_ratio: config.loss_ratio,
            idle_backoff: Duration::from_millis(config.idle_backoff_ms),
            error_backoff: Duration::from_secs(config.cycle_error_backoff_secs),
        }
    }
}

pub struct TradingLoop {
    client: Arc<dyn ExchangeClient>,
    selector: CandidateSelector,
    executor: Arc<OrderExecutor>,
    monitor: PositionMonitor,
    sink: Arc<dyn ResultSink>,
    settings: LoopSettings,
}

impl TradingLoop {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        selector: CandidateSelector,
        executor: Arc<OrderExecutor>,
        monitor: PositionMonitor,
        sink: Arc<dyn ResultSink>,
        settings: LoopSettings,
    ) -> Self {
        Self {
            client,
            selector,
            executor,
            monitor,
            sink,
            settings,
        }
    }

    /// Run one cycle from `ctx` and return the context for the next one.
    /// On error the caller keeps `ctx`; no position is open at that point.
    pub async fn run_cycle(&self, ctx: CycleContext) -> Result<(CycleContext, CycleOutcome), TradeError> {
        let next_cycle = ctx.cycle + 1;
        info!(cycle = next_cycle, capital = ctx.capital, "cycle started");

        let universe = self.client.list_instruments().await?;

        let Some(instrument) = self.selector.select(&universe).await else {
            return Ok((
                CycleContext {
                    capital: ctx.capital,
                    cycle: next_cycle,
                },
                CycleOutcome::NoCandidate,
            ));
        };

        let fill = self.executor.enter(&instrument, ctx.capital).await?;

        let position = Position::open(
            instrument,
            ctx.capital,
            fill.filled_quantity,
            self.settings.profit_ratio,
            self.settings.loss_ratio,
            Utc::now(),
        );

        let record = self.monitor.run(position).await;

        if let Err(e) = self.sink.append(&record).await {
            warn!(instrument = %record.instrument_id, error = %e, "failed to record trade");
        }

        let capital = record.exit_price_adjusted.floor();
        info!(
            cycle = next_cycle,
            instrument = %record.instrument_id,
            reason = %record.exit_reason,
            previous_capital = ctx.capital,
            capital,
            "cycle complete"
        );

        Ok((
            CycleContext {
                capital,
                cycle: next_cycle,
            },
            CycleOutcome::Closed(record),
        ))
    }

    /// Repeat cycles until `shutdown` is cancelled. Returns the final context.
    pub async fn run(&self, mut ctx: CycleContext, shutdown: CancellationToken) -> CycleContext {
        info!(capital = ctx.capital, "trading loop started");

        while !shutdown.is_cancelled() {
            let pause = match self.run_cycle(ctx).await {
                Ok((next, CycleOutcome::NoCandidate)) => {
                    ctx = next;
                    self.settings.idle_backoff
                }
                Ok((next, CycleOutcome::Closed(_))) => {
                    ctx = next;
                    Duration::ZERO
                }
                Err(e) => {
                    error!(cycle = ctx.cycle + 1, capital = ctx.capital, error = %e, "cycle aborted");
                    self.settings.error_backoff
                }
            };

            if !pause.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        info!(capital = ctx.capital, cycles = ctx.cycle, "trading loop stopped");
        ctx
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExchangeError;
    use crate::exchange::CandleInterval;
    use crate::exchange::OrderState;
    use crate::exit::monitor::LogEscalation;
    use crate::selector::{FilterPipeline, FilterStage};
    use crate::testing::{flat_candles, network_error, price_for_adjusted_value, MemorySink, MockExchange};
    use crate::types::{Candle, ExitReason, Ticker};

    struct AlwaysPass;

    impl FilterStage for AlwaysPass {
        fn name(&self) -> &'static str {
            "always"
        }
        fn passes(&self, _ticker: &Ticker, _candles: &[Candle]) -> bool {
            true
        }
    }

    fn settings() -> LoopSettings {
        let mut config = RuntimeConfig::default();
        config.idle_backoff_ms = 1_000;
        LoopSettings::from_config(&config)
    }

    fn build(mock: &Arc<MockExchange>, sink: Arc<dyn ResultSink>) -> TradingLoop {
        let client: Arc<dyn ExchangeClient> = mock.clone();
        let selector = CandidateSelector::new(
            client.clone(),
            FilterPipeline::new(vec![Box::new(AlwaysPass) as Box<dyn FilterStage>]),
            CandleInterval::Minutes(30),
            200,
            Duration::from_millis(100),
        );
        let executor = Arc::new(OrderExecutor::new(client.clone(), Duration::from_millis(100)));
        let monitor = PositionMonitor::new(client.clone(), executor.clone(), 30, Arc::new(LogEscalation));
        TradingLoop::new(client, selector, executor, monitor, sink, settings())
    }

    #[tokio::test(start_paused = true)]
    async fn stop_hit_compounds_floored_exit_value() {
        // First price is read by the selector, the second by the monitor.
        let mock = Arc::new(
            MockExchange::new()
                .with_instruments(&["X"])
                .with_candles("X", flat_candles(5))
                .with_fill_volume(1.0)
                .with_prices([Ok(100.0), Ok(price_for_adjusted_value(99.7, 1.0))]),
        );
        let sink = Arc::new(MemorySink::default());
        let trading = build(&mock, sink.clone());

        let (next, outcome) = trading.run_cycle(CycleContext::new(10_000.0)).await.unwrap();

        let CycleOutcome::Closed(record) = outcome else {
            panic!("expected a closed position");
        };
        assert_eq!(record.exit_reason, ExitReason::StopHit);
        assert!((record.entry_price_adjusted - 10_005.0).abs() < 1e-9);
        assert_eq!(next.capital, 99.0);
        assert_eq!(next.cycle, 1);

        assert_eq!(mock.buys().len(), 1);
        assert!((mock.buys()[0].amount - 10_005.0).abs() < 1e-9);
        assert_eq!(mock.sells().len(), 1);
        assert_eq!(sink.records.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_candidate_keeps_capital() {
        let mock = Arc::new(MockExchange::new().with_instruments(&["X"]));
        let trading = build(&mock, Arc::new(MemorySink::default()));

        let (next, outcome) = trading.run_cycle(CycleContext::new(10_000.0)).await.unwrap();
        assert_eq!(outcome, CycleOutcome::NoCandidate);
        assert_eq!(next.capital, 10_000.0);
        assert!(mock.submitted.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn entry_failure_aborts_cycle_without_position() {
        let mock = Arc::new(
            MockExchange::new()
                .with_instruments(&["X"])
                .with_candles("X", flat_candles(5))
                .with_prices([Ok(100.0)])
                .with_submit_results([Err(ExchangeError::Http {
                    status: 400,
                    body: "insufficient_funds_bid".into(),
                })]),
        );
        let trading = build(&mock, Arc::new(MemorySink::default()));

        let err = trading.run_cycle(CycleContext::new(10_000.0)).await.unwrap_err();
        assert!(matches!(err, TradeError::OrderSubmission { .. }));
        assert!(mock.sells().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unsettled_entry_is_never_bought_twice() {
        let mock = Arc::new(
            MockExchange::new()
                .with_instruments(&["X"])
                .with_candles("X", flat_candles(5))
                .with_fill_volume(0.0)
                .with_prices([Ok(100.0)]),
        );
        let trading = build(&mock, Arc::new(MemorySink::default()));

        let outcome = tokio::time::timeout(
            Duration::from_secs(20),
            trading.run(CycleContext::new(10_000.0), CancellationToken::new()),
        )
        .await;

        assert!(outcome.is_err());
        assert_eq!(mock.buys().len(), 1);
        assert!(mock.sells().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn flaky_fill_read_back_still_monitors_the_position() {
        let mock = Arc::new(
            MockExchange::new()
                .with_instruments(&["X"])
                .with_candles("X", flat_candles(5))
                .with_order_reads([
                    Err(network_error()),
                    Err(network_error()),
                    Ok((OrderState::Open, 0.0)),
                    Ok((OrderState::Done, 1.0)),
                ])
                .with_prices([Ok(100.0), Ok(price_for_adjusted_value(9_960.4, 1.0))]),
        );
        let trading = build(&mock, Arc::new(MemorySink::default()));

        let (next, outcome) = trading.run_cycle(CycleContext::new(10_000.0)).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Closed(ref r) if r.exit_reason == ExitReason::StopHit));
        assert_eq!(next.capital, 9_960.0);
        assert_eq!(mock.buys().len(), 1);
        assert_eq!(mock.sells().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sink_failure_does_not_block_compounding() {
        let mock = Arc::new(
            MockExchange::new()
                .with_instruments(&["X"])
                .with_candles("X", flat_candles(5))
                .with_fill_volume(1.0)
                .with_prices([Ok(100.0), Ok(price_for_adjusted_value(10_060.4, 1.0))]),
        );
        let trading = build(&mock, Arc::new(crate::testing::FailingSink));

        let (next, outcome) = trading.run_cycle(CycleContext::new(10_000.0)).await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Closed(ref r) if r.exit_reason == ExitReason::TargetHit));
        assert_eq!(next.capital, 10_060.0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_stops_before_first_cycle() {
        let mock = Arc::new(MockExchange::new().with_instruments(&["X"]));
        let trading = build(&mock, Arc::new(MemorySink::default()));
        let token = CancellationToken::new();
        token.cancel();

        let ctx = trading.run(CycleContext::new(500.0), token).await;
        assert_eq!(ctx, CycleContext::new(500.0));
        assert_eq!(mock.list_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_between_idle_cycles() {
        let mock = Arc::new(MockExchange::new());
        let trading = build(&mock, Arc::new(MemorySink::default()));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(3_500)).await;
            canceller.cancel();
        });

        let ctx = trading.run(CycleContext::new(500.0), token).await;
        assert_eq!(ctx.capital, 500.0);
        assert_eq!(ctx.cycle, 4);
    }
}
