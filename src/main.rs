// =============================================================================
// Upbit Scout — Main Entry Point
// =============================================================================
//
// Single-position compounding spot agent. Scans the quote-currency market for
// an oversold reversal, buys it with the whole bankroll, holds until the
// fee-adjusted value crosses the target or stop, then starts over with the
// proceeds. Ctrl-C stops the agent once the current cycle finishes.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod error;
mod exchange;
mod execution;
mod exit;
mod indicators;
mod runtime_config;
mod selector;
mod sink;
#[cfg(test)]
mod testing;
mod trading_loop;
mod types;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::exchange::retry::{RetryPolicy, RetryingClient};
use crate::exchange::upbit::UpbitClient;
use crate::exchange::ExchangeClient;
use crate::execution::OrderExecutor;
use crate::exit::monitor::{LogEscalation, PositionMonitor};
use crate::runtime_config::{Credentials, RuntimeConfig};
use crate::selector::CandidateSelector;
use crate::sink::{FanoutSink, JsonLinesSink, ResultSink, TracingSink};
use crate::trading_loop::{CycleContext, LoopSettings, TradingLoop};

const DEFAULT_CONFIG_PATH: &str = "bot_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Upbit Scout starting up");

    let config_path =
        std::env::var("BOT_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut config = RuntimeConfig::load_or_default(&config_path);
    config.apply_env()?;
    config.validate()?;

    info!(
        seed = config.seed,
        profit_ratio = config.profit_ratio,
        loss_ratio = config.loss_ratio,
        quote = %config.quote_currency,
        min_volume = config.min_volume,
        candle_unit_minutes = config.candle_unit_minutes,
        candle_count = config.candle_count,
        trend_filter = config.enable_trend_filter,
        "configuration loaded"
    );

    // ── 2. Exchange client ───────────────────────────────────────────────
    let credentials = Credentials::from_env()?;
    let upbit = UpbitClient::new(credentials, config.quote_currency.clone())?;
    let client: Arc<dyn ExchangeClient> =
        Arc::new(RetryingClient::new(upbit, RetryPolicy::default()));

    // ── 3. Trading components ────────────────────────────────────────────
    let selector = CandidateSelector::from_config(client.clone(), &config);
    let executor = Arc::new(OrderExecutor::new(
        client.clone(),
        Duration::from_millis(config.fill_readback_delay_ms),
    ));
    let monitor = PositionMonitor::new(
        client.clone(),
        executor.clone(),
        config.exit_failure_escalation_threshold,
        Arc::new(LogEscalation),
    );
    let sinks: Vec<Arc<dyn ResultSink>> = vec![
        Arc::new(JsonLinesSink::new(&config.result_log_path)),
        Arc::new(TracingSink),
    ];
    let sink: Arc<dyn ResultSink> = Arc::new(FanoutSink::new(sinks));

    let trading = TradingLoop::new(
        client,
        selector,
        executor,
        monitor,
        sink,
        LoopSettings::from_config(&config),
    );

    // ── 4. Shutdown signal ───────────────────────────────────────────────
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("shutdown requested; stopping after the current cycle");
                shutdown.cancel();
            }
        });
    }

    // ── 5. Run ───────────────────────────────────────────────────────────
    let final_ctx = trading.run(CycleContext::new(config.seed), shutdown).await;

    info!(
        capital = final_ctx.capital,
        cycles = final_ctx.cycle,
        "Upbit Scout shut down"
    );
    Ok(())
}
