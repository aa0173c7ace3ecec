// =============================================================================
// Candidate Selector — first instrument to clear every filter stage wins
// =============================================================================
//
// Stages run in a fixed order and stop at the first rejection:
//
//   1. Volume      trailing 24h quote volume >= configured minimum
//   2. Trend       latest low at/above the long EMA (flag-gated, off by default)
//   3. Oscillator  Stoch RSI %K oversold and crossing above %D
//   4. Pattern     indecision -> strong -> strong-bullish synthetic candles
//
// Instruments whose ticker or candles cannot be fetched, or whose candle
// history is empty, are skipped. The scan delay also applies to an empty
// universe so an idle loop cannot hammer the market list. Selection never
// touches capital or the open position.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::TradeError;
use crate::exchange::{CandleInterval, ExchangeClient};
use crate::indicators::{ema, heikin_ashi, stoch_rsi, volume};
use crate::runtime_config::{IndicatorParams, RuntimeConfig};
use crate::types::{normalize_chronological, Candle, Ticker};

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// One predicate in the selection pipeline. Candles are chronological.
pub trait FilterStage: Send + Sync {
    fn name(&self) -> &'static str;
    fn passes(&self, ticker: &Ticker, candles: &[Candle]) -> bool;
}

pub struct VolumeStage {
    pub min_volume: f64,
}

impl FilterStage for VolumeStage {
    fn name(&self) -> &'static str {
        "volume"
    }

    fn passes(&self, ticker: &Ticker, _candles: &[Candle]) -> bool {
        volume::passes_volume(ticker, self.min_volume)
    }
}

pub struct TrendStage {
    pub period: usize,
    pub proximity: Option<f64>,
}

impl FilterStage for TrendStage {
    fn name(&self) -> &'static str {
        "trend"
    }

    fn passes(&self, _ticker: &Ticker, candles: &[Candle]) -> bool {
        ema::passes_trend_position(candles, self.period, self.proximity)
    }
}

pub struct OscillatorStage {
    pub params: IndicatorParams,
}

impl FilterStage for OscillatorStage {
    fn name(&self) -> &'static str {
        "oscillator"
    }

    fn passes(&self, _ticker: &Ticker, candles: &[Candle]) -> bool {
        stoch_rsi::passes_oscillator(
            candles,
            self.params.rsi_period,
            self.params.stoch_period,
            self.params.k_smoothing,
            self.params.d_smoothing,
        )
    }
}

pub struct PatternStage;

impl FilterStage for PatternStage {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn passes(&self, _ticker: &Ticker, candles: &[Candle]) -> bool {
        heikin_ashi::passes_pattern_filter(candles)
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct FilterPipeline {
    stages: Vec<Box<dyn FilterStage>>,
}

impl FilterPipeline {
    pub fn new(stages: Vec<Box<dyn FilterStage>>) -> Self {
        Self { stages }
    }

    /// Standard stage order for `config`.
    pub fn from_config(config: &RuntimeConfig) -> Self {
        let params = config.indicators.clone();
        let mut stages: Vec<Box<dyn FilterStage>> = vec![Box::new(VolumeStage {
            min_volume: config.min_volume,
        })];
        if config.enable_trend_filter {
            stages.push(Box::new(TrendStage {
                period: params.ema_period,
                proximity: params
                    .enable_trend_proximity
                    .then_some(params.trend_proximity_threshold),
            }));
        }
        stages.push(Box::new(OscillatorStage { params }));
        stages.push(Box::new(PatternStage));
        Self::new(stages)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// `None` when every stage passes, otherwise the first rejecting stage.
    pub fn evaluate(&self, ticker: &Ticker, candles: &[Candle]) -> Option<&'static str> {
        self.stages
            .iter()
            .find(|stage| !stage.passes(ticker, candles))
            .map(|stage| stage.name())
    }
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

pub struct CandidateSelector {
    client: Arc<dyn ExchangeClient>,
    pipeline: FilterPipeline,
    interval: CandleInterval,
    candle_count: usize,
    scan_delay: Duration,
}

impl CandidateSelector {
    pub fn new(
        client: Arc<dyn ExchangeClient>,
        pipeline: FilterPipeline,
        interval: CandleInterval,
        candle_count: usize,
        scan_delay: Duration,
    ) -> Self {
        Self {
            client,
            pipeline,
            interval,
            candle_count,
            scan_delay,
        }
    }

    pub fn from_config(client: Arc<dyn ExchangeClient>, config: &RuntimeConfig) -> Self {
        Self::new(
            client,
            FilterPipeline::from_config(config),
            CandleInterval::Minutes(config.candle_unit_minutes),
            config.candle_count,
            Duration::from_millis(config.scan_delay_ms),
        )
    }

    /// Walk `universe` in order and return the first instrument that clears
    /// every stage.
    pub async fn select(&self, universe: &[String]) -> Option<String> {
        info!(
            instruments = universe.len(),
            stages = ?self.pipeline.stage_names(),
            "scanning for entry candidate"
        );

        if universe.is_empty() {
            tokio::time::sleep(self.scan_delay).await;
        }

        for instrument in universe {
            tokio::time::sleep(self.scan_delay).await;

            let (ticker, candles) = match self.fetch_inputs(instrument).await {
                Ok(inputs) => inputs,
                Err(e @ TradeError::DataInsufficient { .. }) => {
                    debug!(error = %e, "skipping");
                    continue;
                }
                Err(e) => {
                    warn!(instrument = %instrument, error = %e, "fetch failed, skipping");
                    continue;
                }
            };

            match self.pipeline.evaluate(&ticker, &candles) {
                None => {
                    info!(instrument = %instrument, "candidate selected");
                    return Some(instrument.clone());
                }
                Some(stage) => {
                    debug!(instrument = %instrument, stage, "rejected");
                }
            }
        }

        info!("no candidate this cycle");
        None
    }

    /// Ticker plus chronological candles for one instrument.
    async fn fetch_inputs(&self, instrument: &str) -> Result<(Ticker, Vec<Candle>), TradeError> {
        let ticker = self.client.get_ticker(instrument).await?;
        let mut candles = self
            .client
            .get_candles(instrument, self.interval, self.candle_count)
            .await?;
        if candles.is_empty() {
            return Err(TradeError::DataInsufficient {
                instrument: instrument.to_string(),
                reason: "no candle history".into(),
            });
        }
        normalize_chronological(&mut candles);
        Ok((ticker, candles))
    }
}
