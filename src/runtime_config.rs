// =============================================================================
// Runtime Configuration — file defaults overlaid with environment variables
// =============================================================================
//
// Every tunable lives here. A JSON file supplies the base values (all fields
// carry `#[serde(default)]` so a partial or missing file still loads), then
// the environment overrides the handful of knobs operators set per-deploy.
//
// Credentials are kept apart in `Credentials` and are never serialised.
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_seed() -> f64 {
    10_000.0
}

fn default_profit_ratio() -> f64 {
    1.005
}

fn default_loss_ratio() -> f64 {
    0.997
}

fn default_min_volume() -> f64 {
    3_000_000_000.0
}

fn default_quote_currency() -> String {
    "KRW".to_string()
}

fn default_candle_unit_minutes() -> u32 {
    30
}

fn default_candle_count() -> usize {
    5000
}

fn default_ema_period() -> usize {
    200
}

fn default_trend_proximity_threshold() -> f64 {
    0.035
}

fn default_rsi_period() -> usize {
    14
}

fn default_stoch_period() -> usize {
    14
}

fn default_smoothing() -> usize {
    3
}

fn default_scan_delay_ms() -> u64 {
    100
}

fn default_fill_readback_delay_ms() -> u64 {
    100
}

fn default_exit_failure_escalation_threshold() -> u32 {
    30
}

fn default_cycle_error_backoff_secs() -> u64 {
    5
}

fn default_result_log_path() -> String {
    "trades.jsonl".to_string()
}

// =============================================================================
// IndicatorParams
// =============================================================================

/// Look-back settings for the selection filters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_ema_period")]
    pub ema_period: usize,

    /// Proximity refinement for the trend filter: when enabled the latest low
    /// must also sit within `trend_proximity_threshold` of the EMA.
    #[serde(default)]
    pub enable_trend_proximity: bool,

    #[serde(default = "default_trend_proximity_threshold")]
    pub trend_proximity_threshold: f64,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_stoch_period")]
    pub stoch_period: usize,

    #[serde(default = "default_smoothing")]
    pub k_smoothing: usize,

    #[serde(default = "default_smoothing")]
    pub d_smoothing: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_period: default_ema_period(),
            enable_trend_proximity: false,
            trend_proximity_threshold: default_trend_proximity_threshold(),
            rsi_period: default_rsi_period(),
            stoch_period: default_stoch_period(),
            k_smoothing: default_smoothing(),
            d_smoothing: default_smoothing(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the trading agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Capital & exits ---------------------------------------------------

    /// Starting capital in quote currency.
    #[serde(default = "default_seed")]
    pub seed: f64,

    /// Exit with profit once fee-adjusted value reaches `entry * profit_ratio`.
    #[serde(default = "default_profit_ratio")]
    pub profit_ratio: f64,

    /// Exit with loss once fee-adjusted value falls to `entry * loss_ratio`.
    #[serde(default = "default_loss_ratio")]
    pub loss_ratio: f64,

    // --- Universe & data ----------------------------------------------------

    /// Markets quoted in this currency make up the universe.
    #[serde(default = "default_quote_currency")]
    pub quote_currency: String,

    /// Minimum trailing-24h traded value in quote currency.
    #[serde(default = "default_min_volume")]
    pub min_volume: f64,

    #[serde(default = "default_candle_unit_minutes")]
    pub candle_unit_minutes: u32,

    /// Candles fetched per instrument.
    #[serde(default = "default_candle_count")]
    pub candle_count: usize,

    // --- Feature flags -------------------------------------------------------

    /// EMA trend-position stage. Off by default.
    #[serde(default)]
    pub enable_trend_filter: bool,

    #[serde(default)]
    pub indicators: IndicatorParams,

    // --- Pacing --------------------------------------------------------------

    /// Pause between instruments while scanning.
    #[serde(default = "default_scan_delay_ms")]
    pub scan_delay_ms: u64,

    /// Pause between submitting the entry and reading back its fills.
    #[serde(default = "default_fill_readback_delay_ms")]
    pub fill_readback_delay_ms: u64,

    /// Pause before the next cycle when a cycle found no candidate.
    /// Zero restarts immediately.
    #[serde(default)]
    pub idle_backoff_ms: u64,

    /// Pause before the next cycle when a cycle aborted with an error.
    #[serde(default = "default_cycle_error_backoff_secs")]
    pub cycle_error_backoff_secs: u64,

    /// Consecutive failed exit attempts before the escalation hook fires.
    #[serde(default = "default_exit_failure_escalation_threshold")]
    pub exit_failure_escalation_threshold: u32,

    // --- Output ----------------------------------------------------------------

    /// JSON-lines file receiving one row per closed trade.
    #[serde(default = "default_result_log_path")]
    pub result_log_path: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            profit_ratio: default_profit_ratio(),
            loss_ratio: default_loss_ratio(),
            quote_currency: default_quote_currency(),
            min_volume: default_min_volume(),
            candle_unit_minutes: default_candle_unit_minutes(),
            candle_count: default_candle_count(),
            enable_trend_filter: false,
            indicators: IndicatorParams::default(),
            scan_delay_ms: default_scan_delay_ms(),
            fill_readback_delay_ms: default_fill_readback_delay_ms(),
            idle_backoff_ms: 0,
            cycle_error_backoff_secs: default_cycle_error_backoff_secs(),
            exit_failure_escalation_threshold: default_exit_failure_escalation_threshold(),
            result_log_path: default_result_log_path(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!(error = %e, "failed to load config file, using defaults");
            Self::default()
        })
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary key lookup. Unset keys are left alone;
    /// set-but-unparsable keys are an error.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
        where
            T::Err: std::fmt::Display,
        {
            raw.trim()
                .parse::<T>()
                .map_err(|e| anyhow::anyhow!("invalid value for {key} ({raw:?}): {e}"))
        }

        if let Some(v) = lookup("SEED") {
            self.seed = parse("SEED", &v)?;
        }
        if let Some(v) = lookup("PROFIT_RATIO") {
            self.profit_ratio = parse("PROFIT_RATIO", &v)?;
        }
        if let Some(v) = lookup("LOSS_RATIO") {
            self.loss_ratio = parse("LOSS_RATIO", &v)?;
        }
        if let Some(v) = lookup("MIN_VOLUME") {
            self.min_volume = parse("MIN_VOLUME", &v)?;
        }
        if let Some(v) = lookup("ENABLE_TREND_FILTER") {
            self.enable_trend_filter = parse("ENABLE_TREND_FILTER", &v)?;
        }
        if let Some(v) = lookup("CANDLE_COUNT") {
            self.candle_count = parse("CANDLE_COUNT", &v)?;
        }
        if let Some(v) = lookup("CANDLE_UNIT_MINUTES") {
            self.candle_unit_minutes = parse("CANDLE_UNIT_MINUTES", &v)?;
        }
        if let Some(v) = lookup("QUOTE_CURRENCY") {
            self.quote_currency = v.trim().to_uppercase();
        }
        if let Some(v) = lookup("RESULT_LOG_PATH") {
            self.result_log_path = v;
        }
        Ok(())
    }

    /// Reject settings that would make the exit thresholds meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(self.seed.is_finite() && self.seed > 0.0) {
            bail!("seed must be positive, got {}", self.seed);
        }
        if !(self.profit_ratio > 1.0) {
            bail!("profit_ratio must be > 1, got {}", self.profit_ratio);
        }
        if !(self.loss_ratio > 0.0 && self.loss_ratio < 1.0) {
            bail!("loss_ratio must be in (0, 1), got {}", self.loss_ratio);
        }
        if self.candle_count == 0 {
            bail!("candle_count must be non-zero");
        }
        Ok(())
    }
}

// =============================================================================
// Credentials
// =============================================================================

/// Exchange API keys. Read from the environment only.
#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

impl Credentials {
    pub fn from_env() -> Result<Self> {
        let access_key =
            std::env::var("UPBIT_ACCESS_KEY").context("UPBIT_ACCESS_KEY is not set")?;
        let secret_key =
            std::env::var("UPBIT_SECRET_KEY").context("UPBIT_SECRET_KEY is not set")?;
        Ok(Self {
            access_key,
            secret_key,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
