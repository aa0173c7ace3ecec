// =============================================================================
// Shared types used across the trading agent
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLC candle as delivered by the exchange.
///
/// Candle series are passed around in **chronological** order (oldest first)
/// inside the agent. The exchange delivers them newest-first; see
/// [`normalize_chronological`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Candle start time in UNIX milliseconds.
    pub timestamp: i64,
}

impl Candle {
    pub fn new(open: f64, high: f64, low: f64, close: f64, timestamp: i64) -> Self {
        Self {
            open,
            high,
            low,
            close,
            timestamp,
        }
    }
}

/// Sort a candle series oldest-first, whatever order it arrived in.
pub fn normalize_chronological(candles: &mut [Candle]) {
    candles.sort_by_key(|c| c.timestamp);
}

/// Point-in-time market snapshot for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub instrument_id: String,
    pub last_price: f64,
    /// Traded quote-currency value over the trailing 24 hours.
    pub trailing_24h_quote_volume: f64,
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Exchange wire value (`bid` / `ask`).
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Buy => "bid",
            Self::Sell => "ask",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

/// Market order flavours used by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Market buy sized in quote currency.
    MarketByQuote,
    /// Market sell sized in base volume.
    MarketByVolume,
}

impl OrderKind {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::MarketByQuote => "price",
            Self::MarketByVolume => "market",
        }
    }
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    TargetHit,
    StopHit,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TargetHit => write!(f, "TARGET_HIT"),
            Self::StopHit => write!(f, "STOP_HIT"),
        }
    }
}

/// The single open position held while the monitor runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub instrument_id: String,
    /// Quote-currency notional committed at entry (before fees).
    pub entry_price: f64,
    /// Filled base quantity.
    pub quantity: f64,
    /// `entry_price * profit_ratio`.
    pub target_price: f64,
    /// `entry_price * loss_ratio`.
    pub stop_price: f64,
    pub entry_timestamp: DateTime<Utc>,
}

impl Position {
    pub fn open(
        instrument_id: impl Into<String>,
        entry_price: f64,
        quantity: f64,
        profit_ratio: f64,
        loss_ratio: f64,
        entry_timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            entry_price,
            quantity,
            target_price: entry_price * profit_ratio,
            stop_price: entry_price * loss_ratio,
            entry_timestamp,
        }
    }
}

/// Write-once summary of a closed position, handed to the result sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub instrument_id: String,
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price_adjusted: f64,
    pub exit_price_adjusted: f64,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    /// Flat row of scalars in sink column order.
    pub fn to_row(&self) -> Vec<serde_json::Value> {
        vec![
            self.instrument_id.clone().into(),
            self.entry_timestamp.to_rfc3339().into(),
            self.exit_timestamp.to_rfc3339().into(),
            format!("{:.2}", self.entry_price_adjusted).into(),
            format!("{:.2}", self.exit_price_adjusted).into(),
            self.exit_reason.to_string().into(),
        ]
    }
}
