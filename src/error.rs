// =============================================================================
// Error taxonomy
// =============================================================================
//
// Transport failures are classified at the exchange boundary; the trading core
// wraps them together with insufficient-data and order-submission failures so
// each caller can decide between skip, retry and escalate.
// =============================================================================

use thiserror::Error;

use crate::types::OrderSide;

/// Failures raised by an `ExchangeClient` implementation.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Connection, timeout or other I/O failure before a response arrived.
    #[error("network error: {0}")]
    Network(String),

    /// The exchange answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),

    /// Request signing or credential failure.
    #[error("auth error: {0}")]
    Auth(String),

    /// The exchange throttled us (HTTP 429).
    #[error("rate limited")]
    RateLimited,

    /// A query that must return data returned nothing.
    #[error("empty response from {0}")]
    EmptyResponse(String),
}

impl ExchangeError {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::RateLimited => true,
            Self::Http { status, .. } => *status >= 500,
            Self::Parse(_) | Self::Auth(_) | Self::EmptyResponse(_) => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Failures surfaced by the selection / execution / monitoring core.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error(transparent)]
    Transport(#[from] ExchangeError),

    /// Not enough history or ticker data to evaluate; callers skip.
    #[error("insufficient data for {instrument}: {reason}")]
    DataInsufficient { instrument: String, reason: String },

    #[error("{side} order for {instrument} failed: {source}")]
    OrderSubmission {
        instrument: String,
        side: OrderSide,
        #[source]
        source: ExchangeError,
    },

    /// The exchange closed an accepted entry without executing any of it.
    #[error("entry order {order_id} for {instrument} closed without trades")]
    EntryUnfilled { instrument: String, order_id: String },

    #[error("result sink failed: {0}")]
    Sink(String),
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(ExchangeError::Network("reset".into()).is_retryable());
        assert!(ExchangeError::RateLimited.is_retryable());
        assert!(ExchangeError::Http {
            status: 503,
            body: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn client_errors_are_not_retryable() {
        assert!(!ExchangeError::Http {
            status: 400,
            body: "insufficient_funds_bid".into()
        }
        .is_retryable());
        assert!(!ExchangeError::Auth("bad key".into()).is_retryable());
        assert!(!ExchangeError::Parse("missing field".into()).is_retryable());
    }

    #[test]
    fn order_submission_message_names_side() {
        let err = TradeError::OrderSubmission {
            instrument: "KRW-XRP".into(),
            side: OrderSide::Sell,
            source: ExchangeError::RateLimited,
        };
        assert_eq!(err.to_string(), "SELL order for KRW-XRP failed: rate limited");
    }
}
