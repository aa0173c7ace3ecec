// =============================================================================
// Fixed-backoff retry for transient transport failures
// =============================================================================
//
// Every call gets up to `max_attempts` tries with a constant pause between
// them. Non-retryable errors (bad request, auth, parse) surface immediately;
// exhaustion surfaces the last error to the caller.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use super::{CandleInterval, ExchangeClient, OrderAck, OrderDetail, OrderRequest};
use crate::error::ExchangeResult;
use crate::types::{Candle, Ticker};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

/// Run `op` under `policy`.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> ExchangeResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ExchangeResult<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(call = label, attempt, max_attempts, error = %e, "request failed, retrying");
                tokio::time::sleep(policy.backoff).await;
                attempt += 1;
            }
            Err(e) => {
                error!(call = label, attempt, error = %e, "request failed");
                return Err(e);
            }
        }
    }
}

/// Decorator that applies a [`RetryPolicy`] to every call of an inner client.
pub struct RetryingClient<C> {
    inner: C,
    policy: RetryPolicy,
}

impl<C> RetryingClient<C> {
    pub fn new(inner: C, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<C: ExchangeClient> ExchangeClient for RetryingClient<C> {
    async fn list_instruments(&self) -> ExchangeResult<Vec<String>> {
        with_retry(self.policy, "list_instruments", || self.inner.list_instruments()).await
    }

    async fn get_ticker(&self, instrument_id: &str) -> ExchangeResult<Ticker> {
        with_retry(self.policy, "get_ticker", || self.inner.get_ticker(instrument_id)).await
    }

    async fn get_candles(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
        count: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        with_retry(self.policy, "get_candles", || {
            self.inner.get_candles(instrument_id, interval, count)
        })
        .await
    }

    async fn submit_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        with_retry(self.policy, "submit_order", || self.inner.submit_order(order)).await
    }

    async fn get_order(&self, order_id: &str) -> ExchangeResult<OrderDetail> {
        with_retry(self.policy, "get_order", || self.inner.get_order(order_id)).await
    }
}
