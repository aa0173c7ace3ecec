// =============================================================================
// Upbit REST API Client — JWT-signed requests
// =============================================================================
//
// Authenticated calls carry `Authorization: Bearer <jwt>` where the token is
// an HS256 JWT over
//
//   { access_key, nonce, query_hash, query_hash_alg: "SHA512" }
//
// and `query_hash` is the hex SHA-512 of the request's query string. Public
// market-data calls go out unsigned.
//
// SECURITY: the secret key is never logged or serialised.
// =============================================================================

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::rate_limit::RateLimitTracker;
use super::{CandleInterval, ExchangeClient, Fill, OrderAck, OrderDetail, OrderRequest, OrderState};
use crate::error::{ExchangeError, ExchangeResult};
use crate::runtime_config::Credentials;
use crate::types::{Candle, OrderKind, Ticker};

const DEFAULT_BASE_URL: &str = "https://api.upbit.com";

/// The exchange serves at most this many candles per request.
const MAX_CANDLES_PER_PAGE: usize = 200;

const CANDLE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MarketEntry {
    market: String,
}

#[derive(Debug, Deserialize)]
struct TickerEntry {
    market: String,
    trade_price: f64,
    acc_trade_price_24h: f64,
}

#[derive(Debug, Deserialize)]
struct CandleEntry {
    candle_date_time_utc: String,
    opening_price: f64,
    high_price: f64,
    low_price: f64,
    trade_price: f64,
}

#[derive(Debug, Deserialize)]
struct OrderCreated {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct OrderEntry {
    uuid: String,
    /// `wait` / `watch` / `done` / `cancel`.
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    trades: Vec<TradeEntry>,
}

#[derive(Debug, Deserialize)]
struct TradeEntry {
    volume: String,
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    access_key: &'a str,
    nonce: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    query_hash_alg: Option<&'static str>,
}

impl CandleEntry {
    fn into_candle(self) -> ExchangeResult<Candle> {
        let start = NaiveDateTime::parse_from_str(&self.candle_date_time_utc, CANDLE_TIME_FORMAT)
            .map_err(|e| {
                ExchangeError::Parse(format!(
                    "bad candle time '{}': {e}",
                    self.candle_date_time_utc
                ))
            })?
            .and_utc();
        Ok(Candle::new(
            self.opening_price,
            self.high_price,
            self.low_price,
            self.trade_price,
            start.timestamp_millis(),
        ))
    }
}

impl OrderEntry {
    fn into_detail(self) -> ExchangeResult<OrderDetail> {
        let trades = self
            .trades
            .into_iter()
            .map(|t| {
                t.volume
                    .parse::<f64>()
                    .map(|volume| Fill { volume })
                    .map_err(|e| ExchangeError::Parse(format!("bad trade volume '{}': {e}", t.volume)))
            })
            .collect::<ExchangeResult<Vec<_>>>()?;
        let state = match self.state.as_deref() {
            Some("done") => OrderState::Done,
            Some("cancel") => OrderState::Cancelled,
            _ => OrderState::Open,
        };
        Ok(OrderDetail {
            order_id: self.uuid,
            state,
            trades,
        })
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Upbit REST client.
pub struct UpbitClient {
    credentials: Credentials,
    quote_currency: String,
    base_url: String,
    client: reqwest::Client,
    rate_limit: RateLimitTracker,
}

impl UpbitClient {
    /// Create a client for markets quoted in `quote_currency` (e.g. `KRW`).
    pub fn new(credentials: Credentials, quote_currency: impl Into<String>) -> ExchangeResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| ExchangeError::Network(format!("failed to build HTTP client: {e}")))?;

        debug!("UpbitClient initialised (base_url={DEFAULT_BASE_URL})");

        Ok(Self {
            credentials,
            quote_currency: quote_currency.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
            rate_limit: RateLimitTracker::new(),
        })
    }

    /// Point the client at another host (used against local mock servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    // -------------------------------------------------------------------------
    // Signing helpers
    // -------------------------------------------------------------------------

    /// Hex SHA-512 of a query string.
    pub fn query_hash(query: &str) -> String {
        hex::encode(Sha512::digest(query.as_bytes()))
    }

    /// Build the bearer token for a request whose parameters encode to
    /// `query` (empty for parameterless calls).
    pub fn sign(&self, query: &str) -> ExchangeResult<String> {
        let claims = Claims {
            access_key: &self.credentials.access_key,
            nonce: Uuid::new_v4().to_string(),
            query_hash: (!query.is_empty()).then(|| Self::query_hash(query)),
            query_hash_alg: (!query.is_empty()).then_some("SHA512"),
        };
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.credentials.secret_key.as_bytes()),
        )
        .map_err(|e| ExchangeError::Auth(format!("failed to sign request: {e}")))
    }

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, label: &str) -> ExchangeResult<T> {
        self.rate_limit.wait_if_needed().await;

        let resp = request.send().await?;
        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(call = label, "exchange throttled request");
            return Err(ExchangeError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                return Err(ExchangeError::Auth(body));
            }
            return Err(ExchangeError::Http {
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| ExchangeError::Parse(format!("{label}: {e}")))
    }

    fn public_get(&self, path: &str, query: &str) -> RequestBuilder {
        self.client.get(self.url(path, query))
    }

    fn signed(&self, method: Method, path: &str, query: &str) -> ExchangeResult<RequestBuilder> {
        let token = self.sign(query)?;
        Ok(self
            .client
            .request(method, self.url(path, query))
            .bearer_auth(token))
    }

    fn url(&self, path: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/v1{}", self.base_url, path)
        } else {
            format!("{}/v1{}?{}", self.base_url, path, query)
        }
    }

    async fn candle_page(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
        count: usize,
        to: Option<&str>,
    ) -> ExchangeResult<Vec<Candle>> {
        let mut params = vec![
            ("market", instrument_id.to_string()),
            ("count", count.to_string()),
        ];
        if let Some(to) = to {
            params.push(("to", to.to_string()));
        }
        let query = encode_query(&params);
        let path = format!("/candles/{}", interval.path());

        let entries: Vec<CandleEntry> = self.send(self.public_get(&path, &query), "get_candles").await?;
        entries.into_iter().map(CandleEntry::into_candle).collect()
    }
}

#[async_trait]
impl ExchangeClient for UpbitClient {
    /// GET /v1/market/all, filtered to the configured quote currency.
    #[instrument(skip(self), name = "upbit::list_instruments")]
    async fn list_instruments(&self) -> ExchangeResult<Vec<String>> {
        let entries: Vec<MarketEntry> = self
            .send(self.public_get("/market/all", ""), "list_instruments")
            .await?;
        let prefix = format!("{}-", self.quote_currency);
        let markets: Vec<String> = entries
            .into_iter()
            .map(|m| m.market)
            .filter(|m| m.starts_with(&prefix))
            .collect();
        debug!(count = markets.len(), quote = %self.quote_currency, "markets listed");
        Ok(markets)
    }

    /// GET /v1/ticker (signed, like every call that takes a market).
    #[instrument(skip(self), name = "upbit::get_ticker")]
    async fn get_ticker(&self, instrument_id: &str) -> ExchangeResult<Ticker> {
        let query = encode_query(&[("markets", instrument_id.to_string())]);
        let request = self.signed(Method::GET, "/ticker", &query)?;
        let entries: Vec<TickerEntry> = self.send(request, "get_ticker").await?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::EmptyResponse(format!("ticker {instrument_id}")))?;
        Ok(Ticker {
            instrument_id: entry.market,
            last_price: entry.trade_price,
            trailing_24h_quote_volume: entry.acc_trade_price_24h,
        })
    }

    /// GET /v1/candles/{interval}, paging backwards with `to` until `count`
    /// candles are collected. Result is newest-first.
    #[instrument(skip(self), name = "upbit::get_candles")]
    async fn get_candles(
        &self,
        instrument_id: &str,
        interval: CandleInterval,
        count: usize,
    ) -> ExchangeResult<Vec<Candle>> {
        let mut candles: Vec<Candle> = Vec::with_capacity(count);
        let mut to: Option<String> = None;

        while candles.len() < count {
            let page_size = (count - candles.len()).min(MAX_CANDLES_PER_PAGE);
            let page = self
                .candle_page(instrument_id, interval, page_size, to.as_deref())
                .await?;
            let received = page.len();
            let Some(oldest) = page.iter().map(|c| c.timestamp).min() else {
                break;
            };
            candles.extend(page);
            if received < page_size {
                break;
            }
            to = Some(format_candle_time(oldest)?);
        }

        debug!(instrument_id, count = candles.len(), "candles fetched");
        Ok(candles)
    }

    /// POST /v1/orders (signed).
    #[instrument(skip(self), name = "upbit::submit_order")]
    async fn submit_order(&self, order: &OrderRequest) -> ExchangeResult<OrderAck> {
        let amount_key = match order.kind {
            OrderKind::MarketByQuote => "price",
            OrderKind::MarketByVolume => "volume",
        };
        let params = vec![
            ("market", order.instrument_id.clone()),
            ("side", order.side.as_wire().to_string()),
            ("ord_type", order.kind.as_wire().to_string()),
            (amount_key, format_amount(order.amount)),
        ];
        let query = encode_query(&params);
        let body: serde_json::Map<String, serde_json::Value> = params
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.clone())))
            .collect();

        let token = self.sign(&query)?;
        let request = self
            .client
            .post(self.url("/orders", ""))
            .bearer_auth(token)
            .json(&body);

        let created: OrderCreated = self.send(request, "submit_order").await?;
        debug!(order_id = %created.uuid, "order accepted");
        Ok(OrderAck {
            order_id: created.uuid,
        })
    }

    /// GET /v1/order (signed).
    #[instrument(skip(self), name = "upbit::get_order")]
    async fn get_order(&self, order_id: &str) -> ExchangeResult<OrderDetail> {
        let query = encode_query(&[("uuid", order_id.to_string())]);
        let request = self.signed(Method::GET, "/order", &query)?;
        let entry: OrderEntry = self.send(request, "get_order").await?;
        entry.into_detail()
    }
}

impl std::fmt::Debug for UpbitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpbitClient")
            .field("credentials", &self.credentials)
            .field("quote_currency", &self.quote_currency)
            .field("base_url", &self.base_url)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `k=v&k=v` in the given order. Values used here (market codes, numbers,
/// uuids, timestamps) need no escaping beyond what the exchange hashes.
fn encode_query(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Fixed-point with at most eight decimals and no trailing zeros.
fn format_amount(value: f64) -> String {
    let s = format!("{value:.8}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    s.to_string()
}

fn format_candle_time(timestamp_ms: i64) -> ExchangeResult<String> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms)
        .map(|t| t.format(CANDLE_TIME_FORMAT).to_string())
        .ok_or_else(|| ExchangeError::Parse(format!("timestamp out of range: {timestamp_ms}")))
}
