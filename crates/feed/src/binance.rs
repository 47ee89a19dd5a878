use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter};
use papertrade_core::{normalize_symbol, Bar, Interval, PriceResult, PriceSource};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::time::Duration;

/// Binance spot REST API base URL.
const BINANCE_SPOT_API: &str = "https://api.binance.com";

/// Per-attempt request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Backoff schedule between retry attempts: 0.5s, 1s, 2s.
const BACKOFF_MS: [u64; 3] = [500, 1000, 2000];

/// Attempts per call before giving up.
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct TickerResponse {
    #[allow(dead_code)]
    symbol: String,
    price: String,
}

/// Rate-limited client for the public Binance spot ticker and kline
/// endpoints.
pub struct BinanceFeed {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: RateLimiter<
        governor::state::NotKeyed,
        governor::state::InMemoryState,
        governor::clock::DefaultClock,
    >,
}

impl BinanceFeed {
    /// Creates a feed against the public Binance spot API with a default
    /// request budget of 10 requests per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BINANCE_SPOT_API, 10)
    }

    /// Creates a feed with a custom base URL and rate limit.
    ///
    /// # Panics
    /// Panics if `rate_limit_per_second` is zero.
    #[must_use]
    pub fn with_config(base_url: &str, rate_limit_per_second: u32) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        let quota = Quota::per_second(
            NonZeroU32::new(rate_limit_per_second).expect("Rate limit must be > 0"),
        );

        Self {
            client,
            base_url: base_url.to_string(),
            rate_limiter: RateLimiter::direct(quota),
        }
    }

    /// One ticker request. HTTP 429 and transport errors are transient; any
    /// other non-2xx status burns a retry attempt the same way.
    async fn fetch_price_once(&self, symbol: &str) -> Result<Decimal> {
        let url = format!("{}/api/v3/ticker/price", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .send()
            .await
            .context("ticker request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("ticker returned HTTP {status}"));
        }

        let ticker: TickerResponse = response.json().await.context("malformed ticker body")?;
        let price =
            Decimal::from_str(&ticker.price).context("ticker price is not a decimal")?;
        if price <= Decimal::ZERO {
            return Err(anyhow!("ticker price is not positive: {price}"));
        }
        Ok(price)
    }

    async fn fetch_klines_once(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("symbol", symbol),
                ("interval", interval.as_str()),
                ("limit", &limit.to_string()),
            ])
            .send()
            .await
            .context("kline request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("klines returned HTTP {status}"));
        }

        let rows: Vec<Vec<serde_json::Value>> =
            response.json().await.context("malformed kline body")?;

        let mut bars = Vec::with_capacity(rows.len());
        for row in rows {
            match parse_kline_row(symbol, &row) {
                Ok(bar) => bars.push(bar),
                Err(e) => tracing::warn!(symbol, "skipping malformed kline row: {e}"),
            }
        }
        // The exchange returns oldest-first already; keep the invariant
        // explicit in case of a misbehaving mirror.
        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }
}

impl Default for BinanceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceSource for BinanceFeed {
    async fn price(&self, symbol: &str) -> PriceResult {
        let symbol = normalize_symbol(symbol);
        for attempt in 0..MAX_ATTEMPTS {
            self.rate_limiter.until_ready().await;
            match self.fetch_price_once(&symbol).await {
                Ok(price) => return PriceResult::Price(price),
                Err(e) => {
                    tracing::warn!(
                        symbol,
                        attempt = attempt + 1,
                        "price fetch failed: {e:#}"
                    );
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(BACKOFF_MS[attempt])).await;
                    }
                }
            }
        }
        tracing::error!(symbol, "price unavailable after {MAX_ATTEMPTS} attempts");
        PriceResult::Unavailable
    }

    async fn klines(&self, symbol: &str, interval: Interval, limit: usize) -> Vec<Bar> {
        let symbol = normalize_symbol(symbol);
        for attempt in 0..MAX_ATTEMPTS {
            self.rate_limiter.until_ready().await;
            match self.fetch_klines_once(&symbol, interval, limit).await {
                Ok(bars) => return bars,
                Err(e) => {
                    tracing::warn!(
                        symbol,
                        attempt = attempt + 1,
                        "kline fetch failed: {e:#}"
                    );
                    if attempt + 1 < MAX_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(BACKOFF_MS[attempt])).await;
                    }
                }
            }
        }
        tracing::error!(symbol, "klines unavailable after {MAX_ATTEMPTS} attempts");
        Vec::new()
    }
}

/// Parses one kline array row:
/// `[open_ms, open, high, low, close, volume, close_ms, ...]`.
fn parse_kline_row(symbol: &str, row: &[serde_json::Value]) -> Result<Bar> {
    if row.len() < 6 {
        return Err(anyhow!("kline row has {} fields, expected >= 6", row.len()));
    }

    let open_ms = row[0]
        .as_i64()
        .ok_or_else(|| anyhow!("open time is not an integer"))?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(open_ms)
        .ok_or_else(|| anyhow!("open time out of range: {open_ms}"))?;

    let field = |idx: usize, name: &str| -> Result<f64> {
        let value = row[idx]
            .as_str()
            .ok_or_else(|| anyhow!("{name} is not a string"))?
            .parse::<f64>()
            .with_context(|| format!("{name} is not numeric"))?;
        if !value.is_finite() {
            return Err(anyhow!("{name} is not finite"));
        }
        Ok(value)
    };

    Ok(Bar {
        symbol: symbol.to_string(),
        timestamp,
        open: field(1, "open")?,
        high: field(2, "high")?,
        low: field(3, "low")?,
        close: field(4, "close")?,
        volume: field(5, "volume")?,
    })
}
