use crate::bar::Bar;
use crate::interval::Interval;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Outcome of a last-trade price lookup. The feed never raises to callers
/// and never substitutes a fallback price: after retry exhaustion the result
/// is `Unavailable` and every consumer treats it as "no price this tick".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceResult {
    Price(Decimal),
    Unavailable,
}

impl PriceResult {
    #[must_use]
    pub fn price(self) -> Option<Decimal> {
        match self {
            PriceResult::Price(p) => Some(p),
            PriceResult::Unavailable => None,
        }
    }
}

/// The only seam through which the core reads market prices. The live
/// implementation talks to the exchange REST API; tests inject scripted
/// feeds.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current last-trade price for a symbol.
    async fn price(&self, symbol: &str) -> PriceResult;

    /// Most recent `limit` OHLCV bars, oldest first. A prolonged outage
    /// yields an empty list; downstream treats that as insufficient data.
    async fn klines(&self, symbol: &str, interval: Interval, limit: usize) -> Vec<Bar>;
}
