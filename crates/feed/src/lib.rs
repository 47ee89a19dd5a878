//! Live market data feed.
//!
//! The feed is the only component allowed to talk to the exchange; everything
//! else reads from the data store or is handed a price by its caller. All
//! transient failures are absorbed here behind a bounded retry, and there are
//! no fallback prices: an exhausted retry budget yields
//! [`papertrade_core::PriceResult::Unavailable`].

pub mod binance;

pub use binance::BinanceFeed;
