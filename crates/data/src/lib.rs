//! Persistence for the virtual trading engine.
//!
//! Two storage surfaces live here:
//! - [`MarketStore`]: an embedded SQLite database holding OHLCV bars with
//!   their indicator snapshots, closed-trade history, and notifications.
//! - [`JsonStore`]: write-temp-then-rename JSON documents for the ledger
//!   state blobs and classifier checkpoints.
//!
//! The background collector and the live loop use separate connections from
//! the same pool; writes are serialized per connection.

pub mod json_store;
pub mod notifications;
pub mod store;
pub mod trades;

pub use json_store::JsonStore;
pub use notifications::NotificationRecord;
pub use store::{MarketRecord, MarketStore};
pub use trades::{TradeFilter, TradePatch, TradeRecord};
