//! Decision and execution loop for the virtual trading engine.
//!
//! The pipeline per tick is price feed, trade monitor, signal engine, risk
//! gate, position manager; the ledger owns all mutable state behind one
//! mutex and persists it as atomic JSON documents. A separate collector task
//! keeps the bar store warm and never touches the ledger.

pub mod collector;
pub mod ledger;
pub mod manager;
pub mod monitor;
pub mod risk;
pub mod trader;

pub use collector::DataCollector;
pub use ledger::{Ledger, LedgerState};
pub use manager::{OpenGate, OpenRequest, PositionManager};
pub use trader::{AutoTrader, PositionFilter, TickReport};
