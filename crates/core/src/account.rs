use crate::config::AmountConfig;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The single virtual quote-currency balance backing all simulated trading.
///
/// Mutated only inside the ledger critical section; every committed open or
/// close leaves `available >= 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VirtualBalance {
    pub available: Decimal,
    pub updated_at: DateTime<Utc>,
}

impl VirtualBalance {
    pub const STARTING_BALANCE: i64 = 10_000;

    #[must_use]
    pub fn starting() -> Self {
        Self {
            available: Decimal::from(Self::STARTING_BALANCE),
            updated_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_amount(amount: Decimal) -> Self {
        Self {
            available: amount,
            updated_at: Utc::now(),
        }
    }
}

/// Futures account aggregates, re-derived from the open positions after
/// every ledger update so that
/// `total_wallet_balance == available + sum(margin_used) + sum(unrealised_pnl)`
/// holds whenever the account is read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesAccount {
    pub total_wallet_balance: Decimal,
    pub available_balance: Decimal,
    pub total_margin_used: Decimal,
    pub total_unrealised_pnl: Decimal,
    pub maintenance_margin: Decimal,
    /// Maintenance margin over total wallet balance; >= 0.8 halts new opens.
    pub margin_ratio: Decimal,
    pub can_trade: bool,
}

impl FuturesAccount {
    pub const MAX_MARGIN_RATIO: &'static str = "0.8";

    #[must_use]
    pub fn empty(available: Decimal) -> Self {
        Self {
            total_wallet_balance: available,
            available_balance: available,
            total_margin_used: Decimal::ZERO,
            total_unrealised_pnl: Decimal::ZERO,
            maintenance_margin: Decimal::ZERO,
            margin_ratio: Decimal::ZERO,
            can_trade: true,
        }
    }
}

/// Control and bookkeeping document for the automated-signal loop.
/// Persisted on every mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutoTradingStatus {
    pub enabled: bool,
    /// Exactly the ids of currently OPEN positions.
    pub active_trade_ids: Vec<String>,
    /// Signals that resulted in a committed open.
    pub signals_processed: u64,
    pub total_profit: Decimal,
    pub wins: u64,
    pub losses: u64,
    pub configured_symbol: String,
    pub amount_config: AmountConfig,
    pub entry_threshold: f64,
    pub updated_at: DateTime<Utc>,
}

impl AutoTradingStatus {
    #[must_use]
    pub fn new(symbol: &str, amount_config: AmountConfig, entry_threshold: f64) -> Self {
        Self {
            enabled: false,
            active_trade_ids: Vec::new(),
            signals_processed: 0,
            total_profit: Decimal::ZERO,
            wins: 0,
            losses: 0,
            configured_symbol: symbol.to_string(),
            amount_config,
            entry_threshold,
            updated_at: Utc::now(),
        }
    }

    pub fn track_open(&mut self, id: &str) {
        if !self.active_trade_ids.iter().any(|i| i == id) {
            self.active_trade_ids.push(id.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn track_close(&mut self, id: &str, realised_pnl: Decimal) {
        self.active_trade_ids.retain(|i| i != id);
        self.total_profit += realised_pnl;
        if realised_pnl >= Decimal::ZERO {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmountConfig, AmountMode};
    use rust_decimal_macros::dec;

    fn status() -> AutoTradingStatus {
        AutoTradingStatus::new(
            "BTCUSDT",
            AmountConfig {
                mode: AmountMode::Fixed,
                amount: dec!(100),
                percentage: dec!(10),
            },
            0.6,
        )
    }

    #[test]
    fn starting_balance_is_ten_thousand() {
        assert_eq!(VirtualBalance::starting().available, dec!(10000));
    }

    #[test]
    fn track_open_is_idempotent_per_id() {
        let mut s = status();
        s.track_open("BTCUSDT_BUY_1");
        s.track_open("BTCUSDT_BUY_1");
        assert_eq!(s.active_trade_ids.len(), 1);
    }

    #[test]
    fn track_close_updates_profit_and_counters() {
        let mut s = status();
        s.track_open("BTCUSDT_BUY_1");
        s.track_close("BTCUSDT_BUY_1", dec!(5));
        s.track_close("missing", dec!(-2));
        assert!(s.active_trade_ids.is_empty());
        assert_eq!(s.total_profit, dec!(3));
        assert_eq!(s.wins, 1);
        assert_eq!(s.losses, 1);
    }
}
