//! The ledger owns all mutable trading state: the virtual balance, the
//! position set, the auto-trading status, the futures-account aggregates,
//! and the futures settings. It is the single writer; every mutation happens
//! under one mutex held for the whole open/close critical section, and every
//! commit persists the state as atomic JSON documents.

use anyhow::Result;
use chrono::Utc;
use papertrade_core::{
    AutoTradingStatus, FuturesAccount, FuturesSettings, Position, TradingConfig, VirtualBalance,
};
use papertrade_data::JsonStore;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};

pub const DOC_BALANCE: &str = "virtual_balance";
pub const DOC_STATUS: &str = "auto_trading_status";
pub const DOC_ACCOUNT: &str = "futures_account";
pub const DOC_POSITIONS: &str = "positions";
pub const DOC_SETTINGS: &str = "futures_settings";

/// Everything behind the ledger mutex.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub balance: VirtualBalance,
    pub positions: BTreeMap<String, Position>,
    pub status: AutoTradingStatus,
    pub account: FuturesAccount,
    pub settings: FuturesSettings,
}

impl LedgerState {
    fn fresh(trading: &TradingConfig) -> Self {
        let symbol = trading
            .symbols
            .first()
            .cloned()
            .unwrap_or_else(|| "BTCUSDT".to_string());
        let balance = VirtualBalance::starting();
        let account = FuturesAccount::empty(balance.available);
        Self {
            balance,
            positions: BTreeMap::new(),
            status: AutoTradingStatus::new(&symbol, trading.amount.clone(), trading.entry_threshold),
            account,
            settings: trading.futures.clone(),
        }
    }

    /// Currently OPEN positions.
    #[must_use]
    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().filter(|p| p.is_open()).collect()
    }

    /// Re-derives the futures-account aggregates from the open positions so
    /// that `total_wallet_balance == available + sum(margin_used) +
    /// sum(unrealised_pnl)` holds whenever the account is read.
    pub fn recompute_account(&mut self) {
        let mut margin_used = Decimal::ZERO;
        let mut unrealised = Decimal::ZERO;
        let mut maintenance = Decimal::ZERO;
        for position in self.positions.values() {
            if let Position::Futures(f) = position {
                if f.status == papertrade_core::PositionStatus::Open {
                    margin_used += f.margin_used;
                    unrealised += f.unrealised_pnl;
                    let mark = f.current_price.unwrap_or(f.entry_price);
                    maintenance += f.maintenance_margin(mark);
                }
            }
        }

        let available = self.balance.available;
        let wallet = available + margin_used + unrealised;
        let margin_ratio = if wallet <= Decimal::ZERO {
            Decimal::ONE
        } else {
            maintenance / wallet
        };
        self.account = FuturesAccount {
            total_wallet_balance: wallet,
            available_balance: available,
            total_margin_used: margin_used,
            total_unrealised_pnl: unrealised,
            maintenance_margin: maintenance,
            margin_ratio,
            can_trade: margin_ratio < Decimal::new(8, 1),
        };
    }

    /// Touches the balance timestamp; the monotonic `updated_at` marks every
    /// committed mutation.
    pub fn touch(&mut self) {
        self.balance.updated_at = Utc::now();
    }
}

/// Mutex-guarded state plus its persistence.
pub struct Ledger {
    store: JsonStore,
    state: Mutex<LedgerState>,
    needs_restore: AtomicBool,
}

impl Ledger {
    /// Loads state from the JSON documents, falling back to a fresh ledger
    /// (10 000 starting balance, trading disabled) for any missing document.
    #[must_use]
    pub fn open(store: JsonStore, trading: &TradingConfig) -> Self {
        let fresh = LedgerState::fresh(trading);
        let balance = store
            .load_or_none::<VirtualBalance>(DOC_BALANCE)
            .unwrap_or(fresh.balance);
        let positions: BTreeMap<String, Position> = store
            .load_or_none::<Vec<Position>>(DOC_POSITIONS)
            .unwrap_or_default()
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        let status = store
            .load_or_none::<AutoTradingStatus>(DOC_STATUS)
            .unwrap_or(fresh.status);
        let settings = store
            .load_or_none::<FuturesSettings>(DOC_SETTINGS)
            .unwrap_or(fresh.settings);

        let mut state = LedgerState {
            balance,
            positions,
            status,
            account: fresh.account,
            settings,
        };
        state.recompute_account();
        Self {
            store,
            state: Mutex::new(state),
            needs_restore: AtomicBool::new(false),
        }
    }

    /// Acquires the critical section.
    pub async fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().await
    }

    /// Writes every state document atomically.
    ///
    /// # Errors
    /// Returns the first write failure; already-written documents stay
    /// individually consistent (each rename is atomic).
    pub fn persist(&self, state: &LedgerState) -> Result<()> {
        self.store.save(DOC_BALANCE, &state.balance)?;
        let positions: Vec<&Position> = state.positions.values().collect();
        self.store.save(DOC_POSITIONS, &positions)?;
        self.store.save(DOC_STATUS, &state.status)?;
        self.store.save(DOC_ACCOUNT, &state.account)?;
        self.store.save(DOC_SETTINGS, &state.settings)?;
        Ok(())
    }

    /// Persists; on failure the in-memory state is marked stale and will be
    /// re-read from the last good documents at the start of the next tick.
    pub fn commit(&self, state: &LedgerState) {
        if let Err(e) = self.persist(state) {
            tracing::error!("ledger persistence failed, scheduling restore: {e:#}");
            self.needs_restore.store(true, Ordering::SeqCst);
        }
    }

    #[must_use]
    pub fn needs_restore(&self) -> bool {
        self.needs_restore.load(Ordering::SeqCst)
    }

    /// Replaces the in-memory state with the last persisted documents. Used
    /// after a failed commit; state committed before the failure survives.
    pub async fn restore(&self, trading: &TradingConfig) {
        let fresh = LedgerState::fresh(trading);
        let mut state = self.state.lock().await;
        state.balance = self
            .store
            .load_or_none::<VirtualBalance>(DOC_BALANCE)
            .unwrap_or(fresh.balance);
        state.positions = self
            .store
            .load_or_none::<Vec<Position>>(DOC_POSITIONS)
            .unwrap_or_default()
            .into_iter()
            .map(|p| (p.id().to_string(), p))
            .collect();
        state.status = self
            .store
            .load_or_none::<AutoTradingStatus>(DOC_STATUS)
            .unwrap_or(fresh.status);
        state.settings = self
            .store
            .load_or_none::<FuturesSettings>(DOC_SETTINGS)
            .unwrap_or(fresh.settings);
        state.recompute_account();
        self.needs_restore.store(false, Ordering::SeqCst);
        tracing::warn!("ledger state restored from persisted documents");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use papertrade_core::{
        position_id, FuturesPosition, FuturesSide, PositionStatus,
    };
    use rust_decimal_macros::dec;

    fn futures_position(symbol: &str, margin: Decimal, unrealised: Decimal) -> Position {
        let entry = dec!(2000);
        Position::Futures(FuturesPosition {
            id: position_id(symbol, "LONG", Utc::now()),
            symbol: symbol.to_string(),
            side: FuturesSide::Long,
            leverage: 10,
            amount_quote: margin * dec!(10),
            margin_used: margin,
            size_base: margin * dec!(10) / entry,
            entry_price: entry,
            stop_loss_price: dec!(1900),
            take_profit_price: dec!(2200),
            liquidation_price: dec!(1810),
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            current_price: None,
            unrealised_pnl: unrealised,
            unrealised_pnl_pct: Decimal::ZERO,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
        })
    }

    fn ledger_in(dir: &std::path::Path) -> Ledger {
        Ledger::open(JsonStore::open(dir).unwrap(), &TradingConfig::default())
    }

    #[tokio::test]
    async fn fresh_ledger_starts_with_ten_thousand() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        let state = ledger.lock().await;
        assert_eq!(state.balance.available, dec!(10000));
        assert!(!state.status.enabled);
        assert!(state.positions.is_empty());
        assert!(state.account.can_trade);
    }

    #[tokio::test]
    async fn account_coherence_after_recompute() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        let mut state = ledger.lock().await;

        let p1 = futures_position("BTCUSDT", dec!(100), dec!(25));
        let p2 = futures_position("ETHUSDT", dec!(50), dec!(-10));
        state.balance.available -= dec!(150);
        state.positions.insert(p1.id().to_string(), p1);
        state.positions.insert(p2.id().to_string(), p2);
        state.recompute_account();

        let account = &state.account;
        assert_eq!(
            account.total_wallet_balance,
            state.balance.available + account.total_margin_used + account.total_unrealised_pnl
        );
        assert_eq!(account.total_margin_used, dec!(150));
        assert_eq!(account.total_unrealised_pnl, dec!(15));
        assert!(account.maintenance_margin > Decimal::ZERO);
        assert!(account.can_trade);
    }

    #[tokio::test]
    async fn persist_and_reopen_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ledger = ledger_in(dir.path());
            let mut state = ledger.lock().await;
            state.balance.available = dec!(9900);
            let p = futures_position("BTCUSDT", dec!(100), Decimal::ZERO);
            state.status.track_open(p.id());
            state.positions.insert(p.id().to_string(), p);
            state.recompute_account();
            ledger.persist(&state).unwrap();
        }

        let reopened = ledger_in(dir.path());
        let state = reopened.lock().await;
        assert_eq!(state.balance.available, dec!(9900));
        assert_eq!(state.positions.len(), 1);
        assert_eq!(state.status.active_trade_ids.len(), 1);
        assert_eq!(state.account.total_margin_used, dec!(100));
    }

    #[tokio::test]
    async fn restore_discards_unpersisted_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        {
            let state = ledger.lock().await;
            ledger.persist(&state).unwrap();
        }
        {
            let mut state = ledger.lock().await;
            state.balance.available = dec!(1);
        }
        ledger.restore(&TradingConfig::default()).await;
        let state = ledger.lock().await;
        assert_eq!(state.balance.available, dec!(10000));
        assert!(!ledger.needs_restore());
    }
}
