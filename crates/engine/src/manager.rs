//! Position lifecycle: admission-gated opens, manual and triggered closes,
//! and the per-tick mark-to-market pass. Every mutation of balance,
//! positions, and status happens inside one ledger critical section with an
//! explicit rollback on any failed post-condition.

use crate::ledger::{Ledger, LedgerState};
use crate::monitor;
use crate::risk::{self, Candidate};
use chrono::{DateTime, Utc};
use papertrade_core::{
    position_id, protective_prices, CloseReason, FuturesPosition, FuturesSide, MarketKind,
    Position, PositionStatus, PriceSource, RiskConfig, SpotPosition, SpotSide, TradeError,
    TradingConfig,
};
use papertrade_data::{MarketStore, TradePatch, TradeRecord};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;

fn status_str(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Open => "OPEN",
        PositionStatus::ClosedTp => "CLOSED_TP",
        PositionStatus::ClosedSl => "CLOSED_SL",
        PositionStatus::ClosedManual => "CLOSED_MANUAL",
        PositionStatus::Liquidated => "LIQUIDATED",
    }
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// A request to open a virtual position. For spot, `amount_quote` is the
/// full notional; for futures it is the margin to post, and the notional is
/// `amount_quote * leverage`.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub symbol: String,
    pub market: MarketKind,
    /// BUY/LONG when true, SELL/SHORT when false.
    pub long: bool,
    pub amount_quote: Decimal,
    /// Futures only; falls back to the persisted futures settings.
    pub leverage: Option<u32>,
    /// Whole percents; fall back to the configured defaults per market.
    pub sl_pct: Option<Decimal>,
    pub tp_pct: Option<Decimal>,
}

/// How an open is gated. The automated loop honours the enabled flag and
/// counts committed signals; the manual control surface does neither.
#[derive(Debug, Clone, Copy)]
pub struct OpenGate {
    pub require_enabled: bool,
    pub count_signal: bool,
}

impl OpenGate {
    #[must_use]
    pub fn auto() -> Self {
        Self {
            require_enabled: true,
            count_signal: true,
        }
    }

    #[must_use]
    pub fn manual() -> Self {
        Self {
            require_enabled: false,
            count_signal: false,
        }
    }
}

pub struct PositionManager {
    ledger: Arc<Ledger>,
    store: Arc<MarketStore>,
    feed: Arc<dyn PriceSource>,
}

impl PositionManager {
    #[must_use]
    pub fn new(ledger: Arc<Ledger>, store: Arc<MarketStore>, feed: Arc<dyn PriceSource>) -> Self {
        Self {
            ledger,
            store,
            feed,
        }
    }

    fn validate(request: &OpenRequest) -> Result<(), TradeError> {
        if request.symbol.trim().is_empty() {
            return Err(TradeError::Validation("symbol must not be empty".into()));
        }
        if request.amount_quote <= Decimal::ZERO {
            return Err(TradeError::Validation("amount must be positive".into()));
        }
        if let Some(leverage) = request.leverage {
            if !(1..=125).contains(&leverage) {
                return Err(TradeError::Validation(
                    "leverage must be within [1, 125]".into(),
                ));
            }
        }
        for pct in [request.sl_pct, request.tp_pct].into_iter().flatten() {
            if pct <= Decimal::ZERO {
                return Err(TradeError::Validation(
                    "stop percentages must be positive".into(),
                ));
            }
        }
        Ok(())
    }

    /// Opens a position: fresh price read, risk admission, balance
    /// deduction, persistence, history append. Returns the created position.
    ///
    /// # Errors
    /// `NoPrice` when the feed has no usable price, `Validation` for
    /// malformed input, `AdmissionRejected` with the failing rule, and
    /// `Internal` when a post-condition fails (the operation is rolled back).
    pub async fn open(
        &self,
        request: &OpenRequest,
        trading: &TradingConfig,
        gate: OpenGate,
    ) -> Result<Position, TradeError> {
        Self::validate(request)?;
        let symbol = papertrade_core::normalize_symbol(&request.symbol);
        let entry = self
            .feed
            .price(&symbol)
            .await
            .price()
            .ok_or_else(|| TradeError::NoPrice(symbol.clone()))?;

        let mut state = self.ledger.lock().await;
        let position = match request.market {
            MarketKind::Spot => Self::build_spot(request, trading, &symbol, entry),
            MarketKind::Futures => Self::build_futures(request, &state, &symbol, entry),
        };

        let enabled = !gate.require_enabled || state.status.enabled;
        let candidate = Candidate {
            symbol: &symbol,
            side: position.side_str(),
            committed_quote: position.committed_quote(),
            futures: matches!(position, Position::Futures(_)),
        };
        risk::admit(
            enabled,
            &state.open_positions(),
            &state.account,
            state.balance.available,
            &trading.risk,
            &candidate,
        )?;

        let saved = state.clone();
        state.balance.available -= position.committed_quote();
        state.status.track_open(position.id());
        if gate.count_signal {
            state.status.signals_processed += 1;
        }
        state
            .positions
            .insert(position.id().to_string(), position.clone());

        if state.balance.available < Decimal::ZERO {
            *state = saved;
            return Err(TradeError::Internal(
                "balance went negative on open".into(),
            ));
        }
        state.recompute_account();
        state.touch();
        self.ledger.commit(&state);
        drop(state);

        if let Err(e) = self.store.save_trade(&Self::trade_record(&position)).await {
            tracing::warn!(id = position.id(), "failed to append trade history: {e:#}");
        }
        tracing::info!(
            id = position.id(),
            symbol = %symbol,
            side = position.side_str(),
            entry = %entry,
            "opened virtual position"
        );
        Ok(position)
    }

    fn build_spot(
        request: &OpenRequest,
        trading: &TradingConfig,
        symbol: &str,
        entry: Decimal,
    ) -> Position {
        let side = if request.long {
            SpotSide::Buy
        } else {
            SpotSide::Sell
        };
        let sl_pct = request.sl_pct.unwrap_or(trading.stop_loss_pct);
        let tp_pct = request.tp_pct.unwrap_or(trading.take_profit_pct);
        let (sl, tp) = protective_prices(entry, request.long, sl_pct, tp_pct);
        let opened_at = Utc::now();
        Position::Spot(SpotPosition {
            id: position_id(symbol, side.as_str(), opened_at),
            symbol: symbol.to_string(),
            side,
            amount_quote: request.amount_quote,
            entry_price: entry,
            stop_loss_price: sl,
            take_profit_price: tp,
            opened_at,
            status: PositionStatus::Open,
            current_price: Some(entry),
            unrealised_pnl: Decimal::ZERO,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
        })
    }

    fn build_futures(
        request: &OpenRequest,
        state: &LedgerState,
        symbol: &str,
        entry: Decimal,
    ) -> Position {
        let side = if request.long {
            FuturesSide::Long
        } else {
            FuturesSide::Short
        };
        let leverage = request.leverage.unwrap_or(state.settings.default_leverage);
        let margin = request.amount_quote;
        let notional = margin * Decimal::from(leverage);
        let size_base = if entry.is_zero() {
            Decimal::ZERO
        } else {
            notional / entry
        };
        let sl_pct = request.sl_pct.unwrap_or(state.settings.stop_loss_pct);
        let tp_pct = request.tp_pct.unwrap_or(state.settings.take_profit_pct);
        let (sl, tp) = protective_prices(entry, request.long, sl_pct, tp_pct);
        let opened_at = Utc::now();
        Position::Futures(FuturesPosition {
            id: position_id(symbol, side.as_str(), opened_at),
            symbol: symbol.to_string(),
            side,
            leverage,
            amount_quote: notional,
            margin_used: margin,
            size_base,
            entry_price: entry,
            stop_loss_price: sl,
            take_profit_price: tp,
            liquidation_price: papertrade_core::liquidation_price(entry, side, leverage),
            opened_at,
            status: PositionStatus::Open,
            current_price: Some(entry),
            unrealised_pnl: Decimal::ZERO,
            unrealised_pnl_pct: Decimal::ZERO,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
        })
    }

    /// Closes a position. When `price_hint` is `None` (manual close) a fresh
    /// price is read from the feed; triggered closes pass the tick price.
    ///
    /// # Errors
    /// `Conflict` for an unknown or already-closed id, `NoPrice` when no
    /// exit price can be obtained, `Internal` on a failed post-condition.
    pub async fn close(
        &self,
        id: &str,
        reason: CloseReason,
        price_hint: Option<Decimal>,
    ) -> Result<Position, TradeError> {
        let exit = match price_hint {
            Some(price) => price,
            None => {
                let symbol = {
                    let state = self.ledger.lock().await;
                    let position = state
                        .positions
                        .get(id)
                        .ok_or_else(|| TradeError::Conflict(format!("unknown position {id}")))?;
                    position.symbol().to_string()
                };
                self.feed
                    .price(&symbol)
                    .await
                    .price()
                    .ok_or(TradeError::NoPrice(symbol))?
            }
        };

        let mut state = self.ledger.lock().await;
        let closed = Self::close_in_state(&mut state, id, reason, exit)?;
        self.ledger.commit(&state);
        drop(state);

        self.record_close(&closed).await;
        Ok(closed)
    }

    fn close_in_state(
        state: &mut LedgerState,
        id: &str,
        reason: CloseReason,
        exit: Decimal,
    ) -> Result<Position, TradeError> {
        let Some(position) = state.positions.get(id) else {
            return Err(TradeError::Conflict(format!("unknown position {id}")));
        };
        if !position.is_open() {
            return Err(TradeError::Conflict(format!("position {id} already closed")));
        }

        let saved = state.clone();
        let closed_at = Utc::now();
        let (realised, credit) = match state.positions.get_mut(id).expect("present above") {
            Position::Futures(f) => {
                let realised = if reason == CloseReason::Liquidation {
                    -f.margin_used
                } else {
                    f.realised_pnl_at(exit)
                };
                let credit = (f.margin_used + realised).max(Decimal::ZERO);
                f.status = reason.terminal_status();
                f.closed_at = Some(closed_at);
                f.exit_price = Some(exit);
                f.realised_pnl = Some(realised);
                f.current_price = Some(exit);
                f.unrealised_pnl = Decimal::ZERO;
                f.unrealised_pnl_pct = Decimal::ZERO;
                (realised, credit)
            }
            Position::Spot(s) => {
                let realised = s.realised_pnl_at(exit);
                let credit = s.amount_quote + realised;
                s.status = reason.terminal_status();
                s.closed_at = Some(closed_at);
                s.exit_price = Some(exit);
                s.realised_pnl = Some(realised);
                s.current_price = Some(exit);
                s.unrealised_pnl = Decimal::ZERO;
                (realised, credit)
            }
        };

        state.balance.available += credit;
        if state.balance.available < Decimal::ZERO {
            *state = saved;
            return Err(TradeError::Internal(
                "balance went negative on close".into(),
            ));
        }
        state.status.track_close(id, realised);
        state.recompute_account();
        state.touch();
        Ok(state.positions.get(id).expect("still present").clone())
    }

    /// One monitor pass for a symbol at the given tick price: mark every
    /// open position to market, close the ones whose trigger fires, and
    /// re-derive the futures-account aggregates. Positions opened at or
    /// after `opened_before` are skipped so a position can never trigger on
    /// its own entry tick. Returns the positions closed this pass.
    pub async fn monitor_tick(
        &self,
        symbol: &str,
        price: Decimal,
        opened_before: DateTime<Utc>,
    ) -> Vec<Position> {
        let mut state = self.ledger.lock().await;
        let eligible: Vec<String> = state
            .positions
            .values()
            .filter(|p| {
                p.is_open()
                    && p.symbol().eq_ignore_ascii_case(symbol)
                    && p.opened_at() < opened_before
            })
            .map(|p| p.id().to_string())
            .collect();

        let mut closed = Vec::new();
        for id in eligible {
            if let Some(position) = state.positions.get_mut(&id) {
                match position {
                    Position::Spot(s) => s.mark(price),
                    Position::Futures(f) => f.mark(price),
                }
            }
            let trigger = state
                .positions
                .get(&id)
                .and_then(|p| monitor::detect_trigger(p, price));
            if let Some(reason) = trigger {
                match Self::close_in_state(&mut state, &id, reason, price) {
                    Ok(position) => {
                        tracing::info!(
                            id = %id,
                            reason = ?reason,
                            price = %price,
                            "trigger closed position"
                        );
                        closed.push(position);
                    }
                    Err(e) => {
                        tracing::error!(id = %id, "trigger close failed: {e}");
                    }
                }
            }
        }

        state.recompute_account();
        state.touch();
        self.ledger.commit(&state);
        drop(state);

        for position in &closed {
            self.record_close(position).await;
        }
        closed
    }

    async fn record_close(&self, position: &Position) {
        let patch = TradePatch {
            status: Some(status_str(position.status()).to_string()),
            exit_price: match position {
                Position::Spot(s) => s.exit_price.map(to_f64),
                Position::Futures(f) => f.exit_price.map(to_f64),
            },
            realised_pnl: position.realised_pnl().map(to_f64),
            closed_at: match position {
                Position::Spot(s) => s.closed_at,
                Position::Futures(f) => f.closed_at,
            },
        };
        let outcome = self.store.update_trade(position.id(), &patch).await;
        match outcome {
            // Row missing, e.g. history written on another database before a
            // restart; store the full record instead.
            Ok(false) => {
                if let Err(e) = self.store.save_trade(&Self::trade_record(position)).await {
                    tracing::warn!(id = position.id(), "failed to append trade history: {e:#}");
                }
            }
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(id = position.id(), "failed to update trade history: {e:#}");
            }
        }
    }

    fn trade_record(position: &Position) -> TradeRecord {
        let (market, leverage, exit_price, closed_at) = match position {
            Position::Spot(s) => ("spot", 1, s.exit_price, s.closed_at),
            Position::Futures(f) => ("futures", i64::from(f.leverage), f.exit_price, f.closed_at),
        };
        TradeRecord {
            id: position.id().to_string(),
            symbol: position.symbol().to_string(),
            market: market.to_string(),
            side: position.side_str().to_string(),
            entry_price: to_f64(position.entry_price()),
            exit_price: exit_price.map(to_f64),
            amount_quote: to_f64(match position {
                Position::Spot(s) => s.amount_quote,
                Position::Futures(f) => f.amount_quote,
            }),
            leverage,
            realised_pnl: position.realised_pnl().map(to_f64),
            status: status_str(position.status()).to_string(),
            opened_at: position.opened_at(),
            closed_at,
        }
    }
}
