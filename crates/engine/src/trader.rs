//! The per-tick pipeline and the control surface the HTTP layer calls into.
//!
//! Within one tick the ordering is strict: price read, trade monitor,
//! signal, risk gate, open. A tick runs to completion before the next one
//! starts for that symbol, and a position opened in a tick is not eligible
//! for the monitor until the following tick.

use crate::ledger::Ledger;
use crate::manager::{OpenGate, OpenRequest, PositionManager};
use crate::risk;
use chrono::Utc;
use papertrade_core::{
    Bar, CloseReason, Direction, FuturesAccount, Position, Prediction, PriceSource, TradeError,
    TradingConfig, VirtualBalance,
};
use papertrade_data::MarketStore;
use papertrade_indicators::IndicatorEngine;
use papertrade_signal::SignalEngine;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};

/// Filter for [`AutoTrader::list_positions`].
#[derive(Debug, Clone, Default)]
pub struct PositionFilter {
    /// `Some(true)` for open only, `Some(false)` for closed only.
    pub open: Option<bool>,
    pub symbol: Option<String>,
}

/// What one tick did, returned for inspection and tests.
#[derive(Debug)]
pub struct TickReport {
    pub prediction: Option<Prediction>,
    pub opened: Option<Position>,
    pub closed: Vec<Position>,
}

pub struct AutoTrader {
    feed: Arc<dyn PriceSource>,
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    manager: PositionManager,
    indicators: IndicatorEngine,
    signals: Mutex<SignalEngine>,
    config: RwLock<TradingConfig>,
    window_hours: i64,
}

impl AutoTrader {
    #[must_use]
    pub fn new(
        feed: Arc<dyn PriceSource>,
        store: Arc<MarketStore>,
        ledger: Arc<Ledger>,
        signals: SignalEngine,
        config: TradingConfig,
        window_hours: i64,
    ) -> Self {
        let manager = PositionManager::new(ledger.clone(), store.clone(), feed.clone());
        Self {
            feed,
            store,
            ledger,
            manager,
            indicators: IndicatorEngine::new(),
            signals: Mutex::new(signals),
            config: RwLock::new(config),
            window_hours,
        }
    }

    /// One pass of the pipeline for one symbol.
    pub async fn tick(&self, symbol: &str) -> TickReport {
        let config = self.config.read().await.clone();
        if self.ledger.needs_restore() {
            self.ledger.restore(&config).await;
        }
        let tick_start = Utc::now();
        let symbol = papertrade_core::normalize_symbol(symbol);

        // 1. Price and trigger pass. No price means no closes this tick.
        let price = self.feed.price(&symbol).await.price();
        let closed = match price {
            Some(price) => {
                let closed = self.manager.monitor_tick(&symbol, price, tick_start).await;
                let mut signals = self.signals.lock().await;
                for position in &closed {
                    let long = matches!(position.side_str(), "BUY" | "LONG");
                    let won = position
                        .realised_pnl()
                        .is_some_and(|pnl| pnl >= Decimal::ZERO);
                    signals.learn_from_close(position.id(), long, won);
                }
                closed
            }
            None => {
                tracing::warn!(symbol = %symbol, "no price this tick, skipping monitor");
                Vec::new()
            }
        };

        // 2. Indicator snapshot over the stored window, oldest first.
        let bars: Vec<Bar> = match self.store.recent(&symbol, self.window_hours).await {
            Ok(rows) => rows.iter().rev().map(|r| r.bar()).collect(),
            Err(e) => {
                tracing::warn!(symbol = %symbol, "window read failed: {e:#}");
                Vec::new()
            }
        };
        let close = bars.last().map_or(0.0, |b| b.close);
        let result = self.indicators.compute(&bars);

        // 3. Signal.
        let prediction = {
            let mut signals = self.signals.lock().await;
            signals.predict(&symbol, &result.snapshot, close, result.sufficient)
        };
        if prediction.direction == Direction::Hold {
            return TickReport {
                prediction: Some(prediction),
                opened: None,
                closed,
            };
        }

        // 4. Sizing, admission, open. The gate re-checks enabled and every
        // risk rule inside the critical section.
        let available = self.ledger.lock().await.balance.available;
        let amount = risk::position_size(&config.amount, available);
        let request = OpenRequest {
            symbol: symbol.clone(),
            market: config.market,
            long: prediction.direction == Direction::Buy,
            amount_quote: amount,
            leverage: None,
            sl_pct: None,
            tp_pct: None,
        };
        let opened = match self.manager.open(&request, &config, OpenGate::auto()).await {
            Ok(position) => {
                let mut signals = self.signals.lock().await;
                signals.note_open(position.id(), &result.snapshot, close);
                Some(position)
            }
            Err(TradeError::AdmissionRejected { rule }) => {
                tracing::debug!(symbol = %symbol, rule, "signal vetoed by risk gate");
                None
            }
            Err(e) => {
                tracing::warn!(symbol = %symbol, "open failed: {e}");
                None
            }
        };

        TickReport {
            prediction: Some(prediction),
            opened,
            closed,
        }
    }

    /// Runs the live loop until the shutdown signal flips to true, then
    /// flushes the ledger documents.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let (tick_secs, symbols) = {
            let config = self.config.read().await;
            (config.tick_secs, config.symbols.clone())
        };
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for symbol in &symbols {
                        self.tick(symbol).await;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let state = self.ledger.lock().await;
        self.ledger.commit(&state);
        tracing::info!("auto trader stopped, state flushed");
    }

    /// Persists the enabled flag. No positions are touched.
    pub async fn enable_auto_trading(&self, enabled: bool) {
        let mut state = self.ledger.lock().await;
        state.status.enabled = enabled;
        state.status.updated_at = Utc::now();
        self.ledger.commit(&state);
        tracing::info!(enabled, "auto trading toggled");
    }

    /// Replaces the active configuration; takes effect on the next tick.
    ///
    /// # Errors
    /// `Validation` when the new configuration is rejected; the active one
    /// is kept unchanged.
    pub async fn configure(&self, new_config: TradingConfig) -> Result<(), TradeError> {
        new_config.validate().map_err(TradeError::Validation)?;
        {
            let mut signals = self.signals.lock().await;
            signals.set_entry_threshold(new_config.entry_threshold);
        }
        let mut state = self.ledger.lock().await;
        state.status.configured_symbol = new_config
            .symbols
            .first()
            .cloned()
            .unwrap_or_else(|| state.status.configured_symbol.clone());
        state.status.amount_config = new_config.amount.clone();
        state.status.entry_threshold = new_config.entry_threshold;
        state.status.updated_at = Utc::now();
        state.settings = new_config.futures.clone();
        self.ledger.commit(&state);
        drop(state);
        *self.config.write().await = new_config;
        Ok(())
    }

    /// Latest prediction emitted for the symbol, if any.
    pub async fn current_signal(&self, symbol: &str) -> Option<Prediction> {
        let symbol = papertrade_core::normalize_symbol(symbol);
        self.signals.lock().await.current_signal(&symbol)
    }

    /// Manual open through the control surface. Not counted as a processed
    /// signal and not gated on the enabled flag.
    ///
    /// # Errors
    /// See [`PositionManager::open`].
    pub async fn open_virtual_position(
        &self,
        request: &OpenRequest,
    ) -> Result<Position, TradeError> {
        let config = self.config.read().await.clone();
        self.manager.open(request, &config, OpenGate::manual()).await
    }

    /// Manual close at a fresh feed price.
    ///
    /// # Errors
    /// See [`PositionManager::close`].
    pub async fn close_position(&self, id: &str) -> Result<Position, TradeError> {
        self.manager.close(id, CloseReason::Manual, None).await
    }

    /// Snapshot of positions matching the filter.
    pub async fn list_positions(&self, filter: &PositionFilter) -> Vec<Position> {
        let state = self.ledger.lock().await;
        state
            .positions
            .values()
            .filter(|p| match filter.open {
                Some(open) => p.is_open() == open,
                None => true,
            })
            .filter(|p| match &filter.symbol {
                Some(symbol) => p.symbol().eq_ignore_ascii_case(symbol),
                None => true,
            })
            .cloned()
            .collect()
    }

    /// Current account aggregates and virtual balance.
    pub async fn account(&self) -> (FuturesAccount, VirtualBalance) {
        let state = self.ledger.lock().await;
        (state.account.clone(), state.balance.clone())
    }

    /// Resets the virtual balance, only when no position is open.
    ///
    /// # Errors
    /// `Conflict` while positions are open, `Validation` for a non-positive
    /// amount.
    pub async fn reset_virtual_balance(
        &self,
        amount: Option<Decimal>,
    ) -> Result<VirtualBalance, TradeError> {
        let amount = amount.unwrap_or(Decimal::from(VirtualBalance::STARTING_BALANCE));
        if amount <= Decimal::ZERO {
            return Err(TradeError::Validation(
                "reset amount must be positive".into(),
            ));
        }
        let mut state = self.ledger.lock().await;
        if !state.open_positions().is_empty() {
            return Err(TradeError::Conflict(
                "cannot reset balance while positions are open".into(),
            ));
        }
        state.balance = VirtualBalance::with_amount(amount);
        state.recompute_account();
        self.ledger.commit(&state);
        Ok(state.balance.clone())
    }

    /// The feed handle, shared with the collector.
    #[must_use]
    pub fn feed(&self) -> Arc<dyn PriceSource> {
        self.feed.clone()
    }
}
