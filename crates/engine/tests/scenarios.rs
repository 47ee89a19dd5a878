//! End-to-end scenarios for the decision and execution loop, driven through
//! a scripted price feed against an in-memory store and a temp state dir.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use papertrade_engine::{AutoTrader, Ledger, OpenGate, OpenRequest, PositionManager};
use papertrade_core::{
    Bar, CloseReason, Direction, Interval, MarketKind, Position, PositionStatus, PriceResult,
    PriceSource, TradeError, TradingConfig,
};
use papertrade_data::{JsonStore, MarketStore, TradeFilter};
use papertrade_signal::SignalEngine;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

struct ScriptedFeed {
    prices: Mutex<VecDeque<PriceResult>>,
    bars: Vec<Bar>,
}

impl ScriptedFeed {
    fn new(prices: Vec<PriceResult>) -> Arc<Self> {
        Arc::new(Self {
            prices: Mutex::new(prices.into()),
            bars: Vec::new(),
        })
    }

    fn prices(prices: &[Decimal]) -> Arc<Self> {
        Self::new(prices.iter().map(|p| PriceResult::Price(*p)).collect())
    }
}

#[async_trait]
impl PriceSource for ScriptedFeed {
    async fn price(&self, _symbol: &str) -> PriceResult {
        self.prices
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(PriceResult::Unavailable)
    }

    async fn klines(&self, _symbol: &str, _interval: Interval, _limit: usize) -> Vec<Bar> {
        self.bars.clone()
    }
}

struct Rig {
    _state_dir: tempfile::TempDir,
    store: Arc<MarketStore>,
    ledger: Arc<Ledger>,
    manager: PositionManager,
    config: TradingConfig,
}

async fn rig(feed: Arc<ScriptedFeed>) -> Rig {
    let state_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MarketStore::in_memory().await.unwrap());
    let config = TradingConfig::default();
    let ledger = Arc::new(Ledger::open(
        JsonStore::open(state_dir.path()).unwrap(),
        &config,
    ));
    let manager = PositionManager::new(ledger.clone(), store.clone(), feed.clone());
    Rig {
        _state_dir: state_dir,
        store,
        ledger,
        manager,
        config,
    }
}

fn spot_request(symbol: &str, amount: Decimal) -> OpenRequest {
    OpenRequest {
        symbol: symbol.to_string(),
        market: MarketKind::Spot,
        long: true,
        amount_quote: amount,
        leverage: None,
        sl_pct: None,
        tp_pct: None,
    }
}

#[tokio::test]
async fn spot_take_profit_hit() {
    // Fixed 100 USDT, sl 2%, tp 5%. Entry 50 000, next price 52 500.
    let feed = ScriptedFeed::prices(&[dec!(50000)]);
    let rig = rig(feed).await;

    let opened = rig
        .manager
        .open(
            &spot_request("BTCUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();
    assert_eq!(rig.ledger.lock().await.balance.available, dec!(9900));

    let closed = rig
        .manager
        .monitor_tick("BTCUSDT", dec!(52500), Utc::now())
        .await;
    assert_eq!(closed.len(), 1);
    let Position::Spot(position) = &closed[0] else {
        panic!("expected a spot position");
    };
    assert_eq!(position.id, opened.id());
    assert_eq!(position.status, PositionStatus::ClosedTp);
    assert_eq!(position.exit_price, Some(dec!(52500)));
    assert_eq!(position.realised_pnl, Some(dec!(5.0)));

    let state = rig.ledger.lock().await;
    assert_eq!(state.balance.available, dec!(10005.0));
    assert!(state.status.active_trade_ids.is_empty());
    assert_eq!(state.status.total_profit, dec!(5.0));
    drop(state);

    let trades = rig.store.list_trades(&TradeFilter::default()).await.unwrap();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].status, "CLOSED_TP");
    assert_eq!(trades[0].realised_pnl, Some(5.0));
}

#[tokio::test]
async fn spot_stop_loss_hit() {
    let feed = ScriptedFeed::prices(&[dec!(50000)]);
    let rig = rig(feed).await;

    rig.manager
        .open(
            &spot_request("BTCUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();

    let closed = rig
        .manager
        .monitor_tick("BTCUSDT", dec!(49000), Utc::now())
        .await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status(), PositionStatus::ClosedSl);
    assert_eq!(closed[0].realised_pnl(), Some(dec!(-2.0)));
    assert_eq!(rig.ledger.lock().await.balance.available, dec!(9998.0));
}

#[tokio::test]
async fn futures_liquidation_precedes_stop_loss() {
    // LONG at 2000 with 50x and 100 margin: liquidation at 1970. A drop to
    // 1900 crosses both the SL (1900) and the liquidation level; the most
    // adverse reason wins and the margin is fully lost.
    let feed = ScriptedFeed::prices(&[dec!(2000)]);
    let rig = rig(feed).await;

    let request = OpenRequest {
        symbol: "ETHUSDT".to_string(),
        market: MarketKind::Futures,
        long: true,
        amount_quote: dec!(100),
        leverage: Some(50),
        sl_pct: Some(dec!(5)),
        tp_pct: Some(dec!(10)),
    };
    let opened = rig
        .manager
        .open(&request, &rig.config, OpenGate::manual())
        .await
        .unwrap();
    let Position::Futures(futures) = &opened else {
        panic!("expected a futures position");
    };
    assert_eq!(futures.liquidation_price, dec!(1970));
    assert_eq!(futures.margin_used, dec!(100));
    assert_eq!(rig.ledger.lock().await.balance.available, dec!(9900));

    let closed = rig
        .manager
        .monitor_tick("ETHUSDT", dec!(1900), Utc::now())
        .await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status(), PositionStatus::Liquidated);
    assert_eq!(closed[0].realised_pnl(), Some(dec!(-100)));

    // Margin fully lost: nothing comes back to the balance.
    let state = rig.ledger.lock().await;
    assert_eq!(state.balance.available, dec!(9900));
    assert_eq!(
        state.account.total_wallet_balance,
        state.balance.available
            + state.account.total_margin_used
            + state.account.total_unrealised_pnl
    );
}

#[tokio::test]
async fn admission_rejects_fourth_position() {
    let feed = ScriptedFeed::prices(&[dec!(50000), dec!(2000), dec!(100), dec!(10)]);
    let rig = rig(feed).await;

    for symbol in ["BTCUSDT", "ETHUSDT", "SOLUSDT"] {
        rig.manager
            .open(
                &spot_request(symbol, dec!(100)),
                &rig.config,
                OpenGate::manual(),
            )
            .await
            .unwrap();
    }
    let balance_before = rig.ledger.lock().await.balance.available;

    let rejected = rig
        .manager
        .open(
            &spot_request("XRPUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await;
    match rejected {
        Err(TradeError::AdmissionRejected { rule }) => assert_eq!(rule, "max_positions"),
        other => panic!("expected admission rejection, got {other:?}"),
    }

    let state = rig.ledger.lock().await;
    assert_eq!(state.balance.available, balance_before);
    assert_eq!(state.positions.len(), 3);
    assert_eq!(state.status.signals_processed, 0);
}

#[tokio::test]
async fn insufficient_data_yields_hold_and_no_position() {
    let state_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MarketStore::in_memory().await.unwrap());
    let config = TradingConfig::default();
    let ledger = Arc::new(Ledger::open(
        JsonStore::open(state_dir.path()).unwrap(),
        &config,
    ));

    // 20 recent bars, well under the 50-bar warm-up.
    let now = Utc::now();
    let bars: Vec<Bar> = (0..20)
        .map(|i| Bar {
            symbol: "KAIAUSDT".to_string(),
            timestamp: now - Duration::minutes(5 * (20 - i)),
            open: 0.15,
            high: 0.16,
            low: 0.14,
            close: 0.15,
            volume: 1000.0,
        })
        .collect();
    store.append_bars(&bars).await.unwrap();

    let feed = ScriptedFeed::prices(&[dec!(0.15)]);
    let signals = SignalEngine::new(JsonStore::open(state_dir.path()).unwrap(), 0.6);
    let trader = AutoTrader::new(feed, store, ledger.clone(), signals, config, 24);
    trader.enable_auto_trading(true).await;

    let report = trader.tick("KAIAUSDT").await;
    let prediction = report.prediction.unwrap();
    assert_eq!(prediction.direction, Direction::Hold);
    assert!(prediction.confidence.abs() < f64::EPSILON);
    assert!(report.opened.is_none());
    assert!(ledger.lock().await.positions.is_empty());
}

#[tokio::test]
async fn price_feed_outage_changes_nothing() {
    // One position opened while the feed was healthy, then a full outage.
    let feed = ScriptedFeed::new(vec![
        PriceResult::Price(dec!(50000)),
        PriceResult::Unavailable,
        PriceResult::Unavailable,
        PriceResult::Unavailable,
    ]);
    let rig = rig(feed).await;

    rig.manager
        .open(
            &spot_request("BTCUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();
    let before = rig.ledger.lock().await.balance.available;

    // A manual close needs a fresh price and must refuse without one.
    let open_id = rig.ledger.lock().await.positions.keys().next().unwrap().clone();
    let close_attempt = rig.manager.close(&open_id, CloseReason::Manual, None).await;
    assert!(matches!(close_attempt, Err(TradeError::NoPrice(_))));

    // So must a new open.
    let open_attempt = rig
        .manager
        .open(
            &spot_request("ETHUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await;
    assert!(matches!(open_attempt, Err(TradeError::NoPrice(_))));

    let state = rig.ledger.lock().await;
    assert_eq!(state.balance.available, before);
    assert_eq!(state.positions.len(), 1);
    assert!(state.positions.values().all(Position::is_open));
}

#[tokio::test]
async fn no_self_trigger_on_the_opening_tick() {
    let feed = ScriptedFeed::prices(&[dec!(50000)]);
    let rig = rig(feed).await;

    let cutoff_before_open = Utc::now();
    rig.manager
        .open(
            &spot_request("BTCUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();

    // The same tick's cutoff predates the open: even a price beyond TP must
    // not close the position.
    let closed = rig
        .manager
        .monitor_tick("BTCUSDT", dec!(60000), cutoff_before_open)
        .await;
    assert!(closed.is_empty());
    assert!(rig.ledger.lock().await.positions.values().all(Position::is_open));

    // The next tick is eligible.
    let closed = rig
        .manager
        .monitor_tick("BTCUSDT", dec!(60000), Utc::now())
        .await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].status(), PositionStatus::ClosedTp);
}

#[tokio::test]
async fn close_at_entry_realises_zero() {
    // Entry read at open, the same price again for the manual close.
    let feed = ScriptedFeed::prices(&[dec!(50000), dec!(50000)]);
    let rig = rig(feed).await;

    let opened = rig
        .manager
        .open(
            &spot_request("BTCUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();
    let closed = rig
        .manager
        .close(opened.id(), CloseReason::Manual, None)
        .await
        .unwrap();
    assert_eq!(closed.status(), PositionStatus::ClosedManual);
    assert_eq!(closed.realised_pnl(), Some(Decimal::ZERO));
    assert_eq!(rig.ledger.lock().await.balance.available, dec!(10000));
}

#[tokio::test]
async fn spot_conservation_across_opens_and_closes() {
    let feed = ScriptedFeed::prices(&[dec!(50000), dec!(2000), dec!(51000)]);
    let rig = rig(feed).await;

    rig.manager
        .open(
            &spot_request("BTCUSDT", dec!(100)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();
    let opened = rig
        .manager
        .open(
            &spot_request("ETHUSDT", dec!(250)),
            &rig.config,
            OpenGate::manual(),
        )
        .await
        .unwrap();

    {
        let state = rig.ledger.lock().await;
        let committed: Decimal = state
            .open_positions()
            .iter()
            .map(|p| p.committed_quote())
            .sum();
        assert_eq!(state.balance.available + committed, dec!(10000));
        assert!(state.balance.available >= Decimal::ZERO);
    }

    // On close, the balance delta equals the realised PnL.
    let before = rig.ledger.lock().await.balance.available;
    let closed = rig
        .manager
        .close(opened.id(), CloseReason::Manual, None)
        .await
        .unwrap();
    let after = rig.ledger.lock().await.balance.available;
    assert_eq!(
        after - before,
        closed.realised_pnl().unwrap() + closed.committed_quote()
    );
    assert!(after >= Decimal::ZERO);
}

#[tokio::test]
async fn futures_account_stays_coherent_under_marks() {
    let feed = ScriptedFeed::prices(&[dec!(2000)]);
    let rig = rig(feed).await;

    let request = OpenRequest {
        symbol: "ETHUSDT".to_string(),
        market: MarketKind::Futures,
        long: true,
        amount_quote: dec!(100),
        leverage: Some(10),
        sl_pct: Some(dec!(5)),
        tp_pct: Some(dec!(10)),
    };
    rig.manager
        .open(&request, &rig.config, OpenGate::manual())
        .await
        .unwrap();

    // A mark that triggers nothing still refreshes the aggregates.
    for price in [dec!(2010), dec!(1995), dec!(2050)] {
        let closed = rig.manager.monitor_tick("ETHUSDT", price, Utc::now()).await;
        assert!(closed.is_empty());
        let state = rig.ledger.lock().await;
        assert_eq!(
            state.account.total_wallet_balance,
            state.balance.available
                + state.account.total_margin_used
                + state.account.total_unrealised_pnl
        );
        assert_eq!(state.account.total_margin_used, dec!(100));
    }
}

#[tokio::test]
async fn enable_toggle_round_trips_status() {
    let state_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MarketStore::in_memory().await.unwrap());
    let config = TradingConfig::default();
    let ledger = Arc::new(Ledger::open(
        JsonStore::open(state_dir.path()).unwrap(),
        &config,
    ));
    let feed = ScriptedFeed::prices(&[]);
    let signals = SignalEngine::new(JsonStore::open(state_dir.path()).unwrap(), 0.6);
    let trader = AutoTrader::new(feed, store, ledger.clone(), signals, config, 24);

    let before = ledger.lock().await.status.clone();
    trader.enable_auto_trading(true).await;
    assert!(ledger.lock().await.status.enabled);
    trader.enable_auto_trading(false).await;

    let after = ledger.lock().await.status.clone();
    assert_eq!(before.enabled, after.enabled);
    assert_eq!(before.active_trade_ids, after.active_trade_ids);
    assert_eq!(before.signals_processed, after.signals_processed);
    assert_eq!(before.total_profit, after.total_profit);
    assert_eq!(before.configured_symbol, after.configured_symbol);
    assert!(after.updated_at >= before.updated_at);
}

#[tokio::test]
async fn reset_balance_conflicts_while_positions_open() {
    let state_dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MarketStore::in_memory().await.unwrap());
    let config = TradingConfig::default();
    let ledger = Arc::new(Ledger::open(
        JsonStore::open(state_dir.path()).unwrap(),
        &config,
    ));
    let feed = ScriptedFeed::prices(&[dec!(50000), dec!(50000)]);
    let signals = SignalEngine::new(JsonStore::open(state_dir.path()).unwrap(), 0.6);
    let trader = AutoTrader::new(feed, store, ledger, signals, config, 24);

    let opened = trader
        .open_virtual_position(&spot_request("BTCUSDT", dec!(100)))
        .await
        .unwrap();
    let blocked = trader.reset_virtual_balance(None).await;
    assert!(matches!(blocked, Err(TradeError::Conflict(_))));

    trader.close_position(opened.id()).await.unwrap();
    let reset = trader.reset_virtual_balance(Some(dec!(5000))).await.unwrap();
    assert_eq!(reset.available, dec!(5000));

    let (account, balance) = trader.account().await;
    assert_eq!(balance.available, dec!(5000));
    assert_eq!(account.total_wallet_balance, dec!(5000));
}
