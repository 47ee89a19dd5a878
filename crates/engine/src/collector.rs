//! Background market-data collector: a single task that periodically pulls
//! klines, appends them to the store, and writes the indicator snapshot for
//! the newest bar. It never touches positions or the ledger.

use chrono::Utc;
use papertrade_core::{Bar, CollectorConfig, Interval, PriceSource};
use papertrade_data::MarketStore;
use papertrade_indicators::IndicatorEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub struct DataCollector {
    feed: Arc<dyn PriceSource>,
    store: Arc<MarketStore>,
    indicators: IndicatorEngine,
    symbols: Vec<String>,
    interval: Interval,
    config: CollectorConfig,
}

impl DataCollector {
    #[must_use]
    pub fn new(
        feed: Arc<dyn PriceSource>,
        store: Arc<MarketStore>,
        symbols: Vec<String>,
        interval: Interval,
        config: CollectorConfig,
    ) -> Self {
        Self {
            feed,
            store,
            indicators: IndicatorEngine::new(),
            symbols,
            interval,
            config,
        }
    }

    /// One fetch cycle over all configured symbols. A failed symbol is
    /// logged and skipped; the cycle continues with the rest.
    pub async fn cycle(&self) {
        for symbol in &self.symbols {
            let symbol = papertrade_core::normalize_symbol(symbol);
            let bars = self
                .feed
                .klines(&symbol, self.interval, self.config.backfill_bars)
                .await;
            if bars.is_empty() {
                tracing::warn!(symbol = %symbol, "collector fetched no bars");
                continue;
            }
            match self.store.append_bars(&bars).await {
                Ok(inserted) if inserted > 0 => {
                    tracing::debug!(symbol = %symbol, inserted, "stored new bars");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(symbol = %symbol, "bar append failed: {e:#}");
                    continue;
                }
            }
            self.refresh_snapshot(&symbol).await;
        }
    }

    /// Recomputes and stores the snapshot for the newest bar of a symbol.
    async fn refresh_snapshot(&self, symbol: &str) {
        let rows = match self.store.recent(symbol, self.config.window_hours).await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(symbol = %symbol, "window read failed: {e:#}");
                return;
            }
        };
        let Some(newest) = rows.first().map(|r| r.timestamp) else {
            return;
        };
        let window: Vec<Bar> = rows.iter().rev().map(|r| r.bar()).collect();
        let result = self.indicators.compute(&window);
        if !result.sufficient {
            return;
        }
        if let Err(e) = self
            .store
            .write_snapshot(symbol, newest, &result.snapshot)
            .await
        {
            tracing::warn!(symbol = %symbol, "snapshot write failed: {e:#}");
        }
    }

    /// Starts the collector task. The first cycle runs immediately so the
    /// trading loop has a warm window; later cycles follow the configured
    /// cadence until the shutdown signal flips to true.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(
                symbols = self.symbols.len(),
                fetch_secs = self.config.fetch_secs,
                "collector started"
            );
            loop {
                let started = Utc::now();
                self.cycle().await;
                tracing::debug!(elapsed_ms = (Utc::now() - started).num_milliseconds(), "collector cycle done");
                tokio::select! {
                    () = tokio::time::sleep(Duration::from_secs(self.config.fetch_secs.max(1))) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            tracing::info!("collector stopped");
        })
    }
}
