//! Command-line entrypoint for the paper-trading engine.
//!
//! `run` starts the live loop (collector plus auto trader) and shuts both
//! down cleanly on SIGINT/SIGTERM. The remaining commands are one-shot
//! operations against the same state directory.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use papertrade_core::{
    AppConfig, ConfigLoader, MarketKind, PositionStatus, PriceSource,
};
use papertrade_data::{JsonStore, MarketStore};
use papertrade_engine::{AutoTrader, DataCollector, Ledger, OpenRequest, PositionFilter};
use papertrade_feed::BinanceFeed;
use papertrade_signal::SignalEngine;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "papertrade")]
#[command(about = "Virtual crypto trading engine", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/Config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live loop: background collector plus the auto-trading tick.
    Run,
    /// Fetch one round of klines for every configured symbol, then exit.
    Backfill,
    /// Print the virtual balance, account aggregates, and loop status.
    Status,
    /// List positions from the ledger.
    Positions {
        /// Only open positions.
        #[arg(long)]
        open: bool,
        /// Restrict to one symbol.
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Open a position manually at the current feed price.
    Open {
        /// Trading pair, e.g. BTCUSDT.
        symbol: String,
        /// Quote amount to commit (margin for futures).
        #[arg(long)]
        amount: String,
        /// "long" or "short".
        #[arg(long, default_value = "long")]
        side: String,
        /// "spot" or "futures"; defaults to the configured market.
        #[arg(long)]
        market: Option<String>,
        /// Leverage override for futures opens.
        #[arg(long)]
        leverage: Option<u32>,
    },
    /// Close a position manually at the current feed price.
    Close {
        /// Position id as shown by `positions`.
        id: String,
    },
    /// Turn the automated loop on.
    Enable,
    /// Turn the automated loop off.
    Disable,
    /// Reset the virtual balance. Fails while positions are open.
    Reset {
        /// New balance; defaults to the starting 10000.
        #[arg(long)]
        amount: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::load_from(&cli.config)
        .with_context(|| format!("failed to load config from {}", cli.config))?;

    match cli.command {
        Commands::Run => run_live(config).await,
        Commands::Backfill => run_backfill(config).await,
        Commands::Status => run_status(config).await,
        Commands::Positions { open, symbol } => run_positions(config, open, symbol).await,
        Commands::Open {
            symbol,
            amount,
            side,
            market,
            leverage,
        } => run_open(config, symbol, amount, side, market, leverage).await,
        Commands::Close { id } => run_close(config, id).await,
        Commands::Enable => run_enable(config, true).await,
        Commands::Disable => run_enable(config, false).await,
        Commands::Reset { amount } => run_reset(config, amount).await,
    }
}

/// Everything a command needs, wired from one configuration.
struct Stack {
    trader: Arc<AutoTrader>,
    ledger: Arc<Ledger>,
    store: Arc<MarketStore>,
}

async fn open_market_store(config: &AppConfig) -> Result<Arc<MarketStore>> {
    let url = &config.database.url;
    if let Some(path) = url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create database dir {}", parent.display())
                })?;
            }
        }
    }
    Ok(Arc::new(MarketStore::connect(url).await?))
}

async fn build_stack(config: &AppConfig) -> Result<Stack> {
    let store = open_market_store(config).await?;
    let json = JsonStore::open(&config.state_dir)?;
    let ledger = Arc::new(Ledger::open(json.clone(), &config.trading));
    let signals = SignalEngine::new(json, config.trading.entry_threshold);
    let feed: Arc<dyn PriceSource> = Arc::new(BinanceFeed::with_config(
        &config.feed.base_url,
        config.feed.rate_limit_per_second,
    ));
    let trader = Arc::new(AutoTrader::new(
        feed,
        store.clone(),
        ledger.clone(),
        signals,
        config.trading.clone(),
        config.collector.window_hours,
    ));
    Ok(Stack {
        trader,
        ledger,
        store,
    })
}

async fn run_live(config: AppConfig) -> Result<()> {
    let stack = build_stack(&config).await?;
    let collector = DataCollector::new(
        stack.trader.feed(),
        stack.store.clone(),
        config.trading.symbols.clone(),
        config.trading.interval,
        config.collector.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let collector_handle = collector.spawn(shutdown_rx.clone());
    let trader = stack.trader.clone();
    let trader_handle = tokio::spawn(async move {
        trader.run(shutdown_rx).await;
    });

    tracing::info!(
        symbols = ?config.trading.symbols,
        tick_secs = config.trading.tick_secs,
        "live loop started, press Ctrl+C to stop"
    );
    wait_for_shutdown().await?;
    tracing::info!("shutdown signal received, stopping tasks");
    let _ = shutdown_tx.send(true);
    trader_handle.await.context("trader task panicked")?;
    collector_handle.await.context("collector task panicked")?;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn run_backfill(config: AppConfig) -> Result<()> {
    let store = open_market_store(&config).await?;
    let feed: Arc<dyn PriceSource> = Arc::new(BinanceFeed::with_config(
        &config.feed.base_url,
        config.feed.rate_limit_per_second,
    ));
    let collector = DataCollector::new(
        feed,
        store,
        config.trading.symbols.clone(),
        config.trading.interval,
        config.collector.clone(),
    );
    collector.cycle().await;
    println!("backfill cycle complete for {:?}", config.trading.symbols);
    Ok(())
}

async fn run_status(config: AppConfig) -> Result<()> {
    let stack = build_stack(&config).await?;
    let state = stack.ledger.lock().await;
    println!("virtual balance:");
    println!("{}", serde_json::to_string_pretty(&state.balance)?);
    println!("futures account:");
    println!("{}", serde_json::to_string_pretty(&state.account)?);
    println!("auto-trading status:");
    println!("{}", serde_json::to_string_pretty(&state.status)?);
    Ok(())
}

async fn run_positions(config: AppConfig, open: bool, symbol: Option<String>) -> Result<()> {
    let stack = build_stack(&config).await?;
    let filter = PositionFilter {
        open: open.then_some(true),
        symbol,
    };
    let positions = stack.trader.list_positions(&filter).await;
    if positions.is_empty() {
        println!("no matching positions");
        return Ok(());
    }
    for position in &positions {
        let pnl = position
            .realised_pnl()
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        println!(
            "{}  {}  {}  {:?}  entry={}  pnl={}",
            position.id(),
            position.symbol(),
            position.side_str(),
            position.status(),
            position.entry_price(),
            pnl,
        );
    }
    let open_count = positions
        .iter()
        .filter(|p| p.status() == PositionStatus::Open)
        .count();
    println!("{} position(s), {} open", positions.len(), open_count);
    Ok(())
}

async fn run_open(
    config: AppConfig,
    symbol: String,
    amount: String,
    side: String,
    market: Option<String>,
    leverage: Option<u32>,
) -> Result<()> {
    let amount = Decimal::from_str(&amount).context("invalid --amount")?;
    let long = match side.to_ascii_lowercase().as_str() {
        "long" | "buy" => true,
        "short" | "sell" => false,
        other => bail!("unknown side {other:?}, expected long or short"),
    };
    let market = match market.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("spot") => MarketKind::Spot,
        Some("futures") => MarketKind::Futures,
        Some(other) => bail!("unknown market {other:?}, expected spot or futures"),
        None => config.trading.market,
    };
    if market == MarketKind::Spot && !long {
        bail!("spot shorts are not supported");
    }

    let stack = build_stack(&config).await?;
    let request = OpenRequest {
        symbol,
        market,
        long,
        amount_quote: amount,
        leverage,
        sl_pct: None,
        tp_pct: None,
    };
    let position = stack.trader.open_virtual_position(&request).await?;
    println!("opened {}", position.id());
    println!("{}", serde_json::to_string_pretty(&position)?);
    Ok(())
}

async fn run_close(config: AppConfig, id: String) -> Result<()> {
    let stack = build_stack(&config).await?;
    let position = stack.trader.close_position(&id).await?;
    println!(
        "closed {}  pnl={}",
        position.id(),
        position
            .realised_pnl()
            .map_or_else(|| "-".to_string(), |p| p.to_string()),
    );
    Ok(())
}

async fn run_enable(config: AppConfig, enabled: bool) -> Result<()> {
    let stack = build_stack(&config).await?;
    stack.trader.enable_auto_trading(enabled).await;
    println!(
        "auto trading {}",
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

async fn run_reset(config: AppConfig, amount: Option<String>) -> Result<()> {
    let amount = amount
        .map(|a| Decimal::from_str(&a).context("invalid --amount"))
        .transpose()?;
    let stack = build_stack(&config).await?;
    let balance = stack.trader.reset_virtual_balance(amount).await?;
    println!("virtual balance reset to {}", balance.available);
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl+C")?;
    }
    Ok(())
}
