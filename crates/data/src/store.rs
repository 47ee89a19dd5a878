use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use papertrade_core::{Bar, IndicatorSnapshot, Regime};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// One row of the `market_data` table: a bar plus the indicator snapshot
/// computed for it. Indicator columns are nullable because bars are inserted
/// first and snapshots written alongside afterwards.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MarketRecord {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub rsi: Option<f64>,
    pub stoch_k: Option<f64>,
    pub stoch_d: Option<f64>,
    pub williams_r: Option<f64>,
    pub roc: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_diff: Option<f64>,
    pub adx: Option<f64>,
    pub cci: Option<f64>,
    pub sma_20: Option<f64>,
    pub ema_20: Option<f64>,
    pub bb_high: Option<f64>,
    pub bb_mid: Option<f64>,
    pub bb_low: Option<f64>,
    pub atr: Option<f64>,
    pub obv: Option<f64>,
    pub cmf: Option<f64>,
    pub ao: Option<f64>,
    pub regime: Option<String>,
}

impl MarketRecord {
    /// The bar part of the row.
    #[must_use]
    pub fn bar(&self) -> Bar {
        Bar {
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }

    /// The stored indicator snapshot, if one was written for this bar.
    #[must_use]
    pub fn snapshot(&self) -> Option<IndicatorSnapshot> {
        let regime = match self.regime.as_deref() {
            Some("BULLISH") => Regime::Bullish,
            Some("BEARISH") => Regime::Bearish,
            Some(_) => Regime::Neutral,
            None => return None,
        };
        Some(IndicatorSnapshot {
            rsi: self.rsi?,
            stoch_k: self.stoch_k?,
            stoch_d: self.stoch_d?,
            williams_r: self.williams_r?,
            roc: self.roc?,
            macd: self.macd?,
            macd_signal: self.macd_signal?,
            macd_diff: self.macd_diff?,
            adx: self.adx?,
            cci: self.cci?,
            sma_20: self.sma_20?,
            ema_20: self.ema_20?,
            bb_high: self.bb_high?,
            bb_mid: self.bb_mid?,
            bb_low: self.bb_low?,
            atr: self.atr?,
            obv: self.obv?,
            cmf: self.cmf?,
            ao: self.ao?,
            regime,
        })
    }
}

fn regime_str(regime: Regime) -> &'static str {
    match regime {
        Regime::Bullish => "BULLISH",
        Regime::Bearish => "BEARISH",
        Regime::Neutral => "NEUTRAL",
    }
}

/// Embedded SQLite store for bars, indicators, trade history, and
/// notifications.
pub struct MarketStore {
    pool: SqlitePool,
}

impl MarketStore {
    /// Opens (creating if missing) the database at the given sqlx URL,
    /// e.g. `sqlite://state/market_data.db`.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or migrations fail.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .context("invalid database URL")?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to open database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests. Single connection, because every SQLite
    /// memory connection is its own database.
    ///
    /// # Errors
    /// Returns an error if migrations fail.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("failed to open in-memory database")?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Additive-only schema setup; safe to run on every start.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS market_data (
                symbol TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                volume REAL NOT NULL,
                rsi REAL,
                stoch_k REAL,
                stoch_d REAL,
                williams_r REAL,
                roc REAL,
                macd REAL,
                macd_signal REAL,
                macd_diff REAL,
                adx REAL,
                cci REAL,
                sma_20 REAL,
                ema_20 REAL,
                bb_high REAL,
                bb_mid REAL,
                bb_low REAL,
                atr REAL,
                obv REAL,
                cmf REAL,
                ao REAL,
                regime TEXT,
                PRIMARY KEY (symbol, timestamp)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_market_data_symbol_ts
            ON market_data (symbol, timestamp)
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS trade_history (
                id TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                market TEXT NOT NULL,
                side TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                amount_quote REAL NOT NULL,
                leverage INTEGER NOT NULL DEFAULT 1,
                realised_pnl REAL,
                status TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                body TEXT NOT NULL,
                kind TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Appends bars for a symbol, skipping any `(symbol, timestamp)` that is
    /// already present. Runs inside one transaction: a failure stores
    /// nothing from the batch.
    ///
    /// # Errors
    /// Returns an error if the transaction fails.
    pub async fn append_bars(&self, bars: &[Bar]) -> Result<u64> {
        let mut inserted = 0;
        let mut tx = self.pool.begin().await?;
        for bar in bars {
            let result = sqlx::query(
                r"
                INSERT INTO market_data (symbol, timestamp, open, high, low, close, volume)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT (symbol, timestamp) DO NOTHING
                ",
            )
            .bind(&bar.symbol)
            .bind(bar.timestamp)
            .bind(bar.open)
            .bind(bar.high)
            .bind(bar.low)
            .bind(bar.close)
            .bind(bar.volume)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Writes (or atomically overwrites) the indicator snapshot for one bar.
    ///
    /// # Errors
    /// Returns an error if the update fails; no partial row is stored.
    pub async fn write_snapshot(
        &self,
        symbol: &str,
        timestamp: DateTime<Utc>,
        snapshot: &IndicatorSnapshot,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE market_data SET
                rsi = ?3, stoch_k = ?4, stoch_d = ?5, williams_r = ?6, roc = ?7,
                macd = ?8, macd_signal = ?9, macd_diff = ?10, adx = ?11, cci = ?12,
                sma_20 = ?13, ema_20 = ?14, bb_high = ?15, bb_mid = ?16, bb_low = ?17,
                atr = ?18, obv = ?19, cmf = ?20, ao = ?21, regime = ?22
            WHERE symbol = ?1 AND timestamp = ?2
            ",
        )
        .bind(symbol)
        .bind(timestamp)
        .bind(snapshot.rsi)
        .bind(snapshot.stoch_k)
        .bind(snapshot.stoch_d)
        .bind(snapshot.williams_r)
        .bind(snapshot.roc)
        .bind(snapshot.macd)
        .bind(snapshot.macd_signal)
        .bind(snapshot.macd_diff)
        .bind(snapshot.adx)
        .bind(snapshot.cci)
        .bind(snapshot.sma_20)
        .bind(snapshot.ema_20)
        .bind(snapshot.bb_high)
        .bind(snapshot.bb_mid)
        .bind(snapshot.bb_low)
        .bind(snapshot.atr)
        .bind(snapshot.obv)
        .bind(snapshot.cmf)
        .bind(snapshot.ao)
        .bind(regime_str(snapshot.regime))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Rows for the trailing window, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails; callers treat that as an empty
    /// window (insufficient data).
    pub async fn recent(&self, symbol: &str, hours: i64) -> Result<Vec<MarketRecord>> {
        let cutoff = Utc::now() - Duration::hours(hours);
        let records = sqlx::query_as::<_, MarketRecord>(
            r"
            SELECT * FROM market_data
            WHERE symbol = ?1 AND timestamp >= ?2
            ORDER BY timestamp DESC
            ",
        )
        .bind(symbol)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    /// Timestamp of the newest stored bar for a symbol, if any.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn last_timestamp(&self, symbol: &str) -> Result<Option<DateTime<Utc>>> {
        let ts: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r"
            SELECT timestamp FROM market_data
            WHERE symbol = ?1
            ORDER BY timestamp DESC
            LIMIT 1
            ",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(ts.map(|(t,)| t))
    }
}
