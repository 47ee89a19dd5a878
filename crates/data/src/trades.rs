use crate::store::MarketStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One closed (or closing) trade in the history table. Monetary columns are
/// stored as REAL; the authoritative decimal values live in the ledger
/// documents, this table exists for querying and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TradeRecord {
    pub id: String,
    pub symbol: String,
    /// "spot" or "futures".
    pub market: String,
    pub side: String,
    pub entry_price: f64,
    pub exit_price: Option<f64>,
    pub amount_quote: f64,
    pub leverage: i64,
    pub realised_pnl: Option<f64>,
    pub status: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Filter for trade-history queries. `None` fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TradeFilter {
    pub symbol: Option<String>,
    pub status: Option<String>,
    pub limit: Option<i64>,
}

/// Partial update applied to a stored trade; `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct TradePatch {
    pub status: Option<String>,
    pub exit_price: Option<f64>,
    pub realised_pnl: Option<f64>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl MarketStore {
    /// Inserts or replaces a trade-history row.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub async fn save_trade(&self, trade: &TradeRecord) -> Result<()> {
        sqlx::query(
            r"
            INSERT OR REPLACE INTO trade_history
            (id, symbol, market, side, entry_price, exit_price, amount_quote,
             leverage, realised_pnl, status, opened_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ",
        )
        .bind(&trade.id)
        .bind(&trade.symbol)
        .bind(&trade.market)
        .bind(&trade.side)
        .bind(trade.entry_price)
        .bind(trade.exit_price)
        .bind(trade.amount_quote)
        .bind(trade.leverage)
        .bind(trade.realised_pnl)
        .bind(&trade.status)
        .bind(trade.opened_at)
        .bind(trade.closed_at)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Trades matching the filter, newest first.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub async fn list_trades(&self, filter: &TradeFilter) -> Result<Vec<TradeRecord>> {
        let limit = filter.limit.unwrap_or(100);
        let records = sqlx::query_as::<_, TradeRecord>(
            r"
            SELECT * FROM trade_history
            WHERE (?1 IS NULL OR symbol = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY opened_at DESC
            LIMIT ?3
            ",
        )
        .bind(&filter.symbol)
        .bind(&filter.status)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(records)
    }

    /// Applies a patch to a stored trade. Returns false when the id is
    /// unknown.
    ///
    /// # Errors
    /// Returns an error if the update fails.
    pub async fn update_trade(&self, id: &str, patch: &TradePatch) -> Result<bool> {
        let result = sqlx::query(
            r"
            UPDATE trade_history SET
                status = COALESCE(?2, status),
                exit_price = COALESCE(?3, exit_price),
                realised_pnl = COALESCE(?4, realised_pnl),
                closed_at = COALESCE(?5, closed_at)
            WHERE id = ?1
            ",
        )
        .bind(id)
        .bind(&patch.status)
        .bind(patch.exit_price)
        .bind(patch.realised_pnl)
        .bind(patch.closed_at)
        .execute(self.pool())
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Deletes a trade row. Returns false when the id is unknown.
    ///
    /// # Errors
    /// Returns an error if the delete fails.
    pub async fn delete_trade(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM trade_history WHERE id = ?1")
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
