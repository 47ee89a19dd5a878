use crate::interval::Interval;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub feed: FeedConfig,
    pub database: DatabaseConfig,
    /// Directory holding the JSON state documents and classifier checkpoints.
    pub state_dir: String,
    pub trading: TradingConfig,
    pub collector: CollectorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub base_url: String,
    pub rate_limit_per_second: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

/// Which market the automated loop opens positions on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketKind {
    Spot,
    Futures,
}

/// How the quote notional for a new position is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountMode {
    Fixed,
    Percentage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmountConfig {
    pub mode: AmountMode,
    /// Quote notional when `mode == Fixed`, clamped to the available balance.
    pub amount: Decimal,
    /// Percent of the available balance when `mode == Percentage`.
    pub percentage: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_positions: usize,
    /// Smallest admissible quote notional.
    pub min_notional: Decimal,
    /// New futures opens halt at or above this maintenance-margin ratio.
    pub max_margin_ratio: Decimal,
}

/// Leverage and protective-stop defaults for futures opens. Persisted as the
/// `futures_settings` document and editable through `configure`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesSettings {
    pub default_leverage: u32,
    pub margin_type: String,
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub symbols: Vec<String>,
    pub interval: Interval,
    /// Wall-clock cadence of the live auto-trading tick, in seconds.
    pub tick_secs: u64,
    pub market: MarketKind,
    /// Ensemble confidence below this yields HOLD.
    pub entry_threshold: f64,
    pub amount: AmountConfig,
    pub risk: RiskConfig,
    /// Spot protective stops, in whole percent.
    pub stop_loss_pct: Decimal,
    pub take_profit_pct: Decimal,
    pub futures: FuturesSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Seconds between background kline fetch cycles.
    pub fetch_secs: u64,
    /// Window of history handed to the indicator engine, in hours.
    pub window_hours: i64,
    /// Bars fetched on startup so the first tick has a warm window.
    pub backfill_bars: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feed: FeedConfig::default(),
            database: DatabaseConfig::default(),
            state_dir: "state".to_string(),
            trading: TradingConfig::default(),
            collector: CollectorConfig::default(),
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            rate_limit_per_second: 10,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://state/market_data.db".to_string(),
        }
    }
}

impl Default for AmountConfig {
    fn default() -> Self {
        Self {
            mode: AmountMode::Fixed,
            amount: Decimal::ONE_HUNDRED,
            percentage: Decimal::TEN,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_positions: 3,
            min_notional: Decimal::ONE,
            max_margin_ratio: Decimal::new(8, 1),
        }
    }
}

impl Default for FuturesSettings {
    fn default() -> Self {
        Self {
            default_leverage: 10,
            margin_type: "ISOLATED".to_string(),
            stop_loss_pct: Decimal::from(5),
            take_profit_pct: Decimal::TEN,
        }
    }
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            interval: Interval::FiveMinutes,
            tick_secs: 5,
            market: MarketKind::Futures,
            entry_threshold: 0.6,
            amount: AmountConfig::default(),
            risk: RiskConfig::default(),
            stop_loss_pct: Decimal::from(2),
            take_profit_pct: Decimal::from(5),
            futures: FuturesSettings::default(),
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            fetch_secs: 300,
            window_hours: 24,
            backfill_bars: 100,
        }
    }
}

impl TradingConfig {
    /// Validates the caller-editable parts of the configuration.
    ///
    /// # Errors
    /// Returns a message naming the first offending field.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbols.is_empty() {
            return Err("at least one symbol must be configured".to_string());
        }
        if !(0.0..=1.0).contains(&self.entry_threshold) {
            return Err("entry_threshold must be within [0, 1]".to_string());
        }
        if self.amount.amount <= Decimal::ZERO {
            return Err("amount must be positive".to_string());
        }
        if self.amount.percentage <= Decimal::ZERO
            || self.amount.percentage > Decimal::ONE_HUNDRED
        {
            return Err("percentage must be within (0, 100]".to_string());
        }
        if self.risk.max_positions == 0 {
            return Err("max_positions must be at least 1".to_string());
        }
        if !(1..=125).contains(&self.futures.default_leverage) {
            return Err("leverage must be within [1, 125]".to_string());
        }
        if self.stop_loss_pct <= Decimal::ZERO || self.take_profit_pct <= Decimal::ZERO {
            return Err("stop-loss and take-profit percentages must be positive".to_string());
        }
        if self.futures.stop_loss_pct <= Decimal::ZERO
            || self.futures.take_profit_pct <= Decimal::ZERO
        {
            return Err("futures stop percentages must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_config_is_valid() {
        assert!(TradingConfig::default().validate().is_ok());
    }

    #[test]
    fn validation_rejects_out_of_range_leverage() {
        let mut cfg = TradingConfig::default();
        cfg.futures.default_leverage = 126;
        assert!(cfg.validate().is_err());
        cfg.futures.default_leverage = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validation_rejects_non_positive_amount() {
        let mut cfg = TradingConfig::default();
        cfg.amount.amount = dec!(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn interval_round_trips_through_serde() {
        let json = serde_json::to_string(&Interval::FiveMinutes).unwrap();
        assert_eq!(json, "\"5m\"");
        let back: Interval = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Interval::FiveMinutes);
    }
}
