use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Flat maintenance-margin rate used for liquidation pricing.
///
/// Real exchanges tier this by notional; the simulation keeps a single 0.5%
/// rate for every leverage tier. Known simplification.
#[must_use]
pub fn maintenance_margin_rate() -> Decimal {
    Decimal::new(5, 3)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SpotSide {
    Buy,
    Sell,
}

impl SpotSide {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SpotSide::Buy => "BUY",
            SpotSide::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FuturesSide {
    Long,
    Short,
}

impl FuturesSide {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FuturesSide::Long => "LONG",
            FuturesSide::Short => "SHORT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionStatus {
    Open,
    ClosedTp,
    ClosedSl,
    ClosedManual,
    Liquidated,
}

/// Why a position was closed. The trade monitor evaluates triggers in the
/// order liquidation > stop-loss > take-profit; when a single tick crosses
/// several levels the most adverse reason wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TakeProfit,
    StopLoss,
    Liquidation,
    Manual,
}

impl CloseReason {
    #[must_use]
    pub fn terminal_status(&self) -> PositionStatus {
        match self {
            CloseReason::TakeProfit => PositionStatus::ClosedTp,
            CloseReason::StopLoss => PositionStatus::ClosedSl,
            CloseReason::Liquidation => PositionStatus::Liquidated,
            CloseReason::Manual => PositionStatus::ClosedManual,
        }
    }
}

/// Simulated spot position. `amount_quote` is the quote-currency notional
/// committed at open; the base size is `amount_quote / entry_price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotPosition {
    pub id: String,
    pub symbol: String,
    pub side: SpotSide,
    pub amount_quote: Decimal,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub current_price: Option<Decimal>,
    pub unrealised_pnl: Decimal,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub realised_pnl: Option<Decimal>,
}

impl SpotPosition {
    /// Base-asset size bought (or short-sold) at entry.
    #[must_use]
    pub fn size_base(&self) -> Decimal {
        if self.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            self.amount_quote / self.entry_price
        }
    }

    /// Realised PnL for an exit at `exit_price`.
    #[must_use]
    pub fn realised_pnl_at(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            SpotSide::Buy => (exit_price - self.entry_price) * self.size_base(),
            SpotSide::Sell => (self.entry_price - exit_price) * self.size_base(),
        }
    }

    /// Updates the mark-to-market fields for the given price.
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = Some(price);
        self.unrealised_pnl = self.realised_pnl_at(price);
    }
}

/// Simulated leveraged futures position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuturesPosition {
    pub id: String,
    pub symbol: String,
    pub side: FuturesSide,
    pub leverage: u32,
    /// Quote notional controlled by the position (`margin_used * leverage`).
    pub amount_quote: Decimal,
    pub margin_used: Decimal,
    pub size_base: Decimal,
    pub entry_price: Decimal,
    pub stop_loss_price: Decimal,
    pub take_profit_price: Decimal,
    pub liquidation_price: Decimal,
    pub opened_at: DateTime<Utc>,
    pub status: PositionStatus,
    pub current_price: Option<Decimal>,
    pub unrealised_pnl: Decimal,
    pub unrealised_pnl_pct: Decimal,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub realised_pnl: Option<Decimal>,
}

impl FuturesPosition {
    /// Realised PnL for an exit at `exit_price`. A liquidation always
    /// realises exactly `-margin_used`; use [`CloseReason::Liquidation`]
    /// handling in the position manager for that case.
    #[must_use]
    pub fn realised_pnl_at(&self, exit_price: Decimal) -> Decimal {
        match self.side {
            FuturesSide::Long => (exit_price - self.entry_price) * self.size_base,
            FuturesSide::Short => (self.entry_price - exit_price) * self.size_base,
        }
    }

    /// Updates the mark-to-market fields for the given price.
    pub fn mark(&mut self, price: Decimal) {
        self.current_price = Some(price);
        self.unrealised_pnl = self.realised_pnl_at(price);
        self.unrealised_pnl_pct = if self.margin_used.is_zero() {
            Decimal::ZERO
        } else {
            self.unrealised_pnl / self.margin_used * Decimal::ONE_HUNDRED
        };
    }

    /// Maintenance margin at the given mark price (notional x flat rate).
    #[must_use]
    pub fn maintenance_margin(&self, price: Decimal) -> Decimal {
        self.size_base * price * maintenance_margin_rate()
    }

    /// True when the mark price has reached the liquidation level.
    #[must_use]
    pub fn is_liquidated_at(&self, price: Decimal) -> bool {
        match self.side {
            FuturesSide::Long => price <= self.liquidation_price,
            FuturesSide::Short => price >= self.liquidation_price,
        }
    }
}

/// A position is either spot or leveraged futures; risk admission and the
/// trade monitor pattern-match instead of comparing strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "market", rename_all = "snake_case")]
pub enum Position {
    Spot(SpotPosition),
    Futures(FuturesPosition),
}

impl Position {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Position::Spot(p) => &p.id,
            Position::Futures(p) => &p.id,
        }
    }

    #[must_use]
    pub fn symbol(&self) -> &str {
        match self {
            Position::Spot(p) => &p.symbol,
            Position::Futures(p) => &p.symbol,
        }
    }

    #[must_use]
    pub fn status(&self) -> PositionStatus {
        match self {
            Position::Spot(p) => p.status,
            Position::Futures(p) => p.status,
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status() == PositionStatus::Open
    }

    #[must_use]
    pub fn opened_at(&self) -> DateTime<Utc> {
        match self {
            Position::Spot(p) => p.opened_at,
            Position::Futures(p) => p.opened_at,
        }
    }

    #[must_use]
    pub fn entry_price(&self) -> Decimal {
        match self {
            Position::Spot(p) => p.entry_price,
            Position::Futures(p) => p.entry_price,
        }
    }

    /// Quote currency deducted from the available balance at open:
    /// full notional for spot, posted margin for futures.
    #[must_use]
    pub fn committed_quote(&self) -> Decimal {
        match self {
            Position::Spot(p) => p.amount_quote,
            Position::Futures(p) => p.margin_used,
        }
    }

    /// A side label for id construction and trade history rows.
    #[must_use]
    pub fn side_str(&self) -> &'static str {
        match self {
            Position::Spot(p) => p.side.as_str(),
            Position::Futures(p) => p.side.as_str(),
        }
    }

    #[must_use]
    pub fn realised_pnl(&self) -> Option<Decimal> {
        match self {
            Position::Spot(p) => p.realised_pnl,
            Position::Futures(p) => p.realised_pnl,
        }
    }
}

/// Stop-loss and take-profit prices from percent offsets, mirrored by side.
/// `sl_pct`/`tp_pct` are whole percents (2 means 2%).
#[must_use]
pub fn protective_prices(
    entry: Decimal,
    long_like: bool,
    sl_pct: Decimal,
    tp_pct: Decimal,
) -> (Decimal, Decimal) {
    let sl = sl_pct / Decimal::ONE_HUNDRED;
    let tp = tp_pct / Decimal::ONE_HUNDRED;
    if long_like {
        (entry * (Decimal::ONE - sl), entry * (Decimal::ONE + tp))
    } else {
        (entry * (Decimal::ONE + sl), entry * (Decimal::ONE - tp))
    }
}

/// Liquidation price for an isolated-margin futures position:
/// `entry * (1 - (1/leverage - m))` for longs, mirrored for shorts,
/// clamped to stay positive.
#[must_use]
pub fn liquidation_price(entry: Decimal, side: FuturesSide, leverage: u32) -> Decimal {
    let lev = Decimal::from(leverage.max(1));
    let offset = Decimal::ONE / lev - maintenance_margin_rate();
    let price = match side {
        FuturesSide::Long => entry * (Decimal::ONE - offset),
        FuturesSide::Short => entry * (Decimal::ONE + offset),
    };
    price.max(Decimal::ZERO)
}

/// Position ids encode `symbol_side_timestamp` in unix milliseconds.
#[must_use]
pub fn position_id(symbol: &str, side: &str, at: DateTime<Utc>) -> String {
    format!("{symbol}_{side}_{}", at.timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spot(side: SpotSide) -> SpotPosition {
        SpotPosition {
            id: position_id("BTCUSDT", side.as_str(), Utc::now()),
            symbol: "BTCUSDT".to_string(),
            side,
            amount_quote: dec!(100),
            entry_price: dec!(50000),
            stop_loss_price: dec!(49000),
            take_profit_price: dec!(52500),
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            current_price: None,
            unrealised_pnl: Decimal::ZERO,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
        }
    }

    #[test]
    fn spot_buy_pnl() {
        let p = spot(SpotSide::Buy);
        assert_eq!(p.realised_pnl_at(dec!(52500)), dec!(5.0));
        assert_eq!(p.realised_pnl_at(dec!(49000)), dec!(-2.0));
        assert_eq!(p.realised_pnl_at(dec!(50000)), Decimal::ZERO);
    }

    #[test]
    fn spot_sell_pnl_is_mirrored() {
        let p = spot(SpotSide::Sell);
        assert_eq!(p.realised_pnl_at(dec!(49000)), dec!(2.0));
        assert_eq!(p.realised_pnl_at(dec!(52500)), dec!(-5.0));
    }

    #[test]
    fn liquidation_price_matches_flat_rate_formula() {
        // 2000 * (1 - (1/50 - 0.005)) = 2000 * 0.985 = 1970
        let liq = liquidation_price(dec!(2000), FuturesSide::Long, 50);
        assert_eq!(liq, dec!(1970));

        let liq_short = liquidation_price(dec!(2000), FuturesSide::Short, 50);
        assert_eq!(liq_short, dec!(2030));
    }

    #[test]
    fn liquidation_price_never_negative() {
        let liq = liquidation_price(dec!(100), FuturesSide::Long, 1);
        assert!(liq > Decimal::ZERO);
        assert_eq!(liq, dec!(0.5));
    }

    #[test]
    fn protective_prices_mirror_by_side() {
        let (sl, tp) = protective_prices(dec!(50000), true, dec!(2), dec!(5));
        assert_eq!(sl, dec!(49000));
        assert_eq!(tp, dec!(52500));

        let (sl, tp) = protective_prices(dec!(50000), false, dec!(2), dec!(5));
        assert_eq!(sl, dec!(51000));
        assert_eq!(tp, dec!(47500));
    }

    #[test]
    fn futures_mark_updates_pct_against_margin() {
        let mut p = FuturesPosition {
            id: "ETHUSDT_LONG_1".to_string(),
            symbol: "ETHUSDT".to_string(),
            side: FuturesSide::Long,
            leverage: 50,
            amount_quote: dec!(5000),
            margin_used: dec!(100),
            size_base: dec!(2.5),
            entry_price: dec!(2000),
            stop_loss_price: dec!(1900),
            take_profit_price: dec!(2100),
            liquidation_price: dec!(1970),
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            current_price: None,
            unrealised_pnl: Decimal::ZERO,
            unrealised_pnl_pct: Decimal::ZERO,
            closed_at: None,
            exit_price: None,
            realised_pnl: None,
        };
        p.mark(dec!(2010));
        assert_eq!(p.unrealised_pnl, dec!(25.0));
        assert_eq!(p.unrealised_pnl_pct, dec!(25.0));
        assert!(p.is_liquidated_at(dec!(1970)));
        assert!(!p.is_liquidated_at(dec!(1971)));
    }

    #[test]
    fn close_reason_maps_to_terminal_status() {
        assert_eq!(
            CloseReason::TakeProfit.terminal_status(),
            PositionStatus::ClosedTp
        );
        assert_eq!(
            CloseReason::Liquidation.terminal_status(),
            PositionStatus::Liquidated
        );
    }
}
