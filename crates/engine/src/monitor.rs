//! Pure trigger detection for the per-tick trade monitor. The precedence
//! liquidation > stop-loss > take-profit is load-bearing: a single tick can
//! cross several levels and the most adverse must win.

use papertrade_core::{CloseReason, FuturesSide, Position, SpotSide};
use rust_decimal::Decimal;

/// Returns the close reason triggered by `price`, if any. Closed positions
/// never trigger.
#[must_use]
pub fn detect_trigger(position: &Position, price: Decimal) -> Option<CloseReason> {
    if !position.is_open() {
        return None;
    }
    match position {
        Position::Futures(f) => {
            if f.is_liquidated_at(price) {
                return Some(CloseReason::Liquidation);
            }
            let (sl_hit, tp_hit) = match f.side {
                FuturesSide::Long => (price <= f.stop_loss_price, price >= f.take_profit_price),
                FuturesSide::Short => (price >= f.stop_loss_price, price <= f.take_profit_price),
            };
            if sl_hit {
                Some(CloseReason::StopLoss)
            } else if tp_hit {
                Some(CloseReason::TakeProfit)
            } else {
                None
            }
        }
        Position::Spot(s) => {
            let (sl_hit, tp_hit) = match s.side {
                SpotSide::Buy => (price <= s.stop_loss_price, price >= s.take_profit_price),
                SpotSide::Sell => (price >= s.stop_loss_price, price <= s.take_profit_price),
            };
            if sl_hit {
                Some(CloseReason::StopLoss)
            } else if tp_hit {
                Some(CloseReason::TakeProfit)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use papertrade_core::{position_id, FuturesPosition, PositionStatus, SpotPosition};
    use rust_decimal_macros::dec;

    fn long_futures() -> Position {
        Position::Futures(FuturesPosition {
            id: position_id("ETHUSDT", "LONG", Utc::now()),
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
        })
    }

    fn spot_buy() -> Position {
        Position::Spot(SpotPosition {
            id: position_id("BTCUSDT", "BUY", Utc::now()),
            symbol: "BTCUSDT".to_string(),
            side: SpotSide::Buy,
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
        })
    }

    #[test]
    fn liquidation_wins_over_stop_loss() {
        // 1900 crosses both the SL (1900) and the liquidation level (1970).
        let trigger = detect_trigger(&long_futures(), dec!(1900));
        assert_eq!(trigger, Some(CloseReason::Liquidation));
    }

    #[test]
    fn stop_loss_between_liquidation_and_entry() {
        // Liquidation sits at 1970 for this position, so a price between SL
        // and liquidation cannot occur for a long; widen the stop instead.
        let mut p = long_futures();
        if let Position::Futures(f) = &mut p {
            f.liquidation_price = dec!(1800);
        }
        assert_eq!(detect_trigger(&p, dec!(1900)), Some(CloseReason::StopLoss));
        assert_eq!(detect_trigger(&p, dec!(2100)), Some(CloseReason::TakeProfit));
        assert_eq!(detect_trigger(&p, dec!(2000)), None);
    }

    #[test]
    fn spot_crossing_all_levels_closes_at_stop_loss() {
        // Spot has no liquidation; the most adverse remaining trigger is SL.
        let mut p = spot_buy();
        if let Position::Spot(s) = &mut p {
            // Degenerate config in which one price is under SL and over TP.
            s.take_profit_price = dec!(40000);
        }
        assert_eq!(detect_trigger(&p, dec!(45000)), Some(CloseReason::StopLoss));
    }

    #[test]
    fn spot_triggers_mirror_for_sell() {
        let mut p = spot_buy();
        if let Position::Spot(s) = &mut p {
            s.side = SpotSide::Sell;
            s.stop_loss_price = dec!(51000);
            s.take_profit_price = dec!(47500);
        }
        assert_eq!(detect_trigger(&p, dec!(51000)), Some(CloseReason::StopLoss));
        assert_eq!(detect_trigger(&p, dec!(47500)), Some(CloseReason::TakeProfit));
        assert_eq!(detect_trigger(&p, dec!(50000)), None);
    }

    #[test]
    fn closed_positions_never_trigger() {
        let mut p = spot_buy();
        if let Position::Spot(s) = &mut p {
            s.status = PositionStatus::ClosedManual;
        }
        assert_eq!(detect_trigger(&p, dec!(1)), None);
    }
}
