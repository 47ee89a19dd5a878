//! Pure admission control and position sizing. The gate takes consistent
//! snapshots as arguments, mutates nothing, and returns the first failing
//! rule by name.

use papertrade_core::{
    AmountConfig, AmountMode, FuturesAccount, Position, RiskConfig, TradeError,
};
use rust_decimal::Decimal;

/// A candidate open, as seen by the risk gate.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub symbol: &'a str,
    /// Side label (`BUY`/`SELL`/`LONG`/`SHORT`) for the per-symbol cap.
    pub side: &'a str,
    /// Quote currency that would be deducted from the available balance:
    /// the full notional for spot, the posted margin for futures.
    pub committed_quote: Decimal,
    pub futures: bool,
}

/// Evaluates the admission rules in order; the first failing rule vetoes.
///
/// Rules: trading enabled, open-position count, futures margin ratio,
/// committed quote within the available balance, minimum notional, and one
/// open position per `(symbol, side)`.
///
/// # Errors
/// Returns [`TradeError::AdmissionRejected`] naming the failing rule.
pub fn admit(
    enabled: bool,
    open_positions: &[&Position],
    account: &FuturesAccount,
    available: Decimal,
    risk: &RiskConfig,
    candidate: &Candidate<'_>,
) -> Result<(), TradeError> {
    if !enabled {
        return Err(TradeError::AdmissionRejected { rule: "disabled" });
    }
    if open_positions.len() >= risk.max_positions {
        return Err(TradeError::AdmissionRejected {
            rule: "max_positions",
        });
    }
    if candidate.futures && account.margin_ratio >= risk.max_margin_ratio {
        return Err(TradeError::AdmissionRejected {
            rule: "margin_ratio",
        });
    }
    if candidate.committed_quote > available {
        return Err(TradeError::AdmissionRejected {
            rule: "insufficient_balance",
        });
    }
    if candidate.committed_quote < risk.min_notional {
        return Err(TradeError::AdmissionRejected {
            rule: "min_notional",
        });
    }
    let duplicate = open_positions.iter().any(|p| {
        p.symbol().eq_ignore_ascii_case(candidate.symbol) && p.side_str() == candidate.side
    });
    if duplicate {
        return Err(TradeError::AdmissionRejected {
            rule: "duplicate_position",
        });
    }
    Ok(())
}

/// Quote size for a new position from the amount configuration. Fixed
/// amounts are clamped to the available balance; percentage amounts are
/// taken from it.
#[must_use]
pub fn position_size(amount: &AmountConfig, available: Decimal) -> Decimal {
    match amount.mode {
        AmountMode::Fixed => amount.amount.min(available),
        AmountMode::Percentage => available * amount.percentage / Decimal::ONE_HUNDRED,
    }
}
