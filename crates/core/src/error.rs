use thiserror::Error;

/// Caller-visible failures of the trading core.
///
/// Transient feed and storage problems are absorbed inside the components
/// (bounded retry, skipped tick); only the kinds below cross the control
/// surface. None of them implies a state change: a rejected operation leaves
/// balance, positions, and status untouched.
#[derive(Debug, Error)]
pub enum TradeError {
    /// Malformed input: unknown symbol, non-positive size, leverage outside
    /// `[1, 125]`, bad configuration.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The risk gate vetoed the open; `rule` names the first failing rule.
    #[error("admission rejected: {rule}")]
    AdmissionRejected { rule: &'static str },

    /// The operation conflicts with current state, e.g. resetting the
    /// balance while positions are open or closing an unknown id.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No usable price is available for the symbol. Never carries a
    /// fallback price; callers must treat this as "do nothing".
    #[error("no price available for {0}")]
    NoPrice(String),

    /// A post-condition check failed inside the ledger critical section.
    /// The operation was rolled back in memory; detail goes to the log.
    #[error("internal invariant violation: {0}")]
    Internal(String),
}

impl TradeError {
    /// Short machine-readable kind, used in logs and status responses.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            TradeError::Validation(_) => "validation",
            TradeError::AdmissionRejected { .. } => "admission_rejected",
            TradeError::Conflict(_) => "conflict",
            TradeError::NoPrice(_) => "no_price",
            TradeError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_error_names_the_rule() {
        let err = TradeError::AdmissionRejected {
            rule: "max_positions",
        };
        assert_eq!(err.to_string(), "admission rejected: max_positions");
        assert_eq!(err.kind(), "admission_rejected");
    }
}
