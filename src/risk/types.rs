//! Shared risk types

use std::fmt;

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Rejection reasons raised by the risk manager.
///
/// All checks run before any book mutation, so a rejected trade leaves the
/// portfolio exactly as it was.
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    #[error(
        "max exposure exceeded for {token}: notional {notional:.4} > limit {limit:.4}"
    )]
    MaxExposureExceeded {
        token: String,
        notional: f64,
        limit: f64,
    },

    #[error(
        "drawdown limit breached for {token}: drawdown {drawdown:.4} > limit {limit:.4}"
    )]
    DrawdownLimitBreached {
        token: String,
        drawdown: f64,
        limit: f64,
    },

    #[error(
        "insufficient position in {token}: sell {requested:.4} > held {held:.4}"
    )]
    InsufficientPosition {
        token: String,
        requested: f64,
        held: f64,
    },

    #[error("invalid trade for {token}: {reason}")]
    InvalidTrade { token: String, reason: String },
}
