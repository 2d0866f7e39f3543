//! Execution connectors
//!
//! A [`Connector`] turns an order intent into a fill. The paper connector
//! models slippage and fees deterministically so the rest of the stack can
//! be exercised without touching a venue.

use crate::risk::Side;
use async_trait::async_trait;

/// Fill details returned by a connector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionResult {
    /// Effective fill price after slippage
    pub price: f64,
    /// Price impact paid, in fractional terms
    pub slippage: f64,
    /// Fee charged, in currency units
    pub fee: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("limit not reached for {token}: fill {fill:.6} vs limit {limit:.6}")]
    LimitNotReached {
        token: String,
        fill: f64,
        limit: f64,
    },

    #[error("venue rejected order for {token}: {reason}")]
    Rejected { token: String, reason: String },
}

/// Turns order intents into fills
#[async_trait]
pub trait Connector: Send {
    /// Execute `qty` of `token` at the prevailing `price`, honoring
    /// `limit` when given (a ceiling for buys, a floor for sells).
    async fn execute(
        &mut self,
        token: &str,
        side: Side,
        qty: f64,
        price: f64,
        limit: Option<f64>,
    ) -> Result<ExecutionResult, ExecError>;
}

/// Deterministic simulated venue
pub struct PaperConnector {
    /// Price impact per order, fractional
    slippage: f64,
    /// Fee rate on notional, fractional
    fee_rate: f64,
}

impl PaperConnector {
    pub fn new(slippage: f64, fee_rate: f64) -> Self {
        Self { slippage, fee_rate }
    }

    /// Frictionless venue
    pub fn ideal() -> Self {
        Self::new(0.0, 0.0)
    }
}

#[async_trait]
impl Connector for PaperConnector {
    async fn execute(
        &mut self,
        token: &str,
        side: Side,
        qty: f64,
        price: f64,
        limit: Option<f64>,
    ) -> Result<ExecutionResult, ExecError> {
        // Slippage always moves the fill against the taker.
        let fill = match side {
            Side::Buy => price * (1.0 + self.slippage),
            Side::Sell => price * (1.0 - self.slippage),
        };

        if let Some(limit) = limit {
            let breached = match side {
                Side::Buy => fill > limit,
                Side::Sell => fill < limit,
            };
            if breached {
                return Err(ExecError::LimitNotReached {
                    token: token.to_string(),
                    fill,
                    limit,
                });
            }
        }

        Ok(ExecutionResult {
            price: fill,
            slippage: self.slippage,
            fee: fill * qty * self.fee_rate,
        })
    }
}
