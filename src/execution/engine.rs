//! Trade engine
//!
//! Owns the risk book and routes every order through the connector, then
//! through risk accounting, then into the state sink. An order that fails
//! either the venue or the risk check leaves no trace in the book.

use super::connector::{Connector, ExecError, ExecutionResult};
use crate::persistence::{OrderRecord, StateSink};
use crate::risk::{RiskError, RiskManager, Side};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TradeError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Risk(#[from] RiskError),
}

/// Execution front-end over a connector, the risk book and a sink
pub struct TradeEngine<C, S> {
    connector: C,
    risk: RiskManager,
    sink: S,
}

impl<C: Connector, S: StateSink> TradeEngine<C, S> {
    pub fn new(connector: C, risk: RiskManager, sink: S) -> Self {
        Self {
            connector,
            risk,
            sink,
        }
    }

    pub fn risk(&self) -> &RiskManager {
        &self.risk
    }

    pub fn risk_mut(&mut self) -> &mut RiskManager {
        &mut self.risk
    }

    pub fn into_parts(self) -> (C, RiskManager, S) {
        (self.connector, self.risk, self.sink)
    }

    /// Execute and book an order.
    ///
    /// The venue fill happens first; if risk accounting then rejects the
    /// fill the error is surfaced and nothing is recorded. `limit` bounds
    /// the acceptable fill price.
    pub async fn submit(
        &mut self,
        token: &str,
        side: Side,
        qty: f64,
        price: f64,
        limit: Option<f64>,
    ) -> Result<ExecutionResult, TradeError> {
        let fill = self.connector.execute(token, side, qty, price, limit).await?;

        if let Err(err) = self
            .risk
            .record_trade(token, side, qty, fill.price, fill.fee)
        {
            warn!(token, %side, qty, error = %err, "fill rejected by risk book");
            return Err(err.into());
        }

        let order = OrderRecord {
            id: Uuid::new_v4(),
            ts: Utc::now(),
            token: token.to_string(),
            side,
            qty,
            price: fill.price,
            fee: fill.fee,
        };
        info!(token, %side, qty, price = fill.price, id = %order.id, "order filled");
        self.sink.record_order(&order);
        self.sink.record_equity(order.ts, self.risk.equity());

        Ok(fill)
    }

    /// Mark a token and persist the resulting equity sample
    pub fn mark(&mut self, token: &str, price: f64) {
        self.risk.update_market_price(token, price);
        self.sink.record_equity(Utc::now(), self.risk.equity());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::PaperConnector;
    use crate::persistence::MemorySink;

    fn engine() -> TradeEngine<PaperConnector, MemorySink> {
        TradeEngine::new(PaperConnector::ideal(), RiskManager::new(), MemorySink::new())
    }

    #[tokio::test]
    async fn test_submit_books_and_persists() {
        let mut eng = engine();
        let fill = eng.submit("SOL", Side::Buy, 2.0, 10.0, None).await.unwrap();

        assert!((fill.price - 10.0).abs() < 1e-12);
        assert!((eng.risk().position("SOL").unwrap().qty - 2.0).abs() < 1e-12);

        let (_, _, sink) = eng.into_parts();
        assert_eq!(sink.orders().len(), 1);
        assert_eq!(sink.orders()[0].token, "SOL");
        assert_eq!(sink.equity_curve().len(), 1);
    }

    #[tokio::test]
    async fn test_risk_rejection_leaves_no_record() {
        let mut eng = engine();
        eng.risk_mut().set_max_exposure("SOL", 10.0);

        let err = eng.submit("SOL", Side::Buy, 5.0, 10.0, None).await.unwrap_err();
        assert!(matches!(err, TradeError::Risk(RiskError::MaxExposureExceeded { .. })));

        assert!(eng.risk().position("SOL").is_none());
        let (_, _, sink) = eng.into_parts();
        assert!(sink.orders().is_empty());
    }

    #[tokio::test]
    async fn test_limit_breach_propagates() {
        let mut eng = TradeEngine::new(
            PaperConnector::new(0.05, 0.0),
            RiskManager::new(),
            MemorySink::new(),
        );
        let err = eng
            .submit("SOL", Side::Buy, 1.0, 100.0, Some(101.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TradeError::Exec(ExecError::LimitNotReached { .. })));
    }

    #[tokio::test]
    async fn test_mark_persists_equity() {
        let mut eng = engine();
        eng.submit("SOL", Side::Buy, 1.0, 10.0, None).await.unwrap();
        eng.mark("SOL", 12.0);

        assert!((eng.risk().equity() - 12.0).abs() < 1e-12);
        let (_, _, sink) = eng.into_parts();
        assert_eq!(sink.equity_curve().last().unwrap().1, 12.0);
    }
}
