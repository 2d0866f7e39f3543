//! Order and equity persistence
//!
//! The trade engine forwards every fill and equity sample to a
//! [`StateSink`]. The in-memory sink backs tests and backtests; a durable
//! sink can be slotted in without touching the engine.

use crate::risk::Side;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// One executed fill
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: Uuid,
    pub ts: DateTime<Utc>,
    pub token: String,
    pub side: Side,
    pub qty: f64,
    pub price: f64,
    pub fee: f64,
}

/// Receives fills and equity samples as they happen
pub trait StateSink: Send {
    fn record_order(&mut self, order: &OrderRecord);
    fn record_equity(&mut self, ts: DateTime<Utc>, equity: f64);
}

/// Sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    orders: Vec<OrderRecord>,
    equity: Vec<(DateTime<Utc>, f64)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn orders(&self) -> &[OrderRecord] {
        &self.orders
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, f64)] {
        &self.equity
    }
}

impl StateSink for MemorySink {
    fn record_order(&mut self, order: &OrderRecord) {
        self.orders.push(order.clone());
    }

    fn record_equity(&mut self, ts: DateTime<Utc>, equity: f64) {
        self.equity.push((ts, equity));
    }
}
