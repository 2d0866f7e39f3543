//! Price oracle abstraction
//!
//! The pipeline marks positions through a [`PriceOracle`] so live quotes,
//! backtests and tests all feed the risk book the same way.

use async_trait::async_trait;
use std::collections::HashMap;

/// Source of marked prices for risk revaluation
#[async_trait]
pub trait PriceOracle: Send {
    /// Latest known price for `token`, if any
    async fn price(&self, token: &str) -> Option<f64>;
}

/// Static price table, mainly for tests and paper trading
#[derive(Debug, Default, Clone)]
pub struct FixedOracle {
    prices: HashMap<String, f64>,
}

impl FixedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, token: &str, price: f64) {
        self.prices.insert(token.to_string(), price);
    }

    pub fn with_price(mut self, token: &str, price: f64) -> Self {
        self.set(token, price);
        self
    }
}

#[async_trait]
impl PriceOracle for FixedOracle {
    async fn price(&self, token: &str) -> Option<f64> {
        self.prices.get(token).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_oracle_lookup() {
        let oracle = FixedOracle::new().with_price("SOL", 150.0);
        assert_eq!(oracle.price("SOL").await, Some(150.0));
        assert_eq!(oracle.price("BONK").await, None);
    }

    #[tokio::test]
    async fn test_fixed_oracle_overwrite() {
        let mut oracle = FixedOracle::new();
        oracle.set("SOL", 150.0);
        oracle.set("SOL", 155.0);
        assert_eq!(oracle.price("SOL").await, Some(155.0));
    }
}
