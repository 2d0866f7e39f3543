//! Kelly-style position sizing with layered risk clamps
//!
//! Converts a posterior edge into a target quantity: fractional Kelly from
//! edge over variance, scaled by realized Sharpe, then clamped by position,
//! liquidity and tail-risk caps. Exits are mechanical stop-loss and
//! take-profit checks against the position's cost basis.

use crate::posterior::PosteriorOutput;
use crate::risk::{RiskError, RiskManager, Side};
use tracing::debug;

/// Default fractional loss that forces a full close
pub const DEFAULT_STOP_LOSS: f64 = 0.02;
/// Default fractional gain that forces a full close
pub const DEFAULT_TAKE_PROFIT: f64 = 0.04;
/// Default share of pool liquidity a single order may consume
pub const DEFAULT_LIQUIDITY_CAP: f64 = 0.1;

/// Sized entry signal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeSignal {
    /// Quantity to buy
    pub qty: f64,
    /// Posterior edge the size was derived from
    pub edge: f64,
}

/// Entry sizing and exit rules
pub struct Strategy {
    stop_loss: f64,
    take_profit: f64,
    max_position_size: f64,
    liquidity_cap: f64,
}

impl Strategy {
    pub fn new(max_position_size: f64) -> Self {
        Self {
            stop_loss: DEFAULT_STOP_LOSS,
            take_profit: DEFAULT_TAKE_PROFIT,
            max_position_size,
            liquidity_cap: DEFAULT_LIQUIDITY_CAP,
        }
    }

    pub fn stop_loss(mut self, value: f64) -> Self {
        self.stop_loss = value;
        self
    }

    pub fn take_profit(mut self, value: f64) -> Self {
        self.take_profit = value;
        self
    }

    pub fn liquidity_cap(mut self, value: f64) -> Self {
        self.liquidity_cap = value;
        self
    }

    /// Size an entry from the posterior output.
    ///
    /// Returns `None` when the edge is not positive, when realized Sharpe
    /// is non-positive, or when the clamps reduce the size to nothing.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        risk: &RiskManager,
        output: &PosteriorOutput,
        price: f64,
        volatility: f64,
        fee: f64,
        liquidity: f64,
        equity: f64,
    ) -> Option<TradeSignal> {
        if price <= 0.0 || volatility <= 0.0 {
            return None;
        }

        let edge = output.p_trend() - output.p_revert() - fee;
        if edge <= 0.0 {
            return None;
        }

        let mut kelly = (edge / (volatility * volatility)).clamp(0.0, 1.0);

        // Scale by realized performance once there is a track record. A
        // fresh book trades at full Kelly.
        if let Some(sharpe) = risk.sharpe() {
            if sharpe <= 0.0 {
                return None;
            }
            kelly *= sharpe.min(1.0);
        }

        let mut qty = equity * kelly / price;
        qty = qty.min(self.max_position_size);
        qty = qty.min(self.liquidity_cap * liquidity);

        let tail_limit = if risk.equity() > 0.0 {
            risk.value_at_risk().min(risk.expected_shortfall())
        } else {
            0.1 * equity
        };
        if tail_limit > 0.0 {
            qty = qty.min(tail_limit / (volatility * price));
        }

        if qty <= 0.0 {
            return None;
        }
        debug!(qty, edge, kelly, "entry sized");
        Some(TradeSignal { qty, edge })
    }

    /// Close the position in full when its return breaches the stop-loss
    /// or take-profit band. Returns the closed quantity.
    pub fn check_exit(
        &self,
        risk: &mut RiskManager,
        token: &str,
        price: f64,
        fee: f64,
    ) -> Result<Option<f64>, RiskError> {
        let Some(pos) = risk.position(token) else {
            return Ok(None);
        };
        if pos.cost <= 0.0 {
            return Ok(None);
        }

        let ret = (price - pos.cost) / pos.cost;
        if ret <= -self.stop_loss || ret >= self.take_profit {
            let qty = pos.qty;
            risk.record_trade(token, Side::Sell, qty, price, fee)?;
            debug!(token, qty, ret, "position closed on exit rule");
            return Ok(Some(qty));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(trend: f64, revert: f64) -> PosteriorOutput {
        PosteriorOutput {
            p_rug: 0.1,
            p_regime: [trend, revert, 1.0 - trend - revert],
        }
    }

    #[test]
    fn test_positive_edge_sizes_entry() {
        let strategy = Strategy::new(1000.0);
        let rm = RiskManager::new();

        let signal = strategy
            .evaluate(&rm, &output(0.6, 0.3), 10.0, 0.1, 0.01, 100_000.0, 1000.0)
            .unwrap();
        assert!(signal.qty > 0.0);
        assert!((signal.edge - 0.29).abs() < 1e-12);
    }

    #[test]
    fn test_high_fee_kills_edge() {
        let strategy = Strategy::new(1000.0);
        let rm = RiskManager::new();

        let signal = strategy.evaluate(&rm, &output(0.6, 0.3), 10.0, 0.1, 0.5, 100_000.0, 1000.0);
        assert!(signal.is_none());
    }

    #[test]
    fn test_dominant_revert_kills_edge() {
        let strategy = Strategy::new(1000.0);
        let rm = RiskManager::new();

        let signal = strategy.evaluate(&rm, &output(0.3, 0.6), 10.0, 0.5, 0.01, 100_000.0, 1000.0);
        assert!(signal.is_none());
    }

    #[test]
    fn test_kelly_clipped_at_full() {
        let strategy = Strategy::new(f64::MAX).liquidity_cap(f64::MAX);
        let rm = RiskManager::new();

        // Tiny variance would push raw Kelly far above 1; the clip caps the
        // notional at equity.
        let signal = strategy
            .evaluate(&rm, &output(0.9, 0.0), 10.0, 0.01, 0.0, f64::MAX, 1000.0)
            .unwrap();
        // 10% tail fallback applies on an empty book: 100 / (0.01 * 10).
        assert!(signal.qty <= 1000.0 * 1.0 / 10.0 + 1e-9);
    }

    #[test]
    fn test_max_position_size_clamp() {
        let strategy = Strategy::new(2.0).liquidity_cap(f64::MAX);
        let rm = RiskManager::new();

        let signal = strategy
            .evaluate(&rm, &output(0.9, 0.0), 1.0, 1.0, 0.0, f64::MAX, 1_000_000.0)
            .unwrap();
        assert!(signal.qty <= 2.0);
    }

    #[test]
    fn test_liquidity_clamp() {
        let strategy = Strategy::new(f64::MAX);
        let rm = RiskManager::new();

        let signal = strategy
            .evaluate(&rm, &output(0.9, 0.0), 1.0, 1.0, 0.0, 50.0, 1_000_000.0)
            .unwrap();
        // 10% of 50 units of liquidity.
        assert!(signal.qty <= 5.0 + 1e-12);
    }

    #[test]
    fn test_negative_sharpe_blocks_entry() {
        let strategy = Strategy::new(1000.0);
        let mut rm = RiskManager::new();
        rm.record_trade("SOL", Side::Buy, 1.0, 100.0, 0.0).unwrap();
        for price in [100.0, 90.0, 80.0, 70.0] {
            rm.update_market_price("SOL", price);
        }
        assert!(rm.sharpe().unwrap() < 0.0);

        let signal = strategy.evaluate(&rm, &output(0.6, 0.3), 10.0, 0.5, 0.01, 100_000.0, 1000.0);
        assert!(signal.is_none());
    }

    #[test]
    fn test_stop_loss_closes_position() {
        let strategy = Strategy::new(1000.0);
        let mut rm = RiskManager::new();
        rm.record_trade("SOL", Side::Buy, 1.0, 100.0, 0.0).unwrap();

        // 3% loss breaches the 2% stop.
        let closed = strategy.check_exit(&mut rm, "SOL", 97.0, 0.0).unwrap();
        assert_eq!(closed, Some(1.0));
        assert!(rm.position("SOL").is_none());
        assert!((rm.pnl("SOL").realized + 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_take_profit_closes_position() {
        let strategy = Strategy::new(1000.0);
        let mut rm = RiskManager::new();
        rm.record_trade("SOL", Side::Buy, 2.0, 100.0, 0.0).unwrap();

        let closed = strategy.check_exit(&mut rm, "SOL", 105.0, 0.0).unwrap();
        assert_eq!(closed, Some(2.0));
        assert!((rm.pnl("SOL").realized - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_exit_band_holds_position() {
        let strategy = Strategy::new(1000.0);
        let mut rm = RiskManager::new();
        rm.record_trade("SOL", Side::Buy, 1.0, 100.0, 0.0).unwrap();

        let closed = strategy.check_exit(&mut rm, "SOL", 101.0, 0.0).unwrap();
        assert_eq!(closed, None);
        assert!(rm.position("SOL").is_some());
    }

    #[test]
    fn test_exit_without_position_is_noop() {
        let strategy = Strategy::new(1000.0);
        let mut rm = RiskManager::new();
        assert_eq!(strategy.check_exit(&mut rm, "SOL", 100.0, 0.0).unwrap(), None);
    }
}
