//! Portfolio risk manager
//!
//! Single synchronous book of positions, marks and PnL. Every trade is
//! checked against per-token drawdown and exposure limits before any state
//! changes, so a rejection never leaves a half-applied trade behind.
//! Tail-risk measures (historical VaR and expected shortfall) come from
//! per-token return series weighted by current notional share.

use super::position::{PnlState, Position};
use super::types::{RiskError, Side};
use crate::telemetry::metrics;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

/// Retention of the equity curve
const EQUITY_HISTORY_SIZE: usize = 10_000;
/// Retention of per-token mark history used for return series
const PRICE_HISTORY_SIZE: usize = 10_000;

/// Position book with limit enforcement and tail-risk measures
pub struct RiskManager {
    positions: HashMap<String, Position>,
    pnl: HashMap<String, PnlState>,
    marks: HashMap<String, f64>,
    price_history: HashMap<String, VecDeque<f64>>,
    equity_history: VecDeque<(DateTime<Utc>, f64)>,
    peak_equity: f64,
    token_peak: HashMap<String, f64>,
    max_exposure: HashMap<String, f64>,
    drawdown_limits: HashMap<String, f64>,
    var_confidence: f64,
}

impl RiskManager {
    pub fn new() -> Self {
        Self {
            positions: HashMap::new(),
            pnl: HashMap::new(),
            marks: HashMap::new(),
            price_history: HashMap::new(),
            equity_history: VecDeque::with_capacity(EQUITY_HISTORY_SIZE),
            peak_equity: 0.0,
            token_peak: HashMap::new(),
            max_exposure: HashMap::new(),
            drawdown_limits: HashMap::new(),
            var_confidence: 0.95,
        }
    }

    pub fn with_var_confidence(mut self, confidence: f64) -> Self {
        self.var_confidence = confidence;
        self
    }

    /// Cap the notional a single token may reach
    pub fn set_max_exposure(&mut self, token: &str, limit: f64) {
        self.max_exposure.insert(token.to_string(), limit);
    }

    /// Block new trades in a token once its drawdown exceeds `limit`
    pub fn set_drawdown_limit(&mut self, token: &str, limit: f64) {
        self.drawdown_limits.insert(token.to_string(), limit);
    }

    /// Record a fill.
    ///
    /// Checks run in order: token drawdown limit (buys only), position
    /// sufficiency for sells, then the post-trade exposure cap. Only after
    /// all pass is the book mutated. Fills do not move the mark; call
    /// [`update_market_price`](Self::update_market_price) for that.
    pub fn record_trade(
        &mut self,
        token: &str,
        side: Side,
        qty: f64,
        price: f64,
        fee: f64,
    ) -> Result<(), RiskError> {
        if qty <= 0.0 || price <= 0.0 {
            return Err(RiskError::InvalidTrade {
                token: token.to_string(),
                reason: format!("qty {qty} and price {price} must be positive"),
            });
        }

        // The drawdown gate blocks adding risk, never reducing it; exits
        // must stay possible at any drawdown.
        if side == Side::Buy {
            if let Some(&limit) = self.drawdown_limits.get(token) {
                let drawdown = self.token_drawdown(token);
                if drawdown > limit {
                    warn!(token, drawdown, limit, "trade rejected on drawdown limit");
                    return Err(RiskError::DrawdownLimitBreached {
                        token: token.to_string(),
                        drawdown,
                        limit,
                    });
                }
            }
        }

        let held = self.positions.get(token).map_or(0.0, |p| p.qty);
        if side == Side::Sell && qty > held {
            return Err(RiskError::InsufficientPosition {
                token: token.to_string(),
                requested: qty,
                held,
            });
        }

        let new_qty = match side {
            Side::Buy => held + qty,
            Side::Sell => held - qty,
        };
        if let Some(&limit) = self.max_exposure.get(token) {
            let notional = new_qty.abs() * price;
            if notional > limit {
                warn!(token, notional, limit, "trade rejected on exposure limit");
                return Err(RiskError::MaxExposureExceeded {
                    token: token.to_string(),
                    notional,
                    limit,
                });
            }
        }

        let pnl = self.pnl.entry(token.to_string()).or_default();
        match side {
            Side::Buy => {
                let pos = self
                    .positions
                    .entry(token.to_string())
                    .or_insert_with(|| Position::new(0.0, 0.0));
                let total_cost = pos.qty * pos.cost + qty * price;
                pos.qty = new_qty;
                pos.cost = total_cost / new_qty;
                pnl.realized -= fee;
            }
            Side::Sell => {
                // Coverage was checked above, so the position exists.
                let Some(pos) = self.positions.get_mut(token) else {
                    return Err(RiskError::InsufficientPosition {
                        token: token.to_string(),
                        requested: qty,
                        held: 0.0,
                    });
                };
                pnl.realized += (price - pos.cost) * qty - fee;
                pos.qty = new_qty;
                if pos.qty == 0.0 {
                    self.positions.remove(token);
                    // A flat book has no drawdown; the peak restarts with
                    // the next position.
                    self.token_peak.remove(token);
                }
            }
        }

        debug!(token, %side, qty, price, fee, "trade recorded");
        self.revalue();
        Ok(())
    }

    /// Mark a token to `price` and revalue the book
    pub fn update_market_price(&mut self, token: &str, price: f64) {
        self.marks.insert(token.to_string(), price);
        let history = self
            .price_history
            .entry(token.to_string())
            .or_insert_with(|| VecDeque::with_capacity(64));
        if history.len() == PRICE_HISTORY_SIZE {
            history.pop_front();
        }
        history.push_back(price);
        self.revalue();
    }

    pub fn position(&self, token: &str) -> Option<&Position> {
        self.positions.get(token)
    }

    pub fn pnl(&self, token: &str) -> PnlState {
        self.pnl.get(token).copied().unwrap_or_default()
    }

    pub fn total_realized(&self) -> f64 {
        self.pnl.values().map(|p| p.realized).sum()
    }

    pub fn total_unrealized(&self) -> f64 {
        self.pnl.values().map(|p| p.unrealized).sum()
    }

    /// Realized PnL plus marked position value
    pub fn equity(&self) -> f64 {
        self.equity_history.back().map_or(0.0, |&(_, e)| e)
    }

    /// Gross notional over equity; zero when equity is not positive
    pub fn exposure(&self) -> f64 {
        let equity = self.equity();
        if equity <= 0.0 {
            return 0.0;
        }
        self.gross_notional() / equity
    }

    pub fn leverage(&self) -> f64 {
        self.exposure()
    }

    /// Largest single-token notional
    pub fn position_size(&self) -> f64 {
        self.positions
            .iter()
            .map(|(token, pos)| pos.notional(self.mark_or_cost(token, pos)).abs())
            .fold(0.0, f64::max)
    }

    /// Worst peak-to-trough decline over the equity curve
    pub fn max_drawdown(&self) -> f64 {
        let mut peak = f64::MIN;
        let mut worst = 0.0f64;
        for &(_, equity) in &self.equity_history {
            peak = peak.max(equity);
            if peak > 0.0 {
                worst = worst.max((peak - equity) / peak);
            }
        }
        worst
    }

    /// Decline of a token's marked value from its own peak
    pub fn token_drawdown(&self, token: &str) -> f64 {
        let peak = self.token_peak.get(token).copied().unwrap_or(0.0);
        if peak <= 0.0 {
            return 0.0;
        }
        let value = self
            .positions
            .get(token)
            .map_or(0.0, |p| p.notional(self.mark_or_cost(token, p)));
        ((peak - value) / peak).max(0.0)
    }

    /// Historical value-at-risk of the current book at the configured
    /// confidence level, in currency units. Zero without return history.
    pub fn value_at_risk(&self) -> f64 {
        let (returns, notional) = self.portfolio_returns();
        if returns.is_empty() {
            return 0.0;
        }
        let q = quantile(&returns, 1.0 - self.var_confidence);
        (-q * notional).max(0.0)
    }

    /// Mean loss beyond the VaR threshold, in currency units
    pub fn expected_shortfall(&self) -> f64 {
        let (returns, notional) = self.portfolio_returns();
        if returns.is_empty() {
            return 0.0;
        }
        let q = quantile(&returns, 1.0 - self.var_confidence);
        let tail: Vec<f64> = returns.iter().copied().filter(|&r| r < q).collect();
        if tail.is_empty() {
            return 0.0;
        }
        let mean = tail.iter().sum::<f64>() / tail.len() as f64;
        (-mean * notional).max(0.0)
    }

    /// Sharpe ratio of the portfolio return series, or `None` without
    /// enough history to estimate one
    pub fn sharpe(&self) -> Option<f64> {
        let (returns, _) = self.portfolio_returns();
        if returns.len() < 2 {
            return None;
        }
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std = var.sqrt();
        if std == 0.0 {
            return Some(0.0);
        }
        Some(mean / std)
    }

    /// Drop all positions, PnL and history
    pub fn reset(&mut self) {
        self.positions.clear();
        self.pnl.clear();
        self.marks.clear();
        self.price_history.clear();
        self.equity_history.clear();
        self.peak_equity = 0.0;
        self.token_peak.clear();
    }

    fn mark_or_cost(&self, token: &str, pos: &Position) -> f64 {
        self.marks.get(token).copied().unwrap_or(pos.cost)
    }

    fn gross_notional(&self) -> f64 {
        self.positions
            .iter()
            .map(|(token, pos)| pos.notional(self.mark_or_cost(token, pos)).abs())
            .sum()
    }

    /// Recompute unrealized PnL, equity and peaks after any book change
    fn revalue(&mut self) {
        let marks: HashMap<String, f64> = self
            .positions
            .iter()
            .map(|(token, pos)| (token.clone(), self.mark_or_cost(token, pos)))
            .collect();

        for (token, pnl) in self.pnl.iter_mut() {
            pnl.unrealized = match self.positions.get(token) {
                Some(pos) => pos.unrealized(marks[token]),
                None => 0.0,
            };
        }

        let mut equity = 0.0;
        for pnl in self.pnl.values() {
            equity += pnl.realized;
        }
        for (token, pos) in &self.positions {
            let value = pos.notional(marks[token]);
            equity += value;
            let peak = self.token_peak.entry(token.clone()).or_insert(0.0);
            if value > *peak {
                *peak = value;
            }
        }

        if self.equity_history.len() == EQUITY_HISTORY_SIZE {
            self.equity_history.pop_front();
        }
        self.equity_history.push_back((Utc::now(), equity));
        self.peak_equity = self.peak_equity.max(equity);

        metrics::set_portfolio_gauges(equity, self.exposure_for(equity), self.max_drawdown());
    }

    fn exposure_for(&self, equity: f64) -> f64 {
        if equity <= 0.0 {
            0.0
        } else {
            self.gross_notional() / equity
        }
    }

    /// Notional-weighted sum of per-token return series, aligned to the
    /// shortest contributing series
    fn portfolio_returns(&self) -> (Vec<f64>, f64) {
        let mut series: Vec<(f64, Vec<f64>)> = Vec::new();
        let mut notional = 0.0;

        for (token, pos) in &self.positions {
            let Some(history) = self.price_history.get(token) else {
                continue;
            };
            if history.len() < 2 {
                continue;
            }
            let returns: Vec<f64> = history
                .iter()
                .zip(history.iter().skip(1))
                .map(|(prev, next)| (next - prev) / prev)
                .collect();
            let value = pos.notional(self.mark_or_cost(token, pos)).abs();
            notional += value;
            series.push((value, returns));
        }

        if series.is_empty() || notional <= 0.0 {
            return (Vec::new(), 0.0);
        }

        let len = series.iter().map(|(_, r)| r.len()).min().unwrap_or(0);
        let mut combined = vec![0.0f64; len];
        for (value, returns) in &series {
            let weight = value / notional;
            let tail = &returns[returns.len() - len..];
            for (c, r) in combined.iter_mut().zip(tail) {
                *c += weight * r;
            }
        }

        (combined, notional)
    }
}

impl Default for RiskManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Linearly interpolated quantile over an unsorted sample
fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q.clamp(0.0, 1.0) * (n - 1) as f64;
    let lo = pos.floor() as usize;
    let frac = pos - lo as f64;
    if lo + 1 < n {
        sorted[lo] + frac * (sorted[lo + 1] - sorted[lo])
    } else {
        sorted[n - 1]
    }
}
