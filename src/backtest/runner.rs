//! Backtest runner
//!
//! Replays price bars through the same trade engine the live pipeline uses:
//! mark, apply exit rules, then let the caller's decision function size an
//! entry. Fills model slippage and fees through the paper connector, so a
//! backtest differs from live only in where prices come from.

use crate::execution::{PaperConnector, TradeEngine, TradeError};
use crate::persistence::MemorySink;
use crate::risk::{RiskManager, Side};
use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// One historical price bar
#[derive(Debug, Clone, Copy)]
pub struct TradeBar {
    pub ts: DateTime<Utc>,
    pub price: f64,
    /// Pool liquidity at the bar, used by the sizing clamps
    pub liquidity: f64,
}

/// Summary of a completed replay
#[derive(Debug, Clone)]
pub struct BacktestResult {
    /// Realized plus unrealized PnL at the final bar
    pub pnl: f64,
    /// Worst peak-to-trough equity decline
    pub max_drawdown: f64,
    /// Sharpe of the portfolio return series, zero without history
    pub sharpe: f64,
    /// Number of fills
    pub trades: usize,
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
}

/// Replays bars for a single token
pub struct BacktestRunner {
    token: String,
    strategy: Strategy,
    slippage: f64,
    fee_rate: f64,
    initial_equity: f64,
}

impl BacktestRunner {
    pub fn new(token: &str, strategy: Strategy, initial_equity: f64) -> Self {
        Self {
            token: token.to_string(),
            strategy,
            slippage: 0.0,
            fee_rate: 0.0,
            initial_equity,
        }
    }

    pub fn slippage(mut self, value: f64) -> Self {
        self.slippage = value;
        self
    }

    pub fn fee_rate(mut self, value: f64) -> Self {
        self.fee_rate = value;
        self
    }

    /// Run `decide` over `bars`. The decision function returns a quantity
    /// to buy for the bar, or `None` to stand aside; exits are handled by
    /// the strategy's stop-loss and take-profit rules before it is asked.
    pub async fn run<F>(&self, bars: &[TradeBar], mut decide: F) -> Result<BacktestResult, TradeError>
    where
        F: FnMut(&TradeBar, &RiskManager) -> Option<f64>,
    {
        let mut engine = TradeEngine::new(
            PaperConnector::new(self.slippage, self.fee_rate),
            RiskManager::new(),
            MemorySink::new(),
        );
        let mut trades = 0usize;

        for bar in bars {
            engine.mark(&self.token, bar.price);

            if self
                .strategy
                .check_exit(engine.risk_mut(), &self.token, bar.price, 0.0)?
                .is_some()
            {
                trades += 1;
                debug!(token = %self.token, price = bar.price, "exit rule closed position");
                continue;
            }

            if let Some(qty) = decide(bar, engine.risk()) {
                if qty > 0.0 {
                    match engine
                        .submit(&self.token, Side::Buy, qty, bar.price, None)
                        .await
                    {
                        Ok(_) => trades += 1,
                        // A rejected entry is a normal outcome in replay.
                        Err(TradeError::Risk(err)) => {
                            debug!(token = %self.token, error = %err, "entry rejected")
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }

        let (_, risk, sink) = engine.into_parts();
        let result = BacktestResult {
            pnl: risk.total_realized() + risk.total_unrealized(),
            max_drawdown: risk.max_drawdown(),
            sharpe: risk.sharpe().unwrap_or(0.0),
            trades,
            equity_curve: sink.equity_curve().to_vec(),
        };
        info!(
            token = %self.token,
            bars = bars.len(),
            trades = result.trades,
            pnl = result.pnl,
            "backtest complete"
        );
        Ok(result)
    }

    /// Equity available for sizing at a point in the replay
    pub fn sizing_equity(&self, risk: &RiskManager) -> f64 {
        let equity = risk.equity();
        if equity > 0.0 {
            equity
        } else {
            self.initial_equity
        }
    }
}
