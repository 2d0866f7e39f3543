//! `backtest` subcommand: replay a bar file
//!
//! Bars are JSON lines of `{"ts": <unix ms>, "price": ..., "liquidity": ...}`.
//! The decision function is a momentum baseline: the last return sets the
//! regime logits, realized return dispersion sets the volatility input, and
//! sizing goes through the same strategy clamps the live pipeline uses.

use crate::backtest::{BacktestRunner, TradeBar};
use crate::config::Config;
use crate::posterior::PosteriorOutput;
use crate::strategy::Strategy;
use anyhow::Context;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use tracing::info;

/// Returns kept for the rolling volatility estimate
const RETURN_WINDOW: usize = 32;
/// Gain applied to the last return before the softmax
const MOMENTUM_GAIN: f64 = 50.0;

#[derive(Deserialize)]
struct BarRecord {
    ts: i64,
    price: f64,
    #[serde(default)]
    liquidity: f64,
}

pub async fn execute(config: Config, bars_path: &Path) -> anyhow::Result<()> {
    let bars = load_bars(bars_path)?;
    anyhow::ensure!(!bars.is_empty(), "bar file {} is empty", bars_path.display());

    let strategy = Strategy::new(config.strategy.max_position_size)
        .stop_loss(config.strategy.stop_loss)
        .take_profit(config.strategy.take_profit)
        .liquidity_cap(config.strategy.liquidity_cap);

    let runner = BacktestRunner::new(
        &config.trading.token,
        strategy,
        config.trading.initial_equity,
    )
    .slippage(config.execution.slippage)
    .fee_rate(config.execution.fee_rate);

    let sizing = Strategy::new(config.strategy.max_position_size)
        .liquidity_cap(config.strategy.liquidity_cap);
    let fee_rate = config.execution.fee_rate;
    let mut last_price: Option<f64> = None;
    let mut returns: VecDeque<f64> = VecDeque::with_capacity(RETURN_WINDOW);

    let result = runner
        .run(&bars, |bar, risk| {
            let ret = match last_price {
                Some(prev) if prev > 0.0 => (bar.price - prev) / prev,
                _ => {
                    last_price = Some(bar.price);
                    return None;
                }
            };
            last_price = Some(bar.price);
            if returns.len() == RETURN_WINDOW {
                returns.pop_front();
            }
            returns.push_back(ret);

            let output = momentum_output(ret);
            let volatility = dispersion(&returns);
            if volatility <= 0.0 {
                return None;
            }

            sizing
                .evaluate(
                    risk,
                    &output,
                    bar.price,
                    volatility,
                    fee_rate,
                    bar.liquidity,
                    runner.sizing_equity(risk),
                )
                .map(|signal| signal.qty)
        })
        .await?;

    info!(
        bars = bars.len(),
        trades = result.trades,
        pnl = result.pnl,
        max_drawdown = result.max_drawdown,
        sharpe = result.sharpe,
        "backtest finished"
    );
    println!(
        "bars: {}  trades: {}  pnl: {:.4}  max_drawdown: {:.4}  sharpe: {:.4}",
        bars.len(),
        result.trades,
        result.pnl,
        result.max_drawdown,
        result.sharpe
    );
    Ok(())
}

fn load_bars(path: &Path) -> anyhow::Result<Vec<TradeBar>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading bars from {}", path.display()))?;

    let mut bars = Vec::new();
    for (lineno, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: BarRecord = serde_json::from_str(line)
            .with_context(|| format!("bad bar on line {}", lineno + 1))?;
        let ts = Utc
            .timestamp_millis_opt(record.ts)
            .single()
            .with_context(|| format!("bad timestamp on line {}", lineno + 1))?;
        bars.push(TradeBar {
            ts,
            price: record.price,
            liquidity: record.liquidity,
        });
    }
    Ok(bars)
}

/// Regime probabilities from a single return via a softmax over
/// momentum-scaled logits
fn momentum_output(ret: f64) -> PosteriorOutput {
    let logits = [ret * MOMENTUM_GAIN, -ret * MOMENTUM_GAIN, 0.0];
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    PosteriorOutput {
        p_rug: 0.0,
        p_regime: [exps[0] / sum, exps[1] / sum, exps[2] / sum],
    }
}

fn dispersion(returns: &VecDeque<f64>) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_momentum_output_favors_trend_on_gains() {
        let out = momentum_output(0.05);
        assert!(out.p_trend() > out.p_revert());
        assert!((out.p_regime.iter().sum::<f64>() - 1.0).abs() < 1e-12);

        let out = momentum_output(-0.05);
        assert!(out.p_revert() > out.p_trend());
    }

    #[test]
    fn test_dispersion_of_constant_returns_is_zero() {
        let returns: VecDeque<f64> = [0.01, 0.01, 0.01].into_iter().collect();
        assert_eq!(dispersion(&returns), 0.0);
    }

    #[test]
    fn test_load_bars_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.jsonl");
        std::fs::write(&path, "{\"ts\":1000,\"price\":10.0}\nnot json\n").unwrap();
        assert!(load_bars(&path).is_err());
    }

    #[test]
    fn test_load_bars_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bars.jsonl");
        std::fs::write(
            &path,
            "{\"ts\":1000,\"price\":10.0,\"liquidity\":500.0}\n\n{\"ts\":2000,\"price\":11.0}\n",
        )
        .unwrap();

        let bars = load_bars(&path).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].liquidity, 500.0);
        assert_eq!(bars[1].liquidity, 0.0);
    }
}
