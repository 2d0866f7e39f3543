//! solseer: streaming trading engine for on-chain token markets
//!
//! This library provides the core components for:
//! - Reconnecting, backpressure-aware log ingestion over WebSocket
//! - Parsing raw liquidity/trade logs into typed events
//! - Decaying per-dimension feature extraction with a three-slot lag stack
//! - Online logistic/softmax posterior models for rug and regime forecasts
//! - Risk management with exposure, drawdown, VaR/ES and Sharpe controls
//! - Kelly-based, risk-bounded position sizing
//! - Paper execution and backtesting
//! - Full observability stack

pub mod backtest;
pub mod cli;
pub mod config;
pub mod execution;
pub mod features;
pub mod ingest;
pub mod oracle;
pub mod persistence;
pub mod pipeline;
pub mod posterior;
pub mod risk;
pub mod strategy;
pub mod telemetry;
pub mod ws;
