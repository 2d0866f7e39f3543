//! Historical replay of the decision pipeline

pub mod runner;

pub use runner::{BacktestResult, BacktestRunner, TradeBar};
