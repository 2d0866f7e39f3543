//! Command-line interface

pub mod backtest;
pub mod run;
pub mod status;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "solseer", about = "Streaming on-chain trading pipeline", version)]
pub struct Cli {
    /// Path to a TOML config; the bundled defaults apply when omitted
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Connect to the log stream and trade live
    Run,
    /// Replay a bar file through the strategy
    Backtest {
        /// JSON-lines file of {ts, price, liquidity} bars
        #[arg(short, long)]
        bars: PathBuf,
    },
    /// Preflight checks against the resolved configuration
    Status,
    /// Print the resolved configuration
    Config,
}
