//! Portfolio risk accounting: positions, PnL, drawdown, VaR and exposure limits

pub mod manager;
pub mod position;
pub mod types;

pub use manager::RiskManager;
pub use position::{PnlState, Position};
pub use types::{RiskError, Side};
