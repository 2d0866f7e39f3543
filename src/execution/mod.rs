//! Order execution: connector abstraction and the trade engine

pub mod connector;
pub mod engine;

pub use connector::{Connector, ExecError, ExecutionResult, PaperConnector};
pub use engine::{TradeEngine, TradeError};
