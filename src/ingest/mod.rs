//! Log ingestion module
//!
//! Reconnecting, backpressure-aware subscription to the upstream log feed,
//! plus parsing of raw log records into typed events.

mod parser;
mod stream;
mod types;

pub use parser::parse_log;
pub use stream::{LogStream, StreamItem};
pub use types::{Event, EventKind, IngestError};
