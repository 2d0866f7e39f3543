//! WebSocket client library
//!
//! Provides a reusable WebSocket client with automatic reconnection,
//! jittered exponential backoff, and ping/pong keepalive.

mod client;
mod types;

pub use client::WsClient;
pub use types::{WsConfig, WsError, WsMessage};
