//! Ingestion types and errors

use thiserror::Error;

/// A typed on-chain market event.
///
/// Closed set of kinds so that adding a variant is a compile-checked change
/// everywhere events are consumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Event {
    /// Token swap through the pool
    Swap {
        ts: i64,
        amount_in: f64,
        amount_out: f64,
    },
    /// Liquidity added to the pool
    AddLiquidity {
        ts: i64,
        reserve_a: f64,
        reserve_b: f64,
    },
    /// Liquidity withdrawn from the pool
    RemoveLiquidity {
        ts: i64,
        reserve_a: f64,
        reserve_b: f64,
    },
    /// New supply minted
    Mint {
        ts: i64,
        amount_in: f64,
        amount_out: f64,
    },
}

impl Event {
    /// Source-clock timestamp of the event
    pub fn ts(&self) -> i64 {
        match *self {
            Event::Swap { ts, .. }
            | Event::AddLiquidity { ts, .. }
            | Event::RemoveLiquidity { ts, .. }
            | Event::Mint { ts, .. } => ts,
        }
    }

    /// Kind discriminant, handy for logging and metrics labels
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Swap { .. } => EventKind::Swap,
            Event::AddLiquidity { .. } => EventKind::AddLiquidity,
            Event::RemoveLiquidity { .. } => EventKind::RemoveLiquidity,
            Event::Mint { .. } => EventKind::Mint,
        }
    }
}

/// Event kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Swap,
    AddLiquidity,
    RemoveLiquidity,
    Mint,
}

impl EventKind {
    /// Stable label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Swap => "swap",
            EventKind::AddLiquidity => "add_liquidity",
            EventKind::RemoveLiquidity => "remove_liquidity",
            EventKind::Mint => "mint",
        }
    }
}

/// Ingestion errors
///
/// Transient conditions (reconnects, dropped messages) are handled inside
/// the stream and never surface here; these are the fatal cases a consumer
/// must react to.
#[derive(Debug, Clone, Error)]
pub enum IngestError {
    /// The queue stayed completely full beyond the fail-fast window.
    /// Continuing would mean acting on stale data, so the stream halts.
    #[error(
        "ingestion queue full for over {window_ms}ms ({dropped} messages dropped); stream halted"
    )]
    Backpressure { window_ms: u64, dropped: u64 },
}
