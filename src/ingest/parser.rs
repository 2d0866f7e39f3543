//! Raw log record parsing
//!
//! Pure translation from JSON log lines to typed [`Event`]s. Malformed
//! records and unknown kinds parse to `None` and are skipped upstream.

use super::types::Event;
use serde::Deserialize;

/// Wire shape of a raw log record
#[derive(Debug, Deserialize)]
struct RawLog {
    /// Event kind tag
    #[serde(rename = "type")]
    kind: String,
    /// Source-clock timestamp
    ts: Option<i64>,
    amount_in: Option<f64>,
    amount_out: Option<f64>,
    reserve_a: Option<f64>,
    reserve_b: Option<f64>,
}

/// Parse a raw log line into a typed event.
///
/// Missing numeric fields default to zero; the timestamp defaults to zero.
/// Returns `None` for invalid JSON or an unrecognized kind tag.
pub fn parse_log(log: &str) -> Option<Event> {
    let raw: RawLog = serde_json::from_str(log).ok()?;
    let ts = raw.ts.unwrap_or(0);

    match raw.kind.as_str() {
        "swap" => Some(Event::Swap {
            ts,
            amount_in: raw.amount_in.unwrap_or(0.0),
            amount_out: raw.amount_out.unwrap_or(0.0),
        }),
        "add_liquidity" => Some(Event::AddLiquidity {
            ts,
            reserve_a: raw.reserve_a.unwrap_or(0.0),
            reserve_b: raw.reserve_b.unwrap_or(0.0),
        }),
        "remove_liquidity" => Some(Event::RemoveLiquidity {
            ts,
            reserve_a: raw.reserve_a.unwrap_or(0.0),
            reserve_b: raw.reserve_b.unwrap_or(0.0),
        }),
        "mint" => Some(Event::Mint {
            ts,
            amount_in: raw.amount_in.unwrap_or(0.0),
            amount_out: raw.amount_out.unwrap_or(0.0),
        }),
        _ => None,
    }
}
