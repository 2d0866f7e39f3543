//! Telemetry module
//!
//! Structured logging and Prometheus metrics

mod logging;
pub mod metrics;

pub use logging::init_logging;

use crate::config::TelemetryConfig;

/// Guard that keeps telemetry alive for the process lifetime
pub struct TelemetryGuard {
    _priv: (),
}

/// Initialize all telemetry subsystems
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    init_logging(&config.log_level)?;
    metrics::init_metrics(config.metrics_port)?;
    Ok(TelemetryGuard { _priv: () })
}
