//! Prometheus metrics
//!
//! Observability outputs only; nothing in the pipeline reads these back.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

const QUEUE_DEPTH_RATIO: &str = "solseer_ingest_queue_depth_ratio";
const DROPPED_LOGS: &str = "solseer_ingest_dropped_logs_total";
const FEATURE_LATENCY: &str = "solseer_feature_update_latency_us";
const FEATURE_NAN: &str = "solseer_feature_nan_total";
const EQUITY: &str = "solseer_equity";
const EXPOSURE: &str = "solseer_exposure";
const DRAWDOWN: &str = "solseer_drawdown";

/// Start the Prometheus exporter and register metric descriptions
pub fn init_metrics(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;

    describe_gauge!(QUEUE_DEPTH_RATIO, "Fill ratio of the ingestion queue");
    describe_counter!(DROPPED_LOGS, "Log messages dropped due to a full queue");
    describe_histogram!(FEATURE_LATENCY, "Per-event feature update latency");
    describe_counter!(FEATURE_NAN, "NaNs zeroed during feature normalization");
    describe_gauge!(EQUITY, "Current portfolio equity");
    describe_gauge!(EXPOSURE, "Total notional exposure over equity");
    describe_gauge!(DRAWDOWN, "Drawdown from peak equity");

    Ok(())
}

/// Report the ingestion queue fill ratio (0.0 empty, 1.0 full)
pub fn set_queue_depth_ratio(ratio: f64) {
    gauge!(QUEUE_DEPTH_RATIO).set(ratio);
}

/// Count a log message dropped on a full queue
pub fn record_dropped_log() {
    counter!(DROPPED_LOGS).increment(1);
}

/// Record a single feature-engine update latency
pub fn record_feature_latency(elapsed: Duration) {
    histogram!(FEATURE_LATENCY).record(elapsed.as_secs_f64() * 1e6);
}

/// Count a NaN zeroed out during normalization
pub fn record_feature_nan() {
    counter!(FEATURE_NAN).increment(1);
}

/// Publish portfolio gauges after a risk-state change
pub fn set_portfolio_gauges(equity: f64, exposure: f64, drawdown: f64) {
    gauge!(EQUITY).set(equity);
    gauge!(EXPOSURE).set(exposure);
    gauge!(DRAWDOWN).set(drawdown);
}
