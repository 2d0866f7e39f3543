//! TOML configuration
//!
//! Every section has sensible defaults, so a partial file only overrides
//! what it names. `Config::from_file` is the single entry point; the CLI
//! falls back to the bundled example when no file is given.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub posterior: PosteriorConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_str(&raw)
    }

    pub fn from_str(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("parsing config")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestConfig {
    /// Upstream log websocket
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
    /// How long the queue may stay full before the stream halts
    #[serde(default = "default_fail_fast_ms")]
    pub fail_fast_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            queue_size: default_queue_size(),
            fail_fast_ms: default_fail_fast_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FeaturesConfig {
    #[serde(default = "default_history_size")]
    pub history_size: usize,
    /// Event timestamps are bucketed into slots of this width
    #[serde(default = "default_slot_interval_ms")]
    pub slot_interval_ms: u64,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            history_size: default_history_size(),
            slot_interval_ms: default_slot_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PosteriorConfig {
    /// Frame indices fed to the model, in order
    #[serde(default = "default_posterior_indices")]
    pub feature_indices: Vec<usize>,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Position of the volatility feature within `feature_indices`
    #[serde(default = "default_vol_index")]
    pub vol_index: usize,
    /// Position of the fee feature within `feature_indices`
    #[serde(default = "default_fee_index")]
    pub fee_index: usize,
    #[serde(default)]
    pub vol_threshold: f64,
    #[serde(default = "default_fee_threshold")]
    pub fee_threshold: f64,
    /// Warm-start weights, written back on shutdown
    #[serde(default)]
    pub weights_path: Option<String>,
}

impl Default for PosteriorConfig {
    fn default() -> Self {
        Self {
            feature_indices: default_posterior_indices(),
            learning_rate: default_learning_rate(),
            vol_index: default_vol_index(),
            fee_index: default_fee_index(),
            vol_threshold: 0.0,
            fee_threshold: default_fee_threshold(),
            weights_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskConfig {
    #[serde(default = "default_var_confidence")]
    pub var_confidence: f64,
    /// Per-token notional cap, unlimited when absent
    #[serde(default)]
    pub max_exposure: Option<f64>,
    /// Per-token drawdown trading halt, disabled when absent
    #[serde(default)]
    pub drawdown_limit: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            var_confidence: default_var_confidence(),
            max_exposure: None,
            drawdown_limit: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    #[serde(default = "default_stop_loss")]
    pub stop_loss: f64,
    #[serde(default = "default_take_profit")]
    pub take_profit: f64,
    #[serde(default = "default_max_position_size")]
    pub max_position_size: f64,
    #[serde(default = "default_liquidity_cap")]
    pub liquidity_cap: f64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            stop_loss: default_stop_loss(),
            take_profit: default_take_profit(),
            max_position_size: default_max_position_size(),
            liquidity_cap: default_liquidity_cap(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutionConfig {
    #[serde(default = "default_slippage")]
    pub slippage: f64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            slippage: default_slippage(),
            fee_rate: default_fee_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingConfig {
    #[serde(default = "default_token")]
    pub token: String,
    #[serde(default = "default_initial_equity")]
    pub initial_equity: f64,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            token: default_token(),
            initial_equity: default_initial_equity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8900".to_string()
}

fn default_queue_size() -> usize {
    10_000
}

fn default_fail_fast_ms() -> u64 {
    1_000
}

fn default_history_size() -> usize {
    1_000
}

fn default_slot_interval_ms() -> u64 {
    400
}

fn default_posterior_indices() -> Vec<usize> {
    // The live feature columns plus their first lag, then the volatility
    // and fee inputs appended by the pipeline.
    vec![0, 1, 64, 65, 66, 128, 256 + 64, 256 + 65, 256 + 66]
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_vol_index() -> usize {
    9
}

fn default_fee_index() -> usize {
    10
}

fn default_fee_threshold() -> f64 {
    0.1
}

fn default_var_confidence() -> f64 {
    0.95
}

fn default_stop_loss() -> f64 {
    0.02
}

fn default_take_profit() -> f64 {
    0.04
}

fn default_max_position_size() -> f64 {
    1_000.0
}

fn default_liquidity_cap() -> f64 {
    0.1
}

fn default_slippage() -> f64 {
    0.001
}

fn default_fee_rate() -> f64 {
    0.0025
}

fn default_token() -> String {
    "SOL".to_string()
}

fn default_initial_equity() -> f64 {
    1_000.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let cfg = Config::from_str("").unwrap();
        assert_eq!(cfg.ingest.queue_size, 10_000);
        assert_eq!(cfg.features.slot_interval_ms, 400);
        assert_eq!(cfg.trading.token, "SOL");
        assert!(cfg.risk.max_exposure.is_none());
    }

    #[test]
    fn test_partial_section_overrides() {
        let cfg = Config::from_str(
            r#"
            [strategy]
            stop_loss = 0.05

            [risk]
            max_exposure = 5000.0
            "#,
        )
        .unwrap();
        assert!((cfg.strategy.stop_loss - 0.05).abs() < 1e-12);
        // Unnamed fields keep their defaults.
        assert!((cfg.strategy.take_profit - 0.04).abs() < 1e-12);
        assert_eq!(cfg.risk.max_exposure, Some(5000.0));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = Config::from_str(
            r#"
            [strategy]
            sotp_loss = 0.05
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_example_config_parses() {
        let cfg = Config::from_str(include_str!("../config.toml.example")).unwrap();
        assert!(!cfg.trading.token.is_empty());
        assert!(cfg.posterior.vol_index < cfg.posterior.feature_indices.len() + 2);
    }
}
