//! `run` subcommand: live pipeline

use crate::config::Config;
use crate::execution::{PaperConnector, TradeEngine};
use crate::ingest::LogStream;
use crate::oracle::FixedOracle;
use crate::persistence::MemorySink;
use crate::pipeline::Pipeline;
use crate::posterior::PosteriorEngine;
use crate::risk::RiskManager;
use crate::ws::WsConfig;
use anyhow::Context;
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub async fn execute(config: Config) -> anyhow::Result<()> {
    let posterior = build_posterior(&config)?;

    let mut risk = RiskManager::new().with_var_confidence(config.risk.var_confidence);
    if let Some(limit) = config.risk.max_exposure {
        risk.set_max_exposure(&config.trading.token, limit);
    }
    if let Some(limit) = config.risk.drawdown_limit {
        risk.set_drawdown_limit(&config.trading.token, limit);
    }

    let connector = PaperConnector::new(config.execution.slippage, config.execution.fee_rate);
    let engine = TradeEngine::new(connector, risk, MemorySink::new());
    let oracle = FixedOracle::new();

    let ws = WsConfig::new(config.ingest.ws_url.as_str());
    let mut stream = LogStream::connect(
        ws,
        config.ingest.queue_size,
        Duration::from_millis(config.ingest.fail_fast_ms),
    );

    let weights_path = config.posterior.weights_path.clone();
    let mut pipeline = Pipeline::new(config, posterior, engine, oracle)?;
    let result = pipeline.run(&mut stream).await;
    stream.close();

    if let Some(path) = weights_path {
        // Best effort on shutdown, even after a stream failure.
        if let Err(err) = pipeline.posterior().save(Path::new(&path)) {
            tracing::warn!(path = %path, error = %err, "failed to save posterior weights");
        }
    }

    result
}

fn build_posterior(config: &Config) -> anyhow::Result<PosteriorEngine> {
    let n = config.posterior.feature_indices.len() + 2;
    let mut posterior = PosteriorEngine::new(n)
        .learning_rate(config.posterior.learning_rate)
        .vol_feature(config.posterior.vol_index, config.posterior.vol_threshold)
        .fee_feature(config.posterior.fee_index, config.posterior.fee_threshold);

    if let Some(path) = &config.posterior.weights_path {
        let path = Path::new(path);
        if path.exists() {
            posterior
                .load(path)
                .with_context(|| format!("loading weights from {}", path.display()))?;
            info!(path = %path.display(), "warm-started posterior");
        }
    }
    Ok(posterior)
}
