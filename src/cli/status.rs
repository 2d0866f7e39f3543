//! `status` subcommand: preflight checks
//!
//! Validates everything that would make `run` fail at startup: schema
//! version, posterior dimensions against the configured feature selection,
//! and the warm-start weights file when one is configured.

use crate::config::Config;
use crate::features::schema;
use crate::posterior::PosteriorEngine;
use std::path::Path;

pub fn execute(config: &Config) -> anyhow::Result<()> {
    schema::verify_version(schema::SCHEMA_VERSION)?;
    println!("schema version: {}", schema::SCHEMA_VERSION);
    println!("feature frame:  {} of {} columns", schema::DIM, schema::FRAME_DIM);
    for def in schema::ASSIGNED {
        println!("  [{:>3}] {:<20} {:?} ({})", def.index, def.name, def.category, def.unit);
    }

    let n = config.posterior.feature_indices.len() + 2;
    println!("model inputs:   {n} ({} columns + volatility + fee)",
        config.posterior.feature_indices.len());

    for &index in &config.posterior.feature_indices {
        anyhow::ensure!(
            index < schema::FRAME_DIM,
            "feature index {index} is outside the {}-wide frame",
            schema::FRAME_DIM,
        );
    }
    anyhow::ensure!(
        config.posterior.vol_index < n && config.posterior.fee_index < n,
        "volatility/fee indices must address the {n}-wide model input",
    );

    match &config.posterior.weights_path {
        Some(path) if Path::new(path).exists() => {
            let mut posterior = PosteriorEngine::new(n);
            posterior.load(Path::new(path))?;
            println!("weights:        {path} (loadable)");
        }
        Some(path) => println!("weights:        {path} (missing, will train from scratch)"),
        None => println!("weights:        none configured"),
    }

    println!("token:          {}", config.trading.token);
    println!("max exposure:   {:?}", config.risk.max_exposure);
    println!("drawdown limit: {:?}", config.risk.drawdown_limit);
    println!("metrics port:   {}", config.telemetry.metrics_port);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_preflight() {
        execute(&Config::default()).unwrap();
    }

    #[test]
    fn test_out_of_range_feature_index_fails() {
        let mut config = Config::default();
        config.posterior.feature_indices.push(10_000);
        assert!(execute(&config).is_err());
    }
}
