use anyhow::Context;
use clap::Parser;
use solseer::cli::{Cli, Command};
use solseer::config::Config;
use solseer::telemetry;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_str(include_str!("../config.toml.example"))
            .context("parsing bundled default config")?,
    };

    match cli.command {
        Command::Run => {
            let _guard = telemetry::init_telemetry(&config.telemetry)?;
            info!(token = %config.trading.token, "starting solseer");
            solseer::cli::run::execute(config).await
        }
        Command::Backtest { bars } => {
            let _guard = telemetry::init_telemetry(&config.telemetry)?;
            solseer::cli::backtest::execute(config, &bars).await
        }
        Command::Status => solseer::cli::status::execute(&config),
        Command::Config => {
            println!("{config:#?}");
            Ok(())
        }
    }
}
