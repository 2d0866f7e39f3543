//! Live decision pipeline
//!
//! Single-task loop from raw log lines to orders: parse, extract features,
//! run the posterior, then act through the trade engine. Trade rejections
//! are logged and skipped; an ingestion halt or a model dimension error
//! tears the pipeline down.

use crate::config::Config;
use crate::execution::{Connector, TradeEngine, TradeError};
use crate::features::{schema, FeatureEngine, FeatureFrame};
use crate::ingest::{parse_log, Event, LogStream};
use crate::oracle::PriceOracle;
use crate::persistence::StateSink;
use crate::posterior::{Action, PosteriorEngine};
use crate::risk::Side;
use crate::strategy::Strategy;
use anyhow::Context;
use tracing::{debug, info, warn};

/// End-to-end decision loop for one token
pub struct Pipeline<C, S, O> {
    config: Config,
    features: FeatureEngine,
    posterior: PosteriorEngine,
    strategy: Strategy,
    engine: TradeEngine<C, S>,
    oracle: O,
    /// Pool liquidity tracked from add/remove events
    liquidity: f64,
    events_seen: u64,
}

impl<C, S, O> Pipeline<C, S, O>
where
    C: Connector,
    S: StateSink,
    O: PriceOracle,
{
    pub fn new(
        config: Config,
        posterior: PosteriorEngine,
        engine: TradeEngine<C, S>,
        oracle: O,
    ) -> anyhow::Result<Self> {
        schema::verify_version(schema::SCHEMA_VERSION)
            .context("feature schema version check failed")?;

        let expected = config.posterior.feature_indices.len() + 2;
        anyhow::ensure!(
            posterior.n_features() == expected,
            "posterior expects {} features but config selects {}",
            posterior.n_features(),
            expected,
        );

        let strategy = Strategy::new(config.strategy.max_position_size)
            .stop_loss(config.strategy.stop_loss)
            .take_profit(config.strategy.take_profit)
            .liquidity_cap(config.strategy.liquidity_cap);

        let features = FeatureEngine::with_history(config.features.history_size);

        Ok(Self {
            config,
            features,
            posterior,
            strategy,
            engine,
            oracle,
            liquidity: 0.0,
            events_seen: 0,
        })
    }

    pub fn engine(&self) -> &TradeEngine<C, S> {
        &self.engine
    }

    pub fn into_engine(self) -> TradeEngine<C, S> {
        self.engine
    }

    pub fn events_seen(&self) -> u64 {
        self.events_seen
    }

    pub fn posterior(&self) -> &PosteriorEngine {
        &self.posterior
    }

    /// Drive the loop until the stream ends or halts.
    ///
    /// A clean upstream close returns `Ok`; a backpressure halt surfaces
    /// as an error after the queue has been drained.
    pub async fn run(&mut self, stream: &mut LogStream) -> anyhow::Result<()> {
        info!(token = %self.config.trading.token, "pipeline started");
        loop {
            match stream.recv().await? {
                Some(line) => self.handle_line(&line).await?,
                None => {
                    info!(events = self.events_seen, "stream closed, pipeline stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Process one raw log line. Unparseable lines are skipped.
    pub async fn handle_line(&mut self, line: &str) -> anyhow::Result<()> {
        let Some(event) = parse_log(line) else {
            debug!("skipping unparseable log line");
            return Ok(());
        };
        self.handle_event(&event).await
    }

    async fn handle_event(&mut self, event: &Event) -> anyhow::Result<()> {
        self.events_seen += 1;

        match *event {
            Event::AddLiquidity {
                reserve_a,
                reserve_b,
                ..
            } => self.liquidity += reserve_a + reserve_b,
            Event::RemoveLiquidity {
                reserve_a,
                reserve_b,
                ..
            } => self.liquidity = (self.liquidity - reserve_a - reserve_b).max(0.0),
            _ => {}
        }

        let slot = self.slot_for(event.ts());
        let frame = self.features.update(event, slot);

        let token = self.config.trading.token.clone();
        let Some(price) = self.oracle.price(&token).await else {
            debug!(token = %token, "no oracle price yet, learning only");
            return Ok(());
        };
        self.engine.mark(&token, price);

        // Mechanical exits run before the model gets a say.
        if let Some(closed) =
            self.strategy
                .check_exit(self.engine.risk_mut(), &token, price, 0.0)?
        {
            info!(token = %token, qty = closed, price, "exit rule closed position");
            return Ok(());
        }

        let input = self.model_input(&frame);
        let output = self.posterior.predict(&input)?;
        let action = self.posterior.decide_action(&output, &input)?;

        match action {
            Action::Enter => self.enter(&token, &output, &input, price).await,
            Action::Exit => self.exit(&token, price).await,
            Action::Flat => Ok(()),
        }
    }

    async fn enter(
        &mut self,
        token: &str,
        output: &crate::posterior::PosteriorOutput,
        input: &[f64],
        price: f64,
    ) -> anyhow::Result<()> {
        let volatility = input[self.config.posterior.vol_index];
        let fee = input[self.config.posterior.fee_index];
        let equity = self.sizing_equity();

        let Some(signal) = self.strategy.evaluate(
            self.engine.risk(),
            output,
            price,
            volatility,
            fee,
            self.liquidity,
            equity,
        ) else {
            return Ok(());
        };

        match self
            .engine
            .submit(token, Side::Buy, signal.qty, price, None)
            .await
        {
            Ok(fill) => {
                info!(token, qty = signal.qty, price = fill.price, edge = signal.edge, "entered");
                Ok(())
            }
            Err(TradeError::Risk(err)) => {
                warn!(token, error = %err, "entry rejected by risk book");
                Ok(())
            }
            Err(TradeError::Exec(err)) => {
                warn!(token, error = %err, "entry rejected by venue");
                Ok(())
            }
        }
    }

    async fn exit(&mut self, token: &str, price: f64) -> anyhow::Result<()> {
        let Some(qty) = self.engine.risk().position(token).map(|p| p.qty) else {
            return Ok(());
        };
        match self.engine.submit(token, Side::Sell, qty, price, None).await {
            Ok(_) => {
                info!(token, qty, price, "exited on posterior signal");
                Ok(())
            }
            Err(err) => {
                warn!(token, error = %err, "exit failed");
                Ok(())
            }
        }
    }

    /// Model input: the configured frame columns, then volatility and fee
    fn model_input(&self, frame: &FeatureFrame) -> Vec<f64> {
        let mut input: Vec<f64> = self
            .config
            .posterior
            .feature_indices
            .iter()
            .map(|&i| f64::from(frame[i]))
            .collect();

        let (_, var) = self.features.stats(schema::IDX_OF_SIGNED_VOLUME);
        input.push(var.sqrt());
        input.push(self.config.execution.fee_rate);
        input
    }

    fn slot_for(&self, ts: i64) -> u64 {
        let interval = self.config.features.slot_interval_ms.max(1) as i64;
        (ts / interval).max(0) as u64
    }

    fn sizing_equity(&self) -> f64 {
        let equity = self.engine.risk().equity();
        if equity > 0.0 {
            equity
        } else {
            self.config.trading.initial_equity
        }
    }
}
