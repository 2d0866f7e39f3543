//! End-to-end pipeline tests: raw log lines in, booked orders out

use solseer::config::Config;
use solseer::execution::{PaperConnector, TradeEngine};
use solseer::ingest::LogStream;
use solseer::oracle::FixedOracle;
use solseer::persistence::MemorySink;
use solseer::pipeline::Pipeline;
use solseer::posterior::PosteriorEngine;
use solseer::risk::RiskManager;
use std::time::Duration;
use tokio::sync::mpsc;

fn build_pipeline(
    config: Config,
    oracle: FixedOracle,
) -> Pipeline<PaperConnector, MemorySink, FixedOracle> {
    let n = config.posterior.feature_indices.len() + 2;
    let posterior = PosteriorEngine::new(n)
        .learning_rate(config.posterior.learning_rate)
        .vol_feature(config.posterior.vol_index, config.posterior.vol_threshold)
        .fee_feature(config.posterior.fee_index, config.posterior.fee_threshold);
    let engine = TradeEngine::new(
        PaperConnector::ideal(),
        RiskManager::new(),
        MemorySink::new(),
    );
    Pipeline::new(config, posterior, engine, oracle).expect("pipeline config")
}

fn swap_line(ts: i64, amount_in: f64, amount_out: f64) -> String {
    format!(r#"{{"type":"swap","ts":{ts},"amount_in":{amount_in},"amount_out":{amount_out}}}"#)
}

#[tokio::test]
async fn pipeline_consumes_stream_to_completion() {
    let (tx, rx) = mpsc::channel(16);
    let mut stream = LogStream::spawn(rx, 64, Duration::from_secs(1));

    let oracle = FixedOracle::new().with_price("SOL", 10.0);
    let mut pipeline = build_pipeline(Config::default(), oracle);

    for i in 0..20 {
        tx.send(swap_line(i * 400, 2.0 + i as f64, 1.0)).await.unwrap();
    }
    tx.send("garbage line".to_string()).await.unwrap();
    drop(tx);

    pipeline.run(&mut stream).await.expect("clean shutdown");
    assert_eq!(pipeline.events_seen(), 20);
}

#[tokio::test]
async fn pipeline_learns_without_prices() {
    let (tx, rx) = mpsc::channel(16);
    let mut stream = LogStream::spawn(rx, 64, Duration::from_secs(1));

    // No oracle price: features update but nothing is booked.
    let mut pipeline = build_pipeline(Config::default(), FixedOracle::new());

    tx.send(swap_line(400, 3.0, 1.0)).await.unwrap();
    tx.send(swap_line(800, 1.0, 4.0)).await.unwrap();
    drop(tx);

    pipeline.run(&mut stream).await.unwrap();
    assert_eq!(pipeline.events_seen(), 2);

    let engine = pipeline.into_engine();
    let (_, risk, sink) = engine.into_parts();
    assert!(risk.position("SOL").is_none());
    assert!(sink.orders().is_empty());
}

#[tokio::test]
async fn pipeline_surfaces_ingest_halt() {
    let (tx, rx) = mpsc::channel(64);
    // Tiny queue and a zero fail-fast window so a single overflow halts.
    let mut stream = LogStream::spawn(rx, 1, Duration::from_millis(0));

    for i in 0..64 {
        tx.send(swap_line(i * 400, 2.0, 1.0)).await.unwrap();
    }
    // Give the producer time to overflow the queue.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let oracle = FixedOracle::new().with_price("SOL", 10.0);
    let mut pipeline = build_pipeline(Config::default(), oracle);

    let err = pipeline.run(&mut stream).await.expect_err("halt expected");
    assert!(err.to_string().contains("halted"));
}

#[tokio::test]
async fn liquidity_and_marks_reach_the_risk_book() {
    let (tx, rx) = mpsc::channel(16);
    let mut stream = LogStream::spawn(rx, 64, Duration::from_secs(1));

    let oracle = FixedOracle::new().with_price("SOL", 10.0);
    let mut pipeline = build_pipeline(Config::default(), oracle);

    tx.send(
        r#"{"type":"add_liquidity","ts":400,"reserve_a":600.0,"reserve_b":400.0}"#.to_string(),
    )
    .await
    .unwrap();
    tx.send(swap_line(800, 2.0, 1.0)).await.unwrap();
    drop(tx);

    pipeline.run(&mut stream).await.unwrap();
    assert_eq!(pipeline.events_seen(), 2);

    let engine = pipeline.into_engine();
    let (_, _, sink) = engine.into_parts();
    // Every priced event produced an equity sample.
    assert!(sink.equity_curve().len() >= 2);
}
