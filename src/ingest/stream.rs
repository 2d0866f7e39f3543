//! Backpressure-aware log stream
//!
//! A producer task pumps raw log lines from the upstream subscription into a
//! bounded queue. Enqueue never blocks: when the queue is full the incoming
//! message is dropped and counted, and if the queue stays completely full
//! beyond the fail-fast window the stream halts fatally. Silently lagging
//! behind the chain would mean trading on stale features, so the pipeline is
//! told to stop instead.

use super::types::IngestError;
use crate::telemetry::metrics;
use crate::ws::{WsClient, WsConfig, WsMessage};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Default bounded queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 10_000;

/// Default sustained-backpressure window before the stream halts
pub const DEFAULT_FAIL_FAST: Duration = Duration::from_secs(1);

/// Items carried by the bounded queue
#[derive(Debug)]
pub enum StreamItem {
    /// A raw log line
    Log(String),
    /// End-of-stream marker; unblocks a consumer waiting on an empty queue
    Sentinel,
}

/// Consumer handle for the bounded log queue
pub struct LogStream {
    rx: mpsc::Receiver<StreamItem>,
    halted: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    fail_fast: Duration,
    producer: JoinHandle<()>,
}

impl LogStream {
    /// Subscribe to a WebSocket log feed.
    ///
    /// Reconnection with jittered backoff is handled by [`WsClient`]; this
    /// layer only sees the resulting message stream.
    pub fn connect(ws_config: WsConfig, queue_size: usize, fail_fast: Duration) -> Self {
        let (src_tx, src_rx) = mpsc::channel(1024);
        let mut ws_rx = WsClient::new(ws_config).connect();

        tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                match msg {
                    WsMessage::Text(text) => {
                        if src_tx.send(text).await.is_err() {
                            break;
                        }
                    }
                    WsMessage::Connected => tracing::info!("log feed connected"),
                    WsMessage::Reconnecting { attempt } => {
                        tracing::warn!(attempt, "log feed reconnecting...");
                    }
                    WsMessage::Disconnected => {
                        tracing::warn!("log feed disconnected");
                        break;
                    }
                    WsMessage::Binary(_) => {}
                }
            }
        });

        Self::spawn(src_rx, queue_size, fail_fast)
    }

    /// Build a stream from an arbitrary source of log lines.
    ///
    /// Used by tests and replay tooling; `connect` feeds the same path.
    pub fn spawn(
        source: mpsc::Receiver<String>,
        queue_size: usize,
        fail_fast: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        let halted = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let producer = tokio::spawn(Self::pump(
            source,
            tx,
            Arc::clone(&halted),
            Arc::clone(&dropped),
            fail_fast,
        ));

        Self {
            rx,
            halted,
            dropped,
            fail_fast,
            producer,
        }
    }

    /// Producer loop: non-blocking enqueue with drop-and-count on full
    async fn pump(
        mut source: mpsc::Receiver<String>,
        tx: mpsc::Sender<StreamItem>,
        halted: Arc<AtomicBool>,
        dropped: Arc<AtomicU64>,
        fail_fast: Duration,
    ) {
        let mut full_since: Option<Instant> = None;

        while let Some(log) = source.recv().await {
            match tx.try_send(StreamItem::Log(log)) {
                Ok(()) => {
                    full_since = None;
                    let max = tx.max_capacity() as f64;
                    metrics::set_queue_depth_ratio(1.0 - tx.capacity() as f64 / max);
                }
                Err(TrySendError::Full(_)) => {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    metrics::record_dropped_log();
                    metrics::set_queue_depth_ratio(1.0);

                    let since = *full_since.get_or_insert_with(Instant::now);
                    if since.elapsed() > fail_fast {
                        tracing::error!(
                            dropped = total,
                            window_ms = fail_fast.as_millis() as u64,
                            "ingestion queue full beyond fail-fast window, halting stream"
                        );
                        halted.store(true, Ordering::Release);
                        return;
                    }
                }
                Err(TrySendError::Closed(_)) => return,
            }
        }

        // Upstream ended cleanly; the sentinel wakes a consumer blocked on
        // an empty queue. If the queue is full the consumer cannot be
        // blocked, so a failed send is fine.
        let _ = tx.try_send(StreamItem::Sentinel);
    }

    /// Receive the next raw log line.
    ///
    /// Returns `Ok(None)` when the stream ended cleanly, and a fatal
    /// [`IngestError`] after a backpressure halt. The halt error drains any
    /// logs still queued so a restart does not replay stale data.
    pub async fn recv(&mut self) -> Result<Option<String>, IngestError> {
        if self.halted.load(Ordering::Acquire) {
            let mut drained = 0u64;
            while self.rx.try_recv().is_ok() {
                drained += 1;
            }
            if drained > 0 {
                tracing::warn!(drained, "discarded stale logs from halted queue");
            }
            return Err(IngestError::Backpressure {
                window_ms: self.fail_fast.as_millis() as u64,
                dropped: self.dropped.load(Ordering::Relaxed),
            });
        }

        match self.rx.recv().await {
            Some(StreamItem::Log(log)) => Ok(Some(log)),
            Some(StreamItem::Sentinel) | None => Ok(None),
        }
    }

    /// Total messages dropped due to a full queue
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the stream has halted fatally
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// Cancel the producer task and drain the queue
    pub fn close(mut self) {
        self.producer.abort();
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_delivers_logs_in_order() {
        let (tx, rx) = mpsc::channel(16);
        let mut stream = LogStream::spawn(rx, 16, DEFAULT_FAIL_FAST);

        for i in 0..3 {
            tx.send(format!("log{i}")).await.unwrap();
        }

        assert_eq!(stream.recv().await.unwrap(), Some("log0".to_string()));
        assert_eq!(stream.recv().await.unwrap(), Some("log1".to_string()));
        assert_eq!(stream.recv().await.unwrap(), Some("log2".to_string()));
    }

    #[tokio::test]
    async fn test_sentinel_on_source_close() {
        let (tx, rx) = mpsc::channel(16);
        let mut stream = LogStream::spawn(rx, 16, DEFAULT_FAIL_FAST);

        tx.send("last".to_string()).await.unwrap();
        drop(tx);

        assert_eq!(stream.recv().await.unwrap(), Some("last".to_string()));
        assert_eq!(stream.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drops_counted_when_queue_full() {
        let (tx, rx) = mpsc::channel(64);
        let stream = LogStream::spawn(rx, 2, Duration::from_secs(60));

        // Nobody consumes: everything past the queue capacity is dropped.
        for i in 0..10 {
            tx.send(format!("log{i}")).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(stream.dropped() > 0);
        assert!(!stream.is_halted());
        stream.close();
    }

    #[tokio::test]
    async fn test_backpressure_fatal_and_drained() {
        let (tx, rx) = mpsc::channel(1);
        let mut stream = LogStream::spawn(rx, 2, Duration::from_millis(50));

        // Producer outruns a consumer that never reads.
        let feeder = tokio::spawn(async move {
            loop {
                if tx.send("log".to_string()).await.is_err() {
                    break;
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;

        let err = stream.recv().await.unwrap_err();
        match err {
            IngestError::Backpressure { dropped, .. } => assert!(dropped > 0),
            other => panic!("expected backpressure error, got {other:?}"),
        }
        assert!(stream.is_halted());

        // The halt drained the queue: the next read fails again rather than
        // handing out stale logs.
        assert!(stream.recv().await.is_err());
        feeder.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_cancels_producer() {
        let (tx, rx) = mpsc::channel(16);
        let stream = LogStream::spawn(rx, 4, DEFAULT_FAIL_FAST);

        tx.send("log".to_string()).await.unwrap();
        stream.close();

        // Producer is gone, so the source channel closes shortly after.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(tx.is_closed());
    }
}
