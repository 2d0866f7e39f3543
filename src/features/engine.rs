//! Decaying feature engine with a three-slot lag stack
//!
//! Maintains per-dimension exponentially decayed mean/variance statistics
//! (Welford-style, decay constant λ per slot) over a 256-wide vector and
//! emits a 768-wide frame: the normalized current slot followed by the two
//! previous slots. Per-event cost is O(k) in the touched indices, so frame
//! width never shows up on the hot path.
//!
//! Not synchronized. The engine is owned by the pipeline task; subscriber
//! queues are the only state shared across a task boundary.

use super::schema::{
    DIM, EPS, FRAME_DIM, IDX_LIQ_CUM_LOG, IDX_LIQ_POOL_DELTA, IDX_OF_ABS_VOLUME,
    IDX_OF_SIGNED_VOLUME, IDX_OF_SWAP_RATE, IDX_OWN_MINTED_SUPPLY, LAMBDA,
};
use crate::ingest::Event;
use crate::telemetry::metrics;
use crossbeam_queue::ArrayQueue;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

/// Default retention of the (event, frame) audit ring
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Emitted feature frame: `[current | lag-1 | lag-2]`
pub type FeatureFrame = [f32; FRAME_DIM];

/// Receiving side of a feature subscription.
///
/// Backed by a fixed-capacity ring with overwrite-oldest-on-full semantics:
/// a slow subscriber loses intermediate updates but always sees the most
/// recent state.
pub struct FeatureSubscription {
    queue: Arc<ArrayQueue<(Event, FeatureFrame)>>,
}

impl FeatureSubscription {
    /// Pop the oldest queued update, if any
    pub fn try_recv(&self) -> Option<(Event, FeatureFrame)> {
        self.queue.pop()
    }

    /// Number of queued updates
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

/// Streaming feature extractor
pub struct FeatureEngine {
    /// Raw per-slot accumulators
    curr: [f32; DIM],
    /// Normalized view of the current slot
    norm: [f32; DIM],
    prev1: [f32; DIM],
    prev2: [f32; DIM],
    mean: [f64; DIM],
    var: [f64; DIM],
    /// Slot in which each index was last touched or decayed
    last_touched: [u64; DIM],
    slot: Option<u64>,
    decay_slot: Option<u64>,
    last_swap_ts: Option<i64>,
    cum_liquidity: f64,
    history: VecDeque<(Event, FeatureFrame)>,
    history_cap: usize,
    subscribers: Vec<Arc<ArrayQueue<(Event, FeatureFrame)>>>,
}

impl FeatureEngine {
    /// Create an engine with the given audit-ring capacity
    pub fn with_history(history_cap: usize) -> Self {
        Self {
            curr: [0.0; DIM],
            norm: [0.0; DIM],
            prev1: [0.0; DIM],
            prev2: [0.0; DIM],
            mean: [0.0; DIM],
            var: [0.0; DIM],
            last_touched: [0; DIM],
            slot: None,
            decay_slot: None,
            last_swap_ts: None,
            cum_liquidity: 0.0,
            history: VecDeque::with_capacity(history_cap),
            history_cap,
            subscribers: Vec::new(),
        }
    }

    pub fn new() -> Self {
        Self::with_history(DEFAULT_HISTORY_SIZE)
    }

    /// Apply `event` for `slot` and return the emitted frame.
    ///
    /// A slot change rotates the lag stack; indices untouched since their
    /// last update are then decayed in proportion to the elapsed slots
    /// before the event is applied.
    pub fn update(&mut self, event: &Event, slot: u64) -> FeatureFrame {
        let started = Instant::now();

        match self.slot {
            None => self.slot = Some(slot),
            Some(s) if s != slot => {
                self.rotate();
                self.slot = Some(slot);
            }
            _ => {}
        }

        if self.decay_slot != Some(slot) {
            self.decay_inactive(slot);
            self.decay_slot = Some(slot);
        }

        match *event {
            Event::AddLiquidity {
                reserve_a,
                reserve_b,
                ..
            } => {
                let delta = reserve_a + reserve_b;
                self.cum_liquidity += delta;
                self.apply(IDX_LIQ_POOL_DELTA, delta, slot);
                self.apply(IDX_LIQ_CUM_LOG, (self.cum_liquidity.abs() + EPS).ln(), slot);
            }
            Event::RemoveLiquidity {
                reserve_a,
                reserve_b,
                ..
            } => {
                let delta = -(reserve_a + reserve_b);
                self.cum_liquidity += delta;
                self.apply(IDX_LIQ_POOL_DELTA, delta, slot);
                self.apply(IDX_LIQ_CUM_LOG, (self.cum_liquidity.abs() + EPS).ln(), slot);
            }
            Event::Swap {
                ts,
                amount_in,
                amount_out,
            } => {
                let signed = amount_in - amount_out;
                let cum_signed = f64::from(self.curr[IDX_OF_SIGNED_VOLUME]) + signed;
                self.apply(IDX_OF_SIGNED_VOLUME, cum_signed, slot);
                let cum_abs = f64::from(self.curr[IDX_OF_ABS_VOLUME]) + signed.abs();
                self.apply(IDX_OF_ABS_VOLUME, cum_abs, slot);
                if let Some(last) = self.last_swap_ts {
                    let dt = (ts - last).max(1) as f64;
                    self.apply(IDX_OF_SWAP_RATE, 1000.0 / dt, slot);
                }
                self.last_swap_ts = Some(ts);
            }
            Event::Mint { amount_out, .. } => {
                let cum = f64::from(self.curr[IDX_OWN_MINTED_SUPPLY]) + amount_out;
                self.apply(IDX_OWN_MINTED_SUPPLY, cum, slot);
            }
        }

        let frame = self.compose();
        metrics::record_feature_latency(started.elapsed());

        if self.history.len() == self.history_cap {
            self.history.pop_front();
        }
        self.history.push_back((*event, frame));

        for sub in &self.subscribers {
            // Overwrite the oldest entry if the subscriber has fallen behind.
            sub.force_push((*event, frame));
        }

        frame
    }

    /// Current frame without mutating any state (copy-on-read)
    pub fn snapshot(&self) -> FeatureFrame {
        self.compose()
    }

    /// (mean, variance) of the decayed statistics at `index`
    pub fn stats(&self, index: usize) -> (f64, f64) {
        (self.mean[index], self.var[index])
    }

    /// Register a bounded drop-oldest subscriber
    pub fn subscribe(&mut self, capacity: usize) -> FeatureSubscription {
        let queue = Arc::new(ArrayQueue::new(capacity));
        self.subscribers.push(Arc::clone(&queue));
        FeatureSubscription { queue }
    }

    /// Recent (event, frame) pairs, oldest first
    pub fn history(&self) -> impl Iterator<Item = &(Event, FeatureFrame)> {
        self.history.iter()
    }

    /// Clear all buffers and statistics
    pub fn reset(&mut self) {
        self.curr = [0.0; DIM];
        self.norm = [0.0; DIM];
        self.prev1 = [0.0; DIM];
        self.prev2 = [0.0; DIM];
        self.mean = [0.0; DIM];
        self.var = [0.0; DIM];
        self.last_touched = [0; DIM];
        self.slot = None;
        self.decay_slot = None;
        self.last_swap_ts = None;
        self.cum_liquidity = 0.0;
        self.history.clear();
    }

    /// Decayed Welford step for a touched index
    fn apply(&mut self, index: usize, value: f64, slot: u64) {
        self.curr[index] = value as f32;
        self.last_touched[index] = slot;

        let mean_prev = self.mean[index];
        let mean = LAMBDA * mean_prev + (1.0 - LAMBDA) * value;
        let var = LAMBDA * (self.var[index] + (1.0 - LAMBDA) * (value - mean_prev).powi(2));
        self.mean[index] = mean;
        self.var[index] = var;

        let norm = (value - mean) / (var + EPS).sqrt();
        if norm.is_finite() {
            self.norm[index] = norm as f32;
        } else {
            metrics::record_feature_nan();
            self.norm[index] = 0.0;
        }
    }

    /// Relax every index untouched since its last update toward zero
    /// activity, proportional to the number of elapsed slots.
    fn decay_inactive(&mut self, slot: u64) {
        for i in 0..DIM {
            let elapsed = slot.saturating_sub(self.last_touched[i]);
            if elapsed == 0 {
                continue;
            }
            let decay = LAMBDA.powf(elapsed as f64);
            self.mean[i] *= decay;
            self.var[i] *= decay;
            self.norm[i] = (-self.mean[i] / (self.var[i] + EPS).sqrt()) as f32;
            self.curr[i] = 0.0;
            self.last_touched[i] = slot;
        }
    }

    /// Rotate the lag stack at a slot boundary
    fn rotate(&mut self) {
        self.prev2 = self.prev1;
        self.prev1 = self.norm;
        self.curr = [0.0; DIM];
        self.norm = [0.0; DIM];
        self.cum_liquidity = 0.0;
    }

    fn compose(&self) -> FeatureFrame {
        let mut frame = [0.0f32; FRAME_DIM];
        frame[..DIM].copy_from_slice(&self.norm);
        frame[DIM..2 * DIM].copy_from_slice(&self.prev1);
        frame[2 * DIM..].copy_from_slice(&self.prev2);
        frame
    }
}

impl Default for FeatureEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::schema;

    fn swap(ts: i64, amount_in: f64, amount_out: f64) -> Event {
        Event::Swap {
            ts,
            amount_in,
            amount_out,
        }
    }

    fn add_liquidity(ts: i64, reserve_a: f64, reserve_b: f64) -> Event {
        Event::AddLiquidity {
            ts,
            reserve_a,
            reserve_b,
        }
    }

    /// Reference implementation of the decayed Welford recurrence
    fn welford_ref(values: &[f64], lambda: f64) -> (f64, f64) {
        let mut mean = 0.0;
        let mut var = 0.0;
        for &v in values {
            let mean_next = lambda * mean + (1.0 - lambda) * v;
            var = lambda * (var + (1.0 - lambda) * (v - mean).powi(2));
            mean = mean_next;
        }
        (mean, var)
    }

    #[test]
    fn test_swap_touches_only_order_flow_indices() {
        let mut fe = FeatureEngine::new();
        let frame = fe.update(&swap(1, 3.0, 1.0), 1);

        for i in 0..DIM {
            let touched = matches!(
                i,
                schema::IDX_OF_SIGNED_VOLUME | schema::IDX_OF_ABS_VOLUME
            );
            if !touched {
                assert_eq!(frame[i], 0.0, "index {i} should be untouched");
            }
        }
        assert!(frame[schema::IDX_OF_SIGNED_VOLUME] != 0.0);
    }

    #[test]
    fn test_liquidity_events_touch_liquidity_indices() {
        let mut fe = FeatureEngine::new();
        fe.update(&add_liquidity(1, 100.0, 50.0), 1);
        let (mean, _) = fe.stats(schema::IDX_LIQ_POOL_DELTA);
        assert!((mean - (1.0 - LAMBDA) * 150.0).abs() < 1e-9);

        let frame = fe.update(
            &Event::RemoveLiquidity {
                ts: 2,
                reserve_a: 30.0,
                reserve_b: 20.0,
            },
            1,
        );
        assert!(frame[schema::IDX_LIQ_POOL_DELTA] < 0.0);
    }

    #[test]
    fn test_mint_touches_ownership_index() {
        let mut fe = FeatureEngine::new();
        let frame = fe.update(
            &Event::Mint {
                ts: 1,
                amount_in: 0.0,
                amount_out: 1000.0,
            },
            1,
        );
        assert!(frame[schema::IDX_OWN_MINTED_SUPPLY] != 0.0);
        assert_eq!(frame[schema::IDX_OF_SIGNED_VOLUME], 0.0);
    }

    #[test]
    fn test_determinism() {
        let events = [
            swap(1, 1.0, 0.5),
            add_liquidity(2, 100.0, 50.0),
            swap(3, 0.2, 0.7),
        ];

        let mut fe1 = FeatureEngine::new();
        let mut fe2 = FeatureEngine::new();
        let mut out1 = [0.0f32; FRAME_DIM];
        let mut out2 = [0.0f32; FRAME_DIM];
        for ev in &events {
            out1 = fe1.update(ev, 1);
        }
        for ev in &events {
            out2 = fe2.update(ev, 1);
        }

        assert_eq!(out1, out2);
    }

    #[test]
    fn test_welford_matches_reference() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0);
        let amounts: Vec<f64> = (0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect();

        let mut fe = FeatureEngine::new();
        let mut cum = 0.0;
        let mut series = Vec::with_capacity(amounts.len());
        for (i, &a) in amounts.iter().enumerate() {
            fe.update(&swap(i as i64, a, 0.0), 1);
            cum += a;
            series.push(cum);
        }

        let (mean, var) = fe.stats(schema::IDX_OF_SIGNED_VOLUME);
        let (ref_mean, ref_var) = welford_ref(&series, LAMBDA);
        assert!((mean - ref_mean).abs() < 1e-6);
        assert!((var - ref_var).abs() < 1e-6);
    }

    #[test]
    fn test_lag_rotation_on_slot_advance() {
        let mut fe = FeatureEngine::new();
        let frame1 = fe.update(&swap(1, 2.0, 1.0), 1);
        let curr1: Vec<f32> = frame1[..DIM].to_vec();

        let frame2 = fe.update(&swap(2, 1.0, 3.0), 2);
        // Previous slot's normalized block moved verbatim into the lag-1 range.
        assert_ne!(&frame2[..DIM], curr1.as_slice());
        assert_eq!(&frame2[DIM..2 * DIM], curr1.as_slice());
        assert!(frame2[2 * DIM..].iter().all(|&v| v == 0.0));

        let frame3 = fe.update(&swap(3, 1.0, 0.5), 3);
        assert_eq!(&frame3[2 * DIM..], curr1.as_slice());
    }

    #[test]
    fn test_snapshot_is_copy_on_read() {
        let mut fe = FeatureEngine::new();
        fe.update(&swap(1, 2.0, 1.0), 1);

        let before = fe.snapshot();
        fe.update(&swap(2, 5.0, 1.0), 1);
        let after = fe.snapshot();

        assert_ne!(
            before[schema::IDX_OF_SIGNED_VOLUME],
            after[schema::IDX_OF_SIGNED_VOLUME]
        );
        // The earlier copy still holds its original value.
        assert_eq!(before, fe.history().next().unwrap().1);
    }

    #[test]
    fn test_untouched_decay_at_2_and_7_slots() {
        let idx = schema::IDX_OF_SIGNED_VOLUME;
        let mut fe = FeatureEngine::new();
        fe.update(&swap(1, 4.0, 1.0), 1);
        let (mean1, var1) = fe.stats(idx);
        assert!(mean1 > 0.0 && var1 > 0.0);

        // Slot 3: the swap index sat untouched for 2 slots.
        fe.update(&add_liquidity(2, 10.0, 10.0), 3);
        let (mean2, var2) = fe.stats(idx);
        let d2 = LAMBDA.powi(2);
        assert!((mean2 - mean1 * d2).abs() < 1e-12);
        assert!((var2 - var1 * d2).abs() < 1e-12);
        let expected_norm = (-mean2 / (var2 + EPS).sqrt()) as f32;
        assert_eq!(fe.snapshot()[idx], expected_norm);

        // Slot 10: 7 more elapsed slots.
        fe.update(&add_liquidity(3, 10.0, 10.0), 10);
        let (mean3, var3) = fe.stats(idx);
        let d7 = LAMBDA.powi(7);
        assert!((mean3 - mean2 * d7).abs() < 1e-12);
        assert!((var3 - var2 * d7).abs() < 1e-12);
    }

    #[test]
    fn test_subscription_drop_oldest() {
        let mut fe = FeatureEngine::new();
        let sub = fe.subscribe(2);

        fe.update(&swap(1, 1.0, 0.0), 1);
        fe.update(&swap(2, 2.0, 0.0), 1);
        fe.update(&swap(3, 3.0, 0.0), 1);

        assert_eq!(sub.len(), 2);
        let (ev, _) = sub.try_recv().unwrap();
        assert_eq!(ev, swap(2, 2.0, 0.0));
        let (ev, _) = sub.try_recv().unwrap();
        assert_eq!(ev, swap(3, 3.0, 0.0));
        assert!(sub.is_empty());
    }

    #[test]
    fn test_history_ring_caps() {
        let mut fe = FeatureEngine::with_history(3);
        for i in 0..5 {
            fe.update(&swap(i, 1.0, 0.0), 1);
        }
        let events: Vec<i64> = fe.history().map(|(ev, _)| ev.ts()).collect();
        assert_eq!(events, vec![2, 3, 4]);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut fe = FeatureEngine::new();
        fe.update(&swap(1, 2.0, 1.0), 1);
        fe.update(&swap(2, 2.0, 1.0), 2);
        fe.reset();

        assert_eq!(fe.snapshot(), [0.0f32; FRAME_DIM]);
        assert_eq!(fe.stats(schema::IDX_OF_SIGNED_VOLUME), (0.0, 0.0));
        assert_eq!(fe.history().count(), 0);
    }
}
