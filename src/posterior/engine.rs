//! Online posterior model
//!
//! Two heads over the same feature slice: a logistic rug-probability head
//! and a three-way softmax over market regimes. Both are trained online by
//! plain SGD. Weights round-trip through JSON so a long-running process can
//! warm-start from its previous run.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Default width of the model's input slice
pub const DEFAULT_N_FEATURES: usize = 11;
/// Default SGD learning rate
pub const DEFAULT_LEARNING_RATE: f64 = 0.01;
/// Default index of the volatility feature within the input slice
pub const DEFAULT_VOL_INDEX: usize = 8;
/// Default index of the fee feature within the input slice
pub const DEFAULT_FEE_INDEX: usize = 9;

const N_REGIMES: usize = 3;

/// Market regime as classified by the softmax head
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Trend = 0,
    Revert = 1,
    Chop = 2,
}

/// Trading action derived from a posterior output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Enter,
    Exit,
    Flat,
}

/// Model output for a single feature slice
#[derive(Debug, Clone, Copy)]
pub struct PosteriorOutput {
    /// Probability the token is a rug
    pub p_rug: f64,
    /// Regime probabilities, ordered trend / revert / chop
    pub p_regime: [f64; N_REGIMES],
}

impl PosteriorOutput {
    pub fn p_trend(&self) -> f64 {
        self.p_regime[Regime::Trend as usize]
    }

    pub fn p_revert(&self) -> f64 {
        self.p_regime[Regime::Revert as usize]
    }

    pub fn p_chop(&self) -> f64 {
        self.p_regime[Regime::Chop as usize]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PosteriorError {
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("weight io: {0}")]
    Io(#[from] std::io::Error),

    #[error("weight format: {0}")]
    Format(#[from] serde_json::Error),
}

/// Persisted weight snapshot
#[derive(Serialize, Deserialize)]
struct Weights {
    n_features: usize,
    w_rug: Vec<f64>,
    w_regime: Vec<Vec<f64>>,
}

/// Online logistic + softmax posterior
pub struct PosteriorEngine {
    n_features: usize,
    learning_rate: f64,
    vol_index: usize,
    fee_index: usize,
    vol_threshold: f64,
    fee_threshold: f64,
    w_rug: Vec<f64>,
    w_regime: [Vec<f64>; N_REGIMES],
    updates: u64,
}

impl PosteriorEngine {
    pub fn new(n_features: usize) -> Self {
        Self {
            n_features,
            learning_rate: DEFAULT_LEARNING_RATE,
            vol_index: DEFAULT_VOL_INDEX,
            fee_index: DEFAULT_FEE_INDEX,
            vol_threshold: 0.0,
            fee_threshold: 0.1,
            w_rug: vec![0.0; n_features],
            w_regime: [
                vec![0.0; n_features],
                vec![0.0; n_features],
                vec![0.0; n_features],
            ],
            updates: 0,
        }
    }

    pub fn learning_rate(mut self, lr: f64) -> Self {
        self.learning_rate = lr;
        self
    }

    pub fn vol_feature(mut self, index: usize, threshold: f64) -> Self {
        self.vol_index = index;
        self.vol_threshold = threshold;
        self
    }

    pub fn fee_feature(mut self, index: usize, threshold: f64) -> Self {
        self.fee_index = index;
        self.fee_threshold = threshold;
        self
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Number of SGD steps applied since construction or load
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Forward pass over one feature slice
    pub fn predict(&self, features: &[f64]) -> Result<PosteriorOutput, PosteriorError> {
        self.check_dim(features)?;

        let p_rug = sigmoid(dot(&self.w_rug, features));

        let mut logits = [0.0f64; N_REGIMES];
        for (k, w) in self.w_regime.iter().enumerate() {
            logits[k] = dot(w, features);
        }
        let p_regime = softmax(logits);

        Ok(PosteriorOutput { p_rug, p_regime })
    }

    /// One SGD step toward the observed labels.
    ///
    /// `rug_label` is 1.0 when the token rugged. `regime_label` is the
    /// realized regime for the slice.
    pub fn update(
        &mut self,
        features: &[f64],
        rug_label: f64,
        regime_label: Regime,
    ) -> Result<PosteriorOutput, PosteriorError> {
        let out = self.predict(features)?;

        let rug_err = rug_label - out.p_rug;
        for (w, &x) in self.w_rug.iter_mut().zip(features) {
            *w += self.learning_rate * rug_err * x;
        }

        for (k, wk) in self.w_regime.iter_mut().enumerate() {
            let target = if k == regime_label as usize { 1.0 } else { 0.0 };
            let err = target - out.p_regime[k];
            for (w, &x) in wk.iter_mut().zip(features) {
                *w += self.learning_rate * err * x;
            }
        }

        self.updates += 1;
        Ok(out)
    }

    /// Map a posterior output and its feature slice to an action.
    ///
    /// Enter only when trend dominates both other regimes, volatility clears
    /// its floor and the fee is below its ceiling. A dominant revert signal
    /// or an excessive fee forces an exit; everything else stays flat.
    pub fn decide_action(
        &self,
        output: &PosteriorOutput,
        features: &[f64],
    ) -> Result<Action, PosteriorError> {
        self.check_dim(features)?;

        let vol = features[self.vol_index];
        let fee = features[self.fee_index];
        let trend = output.p_trend();
        let revert = output.p_revert();
        let chop = output.p_chop();

        if trend > revert && trend > chop && vol > self.vol_threshold && fee < self.fee_threshold {
            Ok(Action::Enter)
        } else if revert > trend || fee > self.fee_threshold {
            Ok(Action::Exit)
        } else {
            Ok(Action::Flat)
        }
    }

    /// Write weights to `path` as JSON
    pub fn save(&self, path: &Path) -> Result<(), PosteriorError> {
        let weights = Weights {
            n_features: self.n_features,
            w_rug: self.w_rug.clone(),
            w_regime: self.w_regime.to_vec(),
        };
        let json = serde_json::to_string(&weights)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), "saved posterior weights");
        Ok(())
    }

    /// Restore weights previously written by [`save`](Self::save)
    pub fn load(&mut self, path: &Path) -> Result<(), PosteriorError> {
        let json = std::fs::read_to_string(path)?;
        let weights: Weights = serde_json::from_str(&json)?;

        if weights.n_features != self.n_features
            || weights.w_rug.len() != self.n_features
            || weights.w_regime.len() != N_REGIMES
            || weights.w_regime.iter().any(|w| w.len() != self.n_features)
        {
            return Err(PosteriorError::DimensionMismatch {
                expected: self.n_features,
                actual: weights.n_features,
            });
        }

        self.w_rug = weights.w_rug;
        for (dst, src) in self.w_regime.iter_mut().zip(weights.w_regime) {
            *dst = src;
        }
        info!(path = %path.display(), "loaded posterior weights");
        Ok(())
    }

    fn check_dim(&self, features: &[f64]) -> Result<(), PosteriorError> {
        if features.len() != self.n_features {
            return Err(PosteriorError::DimensionMismatch {
                expected: self.n_features,
                actual: features.len(),
            });
        }
        Ok(())
    }
}

fn dot(w: &[f64], x: &[f64]) -> f64 {
    w.iter().zip(x).map(|(a, b)| a * b).sum()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Numerically stable softmax (max subtraction before exponentiation)
fn softmax(logits: [f64; N_REGIMES]) -> [f64; N_REGIMES] {
    let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut out = [0.0f64; N_REGIMES];
    let mut sum = 0.0;
    for (o, &l) in out.iter_mut().zip(&logits) {
        *o = (l - max).exp();
        sum += *o;
    }
    for o in &mut out {
        *o /= sum;
    }
    out
}
