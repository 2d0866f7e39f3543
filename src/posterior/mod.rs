//! Posterior forecasting: online logistic rug model and softmax regime model

pub mod engine;

pub use engine::{Action, PosteriorEngine, PosteriorError, PosteriorOutput, Regime};
