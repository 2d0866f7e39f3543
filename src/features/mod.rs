//! Feature extraction: versioned schema and streaming decayed statistics

pub mod engine;
pub mod schema;

pub use engine::{FeatureEngine, FeatureFrame, FeatureSubscription, DEFAULT_HISTORY_SIZE};
pub use schema::{FeatureCategory, FeatureDef, FeatureError, DIM, FRAME_DIM, SCHEMA_VERSION};
