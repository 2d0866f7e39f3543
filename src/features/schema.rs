//! Feature schema
//!
//! Versioned, stable index assignment for the 256-wide feature vector.
//! Indices are partitioned into four category ranges; every index without an
//! assigned definition is a tombstone that always reads zero. Downstream
//! models depend on this mapping staying put, so the schema version must
//! match the configured version at startup.

use thiserror::Error;

/// Schema version; bump on any index reassignment
pub const SCHEMA_VERSION: u32 = 1;

/// Width of a single-slot feature vector
pub const DIM: usize = 256;

/// Width of the emitted frame: current slot plus two lagged slots
pub const FRAME_DIM: usize = 3 * DIM;

/// Decay constant applied to per-dimension statistics each slot
pub const LAMBDA: f64 = 0.995;

/// Variance floor used during normalization
pub const EPS: f64 = 1e-8;

// Assigned indices. Liquidity events touch the first pair, swaps the order
// flow triple, mints the ownership slot.
pub const IDX_LIQ_POOL_DELTA: usize = 0;
pub const IDX_LIQ_CUM_LOG: usize = 1;
pub const IDX_OF_SIGNED_VOLUME: usize = 64;
pub const IDX_OF_ABS_VOLUME: usize = 65;
pub const IDX_OF_SWAP_RATE: usize = 66;
pub const IDX_OWN_MINTED_SUPPLY: usize = 128;

/// Feature categories grouped by index ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureCategory {
    /// Pool reserve dynamics, indices [0, 64)
    Liquidity,
    /// Trade flow, indices [64, 128)
    OrderFlow,
    /// Holder and supply structure, indices [128, 192)
    Ownership,
    /// Price microstructure, indices [192, 256)
    Microstructure,
}

impl FeatureCategory {
    /// Category owning the given index
    pub fn of_index(index: usize) -> Self {
        debug_assert!(index < DIM);
        match index {
            0..=63 => FeatureCategory::Liquidity,
            64..=127 => FeatureCategory::OrderFlow,
            128..=191 => FeatureCategory::Ownership,
            _ => FeatureCategory::Microstructure,
        }
    }
}

/// Metadata for an assigned feature index
#[derive(Debug, Clone, Copy)]
pub struct FeatureDef {
    pub index: usize,
    pub name: &'static str,
    pub category: FeatureCategory,
    pub unit: &'static str,
    pub doc: &'static str,
}

/// All currently assigned features; everything else is tombstoned
pub const ASSIGNED: &[FeatureDef] = &[
    FeatureDef {
        index: IDX_LIQ_POOL_DELTA,
        name: "liq_pool_delta",
        category: FeatureCategory::Liquidity,
        unit: "tokens",
        doc: "Signed change in pool reserves per liquidity event.",
    },
    FeatureDef {
        index: IDX_LIQ_CUM_LOG,
        name: "liq_cum_log",
        category: FeatureCategory::Liquidity,
        unit: "log-tokens",
        doc: "Log of absolute cumulative reserve change within the slot.",
    },
    FeatureDef {
        index: IDX_OF_SIGNED_VOLUME,
        name: "of_signed_volume",
        category: FeatureCategory::OrderFlow,
        unit: "tokens",
        doc: "Cumulative signed base volume since the last slot boundary.",
    },
    FeatureDef {
        index: IDX_OF_ABS_VOLUME,
        name: "of_abs_volume",
        category: FeatureCategory::OrderFlow,
        unit: "tokens",
        doc: "Cumulative absolute base volume since the last slot boundary.",
    },
    FeatureDef {
        index: IDX_OF_SWAP_RATE,
        name: "of_swap_rate",
        category: FeatureCategory::OrderFlow,
        unit: "swaps/s",
        doc: "Inverse inter-arrival time between consecutive swaps.",
    },
    FeatureDef {
        index: IDX_OWN_MINTED_SUPPLY,
        name: "own_minted_supply",
        category: FeatureCategory::Ownership,
        unit: "tokens",
        doc: "Cumulative supply minted within the slot.",
    },
];

/// Feature schema errors; both are configuration-fatal
#[derive(Debug, Clone, Error)]
pub enum FeatureError {
    /// Configured schema version does not match the compiled mapping
    #[error("feature schema version mismatch: expected {expected}, have {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    /// Lookup of a feature name absent from the schema
    #[error("unknown feature: {0}")]
    UnknownFeature(String),
}

/// Resolve a feature name to its stable index
pub fn index_of(name: &str) -> Result<usize, FeatureError> {
    ASSIGNED
        .iter()
        .find(|def| def.name == name)
        .map(|def| def.index)
        .ok_or_else(|| FeatureError::UnknownFeature(name.to_string()))
}

/// Fail startup if the configured schema version does not match
pub fn verify_version(expected: u32) -> Result<(), FeatureError> {
    if expected != SCHEMA_VERSION {
        return Err(FeatureError::SchemaVersionMismatch {
            expected,
            actual: SCHEMA_VERSION,
        });
    }
    Ok(())
}
