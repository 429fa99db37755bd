//! Batch prediction
//!
//! The batch engine and its aggregation layer. See [`engine::BatchEngine`]
//! for the strategy and ordering guarantees.

mod analysis;
mod engine;

pub use analysis::{BatchAnalysis, BatchMetadata, BatchOutcome, ConfidenceDistribution};
pub use engine::{BatchConfig, BatchEngine, BatchStrategy};
