pub mod cohort;
pub mod engine;
pub mod weights;

pub use engine::ScoringEngine;
pub use weights::{ScoringWeights, ALGORITHM_VERSION};
