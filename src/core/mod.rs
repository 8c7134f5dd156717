//! Core MRV processing modules

pub mod carbon;
pub mod landuse;
pub mod pipeline;
pub mod sampler;
pub mod stand_age;
pub mod strata;

// Re-export main types
pub use carbon::CarbonAccumulator;
pub use landuse::LandUseAttributor;
pub use pipeline::{CarbonBranchOutput, MrvPipeline, SamplingBranchOutput};
pub use sampler::{
    AdaptiveStratifiedSampler, SamplerInputs, SamplingConstraint, SamplingOutcome,
    StratumShortfall,
};
pub use stand_age::{
    classify_history, Establishment, ForestHistoryCase, StandAgeReconstructor, StandAgeSeries,
};
pub use strata::StrataClassifier;
