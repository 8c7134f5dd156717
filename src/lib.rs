//! canopy: A Fast, Modular Forest-Carbon MRV Core
//!
//! This library implements the reproducible core of a remote-sensing
//! monitoring, reporting and verification pipeline for land-use change and
//! forest-carbon accounting: stratification of change-detection output into
//! loss/gain strata, adaptive stratified sampling of validation points for
//! human interpretation, per-pixel stand-age reconstruction, and carbon
//! accumulation with propagated confidence intervals.

pub mod config;
pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use config::{CarbonParams, DealConfig, GrowthCurve, GrowthParams, SamplingParams};
pub use core::{
    AdaptiveStratifiedSampler, CarbonAccumulator, ForestHistoryCase, LandUseAttributor,
    MrvPipeline, SamplingOutcome, StandAgeReconstructor, StandAgeSeries, StrataClassifier,
};
pub use io::{ExportAdapter, GeoDataStore, MemoryStore};
pub use types::{
    AnnualForestMask, CarbonRecord, ChangeSegmentStack, GainStratum, LandUse, LandUseLayer,
    LossStratum, MrvError, MrvResult, SamplePoint, SamplingPhase,
};
