pub mod onset;
pub mod respiration;

pub use onset::{find_breath_onsets, BreathEvents, OnsetError, DEFAULT_N_BINS};
pub use respiration::{
    AnalysisError, CycleRateAnalyzer, RespirationAnalyzer, RespirationMetrics,
};
