pub mod analyzer;
pub mod filter;

pub use analyzer::{
    run_analyzer, AnalysisResult, AnalyzerMessage, WindowedAnalyzer, SAMPLE_RATE_HZ, STEP_SIZE,
    WINDOW_SIZE,
};
pub use filter::{run_filter_stage, FilterSettings, FilterStage, ProcessedSample};
