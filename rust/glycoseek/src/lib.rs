pub mod analysis;
pub mod config;
pub mod errors;
pub mod extraction;
pub mod fragments;
pub mod models;
pub mod scoring;
pub mod utils;

pub use analysis::{
    Analysis,
    AnalysisReport,
    RunDiagnostics,
    run_analysis,
};
pub use config::AnalysisConfig;
pub use errors::{
    GlycoSeekError,
    Result,
};
pub use models::{
    Fragment,
    GlycanCandidate,
    Identification,
    Spectrum,
    SpectrumCollection,
};
pub use scoring::ScoringPipeline;
