mod accumulator;
pub mod aggregator;
pub mod isotopes;
pub mod noise;
pub mod peak_picking;
pub mod pipeline;
pub mod shape;
pub mod snr;
pub mod timings;

pub use accumulator::{
    AnalysisOutput,
    TaskTally,
};
pub use aggregator::{
    AggregationStats,
    IdentificationAggregator,
};
pub use isotopes::{
    IsotopeParams,
    IsotopeScorer,
};
pub use noise::{
    NoiseConfig,
    NoiseEstimate,
    NoiseMethod,
    NoiseModel,
};
pub use peak_picking::{
    PeakPicker,
    PeakPickingParams,
};
pub use pipeline::{
    AnalysisContext,
    AnalysisTask,
    ScoringPipeline,
    TaskOutcome,
    TaskResult,
    enumerate_tasks,
};
pub use shape::{
    GaussianFit,
    ShapeParams,
    ShapeScorer,
};
pub use snr::signal_to_noise;
pub use timings::{
    ScoreTimings,
    TaskBudget,
};
