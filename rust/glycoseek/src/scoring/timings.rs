//! Timing instrumentation for the analysis pipeline.
//!
//! Stage timings are aggregated across parallel workers to give overall
//! performance numbers for a run.

use serde::Serialize;
use std::time::{
    Duration,
    Instant,
};

/// Accumulated wall time per stage, summed over all tasks.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct ScoreTimings {
    /// Building extracted ion chromatograms.
    pub eic: Duration,

    /// Detecting chromatographic peaks.
    pub peak_picking: Duration,

    /// Isotope, shape and S/N scoring of every peak.
    pub scoring: Duration,

    /// Filtering, deduplication and ranking of identifications.
    pub aggregation: Duration,

    /// Assigning MS2 fragments.
    pub fragments: Duration,
}

impl Serialize for ScoreTimings {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ScoreTimings", 5)?;
        state.serialize_field("eic_ms", &self.eic.as_millis())?;
        state.serialize_field("peak_picking_ms", &self.peak_picking.as_millis())?;
        state.serialize_field("scoring_ms", &self.scoring.as_millis())?;
        state.serialize_field("aggregation_ms", &self.aggregation.as_millis())?;
        state.serialize_field("fragments_ms", &self.fragments.as_millis())?;
        state.end()
    }
}

impl std::ops::AddAssign for ScoreTimings {
    fn add_assign(&mut self, rhs: Self) {
        self.eic += rhs.eic;
        self.peak_picking += rhs.peak_picking;
        self.scoring += rhs.scoring;
        self.aggregation += rhs.aggregation;
        self.fragments += rhs.fragments;
    }
}

/// Wall time budget of a single analysis task.
#[derive(Debug, Clone, Copy)]
pub struct TaskBudget {
    started: Instant,
    limit: Option<Duration>,
}

impl TaskBudget {
    pub fn new(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_exhausted(&self) -> bool {
        match self.limit {
            Some(limit) => self.started.elapsed() >= limit,
            None => false,
        }
    }
}
