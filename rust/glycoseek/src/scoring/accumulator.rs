//! Accumulator for parallel task results.
//!
//! Each worker folds its outcomes into a local accumulator and the local
//! accumulators are merged pairwise, so no state is shared while scoring.

use rayon::iter::{
    FromParallelIterator,
    IntoParallelIterator,
    ParallelIterator,
};
use serde::Serialize;
use std::collections::BTreeSet;

use super::pipeline::{
    TaskOutcome,
    TaskResult,
};
use super::timings::ScoreTimings;
use crate::models::Identification;

/// Per-task counters of a batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskTally {
    pub tasks: usize,
    pub identified: usize,
    pub no_evidence: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl std::ops::AddAssign for TaskTally {
    fn add_assign(&mut self, rhs: Self) {
        self.tasks += rhs.tasks;
        self.identified += rhs.identified;
        self.no_evidence += rhs.no_evidence;
        self.failed += rhs.failed;
        self.cancelled += rhs.cancelled;
    }
}

/// Raw results of one or more scored batches, before aggregation.
#[derive(Debug, Default, Clone)]
pub struct AnalysisOutput {
    pub identifications: Vec<Identification>,
    /// Library positions of candidates with at least one failed task.
    pub failed_candidates: BTreeSet<usize>,
    pub tally: TaskTally,
    pub timings: ScoreTimings,
}

impl AnalysisOutput {
    /// Merges two accumulators, used to combine batches and in the reduce
    /// phase of parallel collection.
    pub fn reduce(mut self, other: Self) -> Self {
        self.identifications.extend(other.identifications);
        self.failed_candidates.extend(other.failed_candidates);
        self.tally += other.tally;
        self.timings += other.timings;
        self
    }

    fn fold(mut self, item: TaskResult) -> Self {
        self.tally.tasks += 1;
        match item.outcome {
            TaskOutcome::Identified(idents) => {
                self.tally.identified += 1;
                self.identifications.extend(idents);
            }
            TaskOutcome::NoEvidence => self.tally.no_evidence += 1,
            TaskOutcome::Failed(_) => {
                self.tally.failed += 1;
                self.failed_candidates.insert(item.task.candidate_index);
            }
            TaskOutcome::Cancelled => self.tally.cancelled += 1,
        }
        self.timings += item.timings;
        self
    }
}

impl FromIterator<TaskResult> for AnalysisOutput {
    fn from_iter<I>(iter: I) -> Self
    where
        I: IntoIterator<Item = TaskResult>,
    {
        iter.into_iter()
            .fold(AnalysisOutput::default(), AnalysisOutput::fold)
    }
}

impl FromParallelIterator<TaskResult> for AnalysisOutput {
    fn from_par_iter<I>(par_iter: I) -> Self
    where
        I: IntoParallelIterator<Item = TaskResult>,
    {
        par_iter
            .into_par_iter()
            .fold(AnalysisOutput::default, AnalysisOutput::fold)
            .reduce(AnalysisOutput::default, AnalysisOutput::reduce)
    }
}
