//! Whole-run orchestration.
//!
//! [`Analysis`] validates the global inputs once, computes the shared noise
//! model, scores tasks in as many batches as the caller likes and finally
//! aggregates identifications and assigns fragments.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::{
    info,
    warn,
};

use crate::config::AnalysisConfig;
use crate::errors::{
    InputError,
    Result,
};
use crate::fragments::FragmentAssigner;
use crate::models::{
    Fragment,
    GlycanCandidate,
    Identification,
    SpectrumCollection,
};
use crate::scoring::{
    AnalysisContext,
    AnalysisOutput,
    AnalysisTask,
    IdentificationAggregator,
    NoiseEstimate,
    NoiseModel,
    ScoreTimings,
    ScoringPipeline,
    enumerate_tasks,
};

/// Counts reported with every run so no candidate disappears silently.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunDiagnostics {
    pub candidates_attempted: usize,
    pub candidates_identified: usize,
    pub candidates_degraded: usize,
    pub candidates_failed: usize,
    pub tasks_total: usize,
    pub tasks_no_evidence: usize,
    pub tasks_failed: usize,
    pub tasks_cancelled: usize,
    pub discarded_ppm: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
    pub ms2_spectra: usize,
    pub fragments_assigned: usize,
    pub run_noise: NoiseEstimate,
    pub timings: ScoreTimings,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub identifications: Vec<Identification>,
    pub fragments: Vec<Fragment>,
    pub diagnostics: RunDiagnostics,
}

pub struct Analysis<'a> {
    spectra: &'a SpectrumCollection,
    candidates: &'a [GlycanCandidate],
    config: &'a AnalysisConfig,
    noise: NoiseModel,
    invalid_candidates: BTreeSet<usize>,
    cancel: Arc<AtomicBool>,
}

impl<'a> Analysis<'a> {
    /// Fails only on problems that make the whole run meaningless: an
    /// invalid configuration or an empty library. Individual malformed
    /// candidates are reported and counted as failed.
    pub fn new(
        spectra: &'a SpectrumCollection,
        candidates: &'a [GlycanCandidate],
        config: &'a AnalysisConfig,
    ) -> Result<Self> {
        config.validate()?;
        if candidates.is_empty() {
            return Err(InputError::EmptyLibrary.into());
        }

        let mut invalid_candidates = BTreeSet::new();
        for (i, candidate) in candidates.iter().enumerate() {
            if let Err(e) = candidate.validate() {
                warn!("Skipping candidate at position {}: {}", i, e);
                invalid_candidates.insert(i);
            }
        }

        let st = Instant::now();
        let noise = NoiseModel::from_spectra(spectra, &config.noise_config());
        info!(
            "Noise model over {} MS1 spectra took {:?}, run estimate {:?}",
            spectra.num_ms1(),
            st.elapsed(),
            noise.run_estimate()
        );

        Ok(Self {
            spectra,
            candidates,
            config,
            noise,
            invalid_candidates,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Every (candidate, adduct) task of the valid candidates.
    pub fn tasks(&self) -> Vec<AnalysisTask> {
        enumerate_tasks(self.candidates)
            .into_iter()
            .filter(|t| !self.invalid_candidates.contains(&t.candidate_index))
            .collect()
    }

    /// Setting the flag makes every task that has not started yet return
    /// as cancelled.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    pub fn score_tasks(&self, tasks: &[AnalysisTask]) -> AnalysisOutput {
        let pipeline = ScoringPipeline::new(AnalysisContext {
            spectra: self.spectra,
            candidates: self.candidates,
            noise: &self.noise,
            config: self.config,
            cancel: &self.cancel,
        });
        pipeline.process_batch(tasks)
    }

    /// Aggregates the scored batches and assigns MS2 fragments.
    pub fn finish(&self, outputs: impl IntoIterator<Item = AnalysisOutput>) -> AnalysisReport {
        let output = outputs
            .into_iter()
            .fold(AnalysisOutput::default(), AnalysisOutput::reduce);
        let mut timings = output.timings;

        let st = Instant::now();
        let aggregator =
            IdentificationAggregator::new(self.config.max_ppm_error, self.config.acceptance_threshold);
        let (identifications, stats) = aggregator.aggregate(output.identifications);
        timings.aggregation += st.elapsed();

        let st = Instant::now();
        let assigner = FragmentAssigner::new(self.config.fragment_params());
        let fragments = assigner.assign_all(self.spectra, &identifications);
        timings.fragments += st.elapsed();

        let identified: BTreeSet<usize> =
            identifications.iter().map(|x| x.candidate_index).collect();
        let degraded: BTreeSet<usize> = identifications
            .iter()
            .filter(|x| x.degraded)
            .map(|x| x.candidate_index)
            .collect();
        let failed: BTreeSet<usize> = self
            .invalid_candidates
            .union(&output.failed_candidates)
            .copied()
            .collect();

        let diagnostics = RunDiagnostics {
            candidates_attempted: self.candidates.len(),
            candidates_identified: identified.len(),
            candidates_degraded: degraded.len(),
            candidates_failed: failed.len(),
            tasks_total: output.tally.tasks,
            tasks_no_evidence: output.tally.no_evidence,
            tasks_failed: output.tally.failed,
            tasks_cancelled: output.tally.cancelled,
            discarded_ppm: stats.discarded_ppm,
            below_threshold: stats.below_threshold,
            duplicates: stats.duplicates,
            ms2_spectra: self.spectra.ms2_indices().len(),
            fragments_assigned: fragments.iter().filter(|f| f.identification.is_some()).count(),
            run_noise: self.noise.run_estimate(),
            timings,
        };
        info!(
            "Identified {} of {} candidates ({} degraded, {} failed), {} fragments assigned",
            diagnostics.candidates_identified,
            diagnostics.candidates_attempted,
            diagnostics.candidates_degraded,
            diagnostics.candidates_failed,
            diagnostics.fragments_assigned
        );
        if diagnostics.tasks_cancelled > 0 {
            warn!(
                "{} tasks were cancelled before they ran",
                diagnostics.tasks_cancelled
            );
        }

        AnalysisReport {
            identifications,
            fragments,
            diagnostics,
        }
    }
}

/// Runs every task in one batch and returns the final report.
pub fn run_analysis(
    spectra: &SpectrumCollection,
    candidates: &[GlycanCandidate],
    config: &AnalysisConfig,
) -> Result<AnalysisReport> {
    let analysis = Analysis::new(spectra, candidates, config)?;
    let tasks = analysis.tasks();
    let output = analysis.score_tasks(&tasks);
    Ok(analysis.finish([output]))
}
