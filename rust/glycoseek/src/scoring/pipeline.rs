//! Worker-pool scoring of (candidate, adduct) tasks.
//!
//! ## Buffer reuse
//!
//! 1. `PeakPicker` owns the smoothing and region buffers a task needs.
//! 2. `process_batch()` uses Rayon's `map_init()` to create one picker per thread.
//! 3. Each thread reuses its picker across every task it is handed.
//!
//! ## Stages of a task
//!
//! 1. **EIC**: extract the trace at the precursor m/z of the adduct.
//! 2. **Peak picking**: threshold against the noise of that m/z and pick peaks.
//! 3. **Scoring**: per peak, the isotope envelope in the apex spectrum, the
//!    elution shape, and the signal to noise ratio, merged into one confidence.
//!    The isotope fit and mass error are also averaged over the whole peak
//!    and reported next to the apex values.
//!
//! Tasks only read the shared spectra, library and noise model and only write
//! their own result, so abandoning one never leaves partial state behind.

use rayon::prelude::*;
use std::sync::atomic::{
    AtomicBool,
    Ordering,
};
use std::time::Instant;
use tracing::{
    debug,
    info,
    warn,
};

use super::accumulator::AnalysisOutput;
use super::isotopes::IsotopeScorer;
use super::noise::NoiseModel;
use super::peak_picking::PeakPicker;
use super::shape::ShapeScorer;
use super::snr::signal_to_noise;
use super::timings::{
    ScoreTimings,
    TaskBudget,
};
use crate::config::AnalysisConfig;
use crate::errors::DataProcessingError;
use crate::extraction::EicBuilder;
use crate::models::{
    Adduct,
    ChromatographicPeak,
    GlycanCandidate,
    Identification,
    ScoreVector,
    SpectrumCollection,
};
use crate::utils::math::{
    centered_gaussian_weights,
    weighted_mean,
};

/// Gaussian weighted isotope fit and ppm error over the scans of a peak.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PeakAverages {
    isotope: f64,
    ppm_error: f64,
    missing_scans: usize,
}

/// One unit of dispatch: a library candidate observed as one of its adducts.
///
/// The adduct fixes the charge, so this is also the (candidate, adduct,
/// charge) tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AnalysisTask {
    pub candidate_index: usize,
    pub adduct_index: usize,
}

/// All (candidate, adduct) pairs of a library in library order.
pub fn enumerate_tasks(candidates: &[GlycanCandidate]) -> Vec<AnalysisTask> {
    candidates
        .iter()
        .enumerate()
        .flat_map(|(candidate_index, candidate)| {
            (0..candidate.adducts.len()).map(move |adduct_index| AnalysisTask {
                candidate_index,
                adduct_index,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Identified(Vec<Identification>),
    /// No peak above threshold, or no isotope evidence at any apex.
    NoEvidence,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task: AnalysisTask,
    pub outcome: TaskOutcome,
    pub timings: ScoreTimings,
}

/// Read-only state shared by every worker.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub spectra: &'a SpectrumCollection,
    pub candidates: &'a [GlycanCandidate],
    pub noise: &'a NoiseModel,
    pub config: &'a AnalysisConfig,
    pub cancel: &'a AtomicBool,
}

pub struct ScoringPipeline<'a> {
    ctx: AnalysisContext<'a>,
    eic_builder: EicBuilder,
    isotope_scorer: IsotopeScorer,
    shape_scorer: ShapeScorer,
}

impl<'a> ScoringPipeline<'a> {
    pub fn new(ctx: AnalysisContext<'a>) -> Self {
        let config = ctx.config;
        Self {
            eic_builder: EicBuilder::new(config.mz_tolerance, config.eic_aggregation),
            isotope_scorer: IsotopeScorer::new(config.isotope_params()),
            shape_scorer: ShapeScorer::new(config.shape_params()),
            ctx,
        }
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip(self, picker, timings), level = "trace")
    )]
    pub fn process_task(
        &self,
        task: AnalysisTask,
        picker: &mut PeakPicker,
        timings: &mut ScoreTimings,
    ) -> TaskOutcome {
        if self.ctx.cancel.load(Ordering::Relaxed) {
            return TaskOutcome::Cancelled;
        }
        let config = self.ctx.config;
        let budget = TaskBudget::new(config.task_budget());

        let Some(candidate) = self.ctx.candidates.get(task.candidate_index) else {
            return TaskOutcome::Failed(format!(
                "No candidate at library position {}",
                task.candidate_index
            ));
        };
        let Some(adduct) = candidate.adducts.get(task.adduct_index) else {
            return TaskOutcome::Failed(format!(
                "Candidate {} has no adduct at position {}",
                candidate.id, task.adduct_index
            ));
        };
        let target_mz = candidate.precursor_mz(adduct);
        if !target_mz.is_finite() {
            return TaskOutcome::Failed(format!(
                "Candidate {} has a non finite m/z for adduct {}",
                candidate.id, adduct
            ));
        }

        let st = Instant::now();
        let eic = self.eic_builder.build(target_mz, self.ctx.spectra);
        timings.eic += st.elapsed();

        let st = Instant::now();
        let threshold = self
            .ctx
            .noise
            .eic_noise(target_mz)
            .threshold(config.peak_height_factor);
        let peaks = match picker.pick(&eic, threshold) {
            Ok(peaks) => peaks,
            Err(e) => {
                let e = e.append_to_context(&format!(" picking peaks of {}", candidate.id));
                warn!("Peak picking failed: {:?}", e);
                timings.peak_picking += st.elapsed();
                return TaskOutcome::Failed(format!("{:?}", e));
            }
        };
        timings.peak_picking += st.elapsed();
        if peaks.is_empty() {
            return TaskOutcome::NoEvidence;
        }

        let st = Instant::now();
        let mut identifications = Vec::with_capacity(peaks.len());
        for peak in peaks {
            let Some(apex_spectrum) = self.ctx.spectra.ms1(peak.apex_index) else {
                continue;
            };
            let Some(envelope) = self.isotope_scorer.envelope(apex_spectrum, candidate, adduct)
            else {
                continue;
            };

            let mut degraded = false;
            if !self.isotope_scorer.meets_minimum(&envelope) {
                let e = DataProcessingError::InsufficientIsotopeMatches {
                    matched: envelope.matched,
                    required: self.isotope_scorer.params().min_matches,
                };
                debug!(
                    "Incomplete isotope envelope for {} {} z={}: {:?}",
                    candidate.id,
                    adduct,
                    adduct.charge(),
                    e
                );
                degraded = true;
            }

            let shape = self.shape_scorer.score(&eic, &peak, &budget);
            if shape.degraded {
                debug!(
                    "Shape score of {} {} z={} fell back to {:?}",
                    candidate.id,
                    adduct,
                    adduct.charge(),
                    shape.method
                );
                degraded = true;
            }

            let snr = signal_to_noise(
                peak.apex_intensity,
                &self.ctx.noise.noise_at(peak.apex_index, target_mz),
            );
            let scores = ScoreVector::new(
                envelope.score,
                shape.score,
                envelope.ppm_error,
                config.max_ppm_error,
                snr,
                config.snr_saturation,
            );
            let averages = self.peak_averages(&peak, candidate, adduct);
            let scores = scores.with_across_peak(
                averages.isotope,
                averages.ppm_error,
                config.max_ppm_error,
                averages.missing_scans,
            );
            let mut confidence = scores.composite(&config.weights);
            if degraded {
                confidence *= config.degraded_confidence_penalty;
            }

            identifications.push(Identification {
                candidate_index: task.candidate_index,
                candidate_id: candidate.id.clone(),
                composition: candidate.composition.clone(),
                reducing_end_tag: candidate.reducing_end_tag.clone(),
                adduct: adduct.clone(),
                charge: adduct.charge(),
                precursor_mz: target_mz,
                peak,
                envelope,
                shape,
                snr,
                scores,
                confidence: confidence.clamp(0.0, 1.0),
                degraded,
            });
        }
        timings.scoring += st.elapsed();

        if budget.is_exhausted() {
            warn!(
                "Task for {} {} exceeded its budget ({:?})",
                candidate.id,
                adduct,
                budget.elapsed()
            );
        }

        if identifications.is_empty() {
            TaskOutcome::NoEvidence
        } else {
            TaskOutcome::Identified(identifications)
        }
    }

    /// Scores the envelope in every MS1 scan of the peak and averages the
    /// fits with Gaussian weights centered on the middle of the peak.
    ///
    /// Scans without any envelope count as a zero fit at the largest
    /// accepted ppm error.
    fn peak_averages(
        &self,
        peak: &ChromatographicPeak,
        candidate: &GlycanCandidate,
        adduct: &Adduct,
    ) -> PeakAverages {
        let max_ppm = self.ctx.config.max_ppm_error;
        let indices = peak.start_index..=peak.end_index;
        let weights = centered_gaussian_weights(indices.clone().count());
        let mut missing_scans = 0;
        let fits: Vec<(f64, f64)> = indices
            .map(|i| {
                let envelope = self
                    .ctx
                    .spectra
                    .ms1(i)
                    .and_then(|s| self.isotope_scorer.envelope(s, candidate, adduct));
                match envelope {
                    Some(env) => (env.score, env.ppm_error),
                    None => {
                        missing_scans += 1;
                        (0.0, max_ppm)
                    }
                }
            })
            .collect();

        let isotope = weighted_mean(fits.iter().zip(weights.iter()).map(|(f, w)| (f.0, *w)));
        let ppm_error = weighted_mean(fits.iter().zip(weights.iter()).map(|(f, w)| (f.1, *w)));
        PeakAverages {
            isotope: isotope.unwrap_or(0.0),
            ppm_error: ppm_error.unwrap_or(max_ppm),
            missing_scans,
        }
    }

    fn run_one(&self, task: AnalysisTask, picker: &mut PeakPicker) -> TaskResult {
        let mut timings = ScoreTimings::default();
        let outcome = self.process_task(task, picker, &mut timings);
        TaskResult {
            task,
            outcome,
            timings,
        }
    }

    pub fn process_batch(&self, tasks: &[AnalysisTask]) -> AnalysisOutput {
        let num_input_items = tasks.len();
        let loc_score_start = Instant::now();
        let params = self.ctx.config.peak_picking_params();

        let init_fn = || PeakPicker::new(params);

        #[cfg(not(feature = "serial_scoring"))]
        let results: AnalysisOutput = {
            tasks
                .par_iter()
                .map_init(init_fn, |picker, task| self.run_one(*task, picker))
                .collect()
        };

        #[cfg(feature = "serial_scoring")]
        let results: AnalysisOutput = {
            let mut picker = init_fn();
            tasks
                .iter()
                .map(|task| self.run_one(*task, &mut picker))
                .collect()
        };

        let elapsed = loc_score_start.elapsed();
        if num_input_items > 0 {
            let avg_speed =
                std::time::Duration::from_nanos(elapsed.as_nanos() as u64 / num_input_items as u64);
            let throughput = num_input_items as f64 / elapsed.as_secs_f64();
            info!(
                "Scoring {} tasks took: {:?} throughput: {:#.1}/s, avg: {:?}",
                num_input_items, elapsed, throughput, avg_speed
            );
        }
        info!("{:?}", results.timings);
        if results.tally.failed > 0 {
            warn!("{} tasks failed in this batch", results.tally.failed);
        }

        results
    }
}
