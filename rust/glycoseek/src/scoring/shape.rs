//! Peak shape scoring by least-squares Gaussian fitting.

use nalgebra::{
    Matrix3,
    Vector3,
};
use tracing::trace;

use super::timings::TaskBudget;
use crate::errors::DataProcessingError;
use crate::models::{
    ChromatographicPeak,
    Eic,
    ShapeMethod,
    ShapeScore,
};
use crate::utils::correlation::r_squared;
use crate::utils::math::gaussian;

const INITIAL_DAMPING: f64 = 1e-3;
const MAX_DAMPING: f64 = 1e12;
const RELATIVE_SSE_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParams {
    /// Peaks with fewer samples get the symmetry score instead of a fit.
    pub min_samples: usize,
    pub max_iterations: usize,
    /// Multiplier applied to peaks touching the edge of the analysed window.
    pub truncated_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub amplitude: f64,
    pub mean: f64,
    pub sigma: f64,
    pub iterations: usize,
}

impl GaussianFit {
    pub fn predict(&self, x: f64) -> f64 {
        gaussian(x, self.amplitude, self.mean, self.sigma)
    }
}

#[derive(Debug, Clone)]
pub struct ShapeScorer {
    params: ShapeParams,
}

impl ShapeScorer {
    pub fn new(params: ShapeParams) -> Self {
        Self { params }
    }

    /// Scores how well the raw samples of `peak` follow a Gaussian.
    ///
    /// Never fails: short peaks and non-converging fits fall back to the
    /// symmetry score, an exhausted budget scores zero.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn score(&self, eic: &Eic, peak: &ChromatographicPeak, budget: &TaskBudget) -> ShapeScore {
        let range = peak.start_index..=peak.end_index;
        let (Some(x), Some(y)) = (
            eic.retention_times.get(range.clone()),
            eic.intensities.get(range),
        ) else {
            return self.finish(peak, 0.0, ShapeMethod::SymmetryFallback, true);
        };
        let apex_offset = peak.apex_index - peak.start_index;

        if x.len() < self.params.min_samples {
            let score = symmetry_score(y, apex_offset);
            return self.finish(peak, score, ShapeMethod::SymmetryFallback, false);
        }

        let initial_sigma = (peak.rt_end - peak.rt_start) / 6.0;
        match fit_gaussian(
            x,
            y,
            (peak.apex_intensity, peak.rt_apex, initial_sigma),
            self.params.max_iterations,
            budget,
        ) {
            Ok(fit) => {
                let predicted: Vec<f64> = x.iter().map(|v| fit.predict(*v)).collect();
                match r_squared(y, &predicted) {
                    Ok(r2) => self.finish(peak, r2, ShapeMethod::GaussianFit, false),
                    Err(e) => {
                        trace!("Shape r2 failed: {}", e);
                        let score = symmetry_score(y, apex_offset);
                        self.finish(peak, score, ShapeMethod::SymmetryFallback, true)
                    }
                }
            }
            Err(DataProcessingError::BudgetExhausted { elapsed_ms }) => {
                trace!("Shape fit ran out of budget after {} ms", elapsed_ms);
                self.finish(peak, 0.0, ShapeMethod::BudgetFallback, true)
            }
            Err(e) => {
                trace!("Shape fit fell back to symmetry: {:?}", e);
                let score = symmetry_score(y, apex_offset);
                self.finish(peak, score, ShapeMethod::SymmetryFallback, true)
            }
        }
    }

    fn finish(
        &self,
        peak: &ChromatographicPeak,
        score: f64,
        method: ShapeMethod,
        degraded: bool,
    ) -> ShapeScore {
        let mut score = if score.is_finite() {
            score.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if peak.truncated {
            score *= self.params.truncated_penalty;
        }
        ShapeScore {
            score,
            method,
            degraded,
        }
    }
}

/// Mean ratio of mirrored samples around the apex, in `[0, 1]`.
///
/// A peak without samples on one side has nothing to compare and scores 0.
pub fn symmetry_score(y: &[f64], apex: usize) -> f64 {
    let pairs = apex.min(y.len().saturating_sub(apex + 1));
    if pairs == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for k in 1..=pairs {
        let (a, b) = (y[apex - k], y[apex + k]);
        let hi = a.max(b);
        if hi > 0.0 {
            total += a.min(b).max(0.0) / hi;
        }
    }
    total / pairs as f64
}

/// Levenberg-Marquardt fit of `a * exp(-(x - mu)^2 / (2 s^2))`.
pub fn fit_gaussian(
    x: &[f64],
    y: &[f64],
    initial: (f64, f64, f64),
    max_iterations: usize,
    budget: &TaskBudget,
) -> Result<GaussianFit, DataProcessingError> {
    if x.len() != y.len() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: x.len(),
            other: y.len(),
            context: "fit_gaussian".to_string(),
        });
    }
    if x.len() < 3 {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("fit_gaussian needs at least 3 samples".to_string()),
        });
    }
    let (a0, mu0, s0) = initial;
    if !(a0.is_finite() && mu0.is_finite() && s0.is_finite()) {
        return Err(DataProcessingError::ExpectedFiniteNonNanData {
            context: "fit_gaussian initial guess".to_string(),
        });
    }
    let span = x[x.len() - 1] - x[0];
    let min_sigma = (span / (x.len() as f64 * 100.0)).max(f64::EPSILON);
    let mut params = Vector3::new(a0, mu0, s0.max(min_sigma));
    let mut sse = sum_sq_residuals(x, y, &params);
    let scale = y.iter().map(|v| v * v).sum::<f64>().max(f64::MIN_POSITIVE);
    let mut damping = INITIAL_DAMPING;

    for iteration in 0..max_iterations {
        if budget.is_exhausted() {
            return Err(DataProcessingError::BudgetExhausted {
                elapsed_ms: budget.elapsed().as_millis(),
            });
        }
        if sse <= RELATIVE_SSE_TOLERANCE * scale {
            return Ok(to_fit(&params, iteration));
        }

        let mut jtj = Matrix3::<f64>::zeros();
        let mut jtr = Vector3::<f64>::zeros();
        let (a, mu, s) = (params[0], params[1], params[2]);
        for (xi, yi) in x.iter().zip(y.iter()) {
            let z = (xi - mu) / s;
            let g = (-0.5 * z * z).exp();
            let residual = yi - a * g;
            let jac = Vector3::new(g, a * g * z / s, a * g * z * z / s);
            jtr += jac * residual;
            jtj += jac * jac.transpose();
        }

        loop {
            let mut lhs = jtj;
            for d in 0..3 {
                lhs[(d, d)] += damping * jtj[(d, d)].max(f64::MIN_POSITIVE);
            }
            let candidate = lhs.lu().solve(&jtr).map(|step| params + step);
            match candidate {
                Some(cand) if cand[2] > min_sigma && cand.iter().all(|v| v.is_finite()) => {
                    let new_sse = sum_sq_residuals(x, y, &cand);
                    if new_sse < sse {
                        let improvement = sse - new_sse;
                        params = cand;
                        sse = new_sse;
                        damping = (damping / 10.0).max(f64::MIN_POSITIVE);
                        if improvement <= RELATIVE_SSE_TOLERANCE * sse.max(f64::MIN_POSITIVE) {
                            return Ok(to_fit(&params, iteration + 1));
                        }
                        break;
                    }
                }
                _ => {}
            }
            damping *= 10.0;
            if damping > MAX_DAMPING {
                // No direction improves the fit any more, this is a minimum
                return Ok(to_fit(&params, iteration + 1));
            }
        }
    }

    Err(DataProcessingError::FitDidNotConverge {
        iterations: max_iterations,
    })
}

fn to_fit(params: &Vector3<f64>, iterations: usize) -> GaussianFit {
    GaussianFit {
        amplitude: params[0],
        mean: params[1],
        sigma: params[2],
        iterations,
    }
}

fn sum_sq_residuals(x: &[f64], y: &[f64], params: &Vector3<f64>) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(xi, yi)| (yi - gaussian(*xi, params[0], params[1], params[2])).powi(2))
        .sum()
}
