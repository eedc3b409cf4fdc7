//! Noise floor estimation.
//!
//! All estimators are robust order statistics, a handful of very intense
//! signal peaks does not move them.

use rayon::prelude::*;
use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

use crate::models::SpectrumCollection;
use crate::utils::math::{
    percentile_sorted,
    scaled_mad,
    sorted_finite,
};

/// Dispersion never goes below this, so S/N stays finite on noiseless data.
pub const MIN_DISPERSION: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseMethod {
    /// Floor is a high percentile of the intensities.
    Percentile,
    /// Floor is the median, dispersion the scaled MAD.
    MedianMad,
    /// Percentile floor of the low and high m/z quarters, linearly
    /// interpolated over m/z.
    Regional,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseConfig {
    pub method: NoiseMethod,
    pub percentile: f64,
    /// Above this ratio between the two quarter floors the regional model is
    /// not trusted and the run level estimate is used.
    pub regional_max_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoiseEstimate {
    pub floor: f64,
    pub dispersion: f64,
}

impl NoiseEstimate {
    pub fn new(floor: f64, dispersion: f64) -> Self {
        Self {
            floor: floor.max(0.0),
            dispersion: dispersion.max(MIN_DISPERSION),
        }
    }

    /// Minimum height a chromatographic peak needs, `floor + k * dispersion`.
    pub fn threshold(&self, k: f64) -> f64 {
        self.floor + k * self.dispersion
    }
}

#[derive(Debug, Clone, PartialEq)]
enum SpectrumNoise {
    Global(NoiseEstimate),
    Regional {
        first_quarter: NoiseEstimate,
        last_quarter: NoiseEstimate,
        max_mz: f64,
    },
    /// Not enough peaks, uses the run estimate.
    Fallback,
}

/// Noise estimates for every MS1 spectrum of a run.
///
/// Computed once up front and shared read-only by every worker.
#[derive(Debug, Clone)]
pub struct NoiseModel {
    per_spectrum: Vec<SpectrumNoise>,
    run_estimate: NoiseEstimate,
}

impl NoiseModel {
    /// Estimates the noise of a bag of intensities.
    ///
    /// Returns `None` when there are no finite values. The regional method
    /// has no m/z information here and behaves like the percentile one.
    pub fn estimate(intensities: &[f64], config: &NoiseConfig) -> Option<NoiseEstimate> {
        let sorted = sorted_finite(intensities);
        Self::estimate_sorted(&sorted, config)
    }

    fn estimate_sorted(sorted: &[f64], config: &NoiseConfig) -> Option<NoiseEstimate> {
        let median = percentile_sorted(sorted, 50.0)?;
        let dispersion = scaled_mad(sorted, median)?;
        let floor = match config.method {
            NoiseMethod::MedianMad => median,
            NoiseMethod::Percentile | NoiseMethod::Regional => {
                percentile_sorted(sorted, config.percentile)?
            }
        };
        Some(NoiseEstimate::new(floor, dispersion))
    }

    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn from_spectra(spectra: &SpectrumCollection, config: &NoiseConfig) -> Self {
        let ms1: Vec<_> = spectra.iter_ms1().collect();
        let per_spectrum: Vec<SpectrumNoise> = ms1
            .par_iter()
            .map(|spec| match config.method {
                NoiseMethod::Regional => regional_noise(&spec.mz, &spec.intensity, config),
                _ => match Self::estimate(&spec.intensity, config) {
                    Some(x) => SpectrumNoise::Global(x),
                    None => SpectrumNoise::Fallback,
                },
            })
            .collect();

        let run_estimate = run_level_estimate(&per_spectrum);
        let num_fallback = per_spectrum
            .iter()
            .filter(|x| matches!(x, SpectrumNoise::Fallback))
            .count();
        debug!(
            "Noise model ({:?}): run floor {:.3}, dispersion {:.3}, {} of {} spectra on fallback",
            config.method,
            run_estimate.floor,
            run_estimate.dispersion,
            num_fallback,
            per_spectrum.len()
        );

        Self {
            per_spectrum,
            run_estimate,
        }
    }

    pub fn run_estimate(&self) -> NoiseEstimate {
        self.run_estimate
    }

    /// Local noise of the `ms1_index`-th MS1 spectrum at `mz`.
    pub fn noise_at(&self, ms1_index: usize, mz: f64) -> NoiseEstimate {
        match self.per_spectrum.get(ms1_index) {
            Some(SpectrumNoise::Global(x)) => *x,
            Some(SpectrumNoise::Regional {
                first_quarter,
                last_quarter,
                max_mz,
            }) => {
                let frac = mz / max_mz;
                NoiseEstimate::new(
                    first_quarter.floor + (last_quarter.floor - first_quarter.floor) * frac,
                    first_quarter.dispersion
                        + (last_quarter.dispersion - first_quarter.dispersion) * frac,
                )
            }
            Some(SpectrumNoise::Fallback) | None => self.run_estimate,
        }
    }

    /// Noise of an extracted chromatogram at `mz`, the median of the local
    /// estimates across spectra.
    pub fn eic_noise(&self, mz: f64) -> NoiseEstimate {
        let n = self.per_spectrum.len();
        let mut floors = Vec::with_capacity(n);
        let mut dispersions = Vec::with_capacity(n);
        for i in 0..n {
            let local = self.noise_at(i, mz);
            floors.push(local.floor);
            dispersions.push(local.dispersion);
        }
        floors.sort_by(|a, b| a.total_cmp(b));
        dispersions.sort_by(|a, b| a.total_cmp(b));
        match (
            percentile_sorted(&floors, 50.0),
            percentile_sorted(&dispersions, 50.0),
        ) {
            (Some(floor), Some(dispersion)) => NoiseEstimate::new(floor, dispersion),
            _ => self.run_estimate,
        }
    }
}

fn regional_noise(mz: &[f64], intensity: &[f64], config: &NoiseConfig) -> SpectrumNoise {
    let max_mz = match mz.last() {
        Some(x) if *x > 0.0 => *x,
        _ => return SpectrumNoise::Fallback,
    };
    let first_quarter_end = max_mz / 4.0;
    let last_quarter_start = max_mz * 3.0 / 4.0;
    let mut first = Vec::new();
    let mut last = Vec::new();
    for (m, i) in mz.iter().zip(intensity.iter()) {
        if *m <= first_quarter_end {
            first.push(*i);
        }
        if *m > last_quarter_start {
            last.push(*i);
        }
    }
    let first = NoiseModel::estimate(&first, config);
    let last = NoiseModel::estimate(&last, config);
    match (first, last) {
        (Some(first_quarter), Some(last_quarter)) => {
            let (a, b) = (first_quarter.floor, last_quarter.floor);
            let max_ratio = config.regional_max_ratio;
            if a > b * max_ratio || b > a * max_ratio {
                SpectrumNoise::Fallback
            } else {
                SpectrumNoise::Regional {
                    first_quarter,
                    last_quarter,
                    max_mz,
                }
            }
        }
        _ => SpectrumNoise::Fallback,
    }
}

/// Median of the per-spectrum estimates; zero noise for a run without any.
fn run_level_estimate(per_spectrum: &[SpectrumNoise]) -> NoiseEstimate {
    let mut floors = Vec::new();
    let mut dispersions = Vec::new();
    for x in per_spectrum {
        match x {
            SpectrumNoise::Global(est) => {
                floors.push(est.floor);
                dispersions.push(est.dispersion);
            }
            SpectrumNoise::Regional {
                first_quarter,
                last_quarter,
                ..
            } => {
                floors.push((first_quarter.floor + last_quarter.floor) / 2.0);
                dispersions.push((first_quarter.dispersion + last_quarter.dispersion) / 2.0);
            }
            SpectrumNoise::Fallback => {}
        }
    }
    let floors = sorted_finite(&floors);
    let dispersions = sorted_finite(&dispersions);
    NoiseEstimate::new(
        percentile_sorted(&floors, 50.0).unwrap_or(0.0),
        percentile_sorted(&dispersions, 50.0).unwrap_or(MIN_DISPERSION),
    )
}
