//! Analysis configuration.
//!
//! Keys whose value decides correctness have no defaults, a missing one is a
//! [`ConfigError::MissingKey`]. Heuristic thresholds default to the values
//! the scoring was tuned with.

use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::extraction::EicAggregation;
use crate::fragments::FragmentParams;
use crate::models::{
    MzTolerance,
    RtWindow,
    ScoreWeights,
};
use crate::scoring::isotopes::{
    IsotopeParams,
    MAX_ISOTOPES,
};
use crate::scoring::noise::{
    NoiseConfig,
    NoiseMethod,
};
use crate::scoring::peak_picking::PeakPickingParams;
use crate::scoring::shape::ShapeParams;
use crate::utils::TupleRange;

pub const REQUIRED_KEYS: [&str; 7] = [
    "mz_tolerance",
    "max_ppm_error",
    "rt_window",
    "min_peak_width",
    "max_peak_width",
    "min_isotope_matches",
    "noise_method",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    pub mz_tolerance: MzTolerance,
    /// Identifications with a larger absolute ppm error are discarded.
    pub max_ppm_error: f64,
    pub rt_window: RtWindow,
    /// Minimum number of samples of a chromatographic peak.
    pub min_peak_width: usize,
    /// Maximum width of a chromatographic peak, in minutes.
    pub max_peak_width: f64,
    pub min_isotope_matches: usize,
    pub noise_method: NoiseMethod,

    #[serde(default)]
    pub eic_aggregation: EicAggregation,
    #[serde(default = "default_noise_percentile")]
    pub noise_percentile: f64,
    /// Peak height threshold is `floor + peak_height_factor * dispersion`.
    #[serde(default = "default_peak_height_factor")]
    pub peak_height_factor: f64,
    #[serde(default = "default_boundary_fraction")]
    pub boundary_fraction: f64,
    #[serde(default = "default_valley_depth_fraction")]
    pub valley_depth_fraction: f64,
    #[serde(default = "default_smoothing_passes")]
    pub smoothing_passes: usize,
    /// Keep only the most intense peak of a trace and this many peaks
    /// closest to it. Unset keeps every peak.
    #[serde(default)]
    pub close_peaks: Option<usize>,
    /// The regional noise model falls back to the run estimate when its two
    /// quarter floors differ by more than this factor.
    #[serde(default = "default_regional_max_ratio")]
    pub regional_max_ratio: f64,
    #[serde(default = "default_max_isotopes")]
    pub max_isotopes: usize,
    /// Fraction of the monoisotopic intensity a lighter species' +1 isotope
    /// has to explain before the envelope is flagged as a conflict.
    #[serde(default = "default_preceding_isotope_fraction")]
    pub preceding_isotope_fraction: f64,
    /// Multiplier on the isotope score of conflicting envelopes.
    #[serde(default = "default_isotope_conflict_penalty")]
    pub isotope_conflict_penalty: f64,
    #[serde(default = "default_min_shape_samples")]
    pub min_shape_samples: usize,
    #[serde(default = "default_fit_max_iterations")]
    pub fit_max_iterations: usize,
    #[serde(default = "default_task_budget_ms")]
    pub task_budget_ms: u64,
    #[serde(default = "default_truncated_confidence_penalty")]
    pub truncated_confidence_penalty: f64,
    /// Multiplier on the confidence of identifications scored on a degraded path.
    #[serde(default = "default_degraded_confidence_penalty")]
    pub degraded_confidence_penalty: f64,
    #[serde(default = "default_acceptance_threshold")]
    pub acceptance_threshold: f64,
    #[serde(default)]
    pub weights: ScoreWeights,
    /// S/N at which the S/N component of the confidence saturates.
    #[serde(default = "default_snr_saturation")]
    pub snr_saturation: f64,

    /// Defaults to `mz_tolerance`.
    #[serde(default)]
    pub fragment_tolerance: Option<MzTolerance>,
    #[serde(default = "default_ms2_rt_tolerance_minutes")]
    pub ms2_rt_tolerance_minutes: f64,
    #[serde(default = "default_max_fragment_charge")]
    pub max_fragment_charge: u8,
    #[serde(default = "default_isolation_window_tolerance_factor")]
    pub isolation_window_tolerance_factor: f64,
    #[serde(default)]
    pub report_unassigned_fragments: bool,
    /// Fragment assignments within this many ppm of the best one are tied.
    #[serde(default = "default_fragment_tie_tolerance_ppm")]
    pub fragment_tie_tolerance_ppm: f64,
    /// Isotope peaks of assigned fragment ions are skipped up to this charge.
    #[serde(default = "default_max_isotope_skip_charge")]
    pub max_isotope_skip_charge: u32,
}

fn default_noise_percentile() -> f64 {
    95.0
}
fn default_peak_height_factor() -> f64 {
    3.0
}
fn default_boundary_fraction() -> f64 {
    0.05
}
fn default_valley_depth_fraction() -> f64 {
    0.5
}
fn default_smoothing_passes() -> usize {
    1
}
fn default_regional_max_ratio() -> f64 {
    5.0
}
fn default_max_isotopes() -> usize {
    5
}
fn default_preceding_isotope_fraction() -> f64 {
    0.6
}
fn default_isotope_conflict_penalty() -> f64 {
    0.5
}
fn default_min_shape_samples() -> usize {
    5
}
fn default_fit_max_iterations() -> usize {
    200
}
fn default_task_budget_ms() -> u64 {
    2000
}
fn default_truncated_confidence_penalty() -> f64 {
    0.8
}
fn default_degraded_confidence_penalty() -> f64 {
    0.8
}
fn default_acceptance_threshold() -> f64 {
    0.5
}
fn default_snr_saturation() -> f64 {
    20.0
}
fn default_ms2_rt_tolerance_minutes() -> f64 {
    0.5
}
fn default_max_fragment_charge() -> u8 {
    2
}
fn default_isolation_window_tolerance_factor() -> f64 {
    5.0
}
fn default_fragment_tie_tolerance_ppm() -> f64 {
    1e-9
}
fn default_max_isotope_skip_charge() -> u32 {
    3
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        reason: reason.into(),
    }
}

fn check_fraction(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(key, format!("expected a value in [0, 1], got {}", value)));
    }
    Ok(())
}

impl AnalysisConfig {
    /// Configuration with every optional key at its default.
    pub fn new(
        mz_tolerance: MzTolerance,
        max_ppm_error: f64,
        rt_window: RtWindow,
        min_peak_width: usize,
        max_peak_width: f64,
        min_isotope_matches: usize,
        noise_method: NoiseMethod,
    ) -> Self {
        Self {
            mz_tolerance,
            max_ppm_error,
            rt_window,
            min_peak_width,
            max_peak_width,
            min_isotope_matches,
            noise_method,
            eic_aggregation: EicAggregation::default(),
            noise_percentile: default_noise_percentile(),
            peak_height_factor: default_peak_height_factor(),
            boundary_fraction: default_boundary_fraction(),
            valley_depth_fraction: default_valley_depth_fraction(),
            smoothing_passes: default_smoothing_passes(),
            close_peaks: None,
            regional_max_ratio: default_regional_max_ratio(),
            max_isotopes: default_max_isotopes(),
            preceding_isotope_fraction: default_preceding_isotope_fraction(),
            isotope_conflict_penalty: default_isotope_conflict_penalty(),
            min_shape_samples: default_min_shape_samples(),
            fit_max_iterations: default_fit_max_iterations(),
            task_budget_ms: default_task_budget_ms(),
            truncated_confidence_penalty: default_truncated_confidence_penalty(),
            degraded_confidence_penalty: default_degraded_confidence_penalty(),
            acceptance_threshold: default_acceptance_threshold(),
            weights: ScoreWeights::default(),
            snr_saturation: default_snr_saturation(),
            fragment_tolerance: None,
            ms2_rt_tolerance_minutes: default_ms2_rt_tolerance_minutes(),
            max_fragment_charge: default_max_fragment_charge(),
            isolation_window_tolerance_factor: default_isolation_window_tolerance_factor(),
            report_unassigned_fragments: false,
            fragment_tie_tolerance_ppm: default_fragment_tie_tolerance_ppm(),
            max_isotope_skip_charge: default_max_isotope_skip_charge(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| ConfigError::ParseError { msg: e.to_string() })?;
        Self::from_json_value(value)
    }

    /// Parses and validates a configuration object.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let Some(obj) = value.as_object() else {
            return Err(ConfigError::ParseError {
                msg: "configuration must be a JSON object".to_string(),
            });
        };
        for key in REQUIRED_KEYS {
            if !obj.contains_key(key) {
                return Err(ConfigError::MissingKey { key });
            }
        }
        let config: Self = serde_json::from_value(value)
            .map_err(|e| ConfigError::ParseError { msg: e.to_string() })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.mz_tolerance.is_positive() {
            return Err(invalid("mz_tolerance", "tolerance must be positive"));
        }
        if !(self.max_ppm_error.is_finite() && self.max_ppm_error > 0.0) {
            return Err(invalid("max_ppm_error", "must be a positive number"));
        }
        if let RtWindow::Minutes((start, end)) = self.rt_window {
            if !(start.is_finite() && end.is_finite()) {
                return Err(invalid("rt_window", "bounds must be finite"));
            }
            TupleRange::try_new(start, end).map_err(|e| invalid("rt_window", e.to_string()))?;
        }
        if self.min_peak_width == 0 {
            return Err(invalid("min_peak_width", "must be at least one sample"));
        }
        if !(self.max_peak_width.is_finite() && self.max_peak_width > 0.0) {
            return Err(invalid("max_peak_width", "must be a positive number of minutes"));
        }
        if self.max_isotopes == 0 || self.max_isotopes > MAX_ISOTOPES {
            return Err(invalid(
                "max_isotopes",
                format!("expected a value in [1, {}]", MAX_ISOTOPES),
            ));
        }
        if self.min_isotope_matches == 0 || self.min_isotope_matches > self.max_isotopes {
            return Err(invalid(
                "min_isotope_matches",
                format!("expected a value in [1, max_isotopes = {}]", self.max_isotopes),
            ));
        }
        if !(self.noise_percentile > 0.0 && self.noise_percentile < 100.0) {
            return Err(invalid("noise_percentile", "expected a value in (0, 100)"));
        }
        if !(self.peak_height_factor.is_finite() && self.peak_height_factor >= 0.0) {
            return Err(invalid("peak_height_factor", "must be non-negative"));
        }
        check_fraction("boundary_fraction", self.boundary_fraction)?;
        check_fraction("valley_depth_fraction", self.valley_depth_fraction)?;
        check_fraction(
            "truncated_confidence_penalty",
            self.truncated_confidence_penalty,
        )?;
        check_fraction(
            "degraded_confidence_penalty",
            self.degraded_confidence_penalty,
        )?;
        check_fraction("acceptance_threshold", self.acceptance_threshold)?;
        check_fraction("isotope_conflict_penalty", self.isotope_conflict_penalty)?;
        if !(self.preceding_isotope_fraction.is_finite() && self.preceding_isotope_fraction > 0.0)
        {
            return Err(invalid("preceding_isotope_fraction", "must be a positive number"));
        }
        if !(self.regional_max_ratio.is_finite() && self.regional_max_ratio >= 1.0) {
            return Err(invalid("regional_max_ratio", "must be a number of at least 1"));
        }
        if self.min_shape_samples < 3 {
            return Err(invalid("min_shape_samples", "a fit needs at least 3 samples"));
        }
        let weights = [
            self.weights.isotope,
            self.weights.shape,
            self.weights.ppm,
            self.weights.snr,
        ];
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) || self.weights.total() <= 0.0 {
            return Err(invalid(
                "weights",
                "weights must be non-negative and sum to more than zero",
            ));
        }
        if !(self.snr_saturation.is_finite() && self.snr_saturation > 0.0) {
            return Err(invalid("snr_saturation", "must be a positive number"));
        }
        if let Some(tol) = &self.fragment_tolerance {
            if !tol.is_positive() {
                return Err(invalid("fragment_tolerance", "tolerance must be positive"));
            }
        }
        if !(self.ms2_rt_tolerance_minutes.is_finite() && self.ms2_rt_tolerance_minutes >= 0.0) {
            return Err(invalid("ms2_rt_tolerance_minutes", "must be non-negative"));
        }
        if !(self.fragment_tie_tolerance_ppm.is_finite() && self.fragment_tie_tolerance_ppm >= 0.0)
        {
            return Err(invalid("fragment_tie_tolerance_ppm", "must be non-negative"));
        }
        if self.max_isotope_skip_charge == 0 {
            return Err(invalid("max_isotope_skip_charge", "must be at least 1"));
        }
        if self.max_fragment_charge == 0 {
            return Err(invalid("max_fragment_charge", "must be at least 1"));
        }
        if !(self.isolation_window_tolerance_factor.is_finite()
            && self.isolation_window_tolerance_factor > 0.0)
        {
            return Err(invalid(
                "isolation_window_tolerance_factor",
                "must be a positive number",
            ));
        }
        Ok(())
    }

    pub fn noise_config(&self) -> NoiseConfig {
        NoiseConfig {
            method: self.noise_method,
            percentile: self.noise_percentile,
            regional_max_ratio: self.regional_max_ratio,
        }
    }

    pub fn peak_picking_params(&self) -> PeakPickingParams {
        PeakPickingParams {
            min_width: self.min_peak_width,
            max_width_minutes: self.max_peak_width,
            boundary_fraction: self.boundary_fraction,
            valley_depth_fraction: self.valley_depth_fraction,
            smoothing_passes: self.smoothing_passes,
            rt_window: self.rt_window,
            close_peaks: self.close_peaks,
        }
    }

    pub fn isotope_params(&self) -> IsotopeParams {
        IsotopeParams {
            tolerance: self.mz_tolerance,
            max_isotopes: self.max_isotopes,
            min_matches: self.min_isotope_matches,
            preceding_isotope_fraction: self.preceding_isotope_fraction,
            conflict_penalty: self.isotope_conflict_penalty,
        }
    }

    pub fn shape_params(&self) -> ShapeParams {
        ShapeParams {
            min_samples: self.min_shape_samples,
            max_iterations: self.fit_max_iterations,
            truncated_penalty: self.truncated_confidence_penalty,
        }
    }

    pub fn fragment_params(&self) -> FragmentParams {
        FragmentParams {
            tolerance: self.fragment_tolerance.unwrap_or(self.mz_tolerance),
            precursor_tolerance: self.mz_tolerance,
            rt_tolerance_minutes: self.ms2_rt_tolerance_minutes,
            max_fragment_charge: self.max_fragment_charge,
            isolation_window_tolerance_factor: self.isolation_window_tolerance_factor,
            max_isotopes: self.max_isotopes,
            report_unassigned: self.report_unassigned_fragments,
            tie_tolerance_ppm: self.fragment_tie_tolerance_ppm,
            max_isotope_skip_charge: self.max_isotope_skip_charge,
        }
    }

    pub fn task_budget(&self) -> Duration {
        Duration::from_millis(self.task_budget_ms)
    }
}
