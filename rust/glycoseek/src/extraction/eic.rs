use serde::{
    Deserialize,
    Serialize,
};

use crate::models::{
    Eic,
    MzTolerance,
    Spectrum,
    SpectrumCollection,
};

/// How peaks that fall in the extraction window of one spectrum are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EicAggregation {
    #[default]
    Sum,
    Max,
}

#[derive(Debug, Clone, Copy)]
pub struct EicBuilder {
    tolerance: MzTolerance,
    aggregation: EicAggregation,
}

impl EicBuilder {
    pub fn new(tolerance: MzTolerance, aggregation: EicAggregation) -> Self {
        Self {
            tolerance,
            aggregation,
        }
    }

    /// Builds the chromatogram of `target_mz` over every MS1 spectrum.
    ///
    /// Spectra with nothing in the window contribute a zero sample, so the
    /// output always has one sample per MS1 spectrum.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip(self, spectra), level = "trace")
    )]
    pub fn build(&self, target_mz: f64, spectra: &SpectrumCollection) -> Eic {
        let mut intensities = Vec::with_capacity(spectra.num_ms1());
        for spec in spectra.iter_ms1() {
            intensities.push(self.aggregate(target_mz, spec));
        }
        Eic {
            target_mz,
            tolerance: self.tolerance,
            retention_times: spectra.ms1_retention_times().to_vec(),
            intensities,
        }
    }

    /// Aggregated intensity of the peaks within tolerance of `target_mz`.
    pub fn aggregate(&self, target_mz: f64, spectrum: &Spectrum) -> f64 {
        let range = self.tolerance.mz_range(target_mz);
        let idx = spectrum.mz_index_range(range.start(), range.end());
        let window = &spectrum.intensity[idx];
        match self.aggregation {
            EicAggregation::Sum => window.iter().sum(),
            EicAggregation::Max => window.iter().copied().fold(0.0, f64::max),
        }
    }
}
