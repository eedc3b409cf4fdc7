use serde::{
    Deserialize,
    Serialize,
};

use super::chemistry::ElementalComposition;
use super::chromatogram::ChromatographicPeak;
use super::glycan::{
    Adduct,
    GlycanComposition,
};

/// One expected isotope position and what was found there.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsotopePeakMatch {
    pub isotope_index: usize,
    pub theoretical_mz: f64,
    /// Relative to the monoisotopic peak.
    pub theoretical_intensity: f64,
    /// `None` when nothing was found within tolerance.
    pub observed_mz: Option<f64>,
    /// Zero when nothing was found.
    pub observed_intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IsotopicEnvelope {
    pub peaks: Vec<IsotopePeakMatch>,
    /// Similarity of observed and theoretical relative intensities in `[0, 1]`.
    pub score: f64,
    pub ppm_error: f64,
    pub matched: usize,
    /// Another charge state or a preceding isotope explains the cluster better.
    pub conflict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeMethod {
    GaussianFit,
    SymmetryFallback,
    BudgetFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShapeScore {
    /// Goodness of fit in `[0, 1]`.
    pub score: f64,
    pub method: ShapeMethod,
    /// Whether the result came from a degraded path.
    pub degraded: bool,
}

/// Weights of the composite confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScoreWeights {
    pub isotope: f64,
    pub shape: f64,
    pub ppm: f64,
    pub snr: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            isotope: 0.35,
            shape: 0.3,
            ppm: 0.15,
            snr: 0.2,
        }
    }
}

impl ScoreWeights {
    pub fn total(&self) -> f64 {
        self.isotope + self.shape + self.ppm + self.snr
    }
}

/// Isotope fit and mass error averaged over every MS1 scan of a peak,
/// weighted by a Gaussian centered on the middle of the peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AcrossPeakScores {
    /// Weighted isotope fit in `[0, 1]`, scans without an envelope count as 0.
    pub isotope: f64,
    /// Weighted ppm error, scans without an envelope count as the maximum
    /// allowed error.
    pub ppm_error: f64,
    /// `ppm_error` normalized like [`ScoreVector::mass_accuracy`].
    pub mass_accuracy: f64,
    /// Scans of the peak where no envelope was found.
    pub missing_scans: usize,
}

/// Independent per-scorer components, each normalized to `[0, 1]`.
///
/// `isotope` and `mass_accuracy` are taken at the apex, `across_peak` carries
/// the same two measures over the whole peak when they were computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreVector {
    pub isotope: f64,
    pub shape: f64,
    pub mass_accuracy: f64,
    pub snr: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub across_peak: Option<AcrossPeakScores>,
}

fn mass_accuracy(ppm_error: f64, max_ppm_error: f64) -> f64 {
    if max_ppm_error > 0.0 {
        (1.0 - ppm_error.abs() / max_ppm_error).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl ScoreVector {
    pub fn new(
        isotope: f64,
        shape: f64,
        ppm_error: f64,
        max_ppm_error: f64,
        snr: f64,
        snr_saturation: f64,
    ) -> Self {
        let mass_accuracy = mass_accuracy(ppm_error, max_ppm_error);
        let snr = if snr_saturation > 0.0 {
            (snr / snr_saturation).clamp(0.0, 1.0)
        } else {
            0.0
        };
        Self {
            isotope: isotope.clamp(0.0, 1.0),
            shape: shape.clamp(0.0, 1.0),
            mass_accuracy,
            snr,
            across_peak: None,
        }
    }

    pub fn with_across_peak(
        mut self,
        isotope: f64,
        ppm_error: f64,
        max_ppm_error: f64,
        missing_scans: usize,
    ) -> Self {
        self.across_peak = Some(AcrossPeakScores {
            isotope: isotope.clamp(0.0, 1.0),
            ppm_error,
            mass_accuracy: mass_accuracy(ppm_error, max_ppm_error),
            missing_scans,
        });
        self
    }

    /// Weighted mean of the components.
    pub fn composite(&self, weights: &ScoreWeights) -> f64 {
        let total = weights.total();
        if total <= 0.0 {
            return 0.0;
        }
        (self.isotope * weights.isotope
            + self.shape * weights.shape
            + self.mass_accuracy * weights.ppm
            + self.snr * weights.snr)
            / total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Identification {
    /// Position of the candidate in the library.
    pub candidate_index: usize,
    pub candidate_id: String,
    pub composition: GlycanComposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reducing_end_tag: Option<ElementalComposition>,
    pub adduct: Adduct,
    pub charge: i32,
    pub precursor_mz: f64,
    pub peak: ChromatographicPeak,
    pub envelope: IsotopicEnvelope,
    pub shape: ShapeScore,
    pub snr: f64,
    pub scores: ScoreVector,
    pub confidence: f64,
    /// Some scorer fell back to a degraded path.
    pub degraded: bool,
}

impl Identification {
    pub fn ppm_error(&self) -> f64 {
        self.envelope.ppm_error
    }
}

/// An annotated MS2 ion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fragment {
    /// Index of the MS2 spectrum in the spectrum collection.
    pub spectrum_index: usize,
    pub retention_time: f64,
    pub mz: f64,
    pub intensity: f64,
    /// Tied best substructure labels, sorted. Empty when unassigned.
    pub labels: Vec<String>,
    /// Index into the ranked identification list.
    pub identification: Option<usize>,
    pub ppm_error: Option<f64>,
}
