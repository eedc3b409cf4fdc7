use serde::Serialize;

use super::tolerance::MzTolerance;
use crate::errors::DataProcessingError;

/// Extracted ion chromatogram, one sample per MS1 spectrum.
#[derive(Debug, Clone, Serialize)]
pub struct Eic {
    pub target_mz: f64,
    pub tolerance: MzTolerance,
    pub retention_times: Vec<f64>,
    pub intensities: Vec<f64>,
}

impl Eic {
    pub fn len(&self) -> usize {
        self.retention_times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.retention_times.is_empty()
    }
}

/// A single elution event inside an [`Eic`].
///
/// Indices refer to EIC samples (equivalently, MS1 spectra in order).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChromatographicPeak {
    pub target_mz: f64,
    pub start_index: usize,
    pub apex_index: usize,
    pub end_index: usize,
    pub rt_start: f64,
    pub rt_apex: f64,
    pub rt_end: f64,
    pub apex_intensity: f64,
    pub area: f64,
    /// The peak touches an edge of the analysed retention time window.
    pub truncated: bool,
}

impl ChromatographicPeak {
    pub fn try_new(
        eic: &Eic,
        start_index: usize,
        apex_index: usize,
        end_index: usize,
        area: f64,
        truncated: bool,
    ) -> Result<Self, DataProcessingError> {
        if !(start_index <= apex_index && apex_index <= end_index) || end_index >= eic.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: end_index + 1,
                other: eic.len(),
                context: format!(
                    "peak bounds start={} apex={} end={}",
                    start_index, apex_index, end_index
                ),
            });
        }
        Ok(Self {
            target_mz: eic.target_mz,
            start_index,
            apex_index,
            end_index,
            rt_start: eic.retention_times[start_index],
            rt_apex: eic.retention_times[apex_index],
            rt_end: eic.retention_times[end_index],
            apex_intensity: eic.intensities[apex_index],
            area,
            truncated,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eic() -> Eic {
        Eic {
            target_mz: 500.0,
            tolerance: MzTolerance::default(),
            retention_times: vec![1.0, 2.0, 3.0],
            intensities: vec![1.0, 5.0, 2.0],
        }
    }

    #[test]
    fn test_peak_bounds_are_checked() {
        let eic = eic();
        assert!(ChromatographicPeak::try_new(&eic, 1, 0, 2, 0.0, false).is_err());
        assert!(ChromatographicPeak::try_new(&eic, 0, 1, 3, 0.0, false).is_err());
        let peak = ChromatographicPeak::try_new(&eic, 0, 1, 2, 7.0, false).unwrap();
        assert_eq!(peak.apex_intensity, 5.0);
        assert_eq!(peak.rt_apex, 2.0);
        assert_eq!(peak.num_samples(), 3);
    }
}
