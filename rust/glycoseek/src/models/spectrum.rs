use serde::{
    Deserialize,
    Serialize,
};

use crate::errors::InputError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum MsLevel {
    Ms1,
    Ms2,
}

impl TryFrom<u8> for MsLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MsLevel::Ms1),
            2 => Ok(MsLevel::Ms2),
            other => Err(format!("Unsupported MS level {}", other)),
        }
    }
}

impl From<MsLevel> for u8 {
    fn from(value: MsLevel) -> Self {
        match value {
            MsLevel::Ms1 => 1,
            MsLevel::Ms2 => 2,
        }
    }
}

/// Precursor selection of an MS2 scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Precursor {
    pub mz: f64,
    #[serde(default)]
    pub charge: Option<i32>,
    /// Isolation window offsets below and above `mz`, when the instrument
    /// reports them.
    #[serde(default)]
    pub isolation_lower_offset: Option<f64>,
    #[serde(default)]
    pub isolation_upper_offset: Option<f64>,
}

impl Precursor {
    pub fn isolation_window(&self) -> Option<(f64, f64)> {
        match (self.isolation_lower_offset, self.isolation_upper_offset) {
            (Some(lo), Some(hi)) if lo + hi > 0.0 => Some((self.mz - lo, self.mz + hi)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Retention time in minutes.
    pub retention_time: f64,
    pub ms_level: MsLevel,
    pub mz: Vec<f64>,
    pub intensity: Vec<f64>,
    #[serde(default)]
    pub precursor: Option<Precursor>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mz.is_empty()
    }

    /// Index range of the peaks with `lo <= mz <= hi`.
    pub fn mz_index_range(&self, lo: f64, hi: f64) -> std::ops::Range<usize> {
        let start = self.mz.partition_point(|x| *x < lo);
        let end = start + self.mz[start..].partition_point(|x| *x <= hi);
        start..end
    }

    fn validate(&self, index: usize) -> Result<(), InputError> {
        if self.mz.len() != self.intensity.len() {
            return Err(InputError::MismatchedArrays {
                index,
                mz_len: self.mz.len(),
                intensity_len: self.intensity.len(),
            });
        }
        if !self.retention_time.is_finite() {
            return Err(InputError::NonFiniteValue {
                context: format!("retention time of spectrum {}", index),
            });
        }
        if self
            .mz
            .iter()
            .chain(self.intensity.iter())
            .any(|x| !x.is_finite())
        {
            return Err(InputError::NonFiniteValue {
                context: format!("peaks of spectrum {}", index),
            });
        }
        if self.mz.windows(2).any(|w| w[0] > w[1]) {
            return Err(InputError::UnsortedMzArray { index });
        }
        if self.ms_level == MsLevel::Ms2 && self.precursor.is_none() {
            return Err(InputError::MissingPrecursor { index });
        }
        Ok(())
    }
}

/// Validated, read-only set of spectra for one run.
///
/// MS1 and MS2 scans are kept interleaved as read, with index lists for each
/// level.
#[derive(Debug, Clone)]
pub struct SpectrumCollection {
    spectra: Vec<Spectrum>,
    ms1_indices: Vec<usize>,
    ms2_indices: Vec<usize>,
    ms1_retention_times: Vec<f64>,
}

impl SpectrumCollection {
    pub fn new(spectra: Vec<Spectrum>) -> Result<Self, InputError> {
        if spectra.is_empty() {
            return Err(InputError::EmptySpectrumCollection);
        }
        let mut ms1_indices = Vec::new();
        let mut ms2_indices = Vec::new();
        let mut ms1_retention_times: Vec<f64> = Vec::new();
        for (i, spec) in spectra.iter().enumerate() {
            spec.validate(i)?;
            match spec.ms_level {
                MsLevel::Ms1 => {
                    if let Some(prev) = ms1_retention_times.last() {
                        if spec.retention_time <= *prev {
                            return Err(InputError::UnsortedRetentionTimes {
                                index: i,
                                previous: *prev,
                                current: spec.retention_time,
                            });
                        }
                    }
                    ms1_indices.push(i);
                    ms1_retention_times.push(spec.retention_time);
                }
                MsLevel::Ms2 => ms2_indices.push(i),
            }
        }
        if ms1_indices.is_empty() {
            return Err(InputError::NoMs1Spectra);
        }
        Ok(Self {
            spectra,
            ms1_indices,
            ms2_indices,
            ms1_retention_times,
        })
    }

    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    pub fn get(&self, index: usize) -> Option<&Spectrum> {
        self.spectra.get(index)
    }

    pub fn num_ms1(&self) -> usize {
        self.ms1_indices.len()
    }

    pub fn ms1_retention_times(&self) -> &[f64] {
        &self.ms1_retention_times
    }

    /// The `i`-th MS1 spectrum in retention time order.
    pub fn ms1(&self, i: usize) -> Option<&Spectrum> {
        self.ms1_indices.get(i).map(|x| &self.spectra[*x])
    }

    pub fn iter_ms1(&self) -> impl Iterator<Item = &Spectrum> + '_ {
        self.ms1_indices.iter().map(|x| &self.spectra[*x])
    }

    pub fn ms2_indices(&self) -> &[usize] {
        &self.ms2_indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms1(rt: f64) -> Spectrum {
        Spectrum {
            retention_time: rt,
            ms_level: MsLevel::Ms1,
            mz: vec![100.0, 200.0],
            intensity: vec![1.0, 2.0],
            precursor: None,
        }
    }

    #[test]
    fn test_empty_collection_is_rejected() {
        assert_eq!(
            SpectrumCollection::new(vec![]).unwrap_err(),
            InputError::EmptySpectrumCollection
        );
    }

    #[test]
    fn test_unsorted_rt_is_rejected() {
        let err = SpectrumCollection::new(vec![ms1(1.0), ms1(1.0)]).unwrap_err();
        assert!(matches!(err, InputError::UnsortedRetentionTimes { index: 1, .. }));
    }

    #[test]
    fn test_mismatched_arrays_are_rejected() {
        let mut spec = ms1(1.0);
        spec.intensity.pop();
        let err = SpectrumCollection::new(vec![spec]).unwrap_err();
        assert!(matches!(err, InputError::MismatchedArrays { index: 0, .. }));
    }

    #[test]
    fn test_ms2_only_is_rejected() {
        let spec = Spectrum {
            retention_time: 1.0,
            ms_level: MsLevel::Ms2,
            mz: vec![],
            intensity: vec![],
            precursor: Some(Precursor {
                mz: 500.0,
                charge: Some(2),
                isolation_lower_offset: None,
                isolation_upper_offset: None,
            }),
        };
        assert_eq!(
            SpectrumCollection::new(vec![spec]).unwrap_err(),
            InputError::NoMs1Spectra
        );
    }

    #[test]
    fn test_ms_level_serde() {
        let spec: Spectrum = serde_json::from_str(
            r#"{"retention_time": 1.5, "ms_level": 1, "mz": [1.0], "intensity": [2.0]}"#,
        )
        .unwrap();
        assert_eq!(spec.ms_level, MsLevel::Ms1);
        assert!(serde_json::from_str::<MsLevel>("3").is_err());
    }

    #[test]
    fn test_mz_index_range() {
        let spec = ms1(1.0);
        assert_eq!(spec.mz_index_range(150.0, 250.0), 1..2);
        assert_eq!(spec.mz_index_range(300.0, 400.0), 2..2);
    }
}
