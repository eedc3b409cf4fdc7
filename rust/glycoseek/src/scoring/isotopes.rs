//! Isotopic envelope scoring at a chromatographic apex.

use arrayvec::ArrayVec;

use crate::models::{
    Adduct,
    GlycanCandidate,
    IsotopePeakMatch,
    IsotopicEnvelope,
    MzTolerance,
    NEUTRON_SHIFT,
    Spectrum,
};
use crate::utils::correlation::cosine_similarity;
use crate::utils::math::ppm_error;

/// Upper bound on the number of isotope positions that can be scored.
pub const MAX_ISOTOPES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IsotopeParams {
    pub tolerance: MzTolerance,
    pub max_isotopes: usize,
    pub min_matches: usize,
    /// Fraction of the monoisotopic intensity that a lighter species' +1
    /// isotope has to explain before the envelope is flagged.
    pub preceding_isotope_fraction: f64,
    /// Multiplier on the score when the cluster looks like another charge
    /// state or like the tail of a lighter species.
    pub conflict_penalty: f64,
}

#[derive(Debug, Clone)]
pub struct IsotopeScorer {
    params: IsotopeParams,
}

/// Intensity-weighted m/z and summed intensity of the peaks near `mz`.
fn observe(spectrum: &Spectrum, tolerance: &MzTolerance, mz: f64) -> Option<(f64, f64)> {
    let range = tolerance.mz_range(mz);
    let idx = spectrum.mz_index_range(range.start(), range.end());
    let mzs = &spectrum.mz[idx.clone()];
    let ints = &spectrum.intensity[idx];
    let total: f64 = ints.iter().sum();
    if mzs.is_empty() || total <= 0.0 {
        return None;
    }
    let weighted = mzs.iter().zip(ints.iter()).map(|(m, i)| m * i).sum::<f64>() / total;
    Some((weighted, total))
}

impl IsotopeScorer {
    pub fn new(params: IsotopeParams) -> Self {
        let max_isotopes = params.max_isotopes.clamp(1, MAX_ISOTOPES);
        Self {
            params: IsotopeParams {
                max_isotopes,
                ..params
            },
        }
    }

    pub fn params(&self) -> &IsotopeParams {
        &self.params
    }

    /// Scores the envelope and rejects it when fewer than the minimum number
    /// of isotope positions were matched.
    pub fn score(
        &self,
        spectrum: &Spectrum,
        candidate: &GlycanCandidate,
        adduct: &Adduct,
    ) -> Option<IsotopicEnvelope> {
        self.envelope(spectrum, candidate, adduct)
            .filter(|env| self.meets_minimum(env))
    }

    pub fn meets_minimum(&self, envelope: &IsotopicEnvelope) -> bool {
        envelope.matched >= self.params.min_matches
    }

    /// Scores the envelope regardless of how many positions matched.
    ///
    /// Returns `None` only when nothing at all was found, since then there
    /// is no mass to measure an error on.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn envelope(
        &self,
        spectrum: &Spectrum,
        candidate: &GlycanCandidate,
        adduct: &Adduct,
    ) -> Option<IsotopicEnvelope> {
        let charge = adduct.charge().unsigned_abs();
        if charge == 0 {
            return None;
        }
        let spacing = NEUTRON_SHIFT / charge as f64;
        let mono_mz = candidate.precursor_mz(adduct);
        let theoretical = candidate
            .elemental_composition()
            .isotope_distribution(self.params.max_isotopes);

        let mut observed: ArrayVec<f64, MAX_ISOTOPES> = ArrayVec::new();
        let mut peaks = Vec::with_capacity(theoretical.len());
        for (i, theo) in theoretical.iter().enumerate() {
            let theo_mz = mono_mz + spacing * i as f64;
            let found = observe(spectrum, &self.params.tolerance, theo_mz);
            observed.push(found.map(|x| x.1).unwrap_or(0.0));
            peaks.push(IsotopePeakMatch {
                isotope_index: i,
                theoretical_mz: theo_mz,
                theoretical_intensity: *theo,
                observed_mz: found.map(|x| x.0),
                observed_intensity: found.map(|x| x.1).unwrap_or(0.0),
            });
        }

        let matched = peaks.iter().filter(|p| p.observed_mz.is_some()).count();
        if matched == 0 {
            return None;
        }

        let reference = peaks
            .iter()
            .find(|p| p.isotope_index == 0 && p.observed_mz.is_some())
            .or_else(|| {
                peaks
                    .iter()
                    .filter(|p| p.observed_mz.is_some())
                    .max_by(|a, b| a.observed_intensity.total_cmp(&b.observed_intensity))
            })?;
        let ppm = ppm_error(reference.observed_mz?, reference.theoretical_mz);

        let similarity = match cosine_similarity(&observed, &theoretical) {
            Ok(x) if x.is_finite() => x.clamp(0.0, 1.0),
            _ => 0.0,
        };

        let conflict = self.charge_conflict(spectrum, mono_mz, charge, &peaks)
            || self.preceding_isotope_conflict(spectrum, mono_mz, spacing, &peaks);
        let score = if conflict {
            similarity * self.params.conflict_penalty
        } else {
            similarity
        };

        Some(IsotopicEnvelope {
            peaks,
            score,
            ppm_error: ppm,
            matched,
            conflict,
        })
    }

    /// A higher charge state puts isotopes between ours. If one of those
    /// positions is more intense than our expected +1 isotope, the charge is
    /// probably wrong.
    fn charge_conflict(
        &self,
        spectrum: &Spectrum,
        mono_mz: f64,
        charge: u32,
        peaks: &[IsotopePeakMatch],
    ) -> bool {
        let mono_intensity = peaks[0].observed_intensity;
        let expected_plus_one = match peaks.get(1) {
            Some(p) => p.theoretical_intensity * mono_intensity,
            None => return false,
        };
        if mono_intensity <= 0.0 {
            return false;
        }
        ((charge + 1)..=(charge * 2).max(charge + 1)).any(|other| {
            let mz = mono_mz + NEUTRON_SHIFT / other as f64;
            observe(spectrum, &self.params.tolerance, mz)
                .is_some_and(|(_, intensity)| intensity > expected_plus_one)
        })
    }

    /// Our monoisotopic peak could be the +1 isotope of a lighter species one
    /// spacing below.
    fn preceding_isotope_conflict(
        &self,
        spectrum: &Spectrum,
        mono_mz: f64,
        spacing: f64,
        peaks: &[IsotopePeakMatch],
    ) -> bool {
        let mono_intensity = peaks[0].observed_intensity;
        let plus_one_ratio = match peaks.get(1) {
            Some(p) => p.theoretical_intensity,
            None => return false,
        };
        if mono_intensity <= 0.0 {
            return false;
        }
        observe(spectrum, &self.params.tolerance, mono_mz - spacing).is_some_and(
            |(_, intensity)| {
                intensity * plus_one_ratio
                    >= self.params.preceding_isotope_fraction * mono_intensity
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        GlycanComposition,
        Monosaccharide,
        MsLevel,
    };

    fn candidate() -> GlycanCandidate {
        GlycanCandidate::from_composition(
            "H5N4",
            GlycanComposition::new(&[(Monosaccharide::Hex, 5), (Monosaccharide::HexNAc, 4)]),
            vec![Adduct::protonated(2)],
            None,
        )
    }

    fn params(min_matches: usize) -> IsotopeParams {
        IsotopeParams {
            tolerance: MzTolerance::Ppm((10.0, 10.0)),
            max_isotopes: 4,
            min_matches,
            preceding_isotope_fraction: 0.6,
            conflict_penalty: 0.5,
        }
    }

    fn scorer(min_matches: usize) -> IsotopeScorer {
        IsotopeScorer::new(params(min_matches))
    }

    fn spectrum_with(peaks: Vec<(f64, f64)>) -> Spectrum {
        let mut peaks = peaks;
        peaks.sort_by(|a, b| a.0.total_cmp(&b.0));
        Spectrum {
            retention_time: 1.0,
            ms_level: MsLevel::Ms1,
            mz: peaks.iter().map(|x| x.0).collect(),
            intensity: peaks.iter().map(|x| x.1).collect(),
            precursor: None,
        }
    }

    fn perfect_spectrum(cand: &GlycanCandidate, adduct: &Adduct, n: usize) -> Spectrum {
        let dist = cand.elemental_composition().isotope_distribution(n);
        let mono = cand.precursor_mz(adduct);
        let z = adduct.charge().abs() as f64;
        spectrum_with(
            dist.iter()
                .enumerate()
                .map(|(i, x)| (mono + i as f64 * NEUTRON_SHIFT / z, x * 1e5))
                .collect(),
        )
    }

    #[test]
    fn test_perfect_envelope() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let spec = perfect_spectrum(&cand, &adduct, 4);
        let env = scorer(3).score(&spec, &cand, &adduct).unwrap();
        assert_eq!(env.matched, 4);
        assert!((env.score - 1.0).abs() < 1e-9);
        assert!(env.ppm_error.abs() < 1e-6);
        assert!(!env.conflict);
    }

    #[test]
    fn test_missing_isotopes_are_penalized() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let mut spec = perfect_spectrum(&cand, &adduct, 4);
        spec.mz.truncate(2);
        spec.intensity.truncate(2);
        let env = scorer(2).score(&spec, &cand, &adduct).unwrap();
        assert_eq!(env.matched, 2);
        assert!(env.score < 1.0);
        assert!(scorer(3).score(&spec, &cand, &adduct).is_none());
        assert!(scorer(3).envelope(&spec, &cand, &adduct).is_some());
    }

    #[test]
    fn test_empty_spectrum_has_no_envelope() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let spec = spectrum_with(vec![]);
        assert!(scorer(1).envelope(&spec, &cand, &adduct).is_none());
    }

    #[test]
    fn test_ppm_uses_most_intense_when_mono_missing() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let mono = cand.precursor_mz(&adduct);
        let shifted = mono + NEUTRON_SHIFT / 2.0;
        let spec = spectrum_with(vec![(shifted * (1.0 + 2e-6), 100.0)]);
        let env = scorer(1).score(&spec, &cand, &adduct).unwrap();
        assert!((env.ppm_error - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_charge_conflict_halves_score() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let mut peaks: Vec<(f64, f64)> = {
            let spec = perfect_spectrum(&cand, &adduct, 4);
            spec.mz.into_iter().zip(spec.intensity).collect()
        };
        // Quarter spacing peak suggests charge 4
        let mono = cand.precursor_mz(&adduct);
        peaks.push((mono + NEUTRON_SHIFT / 4.0, 1e5));
        let spec = spectrum_with(peaks);
        let env = scorer(3).score(&spec, &cand, &adduct).unwrap();
        assert!(env.conflict);
        assert!((env.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_preceding_isotope_conflict() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let mut peaks: Vec<(f64, f64)> = {
            let spec = perfect_spectrum(&cand, &adduct, 4);
            spec.mz.into_iter().zip(spec.intensity).collect()
        };
        let mono = cand.precursor_mz(&adduct);
        peaks.push((mono - NEUTRON_SHIFT / 2.0, 1e6));
        let spec = spectrum_with(peaks);
        let env = scorer(3).score(&spec, &cand, &adduct).unwrap();
        assert!(env.conflict);
        assert!((env.score - 0.5).abs() < 1e-9);
    }

    fn with_lighter_species(intensity: f64) -> Spectrum {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let spec = perfect_spectrum(&cand, &adduct, 4);
        let mut peaks: Vec<(f64, f64)> = spec.mz.into_iter().zip(spec.intensity).collect();
        let mono = cand.precursor_mz(&adduct);
        peaks.push((mono - NEUTRON_SHIFT / 2.0, intensity));
        spectrum_with(peaks)
    }

    #[test]
    fn test_preceding_isotope_penalty_follows_the_fraction() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let ratio = cand.elemental_composition().isotope_distribution(2)[1];
        // A lighter species whose +1 isotope explains 70% of our mono peak
        let spec = with_lighter_species(0.7 * 1e5 / ratio);

        let env = scorer(3).score(&spec, &cand, &adduct).unwrap();
        assert!(env.conflict);
        assert!((env.score - 0.5).abs() < 1e-9);

        let mut relaxed = params(3);
        relaxed.preceding_isotope_fraction = 0.8;
        let env = IsotopeScorer::new(relaxed).score(&spec, &cand, &adduct).unwrap();
        assert!(!env.conflict);
        assert!((env.score - 1.0).abs() < 1e-9);

        let mut harsh = params(3);
        harsh.conflict_penalty = 0.1;
        let env = IsotopeScorer::new(harsh).score(&spec, &cand, &adduct).unwrap();
        assert!((env.score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_weak_lighter_species_is_no_conflict() {
        let cand = candidate();
        let adduct = Adduct::protonated(2);
        let ratio = cand.elemental_composition().isotope_distribution(2)[1];
        let spec = with_lighter_species(0.3 * 1e5 / ratio);
        let env = scorer(3).score(&spec, &cand, &adduct).unwrap();
        assert!(!env.conflict);
    }
}
