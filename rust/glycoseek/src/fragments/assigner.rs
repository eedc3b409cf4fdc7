//! Assignment of MS2 fragment ions to precursor identifications.

use rayon::prelude::*;
use tracing::debug;

use super::fragment_mass_builder::{
    FragmentMassBuilder,
    TheoreticalFragment,
};
use crate::models::{
    Fragment,
    Identification,
    MzTolerance,
    NEUTRON_SHIFT,
    Spectrum,
    SpectrumCollection,
};
use crate::utils::math::ppm_error;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentParams {
    /// Fragment ion matching window.
    pub tolerance: MzTolerance,
    /// Window used to match the precursor of the scan, before widening.
    pub precursor_tolerance: MzTolerance,
    /// Slack around the peak bounds of an identification.
    pub rt_tolerance_minutes: f64,
    pub max_fragment_charge: u8,
    /// Widening of `precursor_tolerance` for scans without an isolation window.
    pub isolation_window_tolerance_factor: f64,
    /// Number of precursor isotopes that may have been selected.
    pub max_isotopes: usize,
    pub report_unassigned: bool,
    /// Two assignments whose absolute ppm errors differ by less than this
    /// are tied.
    pub tie_tolerance_ppm: f64,
    /// Isotope peaks of an earlier assigned ion are skipped up to this charge.
    pub max_isotope_skip_charge: u32,
}

#[derive(Debug, Clone)]
pub struct FragmentAssigner {
    params: FragmentParams,
    builder: FragmentMassBuilder,
}

impl FragmentAssigner {
    pub fn new(params: FragmentParams) -> Self {
        Self {
            params,
            builder: FragmentMassBuilder::new(params.max_fragment_charge),
        }
    }

    fn library(&self, ident: &Identification) -> Vec<TheoreticalFragment> {
        self.builder.fragment_mzs(
            &ident.composition,
            ident.reducing_end_tag.as_ref(),
            ident.charge,
        )
    }

    /// Whether `spectrum` could have been acquired on `ident`'s precursor.
    pub fn precursor_matches(&self, spectrum: &Spectrum, ident: &Identification) -> bool {
        let Some(precursor) = &spectrum.precursor else {
            return false;
        };
        let rt_tol = self.params.rt_tolerance_minutes;
        if spectrum.retention_time < ident.peak.rt_start - rt_tol
            || spectrum.retention_time > ident.peak.rt_end + rt_tol
        {
            return false;
        }
        if let Some(charge) = precursor.charge {
            if charge != 0 && charge.abs() != ident.charge.abs() {
                return false;
            }
        }
        let z = ident.charge.unsigned_abs().max(1) as f64;
        let window = precursor.isolation_window();
        let widened = self
            .params
            .precursor_tolerance
            .scaled(self.params.isolation_window_tolerance_factor);
        (0..self.params.max_isotopes.max(1)).any(|k| {
            let iso_mz = ident.precursor_mz + k as f64 * NEUTRON_SHIFT / z;
            match window {
                Some((lo, hi)) => lo <= iso_mz && iso_mz <= hi,
                None => widened.contains(iso_mz, precursor.mz),
            }
        })
    }

    /// Annotates the ions of one MS2 spectrum.
    ///
    /// `identifications` is the final ranked list. Fragments refer to it by
    /// index and a spectrum matching none of them gives no fragments.
    pub fn assign(
        &self,
        spectrum_index: usize,
        spectrum: &Spectrum,
        identifications: &[Identification],
    ) -> Vec<Fragment> {
        let candidates: Vec<(usize, Vec<TheoreticalFragment>)> = identifications
            .iter()
            .enumerate()
            .filter(|(_, ident)| self.precursor_matches(spectrum, ident))
            .map(|(i, ident)| (i, self.library(ident)))
            .collect();
        let borrowed: Vec<(usize, &[TheoreticalFragment])> =
            candidates.iter().map(|(i, l)| (*i, l.as_slice())).collect();
        self.assign_matched(spectrum_index, spectrum, &borrowed)
    }

    /// Annotates every MS2 spectrum in parallel.
    ///
    /// Output is sorted by spectrum and then by m/z.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip_all, level = "trace")
    )]
    pub fn assign_all(
        &self,
        spectra: &SpectrumCollection,
        identifications: &[Identification],
    ) -> Vec<Fragment> {
        if identifications.is_empty() {
            return Vec::new();
        }
        let libraries: Vec<Vec<TheoreticalFragment>> = identifications
            .par_iter()
            .map(|ident| self.library(ident))
            .collect();

        let mut out: Vec<Fragment> = spectra
            .ms2_indices()
            .par_iter()
            .flat_map_iter(|&spectrum_index| {
                let Some(spectrum) = spectra.get(spectrum_index) else {
                    return Vec::new();
                };
                let matched: Vec<(usize, &[TheoreticalFragment])> = identifications
                    .iter()
                    .enumerate()
                    .filter(|(_, ident)| self.precursor_matches(spectrum, ident))
                    .map(|(i, _)| (i, libraries[i].as_slice()))
                    .collect();
                self.assign_matched(spectrum_index, spectrum, &matched)
            })
            .collect();
        out.sort_by(|a, b| {
            a.spectrum_index
                .cmp(&b.spectrum_index)
                .then_with(|| a.mz.total_cmp(&b.mz))
        });
        debug!(
            "Assigned {} fragments over {} MS2 spectra",
            out.iter().filter(|f| f.identification.is_some()).count(),
            spectra.ms2_indices().len()
        );
        out
    }

    fn assign_matched(
        &self,
        spectrum_index: usize,
        spectrum: &Spectrum,
        matched: &[(usize, &[TheoreticalFragment])],
    ) -> Vec<Fragment> {
        if matched.is_empty() {
            return Vec::new();
        }
        let tolerance = &self.params.tolerance;
        let search = tolerance.scaled(2.0);
        let tie = self.params.tie_tolerance_ppm;
        let max_skip_charge = self.params.max_isotope_skip_charge.max(1);
        // m/z of the ions assigned so far, ascending since the spectrum is
        let mut assigned_mzs: Vec<f64> = Vec::new();
        let mut out = Vec::new();

        for (&mz, &intensity) in spectrum.mz.iter().zip(spectrum.intensity.iter()) {
            if intensity <= 0.0 {
                continue;
            }

            // (identification, label, signed ppm)
            let mut best: Vec<(usize, &str, f64)> = Vec::new();
            let mut best_abs = f64::INFINITY;
            let window = search.mz_range(mz);
            for (ident_idx, library) in matched {
                let start = library.partition_point(|f| f.mz < window.start());
                for theo in library[start..].iter().take_while(|f| f.mz <= window.end()) {
                    if !tolerance.contains(theo.mz, mz) {
                        continue;
                    }
                    let ppm = ppm_error(mz, theo.mz);
                    let abs = ppm.abs();
                    if abs < best_abs - tie {
                        best.clear();
                        best_abs = abs;
                    }
                    if abs <= best_abs + tie {
                        best.push((*ident_idx, theo.label.as_str(), ppm));
                    }
                }
            }

            let isotope_abs = isotope_error(
                &assigned_mzs,
                mz,
                tolerance,
                &search,
                max_skip_charge,
            );
            if isotope_abs.is_some_and(|iso| iso <= best_abs + tie) {
                continue;
            }

            match best.iter().min_by_key(|x| x.0) {
                Some(&(owner, _, ppm)) => {
                    assigned_mzs.push(mz);
                    let mut labels: Vec<String> = best.iter().map(|x| x.1.to_string()).collect();
                    labels.sort();
                    labels.dedup();
                    out.push(Fragment {
                        spectrum_index,
                        retention_time: spectrum.retention_time,
                        mz,
                        intensity,
                        labels,
                        identification: Some(owner),
                        ppm_error: Some(ppm),
                    });
                }
                None if self.params.report_unassigned => out.push(Fragment {
                    spectrum_index,
                    retention_time: spectrum.retention_time,
                    mz,
                    intensity,
                    labels: Vec::new(),
                    identification: None,
                    ppm_error: None,
                }),
                None => {}
            }
        }
        out
    }
}

/// Smallest absolute ppm error of `mz` as an isotope (charge 1 up to
/// `max_charge`) of one of the `assigned` ions, if any explains it.
fn isotope_error(
    assigned: &[f64],
    mz: f64,
    tolerance: &MzTolerance,
    search: &MzTolerance,
    max_charge: u32,
) -> Option<f64> {
    let lo = search.mz_range(mz - NEUTRON_SHIFT).start();
    let hi = search.mz_range(mz - NEUTRON_SHIFT / max_charge as f64).end();
    let start = assigned.partition_point(|x| *x < lo);
    assigned[start..]
        .iter()
        .take_while(|x| **x <= hi)
        .flat_map(|prev| {
            (1..=max_charge).filter_map(move |z| {
                let iso = prev + NEUTRON_SHIFT / z as f64;
                tolerance
                    .contains(iso, mz)
                    .then(|| ppm_error(mz, iso).abs())
            })
        })
        .min_by(|a, b| a.total_cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        Adduct,
        ChromatographicPeak,
        GlycanCandidate,
        GlycanComposition,
        IsotopicEnvelope,
        Monosaccharide,
        MsLevel,
        Precursor,
        ScoreVector,
        ShapeMethod,
        ShapeScore,
    };

    fn params() -> FragmentParams {
        FragmentParams {
            tolerance: MzTolerance::Ppm((10.0, 10.0)),
            precursor_tolerance: MzTolerance::Ppm((10.0, 10.0)),
            rt_tolerance_minutes: 0.5,
            max_fragment_charge: 2,
            isolation_window_tolerance_factor: 5.0,
            max_isotopes: 3,
            report_unassigned: false,
            tie_tolerance_ppm: 1e-9,
            max_isotope_skip_charge: 3,
        }
    }

    fn identification(id: &str, composition: GlycanComposition) -> Identification {
        let adduct = Adduct::protonated(2);
        let cand = GlycanCandidate::from_composition(id, composition, vec![adduct.clone()], None);
        Identification {
            candidate_index: 0,
            candidate_id: cand.id.clone(),
            composition: cand.composition.clone(),
            reducing_end_tag: None,
            adduct: adduct.clone(),
            charge: 2,
            precursor_mz: cand.precursor_mz(&adduct),
            peak: ChromatographicPeak {
                target_mz: cand.precursor_mz(&adduct),
                start_index: 0,
                apex_index: 5,
                end_index: 10,
                rt_start: 10.0,
                rt_apex: 10.5,
                rt_end: 11.0,
                apex_intensity: 1000.0,
                area: 100.0,
                truncated: false,
            },
            envelope: IsotopicEnvelope {
                peaks: vec![],
                score: 1.0,
                ppm_error: 0.0,
                matched: 3,
                conflict: false,
            },
            shape: ShapeScore {
                score: 1.0,
                method: ShapeMethod::GaussianFit,
                degraded: false,
            },
            snr: 50.0,
            scores: ScoreVector::new(1.0, 1.0, 0.0, 10.0, 50.0, 20.0),
            confidence: 1.0,
            degraded: false,
        }
    }

    fn h5n4() -> GlycanComposition {
        GlycanComposition::new(&[(Monosaccharide::Hex, 5), (Monosaccharide::HexNAc, 4)])
    }

    fn ms2(rt: f64, precursor_mz: f64, peaks: Vec<(f64, f64)>) -> Spectrum {
        Spectrum {
            retention_time: rt,
            ms_level: MsLevel::Ms2,
            mz: peaks.iter().map(|x| x.0).collect(),
            intensity: peaks.iter().map(|x| x.1).collect(),
            precursor: Some(Precursor {
                mz: precursor_mz,
                charge: Some(2),
                isolation_lower_offset: None,
                isolation_upper_offset: None,
            }),
        }
    }

    fn hexnac_oxonium() -> f64 {
        Monosaccharide::HexNAc
            .residue_composition()
            .monoisotopic_mass()
            + crate::models::PROTON_MASS
    }

    #[test]
    fn test_exact_fragment_is_assigned() {
        let ident = identification("H5N4", h5n4());
        let spec = ms2(10.5, ident.precursor_mz, vec![(hexnac_oxonium(), 500.0)]);
        let assigner = FragmentAssigner::new(params());
        let frags = assigner.assign(3, &spec, &[ident]);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].identification, Some(0));
        assert_eq!(frags[0].labels, vec!["N1 (1+)".to_string()]);
        assert!(frags[0].ppm_error.unwrap().abs() < 1e-6);
        assert_eq!(frags[0].spectrum_index, 3);
    }

    #[test]
    fn test_no_matching_precursor_gives_nothing() {
        let ident = identification("H5N4", h5n4());
        let assigner = FragmentAssigner::new(params());
        // Wrong precursor m/z
        let spec = ms2(10.5, ident.precursor_mz + 3.0, vec![(hexnac_oxonium(), 500.0)]);
        assert!(assigner.assign(0, &spec, &[ident.clone()]).is_empty());
        // Outside of the elution window
        let spec = ms2(12.0, ident.precursor_mz, vec![(hexnac_oxonium(), 500.0)]);
        assert!(assigner.assign(0, &spec, &[ident]).is_empty());
        // No identifications at all
        let spec = ms2(10.5, 1000.0, vec![(hexnac_oxonium(), 500.0)]);
        assert!(assigner.assign(0, &spec, &[]).is_empty());
    }

    #[test]
    fn test_second_isotope_precursor_matches() {
        let ident = identification("H5N4", h5n4());
        let assigner = FragmentAssigner::new(params());
        let spec = ms2(
            10.5,
            ident.precursor_mz + NEUTRON_SHIFT / 2.0,
            vec![(hexnac_oxonium(), 500.0)],
        );
        assert!(assigner.precursor_matches(&spec, &ident));
    }

    #[test]
    fn test_isolation_window_is_used() {
        let ident = identification("H5N4", h5n4());
        let assigner = FragmentAssigner::new(params());
        let mut spec = ms2(10.5, ident.precursor_mz + 1.5, vec![]);
        assert!(!assigner.precursor_matches(&spec, &ident));
        if let Some(p) = spec.precursor.as_mut() {
            p.isolation_lower_offset = Some(2.0);
            p.isolation_upper_offset = Some(2.0);
        }
        assert!(assigner.precursor_matches(&spec, &ident));
    }

    #[test]
    fn test_isotope_ions_are_skipped() {
        let ident = identification("H5N4", h5n4());
        let spec = ms2(
            10.5,
            ident.precursor_mz,
            vec![(hexnac_oxonium(), 500.0), (hexnac_oxonium() + NEUTRON_SHIFT, 50.0)],
        );
        let mut p = params();
        p.report_unassigned = true;
        let frags = FragmentAssigner::new(p).assign(0, &spec, &[ident]);
        assert_eq!(frags.len(), 1);
    }

    #[test]
    fn test_fragment_above_an_unassigned_ion_is_still_assigned() {
        let ident = identification("H5N4", h5n4());
        // Nothing in the library sits one spacing below the oxonium ion
        let noise = hexnac_oxonium() - NEUTRON_SHIFT;
        let spec = ms2(
            10.5,
            ident.precursor_mz,
            vec![(noise, 800.0), (hexnac_oxonium(), 500.0)],
        );
        let mut p = params();
        p.report_unassigned = true;
        let frags = FragmentAssigner::new(p).assign(0, &spec, &[ident]);
        assert_eq!(frags.len(), 2, "{:?}", frags);
        assert_eq!(frags[0].identification, None);
        assert_eq!(frags[1].identification, Some(0));
        assert_eq!(frags[1].labels, vec!["N1 (1+)".to_string()]);
    }

    #[test]
    fn test_isotope_error_searches_only_the_window() {
        let tol = MzTolerance::Ppm((10.0, 10.0));
        let search = tol.scaled(2.0);
        let assigned = [100.0, 300.0, 500.0];
        let err = isotope_error(&assigned, 300.0 + NEUTRON_SHIFT / 2.0, &tol, &search, 3);
        assert!(err.unwrap() < 1e-6);
        assert!(isotope_error(&assigned, 300.0 + NEUTRON_SHIFT / 4.0, &tol, &search, 3).is_none());
        assert!(isotope_error(&assigned, 300.0 + NEUTRON_SHIFT / 2.0, &tol, &search, 1).is_none());
        assert!(isotope_error(&[], 200.0, &tol, &search, 3).is_none());
    }

    #[test]
    fn test_unassigned_ions_are_reported_on_request() {
        let ident = identification("H5N4", h5n4());
        let spec = ms2(10.5, ident.precursor_mz, vec![(150.0, 10.0), (hexnac_oxonium(), 500.0)]);
        let mut p = params();
        p.report_unassigned = true;
        let frags = FragmentAssigner::new(p).assign(0, &spec, &[ident.clone()]);
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].identification, None);
        assert!(frags[0].labels.is_empty());
        let frags = FragmentAssigner::new(params()).assign(0, &spec, &[ident]);
        assert_eq!(frags.len(), 1);
    }

    #[test]
    fn test_ties_are_multi_labeled_and_owned_by_first() {
        let first = identification("a", h5n4());
        let second = identification("b", h5n4());
        let spec = ms2(10.5, first.precursor_mz, vec![(hexnac_oxonium(), 500.0)]);
        let frags = FragmentAssigner::new(params()).assign(0, &spec, &[first, second]);
        assert_eq!(frags.len(), 1);
        assert_eq!(frags[0].identification, Some(0));
        assert_eq!(frags[0].labels, vec!["N1 (1+)".to_string()]);
    }

    #[test]
    fn test_assign_all_is_sorted() {
        let ident = identification("H5N4", h5n4());
        let ms1 = Spectrum {
            retention_time: 10.0,
            ms_level: MsLevel::Ms1,
            mz: vec![100.0],
            intensity: vec![1.0],
            precursor: None,
        };
        let spectra = SpectrumCollection::new(vec![
            ms1,
            ms2(10.4, ident.precursor_mz, vec![(hexnac_oxonium(), 500.0)]),
            ms2(10.6, ident.precursor_mz, vec![(hexnac_oxonium(), 400.0)]),
        ])
        .unwrap();
        let frags = FragmentAssigner::new(params()).assign_all(&spectra, &[ident]);
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].spectrum_index, 1);
        assert_eq!(frags[1].spectrum_index, 2);
    }
}
