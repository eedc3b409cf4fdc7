use glycoseek::extraction::{
    EicAggregation,
    EicBuilder,
};
use glycoseek::fragments::{
    FragmentAssigner,
    FragmentParams,
};
use glycoseek::models::{
    Adduct,
    ChargeCarrier,
    ChromatographicPeak,
    Eic,
    GlycanCandidate,
    GlycanComposition,
    Identification,
    IsotopicEnvelope,
    Monosaccharide,
    MsLevel,
    MzTolerance,
    NEUTRON_SHIFT,
    PROTON_MASS,
    Precursor,
    RtWindow,
    ScoreVector,
    ShapeMethod,
    ShapeScore,
    Spectrum,
    SpectrumCollection,
};
use glycoseek::scoring::{
    IsotopeParams,
    IsotopeScorer,
    NoiseEstimate,
    PeakPicker,
    PeakPickingParams,
    signal_to_noise,
};

fn ppm10() -> MzTolerance {
    MzTolerance::Ppm((10.0, 10.0))
}

fn h5n2() -> GlycanCandidate {
    GlycanCandidate::from_composition(
        "H5N2",
        GlycanComposition::new(&[(Monosaccharide::Hex, 5), (Monosaccharide::HexNAc, 2)]),
        vec![Adduct::protonated(1)],
        None,
    )
}

fn ms1(rt: f64, mz: Vec<f64>, intensity: Vec<f64>) -> Spectrum {
    Spectrum {
        retention_time: rt,
        ms_level: MsLevel::Ms1,
        mz,
        intensity,
        precursor: None,
    }
}

fn gaussian(x: f64, amp: f64, mean: f64, sigma: f64) -> f64 {
    amp * (-(x - mean).powi(2) / (2.0 * sigma * sigma)).exp()
}

fn picker() -> PeakPicker {
    PeakPicker::new(PeakPickingParams {
        min_width: 3,
        max_width_minutes: 10.0,
        boundary_fraction: 0.05,
        valley_depth_fraction: 0.5,
        smoothing_passes: 1,
        rt_window: RtWindow::Unrestricted,
        close_peaks: None,
    })
}

fn synthetic_eic(intensities: Vec<f64>) -> Eic {
    Eic {
        target_mz: 500.0,
        tolerance: ppm10(),
        retention_times: (0..intensities.len()).map(|i| i as f64 * 0.1).collect(),
        intensities,
    }
}

#[test]
fn test_eic_has_one_sample_per_ms1_spectrum() {
    let mut spectra = Vec::new();
    for i in 0..25 {
        spectra.push(ms1(
            1.0 + i as f64 * 0.05,
            vec![499.0, 500.0, 501.0],
            vec![1.0, i as f64, 1.0],
        ));
        if i % 5 == 0 {
            spectra.push(Spectrum {
                retention_time: 1.0 + i as f64 * 0.05 + 0.01,
                ms_level: MsLevel::Ms2,
                mz: vec![200.0],
                intensity: vec![10.0],
                precursor: Some(Precursor {
                    mz: 500.0,
                    charge: Some(2),
                    isolation_lower_offset: None,
                    isolation_upper_offset: None,
                }),
            });
        }
    }
    let collection = SpectrumCollection::new(spectra).unwrap();
    let eic = EicBuilder::new(ppm10(), EicAggregation::Sum).build(500.0, &collection);

    assert_eq!(eic.len(), collection.num_ms1());
    assert_eq!(eic.intensities.len(), 25);
    assert!(eic.retention_times.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(eic.intensities[7], 7.0);
}

#[test]
fn test_two_separated_bumps_give_two_peaks() {
    let intensities = (0..60)
        .map(|i| {
            let x = i as f64;
            gaussian(x, 1000.0, 15.0, 3.0) + gaussian(x, 800.0, 45.0, 3.0)
        })
        .collect();
    let eic = synthetic_eic(intensities);
    let peaks = picker().pick(&eic, 50.0).unwrap();

    assert_eq!(peaks.len(), 2, "{:?}", peaks);
    assert!(peaks[0].apex_index.abs_diff(15) <= 1);
    assert!(peaks[1].apex_index.abs_diff(45) <= 1);
}

#[test]
fn test_overlapping_bumps_merge_into_one_peak() {
    let intensities = (0..60)
        .map(|i| {
            let x = i as f64;
            gaussian(x, 1000.0, 28.0, 3.0) + gaussian(x, 900.0, 33.0, 3.0)
        })
        .collect();
    let eic = synthetic_eic(intensities);
    let peaks = picker().pick(&eic, 50.0).unwrap();

    assert_eq!(peaks.len(), 1, "{:?}", peaks);
    assert!(peaks[0].start_index < 28 && peaks[0].end_index > 33);
}

fn isotope_scorer(max_isotopes: usize, min_matches: usize) -> IsotopeScorer {
    IsotopeScorer::new(IsotopeParams {
        tolerance: ppm10(),
        max_isotopes,
        min_matches,
        preceding_isotope_fraction: 0.6,
        conflict_penalty: 0.5,
    })
}

/// Envelope scores of H5N2 while every odd isotope is scaled by
/// `scale(magnitude)` for magnitudes 0, 0.1, ..., 0.9.
fn scores_under_scaling(scale: impl Fn(f64) -> f64) -> Vec<f64> {
    let candidate = h5n2();
    let adduct = candidate.adducts[0].clone();
    let scorer = isotope_scorer(5, 2);
    let mono = candidate.precursor_mz(&adduct);
    let theoretical = candidate.elemental_composition().isotope_distribution(5);

    (0..10)
        .map(|step| {
            let factor = scale(step as f64 * 0.1);
            let intensity: Vec<f64> = theoretical
                .iter()
                .enumerate()
                .map(|(k, t)| if k % 2 == 1 { 1000.0 * t * factor } else { 1000.0 * t })
                .collect();
            let mz = (0..theoretical.len())
                .map(|k| mono + k as f64 * NEUTRON_SHIFT)
                .collect();
            let spectrum = ms1(1.0, mz, intensity);
            scorer.envelope(&spectrum, &candidate, &adduct).unwrap().score
        })
        .collect()
}

fn assert_non_increasing(scores: &[f64]) {
    for w in scores.windows(2) {
        assert!(w[1] <= w[0] + 1e-12, "score rose from {} to {}", w[0], w[1]);
    }
}

#[test]
fn test_isotope_score_does_not_increase_with_perturbation() {
    let scores = scores_under_scaling(|m| 1.0 - m);
    assert_non_increasing(&scores);
    assert!(scores[0] > 0.999);
    assert!(scores[9] < 1.0);
}

#[test]
fn test_isotope_score_does_not_increase_with_inflated_isotopes() {
    let scores = scores_under_scaling(|m| 1.0 + 3.0 * m);
    assert_non_increasing(&scores);
    assert!(scores[9] < scores[0]);
}

#[test]
fn test_missing_monoisotopic_peak_lowers_the_score() {
    let candidate = h5n2();
    let adduct = candidate.adducts[0].clone();
    let scorer = isotope_scorer(5, 2);
    let mono = candidate.precursor_mz(&adduct);
    let theoretical = candidate.elemental_composition().isotope_distribution(5);

    let full = ms1(
        1.0,
        (0..5).map(|k| mono + k as f64 * NEUTRON_SHIFT).collect(),
        theoretical.iter().map(|t| t * 1000.0).collect(),
    );
    let without_mono = ms1(
        1.0,
        (1..5).map(|k| mono + k as f64 * NEUTRON_SHIFT).collect(),
        theoretical[1..].iter().map(|t| t * 1000.0).collect(),
    );
    let complete = scorer.envelope(&full, &candidate, &adduct).unwrap();
    let partial = scorer.envelope(&without_mono, &candidate, &adduct).unwrap();

    assert_eq!(complete.matched, 5);
    assert_eq!(partial.matched, 4);
    assert!(partial.peaks[0].observed_mz.is_none());
    assert!(partial.score < complete.score);
    assert!(!partial.conflict);
    // The mass error falls back to the most intense matched isotope.
    assert!(partial.ppm_error.abs() < 1e-6, "{}", partial.ppm_error);
}

#[test]
fn test_wrong_adduct_or_charge_finds_no_envelope() {
    let candidate = h5n2();
    let protonated = candidate.adducts[0].clone();
    let scorer = isotope_scorer(5, 2);
    let mono = candidate.precursor_mz(&protonated);
    let theoretical = candidate.elemental_composition().isotope_distribution(5);
    let spectrum = ms1(
        1.0,
        (0..5).map(|k| mono + k as f64 * NEUTRON_SHIFT).collect(),
        theoretical.iter().map(|t| t * 1000.0).collect(),
    );

    assert!(scorer.envelope(&spectrum, &candidate, &protonated).is_some());
    let sodiated = Adduct::new(&[(ChargeCarrier::Sodium, 1)]);
    assert!(scorer.envelope(&spectrum, &candidate, &sodiated).is_none());
    assert!(scorer.envelope(&spectrum, &candidate, &Adduct::protonated(2)).is_none());
}

#[test]
fn test_exact_mass_has_zero_ppm() {
    let candidate = h5n2();
    let adduct = candidate.adducts[0].clone();
    let scorer = isotope_scorer(3, 1);
    let mono = candidate.precursor_mz(&adduct);
    let theoretical = candidate.elemental_composition().isotope_distribution(3);
    let spectrum = ms1(
        1.0,
        (0..3).map(|k| mono + k as f64 * NEUTRON_SHIFT).collect(),
        theoretical.iter().map(|t| t * 500.0).collect(),
    );
    let envelope = scorer.score(&spectrum, &candidate, &adduct).unwrap();
    assert!(envelope.ppm_error.abs() < 1e-6, "{}", envelope.ppm_error);
    assert!(envelope.score > 0.999);
}

#[test]
fn test_snr_is_zero_below_floor_and_linear_above() {
    let noise = NoiseEstimate::new(100.0, 10.0);
    assert_eq!(signal_to_noise(0.0, &noise), 0.0);
    assert_eq!(signal_to_noise(50.0, &noise), 0.0);
    assert_eq!(signal_to_noise(100.0, &noise), 0.0);

    let a = signal_to_noise(150.0, &noise);
    let b = signal_to_noise(200.0, &noise);
    let c = signal_to_noise(300.0, &noise);
    assert!((a - 5.0).abs() < 1e-12);
    assert!((b - 2.0 * a).abs() < 1e-12);
    assert!((c - 4.0 * a).abs() < 1e-12);
}

fn identification_of(candidate: &GlycanCandidate, rt: f64) -> Identification {
    let adduct = candidate.adducts[0].clone();
    Identification {
        candidate_index: 0,
        candidate_id: candidate.id.clone(),
        composition: candidate.composition.clone(),
        reducing_end_tag: None,
        charge: adduct.charge(),
        precursor_mz: candidate.precursor_mz(&adduct),
        peak: ChromatographicPeak {
            target_mz: candidate.precursor_mz(&adduct),
            start_index: 0,
            apex_index: 1,
            end_index: 2,
            rt_start: rt - 0.1,
            rt_apex: rt,
            rt_end: rt + 0.1,
            apex_intensity: 1000.0,
            area: 100.0,
            truncated: false,
        },
        adduct,
        envelope: IsotopicEnvelope {
            peaks: Vec::new(),
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

fn fragment_params() -> FragmentParams {
    FragmentParams {
        tolerance: ppm10(),
        precursor_tolerance: ppm10(),
        rt_tolerance_minutes: 0.5,
        max_fragment_charge: 2,
        isolation_window_tolerance_factor: 5.0,
        max_isotopes: 3,
        report_unassigned: false,
        tie_tolerance_ppm: 1e-9,
        max_isotope_skip_charge: 3,
    }
}

fn ms2_at(rt: f64, precursor_mz: f64, mz: Vec<f64>, intensity: Vec<f64>) -> Spectrum {
    Spectrum {
        retention_time: rt,
        ms_level: MsLevel::Ms2,
        mz,
        intensity,
        precursor: Some(Precursor {
            mz: precursor_mz,
            charge: Some(1),
            isolation_lower_offset: None,
            isolation_upper_offset: None,
        }),
    }
}

#[test]
fn test_exact_fragment_is_assigned_with_zero_ppm() {
    let candidate = h5n2();
    let ident = identification_of(&candidate, 10.0);
    let oxonium =
        Monosaccharide::HexNAc.residue_composition().monoisotopic_mass() + PROTON_MASS;
    let spectrum = ms2_at(10.05, ident.precursor_mz, vec![oxonium], vec![300.0]);

    let fragments =
        FragmentAssigner::new(fragment_params()).assign(3, &spectrum, &[ident]);
    assert_eq!(fragments.len(), 1);
    assert_eq!(fragments[0].identification, Some(0));
    assert_eq!(fragments[0].spectrum_index, 3);
    assert!(fragments[0].labels.contains(&"N1 (1+)".to_string()));
    assert!(fragments[0].ppm_error.unwrap().abs() < 1e-6);
}

#[test]
fn test_no_identifications_give_no_fragments() {
    let spectrum = ms2_at(10.0, 1000.0, vec![204.0867, 366.1395], vec![100.0, 50.0]);
    let fragments = FragmentAssigner::new(fragment_params()).assign(0, &spectrum, &[]);
    assert!(fragments.is_empty());
}
