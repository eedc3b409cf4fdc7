use super::noise::NoiseEstimate;

/// Signal to noise of a peak apex, `(apex - floor) / dispersion`.
///
/// Apexes at or below the floor report zero, never a negative ratio.
pub fn signal_to_noise(apex_intensity: f64, noise: &NoiseEstimate) -> f64 {
    let signal = apex_intensity - noise.floor;
    if signal.is_nan() || signal <= 0.0 {
        return 0.0;
    }
    signal / noise.dispersion
}
