//! Small numeric helpers shared by the scorers.

/// Relative mass deviation in parts per million.
///
/// Positive when the observed value is heavier than the theoretical one.
///
/// ```
/// use glycoseek::utils::math::ppm_error;
///
/// assert_eq!(ppm_error(1000.0, 1000.0), 0.0);
/// assert!((ppm_error(1000.001, 1000.0) - 1.0).abs() < 1e-6);
/// ```
pub fn ppm_error(observed: f64, theoretical: f64) -> f64 {
    (observed - theoretical) / theoretical * 1e6
}

/// Linearly interpolated percentile of an already sorted slice.
///
/// `pct` is on the 0-100 scale. Returns `None` for empty input.
pub fn percentile_sorted(sorted: &[f64], pct: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pct = pct.clamp(0.0, 100.0);
    let rank = (pct / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Sorts a copy of the data (NaN values dropped) and returns its percentile.
pub fn percentile(data: &[f64], pct: f64) -> Option<f64> {
    let sorted = sorted_finite(data);
    percentile_sorted(&sorted, pct)
}

pub fn median(data: &[f64]) -> Option<f64> {
    percentile(data, 50.0)
}

/// Median absolute deviation scaled to be consistent with the standard
/// deviation of normally distributed data.
pub fn scaled_mad(data: &[f64], center: f64) -> Option<f64> {
    const MAD_SCALE: f64 = 1.4826;
    let deviations: Vec<f64> = data
        .iter()
        .filter(|x| x.is_finite())
        .map(|x| (x - center).abs())
        .collect();
    median(&deviations).map(|x| x * MAD_SCALE)
}

pub fn sorted_finite(data: &[f64]) -> Vec<f64> {
    let mut out: Vec<f64> = data.iter().copied().filter(|x| x.is_finite()).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    out
}

/// Trapezoidal integral of `y` over `x`.
///
/// Mismatched lengths integrate over the shorter of the two.
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xw, yw)| (xw[1] - xw[0]) * (yw[0] + yw[1]) * 0.5)
        .sum()
}

pub fn gaussian(x: f64, amplitude: f64, mean: f64, sigma: f64) -> f64 {
    let z = (x - mean) / sigma;
    amplitude * (-0.5 * z * z).exp()
}

/// Gaussian weights over `len` consecutive points, centered on the middle
/// of the run with a standard deviation of a sixth of its span, scaled so
/// the largest weight is 1.
///
/// Runs shorter than three points are weighted uniformly.
pub fn centered_gaussian_weights(len: usize) -> Vec<f64> {
    if len < 3 {
        return vec![1.0; len];
    }
    let mean = len as f64 / 2.0;
    let sigma = (len - 1) as f64 / 6.0;
    let weights: Vec<f64> = (0..len).map(|i| gaussian(i as f64, 1.0, mean, sigma)).collect();
    let max = weights.iter().copied().fold(0.0, f64::max);
    if max > 0.0 {
        weights.into_iter().map(|w| w / max).collect()
    } else {
        vec![1.0; len]
    }
}

/// Weighted arithmetic mean of `(value, weight)` pairs.
///
/// `None` when the weights sum to zero.
pub fn weighted_mean(pairs: impl IntoIterator<Item = (f64, f64)>) -> Option<f64> {
    let (sum, total) = pairs
        .into_iter()
        .fold((0.0, 0.0), |(sum, total), (v, w)| (sum + v * w, total + w));
    if total > 0.0 { Some(sum / total) } else { None }
}

/// Applies a 1D Gaussian blur in-place.
pub fn gaussblur_in_place(x: &mut [f64]) {
    let len = x.len();
    if len < 3 {
        return;
    }
    const W_SIDE: f64 = 0.5;
    const W_CENTER: f64 = 1.0;
    const NORM: f64 = 2.0;

    let mut prev_val = x[0];
    x[0] = (x[0] * 1.5 + x[1] * 0.5) / NORM;

    for i in 1..len - 1 {
        let current_val = x[i];
        x[i] = (prev_val * W_SIDE + current_val * W_CENTER + x[i + 1] * W_SIDE) / NORM;
        prev_val = current_val;
    }
    x[len - 1] = (x[len - 1] * 1.5 + prev_val * 0.5) / NORM;
}
