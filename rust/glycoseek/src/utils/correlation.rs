use crate::errors::{
    DataProcessingError,
    Result,
};

/// Calculates the cosine similarity between two vectors of the same size.
///
/// Returns `NaN` when either vector has zero magnitude.
///
/// # Example
///
/// ```
/// use glycoseek::utils::correlation::cosine_similarity;
///
/// let a = vec![1.0, 2.0, 3.0];
/// let b = vec![2.0, 4.0, 6.0];
/// let result = cosine_similarity(&a, &b).unwrap();
/// assert!((result - 1.0).abs() < 1e-12);
/// ```
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() || a.is_empty() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: a.len(),
            other: b.len(),
            context: "cosine_similarity".to_string(),
        }
        .into());
    }

    let dot_product: f64 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    let magnitude_a: f64 = a.iter().map(|&x| x * x).sum::<f64>().sqrt();
    let magnitude_b: f64 = b.iter().map(|&x| x * x).sum::<f64>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return Ok(f64::NAN);
    }

    Ok(dot_product / (magnitude_a * magnitude_b))
}

/// Coefficient of determination of `predicted` against `observed`.
///
/// Computed as `1 - SSE / SST` and clamped to `[0, 1]`. A flat observation
/// has no variance to explain and scores 0.
pub fn r_squared(observed: &[f64], predicted: &[f64]) -> Result<f64> {
    if observed.len() != predicted.len() {
        return Err(DataProcessingError::ExpectedSlicesSameLength {
            expected: observed.len(),
            other: predicted.len(),
            context: "r_squared".to_string(),
        }
        .into());
    }
    if observed.is_empty() {
        return Err(DataProcessingError::ExpectedNonEmptyData {
            context: Some("r_squared".to_string()),
        }
        .into());
    }
    let n = observed.len() as f64;
    let mean = observed.iter().sum::<f64>() / n;
    let sst: f64 = observed.iter().map(|y| (y - mean).powi(2)).sum();
    let sse: f64 = observed
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if !sse.is_finite() {
        return Err(DataProcessingError::ExpectedFiniteNonNanData {
            context: "r_squared residuals".to_string(),
        }
        .into());
    }
    if sst <= 0.0 {
        return Ok(0.0);
    }
    Ok((1.0 - sse / sst).clamp(0.0, 1.0))
}
