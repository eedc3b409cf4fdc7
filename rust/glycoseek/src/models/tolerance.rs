use serde::{
    Deserialize,
    Serialize,
};

use crate::utils::TupleRange;

/// Mass tolerance window.
///
/// Convention: ranges are expressed as positive widths on each side, so a
/// tolerance of (1, 1) around 10 means the range (9, 11).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum MzTolerance {
    #[serde(rename = "da")]
    Absolute((f64, f64)),
    #[serde(rename = "ppm")]
    Ppm((f64, f64)),
}

impl MzTolerance {
    pub fn mz_range(&self, mz: f64) -> TupleRange<f64> {
        match self {
            MzTolerance::Absolute((low, high)) => TupleRange::around(mz, *low, *high),
            MzTolerance::Ppm((low, high)) => {
                let low = mz * (low / 1e6);
                let high = mz * (high / 1e6);
                TupleRange::around(mz, low, high)
            }
        }
    }

    pub fn contains(&self, target: f64, observed: f64) -> bool {
        self.mz_range(target).contains(observed)
    }

    /// Widens both sides of the window by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        match self {
            MzTolerance::Absolute((low, high)) => MzTolerance::Absolute((low * factor, high * factor)),
            MzTolerance::Ppm((low, high)) => MzTolerance::Ppm((low * factor, high * factor)),
        }
    }

    pub fn is_positive(&self) -> bool {
        let (low, high) = match self {
            MzTolerance::Absolute(x) => x,
            MzTolerance::Ppm(x) => x,
        };
        low.is_finite() && high.is_finite() && *low >= 0.0 && *high >= 0.0 && (low + high) > 0.0
    }
}

impl Default for MzTolerance {
    fn default() -> Self {
        MzTolerance::Ppm((10.0, 10.0))
    }
}

/// Retention time window (minutes) that the analysis is restricted to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub enum RtWindow {
    #[serde(rename = "minutes")]
    Minutes((f64, f64)),
    #[default]
    #[serde(rename = "unrestricted")]
    Unrestricted,
}

impl RtWindow {
    pub fn contains(&self, rt: f64) -> bool {
        match self {
            RtWindow::Minutes((start, end)) => *start <= rt && rt <= *end,
            RtWindow::Unrestricted => true,
        }
    }

    /// Index range `start..end` of the samples of a sorted retention time
    /// array that fall inside the window.
    pub fn index_range(&self, retention_times: &[f64]) -> std::ops::Range<usize> {
        match self {
            RtWindow::Minutes((start, end)) => {
                let lo = retention_times.partition_point(|rt| rt < start);
                let hi = lo + retention_times[lo..].partition_point(|rt| rt <= end);
                lo..hi
            }
            RtWindow::Unrestricted => 0..retention_times.len(),
        }
    }
}
