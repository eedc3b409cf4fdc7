//! Multi-peak detection on extracted ion chromatograms.
//!
//! Apexes are located greedily on a smoothed copy of the trace, highest
//! first, and every claimed region is masked so lower maxima inside it are
//! never picked again. Touching regions are then merged unless a genuine
//! valley separates them. Intensities, apexes and areas are always read from
//! the raw trace.

use std::ops::Range;

use crate::errors::DataProcessingError;
use crate::models::{
    ChromatographicPeak,
    Eic,
    RtWindow,
};
use crate::utils::math::{
    gaussblur_in_place,
    trapezoid,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakPickingParams {
    /// Peaks with fewer samples are rejected as spikes.
    pub min_width: usize,
    /// Peaks spanning more minutes are rejected as baseline drift.
    pub max_width_minutes: f64,
    /// Boundaries stop before the trace falls to this fraction of the apex
    /// height over the trace minimum.
    pub boundary_fraction: f64,
    /// Two touching peaks are kept apart only when the valley between them
    /// drops below this fraction of the smaller apex.
    pub valley_depth_fraction: f64,
    pub smoothing_passes: usize,
    pub rt_window: RtWindow,
    /// Keep only the most intense peak and this many peaks closest to it.
    pub close_peaks: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Region {
    start: usize,
    apex: usize,
    end: usize,
}

/// Reusable peak picker, keep one per worker thread.
#[derive(Debug)]
pub struct PeakPicker {
    params: PeakPickingParams,
    smoothed: Vec<f64>,
    exclusions: Vec<Range<usize>>,
    regions: Vec<Region>,
}

impl PeakPicker {
    pub fn new(params: PeakPickingParams) -> Self {
        Self {
            params,
            smoothed: Vec::new(),
            exclusions: Vec::new(),
            regions: Vec::new(),
        }
    }

    pub fn params(&self) -> &PeakPickingParams {
        &self.params
    }

    /// Detects the chromatographic peaks of `eic` whose raw apex reaches
    /// `threshold`, in retention time order.
    #[cfg_attr(
        feature = "instrumentation",
        tracing::instrument(skip(self, eic), level = "trace")
    )]
    pub fn pick(
        &mut self,
        eic: &Eic,
        threshold: f64,
    ) -> Result<Vec<ChromatographicPeak>, DataProcessingError> {
        if eic.retention_times.len() != eic.intensities.len() {
            return Err(DataProcessingError::ExpectedSlicesSameLength {
                expected: eic.retention_times.len(),
                other: eic.intensities.len(),
                context: "eic arrays in peak picking".to_string(),
            });
        }
        let window = self.params.rt_window.index_range(&eic.retention_times);
        if window.is_empty() {
            return Ok(Vec::new());
        }
        let raw = &eic.intensities[window.clone()];
        let rts = &eic.retention_times[window.clone()];

        self.smoothed.clear();
        self.smoothed.extend_from_slice(raw);
        for _ in 0..self.params.smoothing_passes {
            gaussblur_in_place(&mut self.smoothed);
        }

        self.find_regions(threshold);
        self.merge_regions();

        let mut out = Vec::with_capacity(self.regions.len());
        for region in self.regions.iter() {
            let Some(apex) = argmax(&raw[region.start..=region.end]).map(|x| x + region.start)
            else {
                continue;
            };
            if raw[apex] < threshold || raw[apex] <= 0.0 {
                continue;
            }
            let num_samples = region.end - region.start + 1;
            if num_samples < self.params.min_width {
                continue;
            }
            if rts[region.end] - rts[region.start] > self.params.max_width_minutes {
                continue;
            }
            let truncated = region.start == 0 || region.end == raw.len() - 1;
            let area = trapezoid(
                &rts[region.start..=region.end],
                &raw[region.start..=region.end],
            );
            out.push(ChromatographicPeak::try_new(
                eic,
                region.start + window.start,
                apex + window.start,
                region.end + window.start,
                area,
                truncated,
            )?);
        }
        if let Some(n) = self.params.close_peaks {
            keep_close_peaks(&mut out, n);
        }
        Ok(out)
    }

    fn find_regions(&mut self, threshold: f64) {
        self.exclusions.clear();
        self.regions.clear();
        // Every blur pass keeps at least half of a sample's own value, so no
        // sample reaching the threshold is smoothed below this level.
        let stop_level = threshold * 0.5f64.powi(self.params.smoothing_passes as i32);
        let baseline = self
            .smoothed
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::INFINITY, f64::min)
            .max(0.0);
        while let Some((value, apex)) = self.next_peak() {
            if value <= 0.0 || value <= baseline || value < stop_level {
                break;
            }
            let cutoff = baseline + (value - baseline) * self.params.boundary_fraction;
            let raise = self.count_falling_steps(apex, -1, cutoff);
            let fall = self.count_falling_steps(apex, 1, cutoff);
            let region = Region {
                start: apex - raise,
                apex,
                end: apex + fall,
            };
            self.mask_peak(&region);
            self.regions.push(region);
        }
        self.regions.sort_by_key(|r| r.start);
    }

    fn next_peak(&self) -> Option<(f64, usize)> {
        let mut best_val = f64::NEG_INFINITY;
        let mut best_idx = None;

        for (i, &val) in self.smoothed.iter().enumerate() {
            if val.is_nan() || self.is_excluded(i) {
                continue;
            }
            if val > best_val {
                best_val = val;
                best_idx = Some(i);
            }
        }

        best_idx.map(|i| (best_val, i))
    }

    fn is_excluded(&self, i: usize) -> bool {
        self.exclusions.iter().any(|r| r.contains(&i))
    }

    fn mask_peak(&mut self, region: &Region) {
        self.exclusions.push(region.start..(region.end + 1));
    }

    /// Number of steps from `start` in direction `step` while the trace keeps
    /// strictly falling and stays above `cutoff` without reaching another
    /// region. A plateau ends the walk.
    fn count_falling_steps(&self, start: usize, step: isize, cutoff: f64) -> usize {
        let slc = &self.smoothed;
        let mut count = 0;
        let mut current = start;
        loop {
            let next = current as isize + step;
            if next < 0 || next as usize >= slc.len() {
                break;
            }
            let next = next as usize;
            if slc[next] >= slc[current] || slc[next] <= cutoff || self.is_excluded(next) {
                break;
            }
            current = next;
            count += 1;
        }
        count
    }

    /// Merges touching regions that are not separated by a deep enough valley
    /// or whose apexes sit closer than the minimum peak width.
    fn merge_regions(&mut self) {
        let mut merged: Vec<Region> = Vec::with_capacity(self.regions.len());
        for region in self.regions.drain(..) {
            match merged.last_mut() {
                Some(last)
                    if last.end + 1 >= region.start
                        && should_merge(
                            &self.smoothed,
                            last,
                            &region,
                            self.params.valley_depth_fraction,
                            self.params.min_width,
                        ) =>
                {
                    let apex = if self.smoothed[region.apex] > self.smoothed[last.apex] {
                        region.apex
                    } else {
                        last.apex
                    };
                    *last = Region {
                        start: last.start.min(region.start),
                        apex,
                        end: last.end.max(region.end),
                    };
                }
                _ => merged.push(region),
            }
        }
        self.regions = merged;
    }
}

fn should_merge(
    smoothed: &[f64],
    left: &Region,
    right: &Region,
    valley_depth_fraction: f64,
    min_width: usize,
) -> bool {
    let (lo, hi) = if left.apex <= right.apex {
        (left.apex, right.apex)
    } else {
        (right.apex, left.apex)
    };
    if hi - lo < min_width {
        return true;
    }
    let valley = smoothed[lo..=hi]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    let smaller_apex = smoothed[left.apex].min(smoothed[right.apex]);
    valley >= valley_depth_fraction * smaller_apex
}

/// Keeps the most intense peak and the `n` peaks whose apexes are closest
/// to it in retention time, preserving retention time order.
fn keep_close_peaks(peaks: &mut Vec<ChromatographicPeak>, n: usize) {
    let Some(best) = argmax(&peaks.iter().map(|p| p.apex_intensity).collect::<Vec<_>>()) else {
        return;
    };
    let best_rt = peaks[best].rt_apex;
    let mut order: Vec<usize> = (0..peaks.len()).filter(|i| *i != best).collect();
    order.sort_by(|a, b| {
        let da = (peaks[*a].rt_apex - best_rt).abs();
        let db = (peaks[*b].rt_apex - best_rt).abs();
        da.total_cmp(&db).then(a.cmp(b))
    });
    order.truncate(n);
    order.push(best);
    order.sort_unstable();
    let mut keep = order.into_iter().peekable();
    let mut idx = 0;
    peaks.retain(|_| {
        let kept = keep.next_if_eq(&idx).is_some();
        idx += 1;
        kept
    });
}

/// Index of the first maximum.
fn argmax(x: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in x.iter().enumerate() {
        match best {
            Some((_, b)) if *v <= b => {}
            _ => best = Some((i, *v)),
        }
    }
    best.map(|(i, _)| i)
}
