//! Filtering, deduplication and ranking of identifications.
//!
//! Worker results arrive in any order; everything here is order independent
//! so the output is identical across runs and thread counts.

use serde::Serialize;
use std::cmp::Ordering;

use crate::models::Identification;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AggregationStats {
    pub discarded_ppm: usize,
    pub below_threshold: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IdentificationAggregator {
    pub max_ppm_error: f64,
    pub acceptance_threshold: f64,
}

impl IdentificationAggregator {
    pub fn new(max_ppm_error: f64, acceptance_threshold: f64) -> Self {
        Self {
            max_ppm_error,
            acceptance_threshold,
        }
    }

    /// Drops out of tolerance and low confidence records, removes duplicates
    /// and sorts by composition, retention time and descending confidence.
    pub fn aggregate(&self, raw: Vec<Identification>) -> (Vec<Identification>, AggregationStats) {
        let mut stats = AggregationStats::default();
        let mut kept: Vec<Identification> = Vec::with_capacity(raw.len());
        for ident in raw {
            let ppm = ident.ppm_error();
            if !(ppm.is_finite() && ppm.abs() <= self.max_ppm_error) {
                stats.discarded_ppm += 1;
                continue;
            }
            if ident.confidence < self.acceptance_threshold {
                stats.below_threshold += 1;
                continue;
            }
            kept.push(ident);
        }

        // Duplicates end up adjacent, best confidence first.
        kept.sort_by(|a, b| {
            identity_cmp(a, b).then_with(|| b.confidence.total_cmp(&a.confidence))
        });
        let before = kept.len();
        kept.dedup_by(|later, earlier| identity_cmp(later, earlier) == Ordering::Equal);
        stats.duplicates = before - kept.len();

        kept.sort_by(ranking_cmp);
        (kept, stats)
    }
}

/// Two identifications are the same call when candidate, adduct, charge and
/// peak all match.
fn identity_cmp(a: &Identification, b: &Identification) -> Ordering {
    a.candidate_index
        .cmp(&b.candidate_index)
        .then_with(|| a.adduct.cmp(&b.adduct))
        .then_with(|| a.charge.cmp(&b.charge))
        .then_with(|| a.peak.start_index.cmp(&b.peak.start_index))
        .then_with(|| a.peak.apex_index.cmp(&b.peak.apex_index))
        .then_with(|| a.peak.end_index.cmp(&b.peak.end_index))
}

fn ranking_cmp(a: &Identification, b: &Identification) -> Ordering {
    a.composition
        .to_string()
        .cmp(&b.composition.to_string())
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        .then_with(|| a.peak.rt_apex.total_cmp(&b.peak.rt_apex))
        .then_with(|| b.confidence.total_cmp(&a.confidence))
        .then_with(|| identity_cmp(a, b))
}
