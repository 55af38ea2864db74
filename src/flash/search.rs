//! The four similarity-search algorithms: open, identity, neutral-loss,
//! hybrid. All four share the same range-query primitive and dedup
//! discipline; only the axis scanned (and, for identity, the candidate
//! filter) differs.

use super::{FlashIndex, NeutralLossArrays};
use crate::config::Cancellation;
use crate::entropy::pair_contribution;
use crate::error::EntropySearchResult;
use crate::types::Peak;
use std::collections::{HashMap, HashSet};

/// Locate the index range of `sorted` within `[lo, hi]` via binary
/// search: O(log n) plus output size.
fn range_query(sorted: &[f32], lo: f32, hi: f32) -> std::ops::Range<usize> {
    let start = sorted.partition_point(|&x| x < lo);
    let end = sorted.partition_point(|&x| x <= hi);
    start..end
}

/// Per-query scratch state: which (spectrum, local peak index) pairs
/// have already been credited on a given axis, so a reference peak is
/// never consumed twice.
#[derive(Default)]
struct ConsumedSet(HashMap<u64, HashSet<u32>>);

impl ConsumedSet {
    fn is_consumed(&self, spec_idx: u64, local_idx: u32) -> bool {
        self.0
            .get(&spec_idx)
            .is_some_and(|set| set.contains(&local_idx))
    }

    fn mark(&mut self, spec_idx: u64, local_idx: u32) {
        self.0.entry(spec_idx).or_default().insert(local_idx);
    }
}

/// For one query peak, the best not-yet-consumed match per candidate
/// spectrum on one axis: `spec_idx -> (contribution, local_idx)`.
fn best_unconsumed_matches(
    axis_mz: &[f32],
    axis_intensity: &[f32],
    axis_spec_idx: &[u64],
    axis_local_idx: &[u32],
    query_mz: f32,
    query_intensity: f32,
    tolerance: f32,
    consumed: &ConsumedSet,
    candidate_filter: Option<&HashSet<u64>>,
) -> HashMap<u64, (f32, u32)> {
    let range = range_query(axis_mz, query_mz - tolerance, query_mz + tolerance);
    let mut best: HashMap<u64, (f32, u32)> = HashMap::new();
    for i in range {
        let spec_idx = axis_spec_idx[i];
        let local_idx = axis_local_idx[i];
        if consumed.is_consumed(spec_idx, local_idx) {
            continue;
        }
        if let Some(filter) = candidate_filter {
            if !filter.contains(&spec_idx) {
                continue;
            }
        }
        let contribution = pair_contribution(query_intensity, axis_intensity[i]);
        best.entry(spec_idx)
            .and_modify(|(best_contrib, best_local)| {
                if contribution > *best_contrib {
                    *best_contrib = contribution;
                    *best_local = local_idx;
                }
            })
            .or_insert((contribution, local_idx));
    }
    best
}

/// Single-axis accumulation used by open, identity, and neutral-loss:
/// scan every query peak against one sorted axis, crediting each
/// (query peak, reference spectrum) pair's best unconsumed reference
/// peak exactly once.
fn accumulate_single_axis(
    n_spectra: usize,
    axis_mz: &[f32],
    axis_intensity: &[f32],
    axis_spec_idx: &[u64],
    axis_local_idx: &[u32],
    query_peaks: &[(f32, f32)],
    tolerance: f32,
    candidate_filter: Option<&HashSet<u64>>,
    cancellation: Option<&Cancellation>,
) -> EntropySearchResult<Vec<f32>> {
    let mut score = vec![0.0f32; n_spectra];
    let mut consumed = ConsumedSet::default();

    for &(query_mz, query_intensity) in query_peaks {
        if let Some(c) = cancellation {
            if c.is_cancelled() {
                return Err(crate::error::EntropySearchError::Cancelled);
            }
        }
        let matches = best_unconsumed_matches(
            axis_mz,
            axis_intensity,
            axis_spec_idx,
            axis_local_idx,
            query_mz,
            query_intensity,
            tolerance,
            &consumed,
            candidate_filter,
        );
        for (spec_idx, (contribution, local_idx)) in matches {
            score[spec_idx as usize] += contribution;
            consumed.mark(spec_idx, local_idx);
        }
    }

    Ok(score)
}

fn query_pairs(peaks: &[Peak]) -> Vec<(f32, f32)> {
    peaks.iter().map(|p| (p.mz, p.intensity)).collect()
}

/// Open search: direct fragment m/z alignment within tolerance, no
/// precursor constraint.
pub fn open_search(
    index: &FlashIndex,
    query_peaks: &[Peak],
    ms2_tolerance: f32,
) -> EntropySearchResult<Vec<f32>> {
    accumulate_single_axis(
        index.n_spectra,
        &index.all_peaks_mz,
        &index.all_peaks_intensity,
        &index.all_peaks_spec_idx,
        &index.all_ions_idx_for_peak,
        &query_pairs(query_peaks),
        ms2_tolerance,
        None,
        None,
    )
}

/// Identity search: open search restricted to reference spectra whose
/// precursor m/z is within `ms1_tolerance` of the query precursor.
pub fn identity_search(
    index: &FlashIndex,
    query_precursor_mz: f32,
    query_peaks: &[Peak],
    ms1_tolerance: f32,
    ms2_tolerance: f32,
) -> EntropySearchResult<Vec<f32>> {
    let candidates: HashSet<u64> = index
        .precursor_candidates(query_precursor_mz, ms1_tolerance)
        .into_iter()
        .collect();
    accumulate_single_axis(
        index.n_spectra,
        &index.all_peaks_mz,
        &index.all_peaks_intensity,
        &index.all_peaks_spec_idx,
        &index.all_ions_idx_for_peak,
        &query_pairs(query_peaks),
        ms2_tolerance,
        Some(&candidates),
        None,
    )
}

/// Neutral-loss search: alignment of `precursor_mz - fragment_mz`
/// within tolerance.
pub fn neutral_loss_search(
    index: &FlashIndex,
    query_precursor_mz: f32,
    query_peaks: &[Peak],
    ms2_tolerance: f32,
) -> EntropySearchResult<Vec<f32>> {
    let nl = index.require_neutral_loss("neutral_loss")?;
    let query_losses: Vec<(f32, f32)> = query_peaks
        .iter()
        .map(|p| (query_precursor_mz - p.mz, p.intensity))
        .collect();
    accumulate_single_axis(
        index.n_spectra,
        &nl.all_peaks_mz,
        &nl.all_peaks_intensity,
        &nl.all_peaks_spec_idx,
        &nl.all_ions_idx_for_peak,
        &query_losses,
        ms2_tolerance,
        None,
        None,
    )
}

/// Hybrid search: per query peak and per candidate reference spectrum,
/// credit the maximum of the open-search contribution (direct m/z
/// alignment) and the neutral-loss contribution (precursor-delta
/// alignment) — never both for the same (query peak, reference peak)
/// pair.
pub fn hybrid_search(
    index: &FlashIndex,
    query_precursor_mz: f32,
    query_peaks: &[Peak],
    ms2_tolerance: f32,
) -> EntropySearchResult<Vec<f32>> {
    let nl = index.require_neutral_loss("hybrid")?;
    let mut score = vec![0.0f32; index.n_spectra];
    // One consumed-set shared by both axes: `local_idx` identifies the same
    // physical reference peak in both `index` and `nl` (they are built from
    // the same per-spectrum peak enumeration), so crediting a peak on
    // either axis must be visible to the other.
    let mut consumed = ConsumedSet::default();

    for peak in query_peaks {
        let open_matches = best_unconsumed_matches(
            &index.all_peaks_mz,
            &index.all_peaks_intensity,
            &index.all_peaks_spec_idx,
            &index.all_ions_idx_for_peak,
            peak.mz,
            peak.intensity,
            ms2_tolerance,
            &consumed,
            None,
        );
        let nl_query_mz = query_precursor_mz - peak.mz;
        let nl_matches = best_unconsumed_matches(
            &nl.all_peaks_mz,
            &nl.all_peaks_intensity,
            &nl.all_peaks_spec_idx,
            &nl.all_ions_idx_for_peak,
            nl_query_mz,
            peak.intensity,
            ms2_tolerance,
            &consumed,
            None,
        );

        merge_hybrid_matches(&open_matches, &nl_matches, &mut score, &mut consumed);
    }

    Ok(score)
}

fn merge_hybrid_matches(
    open_matches: &HashMap<u64, (f32, u32)>,
    nl_matches: &HashMap<u64, (f32, u32)>,
    score: &mut [f32],
    consumed: &mut ConsumedSet,
) {
    let all_spectra: HashSet<u64> = open_matches
        .keys()
        .chain(nl_matches.keys())
        .copied()
        .collect();

    for spec_idx in all_spectra {
        let open = open_matches.get(&spec_idx);
        let nl = nl_matches.get(&spec_idx);
        match (open, nl) {
            (Some(&(open_contrib, open_local)), Some(&(nl_contrib, nl_local))) => {
                if open_contrib >= nl_contrib {
                    score[spec_idx as usize] += open_contrib;
                    consumed.mark(spec_idx, open_local);
                } else {
                    score[spec_idx as usize] += nl_contrib;
                    consumed.mark(spec_idx, nl_local);
                }
            }
            (Some(&(open_contrib, open_local)), None) => {
                score[spec_idx as usize] += open_contrib;
                consumed.mark(spec_idx, open_local);
            }
            (None, Some(&(nl_contrib, nl_local))) => {
                score[spec_idx as usize] += nl_contrib;
                consumed.mark(spec_idx, nl_local);
            }
            (None, None) => unreachable!("spec_idx came from one of the two maps"),
        }
    }
}

#[allow(dead_code)]
pub(super) fn neutral_loss_axis(index: &FlashIndex) -> Option<&NeutralLossArrays> {
    index.neutral_loss.as_ref()
}
