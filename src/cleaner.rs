//! Deterministic peak-list normalization
//!
//! Every spectrum passes through [`clean`] before it is indexed or used
//! as a query. The seven steps run in fixed order; each consumes the
//! previous step's output.

use crate::types::{defaults, Peak};

/// Tunables for [`clean`]. Defaults match the search engine's wire
/// contract exactly.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct CleanOptions {
    pub max_mz: Option<f32>,
    pub noise_threshold: f32,
    pub min_ms2_diff_da: f32,
    pub max_peak_num: Option<usize>,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            max_mz: None,
            noise_threshold: defaults::NOISE_THRESHOLD,
            min_ms2_diff_da: defaults::MIN_MS2_DIFFERENCE_DA,
            max_peak_num: None,
        }
    }
}

impl CleanOptions {
    /// `max_mz` derived from a precursor, minus the removal window
    /// (default 1.6 Da).
    pub fn with_precursor_cutoff(mut self, precursor_mz: f32, removal_da: f32) -> Self {
        self.max_mz = Some(precursor_mz - removal_da);
        self
    }
}

/// Run the seven-step cleaning pipeline over `peaks`, producing a
/// canonical peak list: sorted by `mz`, centroided, denoised, capped, and
/// renormalized to sum to 1.
///
/// Returns an empty vector for empty or fully-degenerate input; this is
/// not an error.
pub fn clean(peaks: &[Peak], options: &CleanOptions) -> Vec<Peak> {
    if peaks.is_empty() {
        return Vec::new();
    }

    // 1. Drop non-finite / non-positive peaks.
    let mut out: Vec<Peak> = peaks
        .iter()
        .copied()
        .filter(Peak::is_finite_and_positive)
        .collect();

    // 2. Drop peaks above max_mz (typically precursor_mz - removal window).
    if let Some(max_mz) = options.max_mz {
        out.retain(|p| p.mz <= max_mz);
    }

    if out.is_empty() {
        return Vec::new();
    }

    // 3. Sort by mz ascending, stable.
    out.sort_by(|a, b| a.mz.partial_cmp(&b.mz).expect("finite mz checked above"));

    // 4. Centroid merge of runs within min_ms2_diff_da of the run centroid.
    out = centroid_merge(&out, options.min_ms2_diff_da);

    // 5. Drop peaks below noise_threshold * Imax.
    let i_max = out
        .iter()
        .map(|p| p.intensity)
        .fold(0.0_f32, f32::max);
    if i_max > 0.0 {
        let cutoff = options.noise_threshold * i_max;
        out.retain(|p| p.intensity >= cutoff);
    }

    // 6. Keep the max_peak_num highest-intensity peaks, ties by smaller mz.
    if let Some(max_peak_num) = options.max_peak_num {
        if out.len() > max_peak_num {
            out.sort_by(|a, b| {
                b.intensity
                    .partial_cmp(&a.intensity)
                    .unwrap()
                    .then_with(|| a.mz.partial_cmp(&b.mz).unwrap())
            });
            out.truncate(max_peak_num);
            out.sort_by(|a, b| a.mz.partial_cmp(&b.mz).unwrap());
        }
    }

    // 7. Normalize intensities to sum to 1.
    normalize_in_place(&mut out);

    out
}

/// Walk left-to-right merging adjacent peaks whose `mz` is within
/// `min_ms2_diff_da` of the *running centroid* of the current run (not
/// the last raw peak). Merged `mz` is the intensity-weighted mean;
/// merged intensity is the sum.
fn centroid_merge(sorted: &[Peak], min_ms2_diff_da: f32) -> Vec<Peak> {
    let mut merged = Vec::with_capacity(sorted.len());
    let mut iter = sorted.iter();

    let Some(first) = iter.next() else {
        return merged;
    };
    let mut run_mz = first.mz;
    let mut run_intensity = first.intensity;
    let mut weighted_mz_sum = (first.mz as f64) * (first.intensity as f64);

    for peak in iter {
        if (peak.mz - run_mz).abs() < min_ms2_diff_da {
            run_intensity += peak.intensity;
            weighted_mz_sum += (peak.mz as f64) * (peak.intensity as f64);
            run_mz = (weighted_mz_sum / (run_intensity as f64)) as f32;
        } else {
            merged.push(Peak::new(run_mz, run_intensity));
            run_mz = peak.mz;
            run_intensity = peak.intensity;
            weighted_mz_sum = (peak.mz as f64) * (peak.intensity as f64);
        }
    }
    merged.push(Peak::new(run_mz, run_intensity));

    debug_assert!(
        merged.windows(2).all(|w| w[0].mz <= w[1].mz),
        "centroid merge must preserve mz order since it only consumes adjacent peaks"
    );

    merged
}

fn normalize_in_place(peaks: &mut [Peak]) {
    let sum: f64 = peaks.iter().map(|p| p.intensity as f64).sum();
    if sum <= 0.0 {
        return;
    }
    for p in peaks.iter_mut() {
        p.intensity = ((p.intensity as f64) / sum) as f32;
    }
}
