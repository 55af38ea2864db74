//! Shannon-entropy weighting and entropy similarity
//!
//! The threshold (`H < 3`) and weight formula (`0.25 + 0.25*H`) are a
//! frozen wire contract with stored indexes and must never change: an
//! index built under one rule is not comparable to a query scored under
//! another.

use crate::types::{defaults, Peak};

/// Shannon entropy of a probability vector (natural log, 0 * ln 0 := 0).
pub fn shannon_entropy(p: &[f32]) -> f32 {
    p.iter()
        .filter(|&&x| x > 0.0)
        .map(|&x| -x * x.ln())
        .sum()
}

/// Apply the entropy-weighting rule to a cleaned intensity vector that
/// sums to 1, returning a renormalized, possibly-reweighted vector.
///
/// If `H >= 3` the input is returned unchanged (still summing to 1). If
/// `H < 3`, each intensity is raised to `w = 0.25 + 0.25*H` and the
/// result renormalized.
pub fn entropy_weight(intensities: &[f32]) -> Vec<f32> {
    let h = shannon_entropy(intensities);
    if h >= defaults::ENTROPY_WEIGHT_THRESHOLD {
        return intensities.to_vec();
    }

    let w = 0.25 + 0.25 * h;
    let mut weighted: Vec<f32> = intensities.iter().map(|&p| p.powf(w)).collect();
    let sum: f64 = weighted.iter().map(|&x| x as f64).sum();
    if sum > 0.0 {
        for x in weighted.iter_mut() {
            *x = ((*x as f64) / sum) as f32;
        }
    }
    weighted
}

/// Apply [`entropy_weight`] to a cleaned spectrum's intensities in place.
pub fn entropy_weight_spectrum(peaks: &mut [Peak]) {
    let intensities: Vec<f32> = peaks.iter().map(|p| p.intensity).collect();
    let weighted = entropy_weight(&intensities);
    for (peak, w) in peaks.iter_mut().zip(weighted.into_iter()) {
        peak.intensity = w;
    }
}

#[inline]
fn f_xlogx(x: f32) -> f32 {
    if x > 0.0 {
        x * x.ln()
    } else {
        0.0
    }
}

/// Entropy similarity between two aligned intensity values already
/// known to refer to the "same" fragment (single-pair merged-entropy
/// contribution). Used as the per-match increment in the search kernels.
///
/// `S = (1/ln4) * [f(a+b) - f(a) - f(b)]`
#[inline]
pub fn pair_contribution(a: f32, b: f32) -> f32 {
    let ln4 = 4.0_f32.ln();
    (f_xlogx(a + b) - f_xlogx(a) - f_xlogx(b)) / ln4
}

/// Full entropy similarity between two aligned, equal-length intensity
/// vectors (same index space), via the merged-entropy sum over the union
/// of contributing indices.
///
/// Returns a value in `[0, 1]` (up to floating point slack).
pub fn entropy_similarity(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "aligned vectors must share an index space");
    let ln4 = 4.0_f32.ln();
    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(&ai, &bi)| f_xlogx(ai + bi) - f_xlogx(ai) - f_xlogx(bi))
        .sum();
    (sum / ln4).clamp(0.0, 1.0)
}
