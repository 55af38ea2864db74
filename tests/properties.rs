//! Property-based tests for the invariants the cleaner, entropy, and
//! search kernels must hold for arbitrary inputs, not just hand-picked
//! scenarios.

use entropy_search::cleaner::{clean, CleanOptions};
use entropy_search::entropy::{entropy_similarity, entropy_weight, shannon_entropy};
use entropy_search::flash::{open_search, CleanedSpectrum, FlashIndex};
use entropy_search::types::Peak;
use proptest::prelude::*;

fn arb_peaks(max_len: usize) -> impl Strategy<Value = Vec<Peak>> {
    proptest::collection::vec(
        (1.0f32..2000.0, 0.001f32..1.0).prop_map(|(mz, intensity)| Peak::new(mz, intensity)),
        0..max_len,
    )
}

fn arb_probability_vector(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<f32>> {
    proptest::collection::vec(0.001f32..1.0, len).prop_map(|raw| {
        let sum: f32 = raw.iter().sum();
        raw.iter().map(|&x| x / sum).collect()
    })
}

proptest! {
    #[test]
    fn clean_output_is_sorted_and_normalized(peaks in arb_peaks(40)) {
        let out = clean(&peaks, &CleanOptions::default());
        prop_assert!(out.windows(2).all(|w| w[0].mz < w[1].mz));
        let sum: f32 = out.iter().map(|p| p.intensity).sum();
        if !out.is_empty() {
            prop_assert!((sum - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn clean_is_idempotent(peaks in arb_peaks(40)) {
        let once = clean(&peaks, &CleanOptions::default());
        let twice = clean(&once, &CleanOptions::default());
        prop_assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            prop_assert!((a.mz - b.mz).abs() < 1e-3);
            prop_assert!((a.intensity - b.intensity).abs() < 1e-3);
        }
    }

    #[test]
    fn clean_never_exceeds_max_peak_num(peaks in arb_peaks(60), cap in 1usize..20) {
        let opts = CleanOptions {
            max_peak_num: Some(cap),
            ..Default::default()
        };
        let out = clean(&peaks, &opts);
        prop_assert!(out.len() <= cap);
    }

    #[test]
    fn entropy_weight_preserves_normalization(p in arb_probability_vector(1..30)) {
        let weighted = entropy_weight(&p);
        let sum: f32 = weighted.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-3);
    }

    #[test]
    fn entropy_is_non_negative(p in arb_probability_vector(1..30)) {
        let h = shannon_entropy(&p);
        prop_assert!(h >= -1e-5);
    }

    #[test]
    fn entropy_similarity_is_symmetric(
        a in arb_probability_vector(2..20),
        b in arb_probability_vector(2..20),
    ) {
        let len = a.len().min(b.len());
        let a = &a[..len];
        let b = &b[..len];
        prop_assert!((entropy_similarity(a, b) - entropy_similarity(b, a)).abs() < 1e-4);
    }

    #[test]
    fn entropy_self_similarity_is_one(p in arb_probability_vector(1..30)) {
        prop_assert!((entropy_similarity(&p, &p) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn open_search_never_double_credits_a_reference_peak(
        ref_peaks in proptest::collection::vec(1.0f32..20.0, 1..5),
        query_mz_offsets in proptest::collection::vec(-0.005f32..0.005, 2..12),
    ) {
        // A handful of reference peaks, spaced far enough apart that
        // each query peak can only fall within tolerance of one of
        // them. Many query peaks cluster around the same reference
        // peaks (by reusing `ref_peaks[i % len]` below), so a correct
        // dedup bitmap must cap each reference peak's contribution at
        // one credit no matter how many query peaks target it.
        let ref_mzs: Vec<f32> = ref_peaks.iter().enumerate().map(|(i, _)| 100.0 + i as f32 * 10.0).collect();
        let spectrum = CleanedSpectrum {
            precursor_mz: 500.0,
            peaks: ref_mzs.iter().map(|&mz| Peak::new(mz, 1.0 / ref_mzs.len() as f32)).collect(),
        };
        let index = FlashIndex::build(&[spectrum], false);

        let query_peaks: Vec<Peak> = query_mz_offsets
            .iter()
            .enumerate()
            .map(|(i, &offset)| {
                let target = ref_mzs[i % ref_mzs.len()];
                Peak::new(target + offset, 1.0 / query_mz_offsets.len() as f32)
            })
            .collect();

        let scores = open_search(&index, &query_peaks, 0.02).unwrap();
        prop_assert!(scores[0] <= 1.0 + 1e-4, "open search score {} exceeds the [0, 1] range", scores[0]);
    }

    #[test]
    fn entropy_similarity_is_bounded(
        a in arb_probability_vector(2..20),
        b in arb_probability_vector(2..20),
    ) {
        let len = a.len().min(b.len());
        let a = &a[..len];
        let b = &b[..len];
        let s = entropy_similarity(a, b);
        prop_assert!((-1e-5..=1.0 + 1e-5).contains(&s));
    }
}
