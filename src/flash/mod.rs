//! The compact (Flash) inverted index: an immutable, sorted inverted
//! index over fragment peaks, plus the four similarity-search
//! algorithms that scan it.
//!
//! Built once from a batch of cleaned, entropy-weighted spectra; never
//! mutated afterward. Inserting into an existing `FlashIndex` is not
//! supported — that is the dynamic index's job (see [`crate::dynamic`]).

mod search;

pub use search::{hybrid_search, identity_search, neutral_loss_search, open_search};

use crate::entropy::entropy_weight_spectrum;
use crate::error::{EntropySearchError, EntropySearchResult};
use crate::spectrum::InputSpectrum;
use crate::types::Peak;

/// A spectrum's peaks and precursor, already cleaned and (optionally)
/// entropy-weighted — the only shape the Flash index builder accepts.
#[derive(Debug, Clone)]
pub struct CleanedSpectrum {
    pub precursor_mz: f32,
    pub peaks: Vec<Peak>,
}

impl CleanedSpectrum {
    pub fn from_input(
        spectrum: &InputSpectrum,
        clean_options: &crate::cleaner::CleanOptions,
        intensity_weight: bool,
    ) -> Self {
        let mut options = *clean_options;
        if options.max_mz.is_none() {
            options = options.with_precursor_cutoff(
                spectrum.precursor_mz,
                crate::types::defaults::PRECURSOR_IONS_REMOVAL_DA,
            );
        }
        let mut peaks = crate::cleaner::clean(&spectrum.peaks, &options);
        if intensity_weight {
            entropy_weight_spectrum(&mut peaks);
        }
        Self {
            precursor_mz: spectrum.precursor_mz,
            peaks,
        }
    }
}

/// One group's neutral-loss axis: the same CSR/sorted-array shape as the
/// product-ion axis, but keyed by `precursor_mz - peak_mz`.
#[derive(Debug, Clone, Default)]
pub struct NeutralLossArrays {
    pub all_peaks_mz: Vec<f32>,
    pub all_peaks_intensity: Vec<f32>,
    pub all_peaks_spec_idx: Vec<u64>,
    pub all_ions_idx_for_peak: Vec<u32>,
}

/// One compact, immutable group: the search unit every query mode scans.
#[derive(Debug, Clone)]
pub struct FlashIndex {
    pub n_spectra: usize,
    pub n_peaks: usize,
    /// CSR offsets into the peak arrays, length `n_spectra + 1`.
    pub product_mz_idx_start: Vec<u64>,
    pub all_peaks_mz: Vec<f32>,
    pub all_peaks_intensity: Vec<f32>,
    pub all_peaks_spec_idx: Vec<u64>,
    pub all_ions_idx_for_peak: Vec<u32>,
    pub neutral_loss: Option<NeutralLossArrays>,
    /// Precursor m/z, sorted ascending.
    pub spectra_precursor_mz_sorted: Vec<f32>,
    /// `precursor_order_index[i]` is the spectrum index whose precursor
    /// m/z is `spectra_precursor_mz_sorted[i]`.
    pub precursor_order_index: Vec<u64>,
}

impl FlashIndex {
    /// Build a compact index from already-cleaned, entropy-weighted
    /// spectra. `spectra[i]`'s global index within this group is `i`.
    pub fn build(spectra: &[CleanedSpectrum], index_for_neutral_loss: bool) -> Self {
        let n_spectra = spectra.len();
        let mut product_mz_idx_start = Vec::with_capacity(n_spectra + 1);
        product_mz_idx_start.push(0u64);

        // (mz, intensity, spec_idx, local_idx)
        let mut product_records: Vec<(f32, f32, u64, u32)> = Vec::new();
        let mut nl_records: Vec<(f32, f32, u64, u32)> = Vec::new();

        for (spec_idx, spectrum) in spectra.iter().enumerate() {
            for (local_idx, peak) in spectrum.peaks.iter().enumerate() {
                product_records.push((peak.mz, peak.intensity, spec_idx as u64, local_idx as u32));
                if index_for_neutral_loss {
                    let loss = spectrum.precursor_mz - peak.mz;
                    nl_records.push((loss, peak.intensity, spec_idx as u64, local_idx as u32));
                }
            }
            let running = product_mz_idx_start.last().copied().unwrap();
            product_mz_idx_start.push(running + spectrum.peaks.len() as u64);
        }

        let n_peaks = product_records.len();
        product_records.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

        let mut all_peaks_mz = Vec::with_capacity(n_peaks);
        let mut all_peaks_intensity = Vec::with_capacity(n_peaks);
        let mut all_peaks_spec_idx = Vec::with_capacity(n_peaks);
        let mut all_ions_idx_for_peak = Vec::with_capacity(n_peaks);
        for (mz, intensity, spec_idx, local_idx) in product_records {
            all_peaks_mz.push(mz);
            all_peaks_intensity.push(intensity);
            all_peaks_spec_idx.push(spec_idx);
            all_ions_idx_for_peak.push(local_idx);
        }

        let neutral_loss = if index_for_neutral_loss {
            nl_records.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
            let mut nl = NeutralLossArrays::default();
            for (mz, intensity, spec_idx, local_idx) in nl_records {
                nl.all_peaks_mz.push(mz);
                nl.all_peaks_intensity.push(intensity);
                nl.all_peaks_spec_idx.push(spec_idx);
                nl.all_ions_idx_for_peak.push(local_idx);
            }
            Some(nl)
        } else {
            None
        };

        let mut precursor_order_index: Vec<u64> = (0..n_spectra as u64).collect();
        precursor_order_index.sort_by(|&a, &b| {
            spectra[a as usize]
                .precursor_mz
                .partial_cmp(&spectra[b as usize].precursor_mz)
                .unwrap()
        });
        let spectra_precursor_mz_sorted: Vec<f32> = precursor_order_index
            .iter()
            .map(|&i| spectra[i as usize].precursor_mz)
            .collect();

        Self {
            n_spectra,
            n_peaks,
            product_mz_idx_start,
            all_peaks_mz,
            all_peaks_intensity,
            all_peaks_spec_idx,
            all_ions_idx_for_peak,
            neutral_loss,
            spectra_precursor_mz_sorted,
            precursor_order_index,
        }
    }

    pub fn has_neutral_loss(&self) -> bool {
        self.neutral_loss.is_some()
    }

    pub fn peak_span(&self, spec_idx: usize) -> std::ops::Range<usize> {
        self.product_mz_idx_start[spec_idx] as usize..self.product_mz_idx_start[spec_idx + 1] as usize
    }

    pub fn require_neutral_loss(&self, method: &str) -> EntropySearchResult<&NeutralLossArrays> {
        self.neutral_loss.as_ref().ok_or_else(|| {
            EntropySearchError::config_mismatch(
                format!("{method} search"),
                "an index built with index_for_neutral_loss enabled",
            )
        })
    }

    /// Candidate spectra whose precursor m/z is within `ms1_tolerance`
    /// of `query_precursor_mz`, via binary search over the sorted
    /// precursor array.
    pub fn precursor_candidates(&self, query_precursor_mz: f32, ms1_tolerance: f32) -> Vec<u64> {
        let lo = query_precursor_mz - ms1_tolerance;
        let hi = query_precursor_mz + ms1_tolerance;
        let start = self
            .spectra_precursor_mz_sorted
            .partition_point(|&x| x < lo);
        let end = self.spectra_precursor_mz_sorted.partition_point(|&x| x <= hi);
        self.precursor_order_index[start..end].to_vec()
    }

    /// Recover each spectrum's precursor m/z and peaks, in their
    /// original per-spectrum order, purely from the CSR/sorted arrays.
    /// Used to make a group read back from disk appendable again: the
    /// dynamic index needs the per-spectrum shape, not just the sorted
    /// global arrays, to accept further inserts into a non-compact
    /// bucket.
    pub fn reconstruct_spectra(&self) -> Vec<CleanedSpectrum> {
        let mut precursor_mz = vec![0.0f32; self.n_spectra];
        for (sorted_pos, &spec_idx) in self.precursor_order_index.iter().enumerate() {
            precursor_mz[spec_idx as usize] = self.spectra_precursor_mz_sorted[sorted_pos];
        }

        let mut peaks: Vec<Vec<Option<Peak>>> = (0..self.n_spectra)
            .map(|s| vec![None; self.peak_span(s).len()])
            .collect();

        for i in 0..self.n_peaks {
            let spec_idx = self.all_peaks_spec_idx[i] as usize;
            let local_idx = self.all_ions_idx_for_peak[i] as usize;
            peaks[spec_idx][local_idx] = Some(Peak::new(self.all_peaks_mz[i], self.all_peaks_intensity[i]));
        }

        (0..self.n_spectra)
            .map(|s| CleanedSpectrum {
                precursor_mz: precursor_mz[s],
                peaks: peaks[s]
                    .iter()
                    .map(|p| p.expect("every local index within a spectrum's span is populated"))
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn spec(precursor_mz: f32, peaks: &[(f32, f32)]) -> CleanedSpectrum {
        CleanedSpectrum {
            precursor_mz,
            peaks: peaks.iter().map(|&(mz, i)| Peak::new(mz, i)).collect(),
        }
    }

    #[test]
    fn build_produces_globally_sorted_mz() {
        let spectra = vec![
            spec(150.0, &[(103.0, 1.0), (100.0, 1.0)]),
            spec(200.0, &[(101.0, 1.0)]),
        ];
        let idx = FlashIndex::build(&spectra, false);
        assert_eq!(idx.n_spectra, 2);
        assert_eq!(idx.n_peaks, 3);
        assert!(idx.all_peaks_mz.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn csr_offsets_match_peak_counts() {
        let spectra = vec![
            spec(150.0, &[(100.0, 1.0), (101.0, 1.0)]),
            spec(200.0, &[]),
            spec(250.0, &[(102.0, 1.0)]),
        ];
        let idx = FlashIndex::build(&spectra, false);
        assert_eq!(idx.product_mz_idx_start, vec![0, 2, 2, 3]);
    }

    #[test]
    fn reconstruct_spectra_recovers_original_shape() {
        let spectra = vec![
            spec(150.0, &[(103.0, 1.0), (100.0, 1.0), (101.0, 1.0)]),
            spec(200.0, &[]),
            spec(250.0, &[(102.0, 1.0)]),
        ];
        let idx = FlashIndex::build(&spectra, false);
        let reconstructed = idx.reconstruct_spectra();
        assert_eq!(reconstructed.len(), spectra.len());
        for (original, back) in spectra.iter().zip(reconstructed.iter()) {
            assert_eq!(original.precursor_mz, back.precursor_mz);
            assert_eq!(original.peaks.len(), back.peaks.len());
            for (a, b) in original.peaks.iter().zip(back.peaks.iter()) {
                assert_eq!(a.mz, b.mz);
                assert_eq!(a.intensity, b.intensity);
            }
        }
    }

    #[test]
    fn precursor_candidates_within_tolerance() {
        let spectra = vec![spec(150.0, &[]), spec(150.005, &[]), spec(200.0, &[])];
        let idx = FlashIndex::build(&spectra, false);
        let mut candidates = idx.precursor_candidates(150.0, 0.01);
        candidates.sort();
        assert_eq!(candidates, vec![0, 1]);
    }
}
