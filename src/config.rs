//! Options surface: the typed replacement for the language-neutral
//! options dict. One small `Copy`/`Clone`/`Default` struct per concern,
//! matching the teacher's `Tolerance`/`PrecursorInfo` style.

use crate::types::defaults;
use std::collections::HashMap;

/// Which similarity-search algorithm(s) to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum SearchMethod {
    Identity,
    Open,
    NeutralLoss,
    Hybrid,
}

impl SearchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Identity => "identity",
            SearchMethod::Open => "open",
            SearchMethod::NeutralLoss => "neutral_loss",
            SearchMethod::Hybrid => "hybrid",
        }
    }

    pub fn all() -> [SearchMethod; 4] {
        [
            SearchMethod::Identity,
            SearchMethod::Open,
            SearchMethod::NeutralLoss,
            SearchMethod::Hybrid,
        ]
    }

    pub fn requires_neutral_loss(&self) -> bool {
        matches!(self, SearchMethod::NeutralLoss | SearchMethod::Hybrid)
    }

    pub fn requires_precursor(&self) -> bool {
        matches!(
            self,
            SearchMethod::Identity | SearchMethod::NeutralLoss | SearchMethod::Hybrid
        )
    }
}

/// Tolerances and toggles for a search call, including the query-side
/// cleaning parameters (unused when `clean` is `false`).
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct SearchOptions {
    pub ms1_tolerance_in_da: f32,
    pub ms2_tolerance_in_da: f32,
    pub clean: bool,
    pub precursor_ions_removal_da: f32,
    pub noise_threshold: f32,
    pub min_ms2_difference_in_da: f32,
    pub max_peak_num: Option<usize>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            ms1_tolerance_in_da: defaults::MS1_TOLERANCE_DA,
            ms2_tolerance_in_da: defaults::MS2_TOLERANCE_DA,
            clean: true,
            precursor_ions_removal_da: defaults::PRECURSOR_IONS_REMOVAL_DA,
            noise_threshold: defaults::NOISE_THRESHOLD,
            min_ms2_difference_in_da: defaults::MIN_MS2_DIFFERENCE_DA,
            max_peak_num: None,
        }
    }
}

impl SearchOptions {
    /// The [`crate::cleaner::CleanOptions`] these options imply for a
    /// query with the given precursor m/z.
    pub fn clean_options(&self, query_precursor_mz: f32) -> crate::cleaner::CleanOptions {
        crate::cleaner::CleanOptions {
            max_mz: None,
            noise_threshold: self.noise_threshold,
            min_ms2_diff_da: self.min_ms2_difference_in_da,
            max_peak_num: self.max_peak_num,
        }
        .with_precursor_cutoff(query_precursor_mz, self.precursor_ions_removal_da)
    }
}

/// Dense similarity scores, one per method requested.
#[derive(Debug, Clone, Default)]
pub struct ScoreMap {
    pub scores: HashMap<SearchMethod, Vec<f32>>,
}

impl ScoreMap {
    pub fn single(method: SearchMethod, scores: Vec<f32>) -> Self {
        let mut map = HashMap::new();
        map.insert(method, scores);
        Self { scores: map }
    }

    pub fn get(&self, method: SearchMethod) -> Option<&[f32]> {
        self.scores.get(&method).map(Vec::as_slice)
    }
}

/// Configuration fixed at first insert; changing any field thereafter is
/// a fatal `ConfigMismatch` error.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LibraryConfig {
    pub intensity_weight: bool,
    pub index_for_neutral_loss: bool,
    pub bucket_capacity: usize,
    pub convert_to_flash: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            intensity_weight: true,
            index_for_neutral_loss: true,
            bucket_capacity: defaults::BUCKET_CAPACITY,
            convert_to_flash: true,
        }
    }
}

/// Top-K request options.
#[derive(Debug, Clone, Copy)]
pub struct TopNOptions {
    pub method: SearchMethod,
    pub topn: Option<usize>,
    pub need_metadata: bool,
}

impl Default for TopNOptions {
    fn default() -> Self {
        Self {
            method: SearchMethod::Open,
            topn: Some(defaults::TOPN),
            need_metadata: false,
        }
    }
}

/// One ranked hit, `(global_idx, score)` or metadata-joined.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredHit {
    pub global_index: u64,
    pub score: f32,
    pub metadata: Option<crate::spectrum::MetadataRecord>,
}

pub type TopNResult = Vec<ScoredHit>;

/// Cooperative cancellation, polled between query peaks and between
/// buckets.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(std::sync::Arc<std::sync::atomic::AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Relaxed)
    }
}
