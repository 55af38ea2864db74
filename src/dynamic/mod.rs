//! The dynamic, append-only index: a sequence of buckets presenting a
//! single logical library to queries. Supports incremental insertion,
//! lazy build, and per-bucket promotion to the compact (Flash) form.

mod bucket;

pub use bucket::Bucket;

use crate::cleaner::CleanOptions;
use crate::config::{
    Cancellation, LibraryConfig, ScoreMap, ScoredHit, SearchMethod, SearchOptions, TopNOptions,
    TopNResult,
};
use crate::entropy::entropy_weight;
use crate::error::{EntropySearchError, EntropySearchResult};
use crate::flash::{self, CleanedSpectrum};
use crate::metadata::MetadataStore;
use crate::spectrum::{InputSpectrum, MetadataRecord, SpectrumRecord};
use crate::types::Peak;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::path::Path;

/// Outcome of a batch insert: per-item validation failures are reported
/// alongside successful insertions, never aborting the whole batch.
#[derive(Debug, Clone, Default)]
pub struct InsertReport {
    pub inserted: usize,
    pub skipped: usize,
    pub errors: Vec<(usize, EntropySearchError)>,
}

pub struct DynamicIndex {
    config: LibraryConfig,
    configured: bool,
    buckets: Vec<Bucket>,
}

impl DynamicIndex {
    pub fn new(config: LibraryConfig) -> Self {
        Self {
            config,
            configured: false,
            buckets: Vec::new(),
        }
    }

    pub fn config(&self) -> LibraryConfig {
        self.config
    }

    fn lock_config_on_first_insert(&mut self) -> EntropySearchResult<()> {
        if !self.configured {
            self.configured = true;
        }
        Ok(())
    }

    /// Validate the closed record shape the index actually stores:
    /// precursor m/z must be finite and positive. Peaks may be empty
    /// (a spectrum with zero peaks is legal, and scores zero against
    /// everything).
    fn validate(spectrum: &InputSpectrum) -> EntropySearchResult<()> {
        if !spectrum.precursor_mz.is_finite() || spectrum.precursor_mz <= 0.0 {
            return Err(EntropySearchError::invalid(format!(
                "precursor_mz must be a finite positive value, got {}",
                spectrum.precursor_mz
            )));
        }
        Ok(())
    }

    fn active_bucket_index(&mut self) -> usize {
        if self.buckets.last().map_or(true, |b| b.compact) {
            self.buckets.push(Bucket::new(self.config.bucket_capacity));
        }
        self.buckets.len() - 1
    }

    /// Append cleaned, entropy-weighted spectra to the current append
    /// bucket. If the bucket crosses its capacity and auto-promotion is
    /// enabled, it is built and frozen to compact form immediately.
    pub fn add_spectra(
        &mut self,
        spectra: &[InputSpectrum],
        metadata: Option<&[MetadataRecord]>,
        clean_options: &CleanOptions,
    ) -> EntropySearchResult<InsertReport> {
        self.lock_config_on_first_insert()?;
        let mut report = InsertReport::default();

        for (i, spectrum) in spectra.iter().enumerate() {
            if let Err(e) = Self::validate(spectrum) {
                report.skipped += 1;
                report.errors.push((i, e));
                continue;
            }
            let cleaned =
                CleanedSpectrum::from_input(spectrum, clean_options, self.config.intensity_weight);
            let record = metadata
                .and_then(|m| m.get(i))
                .cloned()
                .unwrap_or_default();

            let bucket_idx = self.active_bucket_index();
            self.buckets[bucket_idx].push(cleaned, record)?;
            report.inserted += 1;

            if self.config.convert_to_flash && self.buckets[bucket_idx].is_over_capacity() {
                self.buckets[bucket_idx].promote(self.config.index_for_neutral_loss)?;
            }
        }

        log::debug!(
            "add_spectra: inserted={} skipped={} buckets={}",
            report.inserted,
            report.skipped,
            self.buckets.len()
        );
        Ok(report)
    }

    /// Force every not-yet-built bucket to build, so queries may run.
    pub fn build(&mut self) -> EntropySearchResult<()> {
        for bucket in &mut self.buckets {
            bucket.ensure_built(self.config.index_for_neutral_loss);
        }
        Ok(())
    }

    /// Promote a bucket (the trailing one, by default) to compact form.
    pub fn promote_to_compact(&mut self, bucket_id: Option<usize>) -> EntropySearchResult<()> {
        let idx = match bucket_id {
            Some(idx) => idx,
            None => {
                self.buckets
                    .iter()
                    .rposition(|b| !b.compact)
                    .ok_or_else(|| EntropySearchError::state("no bucket available to promote"))?
            }
        };
        let bucket = self
            .buckets
            .get_mut(idx)
            .ok_or_else(|| EntropySearchError::state(format!("no such bucket: {idx}")))?;
        bucket.promote(self.config.index_for_neutral_loss)?;
        log::info!("promoted bucket {idx} to compact form");
        Ok(())
    }

    /// Prefix-sum of spectrum counts per bucket; `group_start[i]` is the
    /// first global index of bucket `i`.
    pub fn group_start(&self) -> Vec<u64> {
        let mut starts = Vec::with_capacity(self.buckets.len() + 1);
        let mut running = 0u64;
        starts.push(running);
        for bucket in &self.buckets {
            running += bucket.count() as u64;
            starts.push(running);
        }
        starts
    }

    pub fn n_spectra(&self) -> u64 {
        self.buckets.iter().map(|b| b.count() as u64).sum()
    }

    fn prepare_query(&self, query: &InputSpectrum, options: &SearchOptions) -> Vec<Peak> {
        let mut peaks = if options.clean {
            let clean_opts = options.clean_options(query.precursor_mz);
            crate::cleaner::clean(&query.peaks, &clean_opts)
        } else {
            query.peaks.clone()
        };
        if self.config.intensity_weight {
            let intensities: Vec<f32> = peaks.iter().map(|p| p.intensity).collect();
            let weighted = entropy_weight(&intensities);
            for (p, w) in peaks.iter_mut().zip(weighted) {
                p.intensity = w;
            }
        }
        peaks
    }

    fn run_method_on_bucket(
        &self,
        bucket: &Bucket,
        method: SearchMethod,
        query: &InputSpectrum,
        query_peaks: &[Peak],
        options: &SearchOptions,
    ) -> EntropySearchResult<Vec<f32>> {
        let flash = bucket.flash()?;
        match method {
            SearchMethod::Open => flash::open_search(flash, query_peaks, options.ms2_tolerance_in_da),
            SearchMethod::Identity => flash::identity_search(
                flash,
                query.precursor_mz,
                query_peaks,
                options.ms1_tolerance_in_da,
                options.ms2_tolerance_in_da,
            ),
            SearchMethod::NeutralLoss => {
                if !self.config.index_for_neutral_loss {
                    return Err(EntropySearchError::config_mismatch(
                        "neutral_loss search",
                        "a library built with index_for_neutral_loss enabled",
                    ));
                }
                flash::neutral_loss_search(flash, query.precursor_mz, query_peaks, options.ms2_tolerance_in_da)
            }
            SearchMethod::Hybrid => {
                if !self.config.index_for_neutral_loss {
                    return Err(EntropySearchError::config_mismatch(
                        "hybrid search",
                        "a library built with index_for_neutral_loss enabled",
                    ));
                }
                flash::hybrid_search(flash, query.precursor_mz, query_peaks, options.ms2_tolerance_in_da)
            }
        }
    }

    /// Run the requested methods against every bucket, shifting local
    /// indices by `group_start` and concatenating into one dense vector
    /// per method.
    pub fn search(
        &self,
        query: &InputSpectrum,
        methods: &[SearchMethod],
        options: &SearchOptions,
        cancellation: Option<&Cancellation>,
    ) -> EntropySearchResult<ScoreMap> {
        let query_peaks = self.prepare_query(query, options);
        let mut scores: std::collections::HashMap<SearchMethod, Vec<f32>> =
            methods.iter().map(|&m| (m, Vec::new())).collect();

        for bucket in &self.buckets {
            if let Some(c) = cancellation {
                if c.is_cancelled() {
                    return Err(EntropySearchError::Cancelled);
                }
            }
            for &method in methods {
                let bucket_scores =
                    self.run_method_on_bucket(bucket, method, query, &query_peaks, options)?;
                scores.get_mut(&method).unwrap().extend(bucket_scores);
            }
        }

        Ok(ScoreMap { scores })
    }

    /// Top-K merge across buckets, maintaining a bounded min-heap of
    /// size `K` keyed by (score desc, global index asc).
    pub fn search_topn(
        &self,
        query: &InputSpectrum,
        options: &TopNOptions,
        search_options: &SearchOptions,
        metadata_store: Option<&MetadataStore>,
    ) -> EntropySearchResult<TopNResult> {
        let query_peaks = self.prepare_query(query, search_options);
        let group_start = self.group_start();
        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::new();
        let k = options.topn;

        for (bucket_idx, bucket) in self.buckets.iter().enumerate() {
            let bucket_scores = self.run_method_on_bucket(
                bucket,
                options.method,
                query,
                &query_peaks,
                search_options,
            )?;
            let base = group_start[bucket_idx];
            for (local_idx, &score) in bucket_scores.iter().enumerate() {
                let entry = HeapEntry {
                    global_index: base + local_idx as u64,
                    score,
                };
                match k {
                    Some(k) => {
                        if heap.len() < k {
                            heap.push(entry);
                        } else if let Some(worst) = heap.peek() {
                            if entry.cmp(worst) == Ordering::Less {
                                heap.pop();
                                heap.push(entry);
                            }
                        }
                    }
                    None => heap.push(entry),
                }
            }
        }

        let sorted = heap.into_sorted_vec();
        sorted
            .into_iter()
            .map(|entry| {
                let metadata = if options.need_metadata {
                    let mut record = metadata_store
                        .and_then(|store| store.get(entry.global_index))
                        .cloned()
                        .unwrap_or_default();
                    record.set_similarity(options.method.as_str(), entry.score);
                    Some(record)
                } else {
                    None
                };
                Ok(ScoredHit {
                    global_index: entry.global_index,
                    score: entry.score,
                    metadata,
                })
            })
            .collect()
    }

    pub fn get_spectrum(&self, global_index: u64) -> EntropySearchResult<SpectrumRecord> {
        let group_start = self.group_start();
        let bucket_idx = group_start
            .windows(2)
            .position(|w| global_index >= w[0] && global_index < w[1])
            .ok_or_else(|| EntropySearchError::invalid(format!("no such global index: {global_index}")))?;
        let local_idx = (global_index - group_start[bucket_idx]) as usize;
        let bucket = &self.buckets[bucket_idx];
        let cleaned = bucket
            .spectra
            .get(local_idx)
            .ok_or_else(|| EntropySearchError::invalid(format!("no such global index: {global_index}")))?;
        let metadata = bucket.metadata.get(local_idx).cloned().unwrap_or_default();
        Ok(SpectrumRecord {
            global_index,
            spectrum: InputSpectrum::new(cleaned.precursor_mz, cleaned.peaks.clone()),
            metadata,
        })
    }

    /// Write every bucket, plus the library-level config and `group_start`
    /// table, into `dir` (already created and empty).
    fn write_into(&self, dir: &Path) -> EntropySearchResult<()> {
        let manifest = LibraryManifest {
            config: self.config,
            group_start: self.group_start(),
            bucket_compact: self.buckets.iter().map(|b| b.compact).collect(),
        };
        let manifest_path = dir.join("config.json");
        std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest).unwrap())
            .map_err(|e| EntropySearchError::io(manifest_path.display().to_string(), e))?;

        for (i, bucket) in self.buckets.iter().enumerate() {
            let bucket_dir = dir.join(format!("bucket_{i}"));
            let flash = bucket.flash()?;
            crate::store::write_group(&bucket_dir, flash, self.config.intensity_weight)?;

            let mut store = MetadataStore::new();
            for (local_idx, record) in bucket.metadata.iter().enumerate() {
                store.insert(local_idx as u64, record.clone());
            }
            store.write_jsonl(&bucket_dir.join("metadata.jsonl"))?;
        }
        Ok(())
    }

    /// Persist the library under `root`. The new tree is built entirely
    /// under a staging sibling directory and only swapped into place by
    /// rename once every bucket and the manifest have been written
    /// successfully, so a write failure (disk full, I/O error) never
    /// leaves `root` in a partially-overwritten state.
    pub fn write(&mut self, root: &Path) -> EntropySearchResult<()> {
        self.build()?;

        let parent = root.parent().unwrap_or_else(|| Path::new("."));
        let name = root
            .file_name()
            .ok_or_else(|| EntropySearchError::invalid("write root must name a directory, not `.` or `/`"))?
            .to_string_lossy()
            .into_owned();
        let staging = parent.join(format!(".{name}.write-tmp"));
        let backup = parent.join(format!(".{name}.write-backup"));

        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|e| EntropySearchError::io(staging.display().to_string(), e))?;
        }
        std::fs::create_dir_all(&staging).map_err(|e| EntropySearchError::io(staging.display().to_string(), e))?;

        if let Err(e) = self.write_into(&staging) {
            let _ = std::fs::remove_dir_all(&staging);
            return Err(e);
        }

        if backup.exists() {
            std::fs::remove_dir_all(&backup).map_err(|e| EntropySearchError::io(backup.display().to_string(), e))?;
        }
        let had_previous = root.exists();
        if had_previous {
            std::fs::rename(root, &backup).map_err(|e| EntropySearchError::io(root.display().to_string(), e))?;
        }
        if let Err(e) = std::fs::rename(&staging, root) {
            if had_previous {
                let _ = std::fs::rename(&backup, root);
            }
            return Err(EntropySearchError::io(root.display().to_string(), e));
        }
        if had_previous {
            let _ = std::fs::remove_dir_all(&backup);
        }

        log::info!("wrote dynamic index with {} buckets to {}", self.buckets.len(), root.display());
        Ok(())
    }

    pub fn read(root: &Path) -> EntropySearchResult<Self> {
        let manifest_path = root.join("config.json");
        let manifest_bytes = std::fs::read(&manifest_path)
            .map_err(|e| EntropySearchError::io(manifest_path.display().to_string(), e))?;
        let manifest: LibraryManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| EntropySearchError::corrupt(manifest_path.display().to_string(), e.to_string()))?;

        let mut buckets = Vec::with_capacity(manifest.bucket_compact.len());
        for (i, &compact) in manifest.bucket_compact.iter().enumerate() {
            let bucket_dir = root.join(format!("bucket_{i}"));
            let flash = crate::store::read_group(&bucket_dir)?;
            let metadata_path = bucket_dir.join("metadata.jsonl");
            let metadata_store = MetadataStore::read_jsonl(&metadata_path)?;

            let spectra = flash.reconstruct_spectra();
            let metadata = (0..flash.n_spectra)
                .map(|i| metadata_store.get(i as u64).cloned().unwrap_or_default())
                .collect();

            buckets.push(Bucket {
                capacity: manifest.config.bucket_capacity,
                spectra,
                metadata,
                index: Some(flash),
                compact,
            });
        }

        Ok(Self {
            config: manifest.config,
            configured: true,
            buckets,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct LibraryManifest {
    config: LibraryConfig,
    group_start: Vec<u64>,
    bucket_compact: Vec<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct HeapEntry {
    global_index: u64,
    score: f32,
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ordered so that the *worst* entry (lowest score, tie-broken toward
/// larger global index) compares greatest — a `BinaryHeap` (a max-heap)
/// then surfaces the right candidate to evict when bounding to top-K.
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.score.partial_cmp(&self.score).unwrap_or(Ordering::Equal) {
            Ordering::Equal => self.global_index.cmp(&other.global_index),
            non_eq => non_eq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn spectrum(precursor_mz: f32, peaks: &[(f32, f32)]) -> InputSpectrum {
        InputSpectrum::new(
            precursor_mz,
            peaks.iter().map(|&(mz, i)| Peak::new(mz, i)).collect(),
        )
    }

    #[test]
    fn insert_validates_precursor_mz() {
        let mut idx = DynamicIndex::new(LibraryConfig::default());
        let spectra = vec![spectrum(150.0, &[(100.0, 1.0)]), spectrum(-1.0, &[(100.0, 1.0)])];
        let report = idx
            .add_spectra(&spectra, None, &CleanOptions::default())
            .unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn auto_promotes_on_capacity() {
        let config = LibraryConfig {
            bucket_capacity: 2,
            ..Default::default()
        };
        let mut idx = DynamicIndex::new(config);
        let spectra: Vec<InputSpectrum> = (0..3)
            .map(|i| spectrum(100.0 + i as f32, &[(100.0, 1.0)]))
            .collect();
        idx.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        assert_eq!(idx.buckets.len(), 2);
        assert!(idx.buckets[0].compact);
        assert!(!idx.buckets[1].compact);
    }

    #[test]
    fn promote_already_compact_errors() {
        let config = LibraryConfig {
            bucket_capacity: 1,
            ..Default::default()
        };
        let mut idx = DynamicIndex::new(config);
        idx.add_spectra(&[spectrum(150.0, &[(100.0, 1.0)])], None, &CleanOptions::default())
            .unwrap();
        assert!(idx.promote_to_compact(Some(0)).is_err());
    }

    #[test]
    fn fan_out_matches_monolithic_build() {
        let spectra: Vec<InputSpectrum> = vec![
            spectrum(150.0, &[(100.0, 1.0), (101.0, 1.0)]),
            spectrum(200.0, &[(100.0, 1.0)]),
            spectrum(250.0, &[(200.0, 1.0), (101.0, 1.0)]),
            spectrum(350.0, &[(100.0, 1.0), (101.0, 1.0)]),
        ];

        // Split across two buckets of 2.
        let config = LibraryConfig {
            bucket_capacity: 2,
            index_for_neutral_loss: false,
            ..Default::default()
        };
        let mut split = DynamicIndex::new(config);
        split.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        split.build().unwrap();

        // One monolithic bucket.
        let mono_config = LibraryConfig {
            bucket_capacity: 100,
            index_for_neutral_loss: false,
            ..Default::default()
        };
        let mut mono = DynamicIndex::new(mono_config);
        mono.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        mono.build().unwrap();

        let query = spectrum(150.0, &[(100.0, 1.0), (101.0, 1.0)]);
        let split_scores = split
            .search(&query, &[SearchMethod::Open], &SearchOptions::default(), None)
            .unwrap();
        let mono_scores = mono
            .search(&query, &[SearchMethod::Open], &SearchOptions::default(), None)
            .unwrap();

        let a = split_scores.get(SearchMethod::Open).unwrap();
        let b = mono_scores.get(SearchMethod::Open).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-5);
        }
    }

    #[test]
    fn topn_breaks_ties_by_smallest_global_index() {
        let spectra: Vec<InputSpectrum> = vec![
            spectrum(150.0, &[(100.0, 1.0)]),
            spectrum(150.0, &[(100.0, 1.0)]),
            spectrum(150.0, &[(100.0, 1.0)]),
        ];
        let mut idx = DynamicIndex::new(LibraryConfig {
            index_for_neutral_loss: false,
            ..Default::default()
        });
        idx.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        idx.build().unwrap();

        let query = spectrum(150.0, &[(100.0, 1.0)]);
        let options = TopNOptions {
            method: SearchMethod::Open,
            topn: Some(2),
            need_metadata: false,
        };
        let results = idx
            .search_topn(&query, &options, &SearchOptions::default(), None)
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].global_index, 0);
        assert_eq!(results[1].global_index, 1);
    }

    #[test]
    fn write_then_read_preserves_scores() {
        let dir = tempfile::tempdir().unwrap();
        let spectra: Vec<InputSpectrum> = vec![
            spectrum(150.0, &[(100.0, 1.0), (101.0, 1.0)]),
            spectrum(200.0, &[(105.0, 1.0)]),
        ];
        let mut idx = DynamicIndex::new(LibraryConfig {
            index_for_neutral_loss: false,
            ..Default::default()
        });
        idx.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        idx.write(dir.path()).unwrap();

        let read_back = DynamicIndex::read(dir.path()).unwrap();
        let query = spectrum(150.0, &[(100.0, 1.0), (101.0, 1.0)]);
        let before = idx
            .search(&query, &[SearchMethod::Open], &SearchOptions::default(), None)
            .unwrap();
        let after = read_back
            .search(&query, &[SearchMethod::Open], &SearchOptions::default(), None)
            .unwrap();
        assert_eq!(
            before.get(SearchMethod::Open).unwrap(),
            after.get(SearchMethod::Open).unwrap()
        );
    }

    #[test]
    fn write_overwrites_an_existing_library_atomically_and_leaves_no_staging_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("library");

        let mut first = DynamicIndex::new(LibraryConfig {
            index_for_neutral_loss: false,
            ..Default::default()
        });
        first
            .add_spectra(&[spectrum(150.0, &[(100.0, 1.0)])], None, &CleanOptions::default())
            .unwrap();
        first.write(&root).unwrap();
        assert_eq!(DynamicIndex::read(&root).unwrap().n_spectra(), 1);

        let mut second = DynamicIndex::new(LibraryConfig {
            index_for_neutral_loss: false,
            ..Default::default()
        });
        second
            .add_spectra(
                &[spectrum(150.0, &[(100.0, 1.0)]), spectrum(200.0, &[(105.0, 1.0)])],
                None,
                &CleanOptions::default(),
            )
            .unwrap();
        second.write(&root).unwrap();

        let read_back = DynamicIndex::read(&root).unwrap();
        assert_eq!(read_back.n_spectra(), 2);

        let siblings: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(siblings, vec!["library".to_string()]);
    }
}
