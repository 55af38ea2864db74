//! A charge-partitioned repository: one [`DynamicIndex`] per precursor
//! charge sign, routed by `spectrum.charge.signum()`.
//!
//! Grounded on the teacher's `XICSExtractor`, which splits one extraction
//! run into independent MS1/MS2 sub-indices and routes each query to the
//! sub-index matching its kind rather than scanning a single merged
//! structure.

use crate::cleaner::CleanOptions;
use crate::config::{Cancellation, LibraryConfig, ScoreMap, SearchMethod, SearchOptions, TopNOptions, TopNResult};
use crate::dynamic::{DynamicIndex, InsertReport};
use crate::error::{EntropySearchError, EntropySearchResult};
use crate::metadata::MetadataStore;
use crate::spectrum::{InputSpectrum, MetadataRecord, SpectrumRecord};
use std::path::Path;

/// Which partition a spectrum belongs to. Charge `0` or unspecified
/// charge routes to [`ChargePartition::Positive`] — the repository's
/// default polarity, matching the teacher's MS1 default when charge
/// annotation is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChargePartition {
    Positive,
    Negative,
}

impl ChargePartition {
    fn of(charge: Option<crate::types::Charge>) -> Self {
        match charge {
            Some(c) if c < 0 => ChargePartition::Negative,
            _ => ChargePartition::Positive,
        }
    }
}

/// Two independent libraries, one per charge sign, presented as a single
/// logical repository.
pub struct RepositorySearch {
    positive: DynamicIndex,
    negative: DynamicIndex,
}

impl RepositorySearch {
    pub fn new(config: LibraryConfig) -> Self {
        Self {
            positive: DynamicIndex::new(config),
            negative: DynamicIndex::new(config),
        }
    }

    fn partition(&self, p: ChargePartition) -> &DynamicIndex {
        match p {
            ChargePartition::Positive => &self.positive,
            ChargePartition::Negative => &self.negative,
        }
    }

    fn partition_mut(&mut self, p: ChargePartition) -> &mut DynamicIndex {
        match p {
            ChargePartition::Positive => &mut self.positive,
            ChargePartition::Negative => &mut self.negative,
        }
    }

    /// Split `spectra` by charge sign and insert each group into its own
    /// partition, merging the two `InsertReport`s.
    pub fn add_spectra(
        &mut self,
        spectra: &[InputSpectrum],
        metadata: Option<&[MetadataRecord]>,
        clean_options: &CleanOptions,
    ) -> EntropySearchResult<InsertReport> {
        let mut by_partition: std::collections::HashMap<ChargePartition, (Vec<InputSpectrum>, Vec<MetadataRecord>)> =
            std::collections::HashMap::new();

        for (i, spectrum) in spectra.iter().enumerate() {
            let partition = ChargePartition::of(spectrum.charge);
            let record = metadata.and_then(|m| m.get(i)).cloned().unwrap_or_default();
            let entry = by_partition.entry(partition).or_default();
            entry.0.push(spectrum.clone());
            entry.1.push(record);
        }

        let mut report = InsertReport::default();
        for (partition, (group_spectra, group_metadata)) in by_partition {
            let sub_report = self.partition_mut(partition).add_spectra(
                &group_spectra,
                Some(&group_metadata),
                clean_options,
            )?;
            report.inserted += sub_report.inserted;
            report.skipped += sub_report.skipped;
            report.errors.extend(sub_report.errors);
        }
        Ok(report)
    }

    pub fn build(&mut self) -> EntropySearchResult<()> {
        self.positive.build()?;
        self.negative.build()?;
        Ok(())
    }

    /// Search only the partition matching the query's declared charge.
    /// A query with no charge annotation searches the positive partition.
    pub fn search(
        &self,
        query: &InputSpectrum,
        methods: &[SearchMethod],
        options: &SearchOptions,
        cancellation: Option<&Cancellation>,
    ) -> EntropySearchResult<ScoreMap> {
        let partition = ChargePartition::of(query.charge);
        self.partition(partition).search(query, methods, options, cancellation)
    }

    pub fn search_topn(
        &self,
        query: &InputSpectrum,
        options: &TopNOptions,
        search_options: &SearchOptions,
        metadata_store: Option<&MetadataStore>,
    ) -> EntropySearchResult<TopNResult> {
        let partition = ChargePartition::of(query.charge);
        self.partition(partition)
            .search_topn(query, options, search_options, metadata_store)
    }

    /// Fetch a spectrum by `(charge, global_index)`, since global indices
    /// are only unique within one partition, not across the repository.
    pub fn get_spectrum(
        &self,
        charge: ChargePartition,
        global_index: u64,
    ) -> EntropySearchResult<SpectrumRecord> {
        self.partition(charge).get_spectrum(global_index)
    }

    pub fn write(&mut self, root: &Path) -> EntropySearchResult<()> {
        std::fs::create_dir_all(root).map_err(|e| EntropySearchError::io(root.display().to_string(), e))?;
        self.positive.write(&root.join("positive"))?;
        self.negative.write(&root.join("negative"))?;
        Ok(())
    }

    pub fn read(root: &Path) -> EntropySearchResult<Self> {
        Ok(Self {
            positive: DynamicIndex::read(&root.join("positive"))?,
            negative: DynamicIndex::read(&root.join("negative"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Peak;

    fn spectrum(precursor_mz: f32, peaks: &[(f32, f32)], charge: Option<i8>) -> InputSpectrum {
        let mut s = InputSpectrum::new(precursor_mz, peaks.iter().map(|&(mz, i)| Peak::new(mz, i)).collect());
        s.charge = charge;
        s
    }

    #[test]
    fn routes_by_charge_sign() {
        let mut repo = RepositorySearch::new(LibraryConfig {
            index_for_neutral_loss: false,
            ..Default::default()
        });
        let spectra = vec![
            spectrum(150.0, &[(100.0, 1.0)], Some(1)),
            spectrum(150.0, &[(100.0, 1.0)], Some(-1)),
            spectrum(150.0, &[(100.0, 1.0)], None),
        ];
        repo.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        assert_eq!(repo.positive.n_spectra(), 2);
        assert_eq!(repo.negative.n_spectra(), 1);
    }

    #[test]
    fn search_stays_within_declared_partition() {
        let mut repo = RepositorySearch::new(LibraryConfig {
            index_for_neutral_loss: false,
            ..Default::default()
        });
        let spectra = vec![
            spectrum(150.0, &[(100.0, 1.0)], Some(1)),
            spectrum(150.0, &[(100.0, 1.0)], Some(-1)),
        ];
        repo.add_spectra(&spectra, None, &CleanOptions::default()).unwrap();
        repo.build().unwrap();

        let query = spectrum(150.0, &[(100.0, 1.0)], Some(-1));
        let scores = repo
            .search(&query, &[SearchMethod::Open], &SearchOptions::default(), None)
            .unwrap();
        assert_eq!(scores.get(SearchMethod::Open).unwrap().len(), 1);
    }
}
