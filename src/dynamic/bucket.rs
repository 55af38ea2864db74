//! One bucket of the dynamic index: an append-only group of spectra
//! that is lazily built into a [`FlashIndex`] and, once past capacity,
//! frozen ("promoted") into compact form.

use crate::error::{EntropySearchError, EntropySearchResult};
use crate::flash::{CleanedSpectrum, FlashIndex};
use crate::spectrum::MetadataRecord;

#[derive(Debug, Clone)]
pub struct Bucket {
    pub capacity: usize,
    /// Source of truth for this bucket's spectra, in insertion order.
    /// A spectrum's local index is its position here, and never moves.
    pub spectra: Vec<CleanedSpectrum>,
    pub metadata: Vec<MetadataRecord>,
    /// `None` whenever the bucket has been appended to since the last
    /// build (the "open"/stale state); `Some` once built.
    pub index: Option<FlashIndex>,
    /// Once true, further inserts are refused; a new bucket is opened
    /// instead.
    pub compact: bool,
}

impl Bucket {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            spectra: Vec::new(),
            metadata: Vec::new(),
            index: None,
            compact: false,
        }
    }

    pub fn count(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_built(&self) -> bool {
        self.index.is_some()
    }

    pub fn push(
        &mut self,
        spectrum: CleanedSpectrum,
        metadata: MetadataRecord,
    ) -> EntropySearchResult<()> {
        if self.compact {
            return Err(EntropySearchError::config_mismatch(
                "insert",
                "a non-compact bucket (this bucket has been promoted to Flash)",
            ));
        }
        self.spectra.push(spectrum);
        self.metadata.push(metadata);
        self.index = None;
        Ok(())
    }

    pub fn is_over_capacity(&self) -> bool {
        self.count() >= self.capacity
    }

    /// Build (or rebuild) the Flash index from the current spectra list,
    /// if it is not already up to date.
    pub fn ensure_built(&mut self, index_for_neutral_loss: bool) {
        if self.index.is_none() {
            self.index = Some(FlashIndex::build(&self.spectra, index_for_neutral_loss));
        }
    }

    /// Build (if needed) and mark compact. Errors if already compact,
    /// per the redesign's resolution of the "is promotion idempotent"
    /// open question: promoting an already-compact bucket is a fatal
    /// configuration error, not a no-op.
    pub fn promote(&mut self, index_for_neutral_loss: bool) -> EntropySearchResult<()> {
        if self.compact {
            return Err(EntropySearchError::config_mismatch(
                "promote_to_compact",
                "a bucket that has not already been promoted",
            ));
        }
        self.ensure_built(index_for_neutral_loss);
        self.compact = true;
        Ok(())
    }

    pub fn flash(&self) -> EntropySearchResult<&FlashIndex> {
        self.index.as_ref().ok_or_else(|| {
            EntropySearchError::state(
                "bucket has unbuilt pending spectra; call build() before searching",
            )
        })
    }
}
