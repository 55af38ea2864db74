//! An entropy-similarity spectral search engine.
//!
//! - [`cleaner`] — deterministic peak-list normalization ahead of indexing
//!   or querying.
//! - [`entropy`] — Shannon-entropy peak reweighting and the merged-entropy
//!   similarity score.
//! - [`flash`] — the compact, immutable inverted index and the four
//!   search algorithms (open, identity, neutral-loss, hybrid).
//! - [`dynamic`] — the append-only, bucketed index built on top of
//!   `flash`, with lazy build and promotion to compact form.
//! - [`repository`] — a charge-partitioned pair of dynamic indices.
//! - [`store`] — the on-disk layout for a compact group.
//! - [`metadata`] — the opaque per-spectrum key/value side table.
//! - [`config`] — the typed options surface shared by every search call.
//! - [`error`] — the crate-wide error type.

pub mod cleaner;
pub mod config;
pub mod dynamic;
pub mod entropy;
pub mod error;
pub mod flash;
pub mod metadata;
pub mod repository;
pub mod spectrum;
pub mod store;
pub mod types;

pub use config::{
    Cancellation, LibraryConfig, ScoreMap, ScoredHit, SearchMethod, SearchOptions, TopNOptions,
    TopNResult,
};
pub use dynamic::{DynamicIndex, InsertReport};
pub use error::{EntropySearchError, EntropySearchResult};
pub use repository::{ChargePartition, RepositorySearch};
pub use spectrum::{InputSpectrum, MetadataRecord, MetadataValue, SpectrumRecord};
pub use types::{Charge, GlobalIndex, Peak};
