//! The closed spectrum record type and the opaque metadata side table
//!
//! The source system accepts spectra as open-ended key/value mappings.
//! Here the shape that actually matters to the index — precursor m/z,
//! peaks, optional charge — is a closed struct; anything else a caller
//! wants to carry along rides in [`MetadataRecord`], joined back in only
//! when a query asks for it.

use crate::types::{Charge, Peak};
use std::collections::BTreeMap;

/// A spectrum as given to the cleaner / index, before or after cleaning.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputSpectrum {
    pub precursor_mz: f32,
    pub peaks: Vec<Peak>,
    pub charge: Option<Charge>,
}

impl InputSpectrum {
    pub fn new(precursor_mz: f32, peaks: Vec<Peak>) -> Self {
        Self {
            precursor_mz,
            peaks,
            charge: None,
        }
    }

    pub fn with_charge(mut self, charge: Charge) -> Self {
        self.charge = Some(charge);
        self
    }
}

/// An opaque metadata value. Reserved keys (`scan`, `file_name`, ...) are
/// free-form strings or numbers; everything else is caller-defined.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum MetadataValue {
    Text(String),
    Number(f64),
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

/// Per-spectrum key/value record, opaque to the index.
///
/// `precursor_mz`, `peaks`, `charge`, `scan`, `file_name` are the reserved
/// keys with well-known semantics; everything else is free-form.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetadataRecord {
    fields: BTreeMap<String, MetadataValue>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.fields.get(key)
    }

    pub fn scan_number(&self) -> Option<f64> {
        match self.fields.get("scan") {
            Some(MetadataValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn file_name(&self) -> Option<&str> {
        match self.fields.get("file_name") {
            Some(MetadataValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Set a `{method}_search_entropy_similarity` field, as joined onto
    /// top-N metadata results.
    pub fn set_similarity(&mut self, method: &str, score: f32) {
        self.insert(
            format!("{method}_search_entropy_similarity"),
            score as f64,
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.fields.iter()
    }
}

/// A spectrum joined with its metadata, as returned by `get_spectrum`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SpectrumRecord {
    pub global_index: u64,
    pub spectrum: InputSpectrum,
    pub metadata: MetadataRecord,
}
