//! Arbitrary per-spectrum key/value records, retrievable by global index
//!
//! Metadata is owned by the metadata store, independent of the peak
//! arrays owned by the enclosing group — mirroring the teacher's split
//! between `Spectrum` (peaks) and its `additional_info` side table in
//! `core/spectrum.rs`.

use crate::spectrum::MetadataRecord;
use std::collections::BTreeMap;

/// A flat, in-memory metadata store keyed by global index. Persisted
/// alongside a group as a record-oriented JSON-lines file.
#[derive(Debug, Clone, Default)]
pub struct MetadataStore {
    records: BTreeMap<u64, MetadataRecord>,
}

impl MetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, global_index: u64, record: MetadataRecord) {
        self.records.insert(global_index, record);
    }

    pub fn get(&self, global_index: u64) -> Option<&MetadataRecord> {
        self.records.get(&global_index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Write one JSON object per line, ordered by global index.
    pub fn write_jsonl(&self, path: &std::path::Path) -> crate::error::EntropySearchResult<()> {
        use std::io::Write;
        let file = std::fs::File::create(path)
            .map_err(|e| crate::error::EntropySearchError::io(path.display().to_string(), e))?;
        let mut writer = std::io::BufWriter::new(file);
        for (global_index, record) in &self.records {
            let line = serde_json::json!({ "global_index": global_index, "record": record });
            writeln!(writer, "{line}")
                .map_err(|e| crate::error::EntropySearchError::io(path.display().to_string(), e))?;
        }
        Ok(())
    }

    pub fn read_jsonl(path: &std::path::Path) -> crate::error::EntropySearchResult<Self> {
        use std::io::BufRead;
        let file = std::fs::File::open(path)
            .map_err(|e| crate::error::EntropySearchError::io(path.display().to_string(), e))?;
        let reader = std::io::BufReader::new(file);
        let mut store = Self::new();
        for line in reader.lines() {
            let line = line.map_err(|e| crate::error::EntropySearchError::io(path.display().to_string(), e))?;
            if line.trim().is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(&line).map_err(|e| {
                crate::error::EntropySearchError::corrupt(path.display().to_string(), e.to_string())
            })?;
            let global_index = value["global_index"]
                .as_u64()
                .ok_or_else(|| crate::error::EntropySearchError::corrupt(path.display().to_string(), "missing global_index"))?;
            let record: MetadataRecord = serde_json::from_value(value["record"].clone()).map_err(|e| {
                crate::error::EntropySearchError::corrupt(path.display().to_string(), e.to_string())
            })?;
            store.insert(global_index, record);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meta.jsonl");

        let mut store = MetadataStore::new();
        let mut record = MetadataRecord::new();
        record.insert("file_name", "run1.mzML");
        record.insert("scan", 42.0);
        store.insert(0, record);

        store.write_jsonl(&path).unwrap();
        let read_back = MetadataStore::read_jsonl(&path).unwrap();

        assert_eq!(read_back.len(), 1);
        let record = read_back.get(0).unwrap();
        assert_eq!(record.file_name(), Some("run1.mzML"));
        assert_eq!(record.scan_number(), Some(42.0));
    }
}
