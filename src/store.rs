//! On-disk layout for one compact group: a JSON metadata header plus one
//! flat little-endian packed-array file per CSR/sorted array, designed
//! for direct memory mapping.

use crate::error::{EntropySearchError, EntropySearchResult};
use crate::flash::{FlashIndex, NeutralLossArrays};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap2::Mmap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Current on-disk layout version. Bumped whenever the array set or
/// encoding changes; mismatched versions are a fatal `CorruptStore`.
pub const GROUP_STORE_VERSION: u32 = 1;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct GroupStoreMeta {
    pub version: u32,
    pub n_spectra: usize,
    pub n_peaks: usize,
    pub has_neutral_loss: bool,
    pub intensity_weighted: bool,
}

fn array_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.bin"))
}

fn write_f32_array(path: &Path, values: &[f32]) -> EntropySearchResult<()> {
    let file = File::create(path).map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    let mut writer = BufWriter::new(file);
    for &v in values {
        writer
            .write_f32::<LittleEndian>(v)
            .map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    }
    writer
        .flush()
        .map_err(|e| EntropySearchError::io(path.display().to_string(), e))
}

fn write_u64_array(path: &Path, values: &[u64]) -> EntropySearchResult<()> {
    let file = File::create(path).map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    let mut writer = BufWriter::new(file);
    for &v in values {
        writer
            .write_u64::<LittleEndian>(v)
            .map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    }
    writer
        .flush()
        .map_err(|e| EntropySearchError::io(path.display().to_string(), e))
}

fn write_u32_array(path: &Path, values: &[u32]) -> EntropySearchResult<()> {
    let file = File::create(path).map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    let mut writer = BufWriter::new(file);
    for &v in values {
        writer
            .write_u32::<LittleEndian>(v)
            .map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    }
    writer
        .flush()
        .map_err(|e| EntropySearchError::io(path.display().to_string(), e))
}

/// Read a whole array file via `memmap2`, letting the OS page cache
/// serve repeated reads, then decode into a typed `Vec`. Raw mapped
/// bytes are not guaranteed to satisfy `f32`/`u64` alignment on every
/// platform, so decoding copies through `byteorder` rather than casting
/// the mapping directly.
fn mmap_file(path: &Path) -> EntropySearchResult<Mmap> {
    let file = File::open(path).map_err(|e| EntropySearchError::io(path.display().to_string(), e))?;
    unsafe { Mmap::map(&file) }.map_err(|e| EntropySearchError::io(path.display().to_string(), e))
}

fn read_f32_array(path: &Path, count: usize) -> EntropySearchResult<Vec<f32>> {
    let mmap = mmap_file(path)?;
    let mut reader = BufReader::new(&mmap[..]);
    (0..count)
        .map(|_| {
            reader
                .read_f32::<LittleEndian>()
                .map_err(|e| EntropySearchError::io(path.display().to_string(), e))
        })
        .collect()
}

fn read_u64_array(path: &Path, count: usize) -> EntropySearchResult<Vec<u64>> {
    let mmap = mmap_file(path)?;
    let mut reader = BufReader::new(&mmap[..]);
    (0..count)
        .map(|_| {
            reader
                .read_u64::<LittleEndian>()
                .map_err(|e| EntropySearchError::io(path.display().to_string(), e))
        })
        .collect()
}

fn read_u32_array(path: &Path, count: usize) -> EntropySearchResult<Vec<u32>> {
    let mmap = mmap_file(path)?;
    let mut reader = BufReader::new(&mmap[..]);
    (0..count)
        .map(|_| {
            reader
                .read_u32::<LittleEndian>()
                .map_err(|e| EntropySearchError::io(path.display().to_string(), e))
        })
        .collect()
}

/// Persist one compact group to `dir` (created if missing).
pub fn write_group(dir: &Path, index: &FlashIndex, intensity_weighted: bool) -> EntropySearchResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| EntropySearchError::io(dir.display().to_string(), e))?;

    let meta = GroupStoreMeta {
        version: GROUP_STORE_VERSION,
        n_spectra: index.n_spectra,
        n_peaks: index.n_peaks,
        has_neutral_loss: index.has_neutral_loss(),
        intensity_weighted,
    };
    let meta_path = dir.join("meta.json");
    std::fs::write(&meta_path, serde_json::to_vec_pretty(&meta).unwrap())
        .map_err(|e| EntropySearchError::io(meta_path.display().to_string(), e))?;

    write_u64_array(&array_path(dir, "product_mz_idx_start"), &index.product_mz_idx_start)?;
    write_f32_array(&array_path(dir, "all_peaks_mz"), &index.all_peaks_mz)?;
    write_f32_array(&array_path(dir, "all_peaks_intensity"), &index.all_peaks_intensity)?;
    write_u64_array(&array_path(dir, "all_peaks_spec_idx"), &index.all_peaks_spec_idx)?;
    write_u32_array(&array_path(dir, "all_ions_idx_for_peak"), &index.all_ions_idx_for_peak)?;
    write_f32_array(&array_path(dir, "spectra_precursor_mz_sorted"), &index.spectra_precursor_mz_sorted)?;
    write_u64_array(&array_path(dir, "precursor_order_index"), &index.precursor_order_index)?;

    if let Some(nl) = &index.neutral_loss {
        write_f32_array(&array_path(dir, "nl_all_peaks_mz"), &nl.all_peaks_mz)?;
        write_f32_array(&array_path(dir, "nl_all_peaks_intensity"), &nl.all_peaks_intensity)?;
        write_u64_array(&array_path(dir, "nl_all_peaks_spec_idx"), &nl.all_peaks_spec_idx)?;
        write_u32_array(&array_path(dir, "nl_all_ions_idx_for_peak"), &nl.all_ions_idx_for_peak)?;
    }

    Ok(())
}

/// Load a compact group previously persisted by [`write_group`].
pub fn read_group(dir: &Path) -> EntropySearchResult<FlashIndex> {
    let meta_path = dir.join("meta.json");
    let meta_bytes = std::fs::read(&meta_path).map_err(|e| EntropySearchError::io(meta_path.display().to_string(), e))?;
    let meta: GroupStoreMeta = serde_json::from_slice(&meta_bytes)
        .map_err(|e| EntropySearchError::corrupt(meta_path.display().to_string(), e.to_string()))?;

    if meta.version != GROUP_STORE_VERSION {
        return Err(EntropySearchError::corrupt(
            dir.display().to_string(),
            format!(
                "group store version {} is incompatible with reader version {}",
                meta.version, GROUP_STORE_VERSION
            ),
        ));
    }

    let product_mz_idx_start = read_u64_array(&array_path(dir, "product_mz_idx_start"), meta.n_spectra + 1)?;
    let all_peaks_mz = read_f32_array(&array_path(dir, "all_peaks_mz"), meta.n_peaks)?;
    let all_peaks_intensity = read_f32_array(&array_path(dir, "all_peaks_intensity"), meta.n_peaks)?;
    let all_peaks_spec_idx = read_u64_array(&array_path(dir, "all_peaks_spec_idx"), meta.n_peaks)?;
    let all_ions_idx_for_peak = read_u32_array(&array_path(dir, "all_ions_idx_for_peak"), meta.n_peaks)?;
    let spectra_precursor_mz_sorted =
        read_f32_array(&array_path(dir, "spectra_precursor_mz_sorted"), meta.n_spectra)?;
    let precursor_order_index = read_u64_array(&array_path(dir, "precursor_order_index"), meta.n_spectra)?;

    let neutral_loss = if meta.has_neutral_loss {
        Some(NeutralLossArrays {
            all_peaks_mz: read_f32_array(&array_path(dir, "nl_all_peaks_mz"), meta.n_peaks)?,
            all_peaks_intensity: read_f32_array(&array_path(dir, "nl_all_peaks_intensity"), meta.n_peaks)?,
            all_peaks_spec_idx: read_u64_array(&array_path(dir, "nl_all_peaks_spec_idx"), meta.n_peaks)?,
            all_ions_idx_for_peak: read_u32_array(&array_path(dir, "nl_all_ions_idx_for_peak"), meta.n_peaks)?,
        })
    } else {
        None
    };

    Ok(FlashIndex {
        n_spectra: meta.n_spectra,
        n_peaks: meta.n_peaks,
        product_mz_idx_start,
        all_peaks_mz,
        all_peaks_intensity,
        all_peaks_spec_idx,
        all_ions_idx_for_peak,
        neutral_loss,
        spectra_precursor_mz_sorted,
        precursor_order_index,
    })
}

pub fn read_meta(dir: &Path) -> EntropySearchResult<GroupStoreMeta> {
    let meta_path = dir.join("meta.json");
    let meta_bytes = std::fs::read(&meta_path).map_err(|e| EntropySearchError::io(meta_path.display().to_string(), e))?;
    serde_json::from_slice(&meta_bytes)
        .map_err(|e| EntropySearchError::corrupt(meta_path.display().to_string(), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::CleanedSpectrum;
    use crate::types::Peak;

    #[test]
    fn round_trip_preserves_scores() {
        let spectra = vec![
            CleanedSpectrum {
                precursor_mz: 150.0,
                peaks: vec![Peak::new(100.0, 0.5), Peak::new(101.0, 0.5)],
            },
            CleanedSpectrum {
                precursor_mz: 200.0,
                peaks: vec![Peak::new(105.0, 1.0)],
            },
        ];
        let index = FlashIndex::build(&spectra, true);

        let dir = tempfile::tempdir().unwrap();
        write_group(dir.path(), &index, true).unwrap();
        let read_back = read_group(dir.path()).unwrap();

        assert_eq!(read_back.n_spectra, index.n_spectra);
        assert_eq!(read_back.n_peaks, index.n_peaks);
        assert_eq!(read_back.all_peaks_mz, index.all_peaks_mz);
        assert_eq!(read_back.all_peaks_intensity, index.all_peaks_intensity);

        let query = [Peak::new(100.0, 0.5), Peak::new(101.0, 0.5)];
        let before = crate::flash::open_search(&index, &query, 0.02).unwrap();
        let after = crate::flash::open_search(&read_back, &query, 0.02).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let spectra = vec![CleanedSpectrum {
            precursor_mz: 150.0,
            peaks: vec![Peak::new(100.0, 1.0)],
        }];
        let index = FlashIndex::build(&spectra, false);
        let dir = tempfile::tempdir().unwrap();
        write_group(dir.path(), &index, true).unwrap();

        let mut meta = read_meta(dir.path()).unwrap();
        meta.version = GROUP_STORE_VERSION + 1;
        std::fs::write(dir.path().join("meta.json"), serde_json::to_vec(&meta).unwrap()).unwrap();

        assert!(read_group(dir.path()).is_err());
    }
}
