// rust/dataset-core/src/store/format.rs

//! Shared record store file format.
//!
//! A committed serialized store can be written to disk once and memory-mapped
//! by any number of sibling processes, which then read samples straight out
//! of the shared page cache instead of each decoding annotations privately.
//!
//! ```text
//! +--------------------------+
//! | Magic "DSRS" (4 bytes)   |
//! +--------------------------+
//! | Header Length (4 bytes)  |  <- u32 little-endian
//! +--------------------------+
//! | Header (bincode)         |  <- StoreHeader
//! +--------------------------+
//! | Offsets                  |  <- (num_records + 1) x u64 little-endian
//! +--------------------------+
//! | Data                     |  <- encoded samples, back to back
//! +--------------------------+
//! ```

use std::fs::File;
use std::hash::Hasher;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use super::serialized::{SerializedRecords, SharedBuffer};
use crate::error::{DatasetError, Result};
use crate::storage::StorageBackend;
use crate::value::Metadata;

/// Magic bytes for shared store files.
pub const STORE_MAGIC: [u8; 4] = *b"DSRS";

/// Header of a shared store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    /// Format version number
    pub version: u32,
    /// Identifies the configuration the store was built from
    pub fingerprint: u64,
    /// Number of samples
    pub num_records: u64,
    /// Size of the data section in bytes
    pub data_len: u64,
    /// XXHash64 checksum of the data section
    pub checksum: u64,
    /// Resolved metadata at commit time, file-declared keys included
    pub metainfo: Metadata,
}

impl StoreHeader {
    /// Current format version
    pub const VERSION: u32 = 1;
}

/// XXHash64 of `data` with seed 0.
pub fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

/// Writes `records` to `path` atomically (temp file, then rename).
///
/// # Errors
///
/// Returns an error if encoding or any storage operation fails. The temp
/// file is removed on failure.
pub fn write_store(
    storage: &dyn StorageBackend,
    path: &Path,
    records: &SerializedRecords,
    fingerprint: u64,
    metainfo: &Metadata,
) -> Result<()> {
    let data = records.buffer().as_slice();
    let header = StoreHeader {
        version: StoreHeader::VERSION,
        fingerprint,
        num_records: records.len() as u64,
        data_len: data.len() as u64,
        checksum: checksum(data),
        metainfo: metainfo.clone(),
    };

    let header_bytes = bincode::serialize(&header)
        .map_err(|e| DatasetError::serialization(format!("failed to serialize store header: {e}")))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "records".to_string());
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let written = (|| -> Result<()> {
        let mut writer = storage.open_write(&temp_path)?;
        let io_err = |e: std::io::Error| {
            DatasetError::storage_with_source(&temp_path, "failed to write record store", e)
        };

        writer.write_all(&STORE_MAGIC).map_err(io_err)?;
        writer
            .write_all(&(header_bytes.len() as u32).to_le_bytes())
            .map_err(io_err)?;
        writer.write_all(&header_bytes).map_err(io_err)?;
        for offset in records.offsets() {
            writer.write_all(&offset.to_le_bytes()).map_err(io_err)?;
        }
        writer.write_all(data).map_err(io_err)?;
        writer.finish()
    })();

    if let Err(e) = written {
        let _ = storage.delete(&temp_path);
        return Err(e);
    }

    storage.rename(&temp_path, path)
}

/// Memory-maps a shared store file and validates it.
///
/// When `expected_fingerprint` is given, a file built from a different
/// configuration is rejected.
///
/// # Errors
///
/// Returns a storage error if the file cannot be opened or mapped and a
/// serialization error if magic, version, sizes, fingerprint or checksum
/// do not match.
pub fn open_store(
    path: &Path,
    expected_fingerprint: Option<u64>,
) -> Result<(SerializedRecords, Metadata)> {
    let file = File::open(path)
        .map_err(|e| DatasetError::storage_with_source(path, "failed to open record store", e))?;

    // SAFETY: The file is opened read-only and the mapping is never written
    // through. Stores are replaced by rename, never modified in place.
    let map = unsafe { Mmap::map(&file) }
        .map_err(|e| DatasetError::storage_with_source(path, "failed to memory-map record store", e))?;

    if map.len() < 8 {
        return Err(DatasetError::serialization("record store file too small"));
    }
    if map[..4] != STORE_MAGIC {
        return Err(DatasetError::serialization(format!(
            "invalid magic bytes: expected {:?}, got {:?}",
            STORE_MAGIC,
            &map[..4]
        )));
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&map[4..8]);
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    let header_end = 8 + header_len;
    if map.len() < header_end {
        return Err(DatasetError::serialization(
            "record store truncated: header incomplete",
        ));
    }

    let header: StoreHeader = bincode::deserialize(&map[8..header_end])
        .map_err(|e| DatasetError::serialization(format!("failed to deserialize store header: {e}")))?;

    if header.version != StoreHeader::VERSION {
        return Err(DatasetError::serialization(format!(
            "unsupported store version: expected {}, got {}",
            StoreHeader::VERSION,
            header.version
        )));
    }
    if let Some(expected) = expected_fingerprint {
        if header.fingerprint != expected {
            return Err(DatasetError::serialization(format!(
                "fingerprint mismatch: expected {expected:#x}, got {:#x}",
                header.fingerprint
            )));
        }
    }

    let data_len = header.data_len as usize;
    let expected_size = (header.num_records as usize)
        .checked_add(1)
        .and_then(|n| n.checked_mul(8))
        .and_then(|n| n.checked_add(header_end))
        .and_then(|n| n.checked_add(data_len));
    if expected_size != Some(map.len()) {
        return Err(DatasetError::serialization(format!(
            "record store size mismatch: header describes {} records and {} data bytes, file holds {} bytes",
            header.num_records,
            header.data_len,
            map.len()
        )));
    }
    let data_start = map.len() - data_len;

    let offsets = map[header_end..data_start]
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect::<Vec<u64>>();

    let computed = checksum(&map[data_start..]);
    if computed != header.checksum {
        return Err(DatasetError::serialization(format!(
            "checksum mismatch: expected {}, got {}",
            header.checksum, computed
        )));
    }

    let buffer = SharedBuffer::Mapped {
        map: Arc::new(map),
        start: data_start,
        len: data_len,
    };
    let records = SerializedRecords::from_parts(buffer, offsets)?;

    Ok((records, header.metainfo))
}
