// rust/dataset-core/src/store/mod.rs

//! Record store: the committed, indexable sequence of samples.
//!
//! Two representations answer reads identically:
//!
//! - **Direct**: one decoded [`Sample`] per index, owned by the dataset.
//! - **Serialized**: every sample encoded with `bincode` into one contiguous
//!   buffer plus an offset table. Clones share the buffer, and a store
//!   written with [`write_store`] can be memory-mapped by sibling processes
//!   via [`open_store`].
//!
//! A store is never mutated after it is committed.

mod format;
mod serialized;

pub use format::{checksum, open_store, write_store, StoreHeader, STORE_MAGIC};
pub use serialized::{SerializedRecords, SharedBuffer};

use crate::error::{DatasetError, Result};
use crate::value::Sample;

#[derive(Debug, Clone)]
pub enum RecordStore {
    Direct(Vec<Sample>),
    Serialized(SerializedRecords),
}

impl RecordStore {
    /// Commits `samples`, encoding them when `serialize` is set.
    pub fn commit(samples: Vec<Sample>, serialize: bool) -> Result<Self> {
        if serialize {
            Ok(RecordStore::Serialized(SerializedRecords::from_samples(
                &samples,
            )?))
        } else {
            Ok(RecordStore::Direct(samples))
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordStore::Direct(samples) => samples.len(),
            RecordStore::Serialized(records) => records.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an owned copy of sample `idx`.
    ///
    /// # Errors
    ///
    /// Returns an index error when `idx >= len`, or a serialization error if
    /// the encoded bytes cannot be decoded.
    pub fn get(&self, idx: usize) -> Result<Sample> {
        match self {
            RecordStore::Direct(samples) => samples
                .get(idx)
                .cloned()
                .ok_or_else(|| DatasetError::index(idx, samples.len())),
            RecordStore::Serialized(records) => records.get(idx),
        }
    }

    /// Builds a new store holding the samples at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        match self {
            RecordStore::Direct(samples) => indices
                .iter()
                .map(|&i| {
                    samples
                        .get(i)
                        .cloned()
                        .ok_or_else(|| DatasetError::index(i, samples.len()))
                })
                .collect::<Result<Vec<_>>>()
                .map(RecordStore::Direct),
            RecordStore::Serialized(records) => {
                records.select(indices).map(RecordStore::Serialized)
            }
        }
    }

    pub fn as_serialized(&self) -> Option<&SerializedRecords> {
        match self {
            RecordStore::Serialized(records) => Some(records),
            RecordStore::Direct(_) => None,
        }
    }

    /// Short description of the representation, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordStore::Direct(_) => "direct",
            RecordStore::Serialized(records) if records.buffer().is_mapped() => "mapped",
            RecordStore::Serialized(_) => "serialized",
        }
    }
}
