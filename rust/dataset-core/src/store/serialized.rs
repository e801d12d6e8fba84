// rust/dataset-core/src/store/serialized.rs

//! Contiguous byte-buffer representation of committed samples.

use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use memmap2::Mmap;

use crate::error::{DatasetError, Result};
use crate::value::Sample;

/// Read-only bytes shared by every reader of a serialized store.
///
/// Heap buffers are reference counted and shared across threads; mapped
/// buffers are backed by a read-only file mapping and shared across
/// processes through the page cache.
#[derive(Clone)]
pub enum SharedBuffer {
    Heap(Bytes),
    Mapped {
        map: Arc<Mmap>,
        start: usize,
        len: usize,
    },
}

impl SharedBuffer {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            SharedBuffer::Heap(bytes) => &bytes[..],
            SharedBuffer::Mapped { map, start, len } => &map[*start..*start + *len],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            SharedBuffer::Heap(bytes) => bytes.len(),
            SharedBuffer::Mapped { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_mapped(&self) -> bool {
        matches!(self, SharedBuffer::Mapped { .. })
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBuffer")
            .field("mapped", &self.is_mapped())
            .field("len", &self.len())
            .finish()
    }
}

/// Samples encoded back to back in one buffer.
///
/// `offsets` holds one more entry than there are samples: sample `i` lives
/// in `buffer[offsets[i]..offsets[i + 1]]`. Neither part is mutated after
/// construction, so clones can be handed to any number of readers.
#[derive(Debug, Clone)]
pub struct SerializedRecords {
    buffer: SharedBuffer,
    offsets: Arc<[u64]>,
}

impl SerializedRecords {
    /// Encodes `samples` into a fresh heap buffer.
    pub fn from_samples(samples: &[Sample]) -> Result<Self> {
        let mut buf = Vec::new();
        let mut offsets = Vec::with_capacity(samples.len() + 1);
        offsets.push(0u64);

        for sample in samples {
            bincode::serialize_into(&mut buf, sample)
                .map_err(|e| DatasetError::serialization(format!("failed to encode sample: {e}")))?;
            offsets.push(buf.len() as u64);
        }

        Ok(Self {
            buffer: SharedBuffer::Heap(Bytes::from(buf)),
            offsets: offsets.into(),
        })
    }

    /// Assembles a store from an existing buffer and boundary table.
    ///
    /// # Errors
    ///
    /// Returns an error if the offsets are empty, do not start at zero, are
    /// not monotonic, or do not end at the buffer length.
    pub fn from_parts(buffer: SharedBuffer, offsets: Vec<u64>) -> Result<Self> {
        if offsets.first() != Some(&0) {
            return Err(DatasetError::serialization(
                "offset table must start at 0",
            ));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(DatasetError::serialization(
                "offset table must be non-decreasing",
            ));
        }
        let end = offsets.last().copied().unwrap_or(0);
        if end != buffer.len() as u64 {
            return Err(DatasetError::serialization(format!(
                "offset table ends at {end} but buffer holds {} bytes",
                buffer.len()
            )));
        }

        Ok(Self {
            buffer,
            offsets: offsets.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Encoded bytes of sample `idx`.
    pub fn raw(&self, idx: usize) -> Option<&[u8]> {
        if idx >= self.len() {
            return None;
        }
        let start = self.offsets[idx] as usize;
        let end = self.offsets[idx + 1] as usize;
        Some(&self.buffer.as_slice()[start..end])
    }

    /// Decodes sample `idx`.
    pub fn get(&self, idx: usize) -> Result<Sample> {
        let bytes = self
            .raw(idx)
            .ok_or_else(|| DatasetError::index(idx, self.len()))?;
        bincode::deserialize(bytes).map_err(|e| {
            DatasetError::serialization(format!("failed to decode sample {idx}: {e}"))
        })
    }

    /// Copies the encoded bytes of the chosen samples into a new store
    /// without decoding them.
    pub fn select(&self, indices: &[usize]) -> Result<Self> {
        let mut buf = BytesMut::new();
        let mut offsets = Vec::with_capacity(indices.len() + 1);
        offsets.push(0u64);

        for &idx in indices {
            let bytes = self
                .raw(idx)
                .ok_or_else(|| DatasetError::index(idx, self.len()))?;
            buf.extend_from_slice(bytes);
            offsets.push(buf.len() as u64);
        }

        Ok(Self {
            buffer: SharedBuffer::Heap(buf.freeze()),
            offsets: offsets.into(),
        })
    }

    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    /// Size of the encoded data in bytes.
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }
}
