// rust/dataset-core/src/loader/mod.rs

//! Annotation loading.
//!
//! A loader decodes one annotation source into dataset-level metadata and an
//! ordered list of raw records. The dataset never inspects the file format
//! itself; it only relies on this contract.
//!
//! Two loaders ship with the crate:
//!
//! - [`JsonAnnotationLoader`] reads `{"metainfo": {...}, "data_list": [...]}`
//!   documents through a [`StorageBackend`](crate::storage::StorageBackend).
//! - [`MemoryLoader`] serves annotations that were built in-process.

mod json;
mod memory;

pub use json::JsonAnnotationLoader;
pub use memory::MemoryLoader;

use std::path::Path;

use crate::error::Result;
use crate::value::{Metadata, RawRecord};

/// The decoded form of an annotation source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedAnnotations {
    /// Metadata declared by the file (lowest merge priority).
    pub metainfo: Metadata,
    /// Raw records in file order.
    pub data_list: Vec<RawRecord>,
}

/// Decodes an annotation source.
///
/// Implementations must fail with [`DatasetError::Load`](crate::DatasetError::Load)
/// naming the violated structural requirement when the source is missing or
/// malformed. Retry policy, if any, belongs here and not in the dataset.
pub trait AnnotationLoader: Send + Sync {
    /// Loads the annotation source at `path`.
    fn load(&self, path: &Path) -> Result<LoadedAnnotations>;

    /// Name of this loader, used in log output.
    fn name(&self) -> &'static str;
}
