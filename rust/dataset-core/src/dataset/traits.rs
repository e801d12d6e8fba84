// rust/dataset-core/src/dataset/traits.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::FilterConfig;
use crate::error::{BoxError, DatasetError, Result};
use crate::value::{CategoryId, Metadata, RawRecord, Sample};

/// Read-only context handed to the expansion step.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    /// Logical source name to resolved path prefix.
    pub data_prefix: &'a BTreeMap<String, PathBuf>,
    /// Metadata resolved so far, file-declared keys included.
    pub metainfo: &'a Metadata,
    pub test_mode: bool,
}

/// Result of expanding one raw record.
#[derive(Debug, Clone, PartialEq)]
pub enum Expanded {
    One(Sample),
    Many(Vec<Sample>),
}

impl Expanded {
    /// Normalizes to a sequence of samples.
    pub fn into_vec(self) -> Vec<Sample> {
        match self {
            Expanded::One(sample) => vec![sample],
            Expanded::Many(samples) => samples,
        }
    }
}

impl From<Sample> for Expanded {
    fn from(sample: Sample) -> Self {
        Expanded::One(sample)
    }
}

impl From<Vec<Sample>> for Expanded {
    fn from(samples: Vec<Sample>) -> Self {
        Expanded::Many(samples)
    }
}

/// Defines a concrete dataset variant.
///
/// `parse_data_info` is the only required method. Everything else has a
/// default: no class-level metadata, the configured filter policy, and no
/// category lookup.
pub trait AnnotationParser: Send + Sync {
    /// Expands one raw record into one or more samples.
    ///
    /// Errors are reported to the caller as an expansion error carrying the
    /// position of `raw` in the annotation file.
    fn parse_data_info(
        &self,
        raw: &RawRecord,
        ctx: &ParseContext<'_>,
    ) -> std::result::Result<Expanded, BoxError>;

    /// Class-level default metadata, ranked between user and file metadata.
    fn default_metainfo(&self) -> Metadata {
        Metadata::new()
    }

    /// Removes samples that should never be served.
    ///
    /// The default drops samples lacking any of `filter.required_keys`, and
    /// with `filter.filter_empty` also those holding an empty value there.
    fn filter_data(&self, samples: Vec<Sample>, filter: &FilterConfig) -> Vec<Sample> {
        if filter.is_noop() {
            return samples;
        }
        samples
            .into_iter()
            .filter(|sample| {
                filter.required_keys.iter().all(|key| match sample.get(key) {
                    Some(value) => !(filter.filter_empty && value.is_empty()),
                    None => false,
                })
            })
            .collect()
    }

    fn supports_cat_ids(&self) -> bool {
        false
    }

    /// Categories present in a committed sample.
    fn cat_ids(&self, sample: &Sample) -> Result<Vec<CategoryId>> {
        let _ = sample;
        Err(DatasetError::missing_capability("category lookup"))
    }

    /// Name of this parser, used in logs and cache fingerprints.
    fn name(&self) -> &'static str;

    /// Bytes identifying this parser and every setting that changes its
    /// output. Record caches are keyed on it, so parsers with settings must
    /// override it.
    fn cache_key(&self) -> std::result::Result<Vec<u8>, BoxError> {
        Ok(self.name().as_bytes().to_vec())
    }
}

/// Indexed access shared by the base dataset and every wrapper.
///
/// Accessors other than `metainfo` trigger full initialization on first use.
pub trait Dataset: Send + Sync {
    /// Resolved metadata. Available without full initialization.
    fn metainfo(&self) -> Metadata;

    /// Completes initialization. Idempotent.
    fn full_init(&self) -> Result<()>;

    fn is_fully_initialized(&self) -> bool;

    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The stored sample at `idx`, without preprocessing.
    fn get_data_info(&self, idx: usize) -> Result<Sample>;

    /// The sample at `idx` after the preprocessing pipeline.
    fn get(&self, idx: usize) -> Result<Sample>;

    fn supports_cat_ids(&self) -> bool {
        false
    }

    fn get_cat_ids(&self, idx: usize) -> Result<Vec<CategoryId>> {
        let _ = idx;
        Err(DatasetError::missing_capability("category lookup"))
    }
}

impl<D: Dataset + ?Sized> Dataset for Arc<D> {
    fn metainfo(&self) -> Metadata {
        (**self).metainfo()
    }

    fn full_init(&self) -> Result<()> {
        (**self).full_init()
    }

    fn is_fully_initialized(&self) -> bool {
        (**self).is_fully_initialized()
    }

    fn len(&self) -> Result<usize> {
        (**self).len()
    }

    fn get_data_info(&self, idx: usize) -> Result<Sample> {
        (**self).get_data_info(idx)
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        (**self).get(idx)
    }

    fn supports_cat_ids(&self) -> bool {
        (**self).supports_cat_ids()
    }

    fn get_cat_ids(&self, idx: usize) -> Result<Vec<CategoryId>> {
        (**self).get_cat_ids(idx)
    }
}
