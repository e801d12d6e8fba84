// rust/dataset-core/src/dataset/mod.rs

//! Lazily initialized datasets and composition wrappers.
//!
//! A [`BaseDataset`] is defined by an [`AnnotationParser`] that expands raw
//! annotation records into samples. Metadata is available right after
//! construction; the annotation source is loaded on the first data access or
//! an explicit [`Dataset::full_init`].
//!
//! Wrappers hold the wrapped datasets behind `Arc<dyn Dataset>` and only
//! transform indices, so they nest freely and never copy record stores.
//!
//! # Example
//!
//! ```ignore
//! use dataset_core::{BaseDataset, ClassBalancedDataset, Dataset, DatasetConfig, PassthroughParser};
//! use std::sync::Arc;
//!
//! let config = DatasetConfig::from_file("train.toml")?.with_env_overrides();
//! let parser = PassthroughParser::new().with_category_key("label");
//! let dataset = Arc::new(BaseDataset::new(config, Arc::new(parser))?);
//!
//! // Load once before handing the dataset to readers
//! dataset.full_init()?;
//!
//! let balanced = ClassBalancedDataset::new(dataset, 0.1)?;
//! for idx in 0..balanced.len()? {
//!     let sample = balanced.get(idx)?;
//!     // Feed sample to the training loop
//! }
//! ```

mod base;
mod class_balanced;
mod concat;
mod init;
mod parsers;
mod repeat;
mod traits;

#[cfg(test)]
mod testing;

pub use base::{BaseDataset, BaseDatasetBuilder, SAMPLE_IDX_KEY};
pub use class_balanced::ClassBalancedDataset;
pub use concat::ConcatDataset;
pub use init::{InitGuard, InitState};
pub use parsers::{GroupedParser, PassthroughParser};
pub use repeat::RepeatDataset;
pub use traits::{AnnotationParser, Dataset, Expanded, ParseContext};
