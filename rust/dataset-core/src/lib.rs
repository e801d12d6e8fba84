// rust/dataset-core/src/lib.rs

//! Dataset Core Library
//!
//! This crate provides a lazily initialized, randomly indexable dataset
//! abstraction for training and evaluation pipelines: metadata resolution,
//! annotation loading, record expansion, a shareable serialized record
//! store, and composition wrappers (concat, repeat, class-balanced).

pub mod config;
pub mod error;
pub mod meta;
pub mod pipeline;
pub mod storage;
pub mod value;

// Re-export commonly used types for convenience
pub use config::{DatasetConfig, FilterConfig, IndexSelector, StorageConfig};
pub use error::{BoxError, DatasetError, Result};
pub use meta::resolve_metadata;
pub use pipeline::{Compose, Identity, Pipeline, PipelineResult};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader, StorageWriter};
pub use value::{CategoryId, Metadata, RawRecord, Record, Sample, Value};

pub mod loader;
pub use loader::{AnnotationLoader, JsonAnnotationLoader, LoadedAnnotations, MemoryLoader};

pub mod store;
pub use store::{open_store, write_store, RecordStore, SerializedRecords, SharedBuffer, StoreHeader};

pub mod dataset;
pub use dataset::{
    AnnotationParser, BaseDataset, BaseDatasetBuilder, ClassBalancedDataset, ConcatDataset,
    Dataset, Expanded, GroupedParser, InitGuard, InitState, ParseContext, PassthroughParser,
    RepeatDataset, SAMPLE_IDX_KEY,
};
