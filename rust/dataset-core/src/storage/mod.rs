// rust/dataset-core/src/storage/mod.rs

//! Storage abstraction for annotation files and shared record stores.
//!
//! # Example
//!
//! ```no_run
//! use dataset_core::config::StorageConfig;
//! use dataset_core::storage::{LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default());
//!
//! let mut writer = storage.open_write(Path::new("example.json")).unwrap();
//! writer.write_all(b"{}").unwrap();
//! writer.finish().unwrap();
//!
//! let mut reader = storage.open_read(Path::new("example.json")).unwrap();
//! let content = reader.read_all().unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
