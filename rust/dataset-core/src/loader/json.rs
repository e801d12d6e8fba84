// rust/dataset-core/src/loader/json.rs

//! JSON annotation loader.
//!
//! The expected document layout is:
//!
//! ```text
//! {
//!     "metainfo": { "classes": ["cat", "dog"], ... },
//!     "data_list": [ { "img_path": "a.jpg", "label": 0 }, ... ]
//! }
//! ```

use std::path::Path;
use std::sync::Arc;

use super::{AnnotationLoader, LoadedAnnotations};
use crate::error::{DatasetError, Result};
use crate::storage::{LocalStorage, StorageBackend};
use crate::value::{record_from_json, RawRecord};

/// Loads annotations from JSON documents.
pub struct JsonAnnotationLoader {
    storage: Arc<dyn StorageBackend>,
}

impl Default for JsonAnnotationLoader {
    fn default() -> Self {
        Self::new(Arc::new(LocalStorage::default()))
    }
}

impl JsonAnnotationLoader {
    /// Creates a loader reading through `storage`.
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    /// Decodes an in-memory JSON document. `path` is only used for errors.
    pub fn parse(path: &Path, bytes: &[u8]) -> Result<LoadedAnnotations> {
        let document: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| DatasetError::load_with_source(path, "malformed JSON document", e))?;

        let serde_json::Value::Object(mut root) = document else {
            return Err(DatasetError::load(
                path,
                "annotation document must be a JSON object",
            ));
        };

        let metainfo = match root.remove("metainfo") {
            Some(serde_json::Value::Object(map)) => record_from_json(map),
            Some(_) => {
                return Err(DatasetError::load(path, "'metainfo' must be an object"));
            }
            None => {
                return Err(DatasetError::load(
                    path,
                    "annotation document must contain a 'metainfo' object",
                ));
            }
        };

        let raw_list = match root.remove("data_list") {
            Some(serde_json::Value::Array(items)) => items,
            Some(_) => {
                return Err(DatasetError::load(path, "'data_list' must be an array"));
            }
            None => {
                return Err(DatasetError::load(
                    path,
                    "annotation document must contain a 'data_list' array",
                ));
            }
        };

        let data_list = raw_list
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                serde_json::Value::Object(map) => Ok(record_from_json(map)),
                _ => Err(DatasetError::load(
                    path,
                    format!("data_list[{i}] must be an object"),
                )),
            })
            .collect::<Result<Vec<RawRecord>>>()?;

        Ok(LoadedAnnotations {
            metainfo,
            data_list,
        })
    }
}

impl AnnotationLoader for JsonAnnotationLoader {
    fn load(&self, path: &Path) -> Result<LoadedAnnotations> {
        let mut reader = self.storage.open_read(path).map_err(|e| {
            DatasetError::load_with_source(path, "failed to open annotation file", e)
        })?;

        if let Some(bytes) = reader.as_slice() {
            return Self::parse(path, bytes);
        }

        let bytes = reader.read_all().map_err(|e| {
            DatasetError::load_with_source(path, "failed to read annotation file", e)
        })?;
        Self::parse(path, &bytes)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}
