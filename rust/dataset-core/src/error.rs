// rust/dataset-core/src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Boxed error produced by external collaborators (pipelines, parsers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum DatasetError {

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to load annotations from '{path}': {message}")]
    Load {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Failed to expand raw record {index}: {message}")]
    Expansion {
        index: usize,
        message: String,
    },

    #[error("Index {index} out of range (length: {len})")]
    Index {
        index: usize,
        len: usize,
    },

    #[error(transparent)]
    Pipeline(BoxError),

    #[error("Dataset does not support {capability}")]
    MissingCapability {
        capability: &'static str,
    },

    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, DatasetError>;

// Convenience constructors
impl DatasetError {

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn load_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Load {
            path: path.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn expansion(index: usize, message: impl Into<String>) -> Self {
        Self::Expansion {
            index,
            message: message.into(),
        }
    }

    pub fn index(index: usize, len: usize) -> Self {
        Self::Index { index, len }
    }

    pub fn pipeline(source: BoxError) -> Self {
        Self::Pipeline(source)
    }

    pub fn missing_capability(capability: &'static str) -> Self {
        Self::MissingCapability { capability }
    }

    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}
