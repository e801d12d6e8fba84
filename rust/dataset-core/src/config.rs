// rust/dataset-core/src/config.rs

//! Dataset configuration.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{DatasetError, Result};
use crate::value::{record_from_json, Metadata};

/// Top-level dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Annotation file. Joined onto `data_root` when relative.
    pub ann_file: PathBuf,
    /// Root directory for the annotation file and data prefixes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_root: Option<PathBuf>,
    /// Logical source name (e.g. "img") to path prefix.
    pub data_prefix: BTreeMap<String, PathBuf>,
    /// User-supplied metadata; overrides class defaults and the file.
    pub metainfo: serde_json::Map<String, serde_json::Value>,
    /// Filtering applied once before commit.
    pub filter: FilterConfig,
    /// Optional subsample applied after filtering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indices: Option<IndexSelector>,
    /// Commit records into one contiguous byte buffer instead of a vector.
    pub serialize_data: bool,
    /// Defer annotation loading until first data access.
    pub lazy_init: bool,
    /// Evaluation mode: a pipeline dropping a sample is an error.
    pub test_mode: bool,
    /// How many fallback indices a training read may try.
    pub max_refetch: usize,
    /// Shared record store file reused across processes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_cache: Option<PathBuf>,
    pub storage: StorageConfig,
}

/// Built-in filter policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Samples missing any of these keys are dropped.
    pub required_keys: Vec<String>,
    /// Also drop samples where a required key holds an empty value.
    pub filter_empty: bool,
}

impl FilterConfig {
    /// Whether this policy removes nothing.
    pub fn is_noop(&self) -> bool {
        self.required_keys.is_empty()
    }
}

/// Selects a subset of committed samples.
///
/// In TOML: `indices = 100` keeps the first 100, `indices = -100` the last
/// 100, `indices = [0, 5, 9]` picks positions and `indices = 0.25` keeps the
/// leading quarter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndexSelector {
    Count(i64),
    List(Vec<usize>),
    Fraction(f64),
}

impl IndexSelector {
    /// Resolves the selector against `len` samples.
    ///
    /// Counts larger than `len` are clamped; explicit positions must be in range.
    pub fn resolve(&self, len: usize) -> Result<Vec<usize>> {
        match self {
            IndexSelector::Count(n) if *n >= 0 => Ok((0..(*n as usize).min(len)).collect()),
            IndexSelector::Count(n) => {
                let keep = (n.unsigned_abs() as usize).min(len);
                Ok((len - keep..len).collect())
            }
            IndexSelector::List(indices) => {
                if let Some(&bad) = indices.iter().find(|&&i| i >= len) {
                    return Err(DatasetError::index(bad, len));
                }
                Ok(indices.clone())
            }
            IndexSelector::Fraction(f) => {
                if !(*f > 0.0 && *f <= 1.0) {
                    return Err(DatasetError::config(format!(
                        "indices fraction must be in (0, 1], got {f}"
                    )));
                }
                let keep = ((len as f64) * f).floor() as usize;
                Ok((0..keep.min(len)).collect())
            }
        }
    }
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
    // Whether to use memory-mapped I/O for large annotation files.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            ann_file: PathBuf::new(),
            data_root: None,
            data_prefix: BTreeMap::new(),
            metainfo: serde_json::Map::new(),
            filter: FilterConfig::default(),
            indices: None,
            serialize_data: true,
            lazy_init: true,
            test_mode: false,
            max_refetch: 1000,
            record_cache: None,
            storage: StorageConfig::default(),
        }
    }
}

impl FromStr for DatasetConfig {
    type Err = DatasetError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| DatasetError::config_with_source("failed to parse TOML config", e))
    }
}

impl DatasetConfig {
    /// Creates a configuration for the given annotation file with defaults elsewhere.
    pub fn new(ann_file: impl Into<PathBuf>) -> Self {
        Self {
            ann_file: ann_file.into(),
            ..Default::default()
        }
    }

    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DatasetError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `DSET_`. For example:
    // - `DSET_ANN_FILE` overrides `ann_file`
    // - `DSET_LAZY_INIT` overrides `lazy_init`
    // - `DSET_STORAGE_USE_MMAP` overrides `storage.use_mmap`
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("DSET_ANN_FILE") {
            self.ann_file = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("DSET_DATA_ROOT") {
            self.data_root = Some(PathBuf::from(val));
        }
        if let Ok(val) = std::env::var("DSET_SERIALIZE_DATA") {
            if let Ok(v) = val.parse() {
                self.serialize_data = v;
            }
        }
        if let Ok(val) = std::env::var("DSET_LAZY_INIT") {
            if let Ok(v) = val.parse() {
                self.lazy_init = v;
            }
        }
        if let Ok(val) = std::env::var("DSET_TEST_MODE") {
            if let Ok(v) = val.parse() {
                self.test_mode = v;
            }
        }
        if let Ok(val) = std::env::var("DSET_MAX_REFETCH") {
            if let Ok(v) = val.parse() {
                self.max_refetch = v;
            }
        }
        if let Ok(val) = std::env::var("DSET_RECORD_CACHE") {
            self.record_cache = Some(PathBuf::from(val));
        }

        // Storage overrides
        if let Ok(val) = std::env::var("DSET_STORAGE_BUFFER_SIZE") {
            if let Ok(v) = val.parse() {
                self.storage.buffer_size = v;
            }
        }
        if let Ok(val) = std::env::var("DSET_STORAGE_USE_MMAP") {
            if let Ok(v) = val.parse() {
                self.storage.use_mmap = v;
            }
        }

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.ann_file.as_os_str().is_empty() {
            return Err(DatasetError::config("ann_file must not be empty"));
        }

        if self.storage.buffer_size == 0 {
            return Err(DatasetError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }

        if let Some(IndexSelector::Fraction(f)) = &self.indices {
            if !(*f > 0.0 && *f <= 1.0) {
                return Err(DatasetError::config(format!(
                    "indices fraction must be in (0, 1], got {f}"
                )));
            }
        }

        if self.record_cache.is_some() && !self.serialize_data {
            return Err(DatasetError::config(
                "record_cache requires serialize_data = true",
            ));
        }

        Ok(())
    }

    /// User-supplied metadata as a record.
    pub fn user_metainfo(&self) -> Metadata {
        record_from_json(self.metainfo.clone())
    }

    /// The annotation file path, joined onto `data_root` when relative.
    pub fn resolved_ann_file(&self) -> PathBuf {
        join_root(self.data_root.as_deref(), &self.ann_file)
    }

    /// Data prefixes, each joined onto `data_root` when relative.
    pub fn resolved_data_prefix(&self) -> BTreeMap<String, PathBuf> {
        self.data_prefix
            .iter()
            .map(|(k, v)| (k.clone(), join_root(self.data_root.as_deref(), v)))
            .collect()
    }
}

fn join_root(root: Option<&Path>, path: &Path) -> PathBuf {
    match root {
        Some(root) if !path.is_absolute() => root.join(path),
        _ => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = DatasetConfig::default();

        assert!(config.ann_file.as_os_str().is_empty());
        assert!(config.data_root.is_none());
        assert!(config.data_prefix.is_empty());
        assert!(config.metainfo.is_empty());
        assert!(config.filter.is_noop());
        assert!(config.indices.is_none());
        assert!(config.serialize_data);
        assert!(config.lazy_init);
        assert!(!config.test_mode);
        assert_eq!(config.max_refetch, 1000);
        assert!(config.record_cache.is_none());
        assert_eq!(config.storage.buffer_size, 64 * 1024);
    }

    #[test]
    fn test_default_requires_ann_file() {
        assert!(DatasetConfig::default().validate().is_err());
        assert!(DatasetConfig::new("ann.json").validate().is_ok());
    }

    #[test]
    fn test_from_str_full() {
        let toml = r#"
            ann_file = "annotations/train.json"
            data_root = "/data/coco"
            serialize_data = false
            lazy_init = false
            test_mode = true
            max_refetch = 10
            indices = 100

            [data_prefix]
            img = "images/train"

            [metainfo]
            classes = ["cat", "dog"]
            version = 2

            [filter]
            required_keys = ["img_path"]
            filter_empty = true

            [storage]
            use_mmap = false
        "#;

        let config: DatasetConfig = toml.parse().unwrap();

        assert_eq!(config.ann_file, PathBuf::from("annotations/train.json"));
        assert_eq!(config.data_root, Some(PathBuf::from("/data/coco")));
        assert!(!config.serialize_data);
        assert!(!config.lazy_init);
        assert!(config.test_mode);
        assert_eq!(config.max_refetch, 10);
        assert_eq!(config.indices, Some(IndexSelector::Count(100)));
        assert_eq!(config.data_prefix["img"], PathBuf::from("images/train"));
        assert_eq!(config.filter.required_keys, vec!["img_path".to_string()]);
        assert!(config.filter.filter_empty);
        assert!(!config.storage.use_mmap);

        let meta = config.user_metainfo();
        assert_eq!(meta["version"].as_i64(), Some(2));
        assert_eq!(meta["classes"].as_list().unwrap().len(), 2);
    }

    #[test]
    fn test_index_selector_forms() {
        let config: DatasetConfig = "ann_file = \"a.json\"\nindices = [1, 3]".parse().unwrap();
        assert_eq!(config.indices, Some(IndexSelector::List(vec![1, 3])));

        let config: DatasetConfig = "ann_file = \"a.json\"\nindices = 0.5".parse().unwrap();
        assert_eq!(config.indices, Some(IndexSelector::Fraction(0.5)));

        let config: DatasetConfig = "ann_file = \"a.json\"\nindices = -2".parse().unwrap();
        assert_eq!(config.indices, Some(IndexSelector::Count(-2)));
    }

    #[test]
    fn test_index_selector_resolve() {
        assert_eq!(IndexSelector::Count(3).resolve(10).unwrap(), vec![0, 1, 2]);
        assert_eq!(IndexSelector::Count(30).resolve(3).unwrap(), vec![0, 1, 2]);
        assert_eq!(IndexSelector::Count(-2).resolve(5).unwrap(), vec![3, 4]);
        assert_eq!(IndexSelector::Fraction(0.5).resolve(5).unwrap(), vec![0, 1]);
        assert_eq!(
            IndexSelector::List(vec![4, 0]).resolve(5).unwrap(),
            vec![4, 0]
        );
        assert!(matches!(
            IndexSelector::List(vec![5]).resolve(5),
            Err(DatasetError::Index { index: 5, len: 5 })
        ));
    }

    #[test]
    fn test_resolved_paths() {
        let mut config = DatasetConfig::new("ann.json");
        config.data_root = Some(PathBuf::from("/root"));
        config.data_prefix.insert("img".into(), PathBuf::from("imgs"));
        config.data_prefix.insert("seg".into(), PathBuf::from("/abs/seg"));

        assert_eq!(config.resolved_ann_file(), PathBuf::from("/root/ann.json"));
        let prefix = config.resolved_data_prefix();
        assert_eq!(prefix["img"], PathBuf::from("/root/imgs"));
        assert_eq!(prefix["seg"], PathBuf::from("/abs/seg"));
    }

    #[test]
    fn test_validate_invalid_fraction() {
        let mut config = DatasetConfig::new("ann.json");
        config.indices = Some(IndexSelector::Fraction(1.5));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_cache_requires_serialization() {
        let mut config = DatasetConfig::new("ann.json");
        config.record_cache = Some(PathBuf::from("cache.dsrs"));
        config.serialize_data = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_buffer_size() {
        let mut config = DatasetConfig::new("ann.json");
        config.storage.buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            ann_file = "train.json"
            data_root = "/tmp/test"
            "#
        )
        .unwrap();

        let config = DatasetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.resolved_ann_file(), PathBuf::from("/tmp/test/train.json"));
    }

    #[test]
    fn test_from_file_not_found() {
        let result = DatasetConfig::from_file("/nonexistent/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_str_invalid_toml() {
        let result: std::result::Result<DatasetConfig, _> = "invalid = [".parse();
        assert!(result.is_err());
    }

    // Helper to clear all DSET_ environment variables for test isolation
    fn clear_dset_env_vars() {
        for (key, _) in std::env::vars() {
            if key.starts_with("DSET_") {
                std::env::remove_var(&key);
            }
        }
    }

    // Environment variable tests are combined into a single test to avoid
    // race conditions when tests run in parallel, since env vars are global state.
    #[test]
    fn test_env_overrides() {
        clear_dset_env_vars();

        std::env::set_var("DSET_ANN_FILE", "/env/ann.json");
        std::env::set_var("DSET_LAZY_INIT", "false");
        std::env::set_var("DSET_MAX_REFETCH", "7");
        std::env::set_var("DSET_STORAGE_USE_MMAP", "false");

        let config = DatasetConfig::default().with_env_overrides();

        assert_eq!(config.ann_file, PathBuf::from("/env/ann.json"));
        assert!(!config.lazy_init);
        assert_eq!(config.max_refetch, 7);
        assert!(!config.storage.use_mmap);

        clear_dset_env_vars();

        // Invalid values are ignored
        std::env::set_var("DSET_MAX_REFETCH", "lots");
        let config = DatasetConfig::default().with_env_overrides();
        assert_eq!(config.max_refetch, 1000);

        clear_dset_env_vars();
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut original = DatasetConfig::new("train.json");
        original.indices = Some(IndexSelector::List(vec![2, 4]));
        original
            .metainfo
            .insert("classes".into(), serde_json::json!(["a", "b"]));

        let toml_str = toml::to_string(&original).unwrap();
        let parsed: DatasetConfig = toml_str.parse().unwrap();

        assert_eq!(parsed.ann_file, original.ann_file);
        assert_eq!(parsed.indices, original.indices);
        assert_eq!(parsed.metainfo, original.metainfo);
    }
}
