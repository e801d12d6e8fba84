// rust/dataset-core/src/dataset/testing.rs

//! In-memory datasets for wrapper tests.

use std::sync::Arc;

use super::base::BaseDataset;
use super::parsers::PassthroughParser;
use super::traits::Dataset;
use crate::config::DatasetConfig;
use crate::loader::MemoryLoader;
use crate::value::{CategoryId, Metadata, RawRecord, Value};

/// Builds a [`BaseDataset`] over in-memory records tagged with `source`.
pub(crate) struct Toy {
    source: String,
    records: Vec<RawRecord>,
    user_meta: Metadata,
    file_meta: Metadata,
    categories: bool,
}

impl Toy {
    pub(crate) fn new(source: &str, records: Vec<RawRecord>) -> Self {
        Self {
            source: source.to_string(),
            records,
            user_meta: Metadata::new(),
            file_meta: Metadata::new(),
            categories: true,
        }
    }

    pub(crate) fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.user_meta.insert(key.to_string(), value);
        self
    }

    pub(crate) fn with_file_meta(mut self, key: &str, value: Value) -> Self {
        self.file_meta.insert(key.to_string(), value);
        self
    }

    pub(crate) fn without_categories(mut self) -> Self {
        self.categories = false;
        self
    }

    pub(crate) fn build(self) -> Arc<dyn Dataset> {
        let mut config = DatasetConfig::new(format!("{}.json", self.source));
        config.metainfo = self
            .user_meta
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::from(v)))
            .collect();

        let records = self
            .records
            .into_iter()
            .map(|mut r| {
                r.insert("source".into(), Value::from(self.source.as_str()));
                r
            })
            .collect();

        let parser = if self.categories {
            PassthroughParser::new().with_category_key("label")
        } else {
            PassthroughParser::new()
        };

        let dataset = BaseDataset::builder(config, Arc::new(parser))
            .loader(Arc::new(MemoryLoader::new(self.file_meta, records)))
            .build()
            .unwrap();
        Arc::new(dataset)
    }
}

/// One record per label.
pub(crate) fn labelled(labels: &[CategoryId]) -> Vec<RawRecord> {
    labels
        .iter()
        .map(|&label| {
            let mut r = RawRecord::new();
            r.insert("label".into(), Value::Int(label));
            r
        })
        .collect()
}

/// One record per category set.
pub(crate) fn multi_labelled(labels: &[&[CategoryId]]) -> Vec<RawRecord> {
    labels
        .iter()
        .map(|set| {
            let mut r = RawRecord::new();
            r.insert("label".into(), Value::from(set.to_vec()));
            r
        })
        .collect()
}
