// rust/dataset-core/src/dataset/parsers.rs

//! Built-in dataset variants.
//!
//! Both parsers join data prefixes onto path fields: for every logical source
//! `name` in `data_prefix`, a string field `{name}_path` is rewritten to
//! `prefix/value`. With `img = "/data/images"`, `{"img_path": "a.jpg"}`
//! becomes `{"img_path": "/data/images/a.jpg"}`.

use std::collections::BTreeMap;
use std::path::PathBuf;

use super::traits::{AnnotationParser, Expanded, ParseContext};
use crate::error::{BoxError, DatasetError, Result};
use crate::value::{CategoryId, Metadata, RawRecord, Sample, Value};

fn join_prefixes(
    sample: &mut Sample,
    data_prefix: &BTreeMap<String, PathBuf>,
) -> std::result::Result<(), BoxError> {
    for (name, prefix) in data_prefix {
        let key = format!("{name}_path");
        match sample.get_mut(&key) {
            Some(Value::Str(path)) => {
                *path = prefix.join(path.as_str()).to_string_lossy().into_owned();
            }
            Some(other) => {
                return Err(format!("field '{key}' must be a string, got {}", other.kind()).into());
            }
            None => {}
        }
    }
    Ok(())
}

/// Reads category ids stored as one int or a list of ints. A missing or
/// null field means no categories.
fn category_ids(sample: &Sample, key: &str) -> std::result::Result<Vec<CategoryId>, String> {
    match sample.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Int(id)) => Ok(vec![*id]),
        Some(Value::List(items)) => items
            .iter()
            .map(|item| {
                item.as_i64().ok_or_else(|| {
                    format!(
                        "category field '{key}' must hold ints, found {}",
                        item.kind()
                    )
                })
            })
            .collect(),
        Some(other) => Err(format!(
            "category field '{key}' must be an int or a list of ints, got {}",
            other.kind()
        )),
    }
}

fn settings_key(
    name: &str,
    group_key: Option<&str>,
    category_key: Option<&str>,
    metainfo: &Metadata,
) -> std::result::Result<Vec<u8>, BoxError> {
    Ok(bincode::serialize(&(name, group_key, category_key, metainfo))?)
}

/// One raw record becomes one sample.
#[derive(Debug, Clone, Default)]
pub struct PassthroughParser {
    category_key: Option<String>,
    metainfo: Metadata,
}

impl PassthroughParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables category lookup from `key`.
    #[must_use]
    pub fn with_category_key(mut self, key: impl Into<String>) -> Self {
        self.category_key = Some(key.into());
        self
    }

    /// Class-level default metadata.
    #[must_use]
    pub fn with_metainfo(mut self, metainfo: Metadata) -> Self {
        self.metainfo = metainfo;
        self
    }
}

impl AnnotationParser for PassthroughParser {
    fn parse_data_info(
        &self,
        raw: &RawRecord,
        ctx: &ParseContext<'_>,
    ) -> std::result::Result<Expanded, BoxError> {
        let mut sample = raw.clone();
        join_prefixes(&mut sample, ctx.data_prefix)?;
        if let Some(key) = &self.category_key {
            category_ids(&sample, key)?;
        }
        Ok(Expanded::One(sample))
    }

    fn default_metainfo(&self) -> Metadata {
        self.metainfo.clone()
    }

    fn supports_cat_ids(&self) -> bool {
        self.category_key.is_some()
    }

    fn cat_ids(&self, sample: &Sample) -> Result<Vec<CategoryId>> {
        let key = self
            .category_key
            .as_deref()
            .ok_or_else(|| DatasetError::missing_capability("category lookup"))?;
        category_ids(sample, key).map_err(DatasetError::config)
    }

    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn cache_key(&self) -> std::result::Result<Vec<u8>, BoxError> {
        settings_key(self.name(), None, self.category_key.as_deref(), &self.metainfo)
    }
}

/// One raw record holding a list of items becomes one sample per item.
///
/// Each sample holds the record's other fields plus the item's own fields;
/// item fields win on conflict. Used for grouped formats such as video
/// records listing their clips.
#[derive(Debug, Clone)]
pub struct GroupedParser {
    group_key: String,
    category_key: Option<String>,
    metainfo: Metadata,
}

impl GroupedParser {
    pub fn new(group_key: impl Into<String>) -> Self {
        Self {
            group_key: group_key.into(),
            category_key: None,
            metainfo: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_category_key(mut self, key: impl Into<String>) -> Self {
        self.category_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_metainfo(mut self, metainfo: Metadata) -> Self {
        self.metainfo = metainfo;
        self
    }

    pub fn group_key(&self) -> &str {
        &self.group_key
    }
}

impl AnnotationParser for GroupedParser {
    fn parse_data_info(
        &self,
        raw: &RawRecord,
        ctx: &ParseContext<'_>,
    ) -> std::result::Result<Expanded, BoxError> {
        let items = match raw.get(&self.group_key) {
            Some(Value::List(items)) => items,
            Some(other) => {
                return Err(format!(
                    "field '{}' must be a list, got {}",
                    self.group_key,
                    other.kind()
                )
                .into());
            }
            None => return Err(format!("missing field '{}'", self.group_key).into()),
        };

        let mut shared = raw.clone();
        shared.remove(&self.group_key);

        let mut samples = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            let Value::Map(fields) = item else {
                return Err(format!(
                    "{}[{position}] must be a map, got {}",
                    self.group_key,
                    item.kind()
                )
                .into());
            };
            let mut sample = shared.clone();
            sample.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
            join_prefixes(&mut sample, ctx.data_prefix)?;
            if let Some(key) = &self.category_key {
                category_ids(&sample, key)?;
            }
            samples.push(sample);
        }

        Ok(Expanded::Many(samples))
    }

    fn default_metainfo(&self) -> Metadata {
        self.metainfo.clone()
    }

    fn supports_cat_ids(&self) -> bool {
        self.category_key.is_some()
    }

    fn cat_ids(&self, sample: &Sample) -> Result<Vec<CategoryId>> {
        let key = self
            .category_key
            .as_deref()
            .ok_or_else(|| DatasetError::missing_capability("category lookup"))?;
        category_ids(sample, key).map_err(DatasetError::config)
    }

    fn name(&self) -> &'static str {
        "grouped"
    }

    fn cache_key(&self) -> std::result::Result<Vec<u8>, BoxError> {
        settings_key(
            self.name(),
            Some(&self.group_key),
            self.category_key.as_deref(),
            &self.metainfo,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(prefix: &'a BTreeMap<String, PathBuf>, meta: &'a Metadata) -> ParseContext<'a> {
        ParseContext {
            data_prefix: prefix,
            metainfo: meta,
            test_mode: false,
        }
    }

    fn raw(pairs: &[(&str, Value)]) -> RawRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn item(pairs: &[(&str, Value)]) -> Value {
        Value::Map(raw(pairs))
    }

    #[test]
    fn test_passthrough_joins_prefix() {
        let mut prefix = BTreeMap::new();
        prefix.insert("img".to_string(), PathBuf::from("/data/images"));
        prefix.insert("seg".to_string(), PathBuf::from("/data/masks"));
        let meta = Metadata::new();

        let record = raw(&[("img_path", Value::from("a.jpg")), ("label", Value::Int(3))]);
        let out = PassthroughParser::new()
            .parse_data_info(&record, &ctx(&prefix, &meta))
            .unwrap()
            .into_vec();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["img_path"].as_str(), Some("/data/images/a.jpg"));
        assert!(!out[0].contains_key("seg_path"));
        assert_eq!(out[0]["label"], Value::Int(3));
        // Input record is untouched
        assert_eq!(record["img_path"].as_str(), Some("a.jpg"));
    }

    #[test]
    fn test_passthrough_rejects_non_string_path() {
        let mut prefix = BTreeMap::new();
        prefix.insert("img".to_string(), PathBuf::from("/data"));
        let meta = Metadata::new();

        let err = PassthroughParser::new()
            .parse_data_info(&raw(&[("img_path", Value::Int(1))]), &ctx(&prefix, &meta))
            .unwrap_err();
        assert!(err.to_string().contains("'img_path' must be a string"));
    }

    #[test]
    fn test_passthrough_categories() {
        let parser = PassthroughParser::new().with_category_key("labels");
        assert!(parser.supports_cat_ids());

        let sample = raw(&[("labels", Value::from(vec![2i64, 5]))]);
        assert_eq!(parser.cat_ids(&sample).unwrap(), vec![2, 5]);
        assert_eq!(parser.cat_ids(&raw(&[("labels", Value::Int(4))])).unwrap(), vec![4]);
        assert!(parser.cat_ids(&Sample::new()).unwrap().is_empty());
        assert!(parser.cat_ids(&raw(&[("labels", Value::from("cat"))])).is_err());

        let prefix = BTreeMap::new();
        let meta = Metadata::new();
        assert!(parser
            .parse_data_info(&raw(&[("labels", Value::from(vec!["x"]))]), &ctx(&prefix, &meta))
            .is_err());
    }

    #[test]
    fn test_passthrough_default_metainfo() {
        let mut classes = Metadata::new();
        classes.insert("classes".into(), Value::from(vec!["a", "b"]));
        let parser = PassthroughParser::new().with_metainfo(classes.clone());
        assert_eq!(parser.default_metainfo(), classes);
        assert!(PassthroughParser::new().default_metainfo().is_empty());
    }

    #[test]
    fn test_grouped_expands_items() {
        let mut prefix = BTreeMap::new();
        prefix.insert("video".to_string(), PathBuf::from("/videos"));
        let meta = Metadata::new();

        let record = raw(&[
            ("video_path", Value::from("clip.mp4")),
            ("label", Value::Int(1)),
            (
                "clips",
                Value::List(vec![
                    item(&[("start", Value::Int(0))]),
                    item(&[("start", Value::Int(32)), ("label", Value::Int(7))]),
                ]),
            ),
        ]);

        let parser = GroupedParser::new("clips").with_category_key("label");
        let out = parser
            .parse_data_info(&record, &ctx(&prefix, &meta))
            .unwrap()
            .into_vec();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["video_path"].as_str(), Some("/videos/clip.mp4"));
        assert_eq!(out[0]["start"], Value::Int(0));
        assert!(!out[0].contains_key("clips"));
        assert_eq!(parser.cat_ids(&out[0]).unwrap(), vec![1]);
        assert_eq!(parser.cat_ids(&out[1]).unwrap(), vec![7]);
    }

    #[test]
    fn test_grouped_empty_list_yields_nothing() {
        let prefix = BTreeMap::new();
        let meta = Metadata::new();
        let out = GroupedParser::new("clips")
            .parse_data_info(&raw(&[("clips", Value::List(vec![]))]), &ctx(&prefix, &meta))
            .unwrap();
        assert!(out.into_vec().is_empty());
    }

    #[test]
    fn test_grouped_malformed_records() {
        let prefix = BTreeMap::new();
        let meta = Metadata::new();
        let parser = GroupedParser::new("clips");

        let missing = parser.parse_data_info(&RawRecord::new(), &ctx(&prefix, &meta));
        assert!(missing.unwrap_err().to_string().contains("missing field 'clips'"));

        let not_list = parser.parse_data_info(&raw(&[("clips", Value::Int(1))]), &ctx(&prefix, &meta));
        assert!(not_list.unwrap_err().to_string().contains("must be a list"));

        let bad_item = parser.parse_data_info(
            &raw(&[("clips", Value::List(vec![Value::Int(1)]))]),
            &ctx(&prefix, &meta),
        );
        assert!(bad_item.unwrap_err().to_string().contains("clips[0] must be a map"));
        assert!(!parser.supports_cat_ids());
    }

    #[test]
    fn test_cache_key_tracks_settings() {
        let clips = GroupedParser::new("clips").cache_key().unwrap();
        assert_eq!(clips, GroupedParser::new("clips").cache_key().unwrap());
        assert_ne!(clips, GroupedParser::new("frames").cache_key().unwrap());
        assert_ne!(
            clips,
            GroupedParser::new("clips").with_category_key("label").cache_key().unwrap()
        );

        let mut classes = Metadata::new();
        classes.insert("classes".into(), Value::from(vec!["a"]));
        assert_ne!(
            PassthroughParser::new().cache_key().unwrap(),
            PassthroughParser::new().with_metainfo(classes).cache_key().unwrap()
        );
    }
}
