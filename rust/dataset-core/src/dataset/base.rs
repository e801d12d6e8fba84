// rust/dataset-core/src/dataset/base.rs

//! The base dataset.
//!
//! Construction only resolves metadata and attaches the pipeline. Annotation
//! loading, expansion, filtering, subsampling and commit happen together in
//! `full_init`, either on request or on the first data access, and take
//! effect at most once per instance.
//!
//! ```text
//! construct ──► MetaOnly ──full_init──► FullyInitialized
//!                  │                         ▲
//!                  └── load ─ expand ─ filter ─ subsample ─ commit
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hasher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use twox_hash::XxHash64;

use super::init::{InitGuard, InitState};
use super::traits::{AnnotationParser, Dataset, ParseContext};
use crate::config::{DatasetConfig, IndexSelector};
use crate::error::{DatasetError, Result};
use crate::loader::{AnnotationLoader, JsonAnnotationLoader};
use crate::meta::{merge_file_declared, resolve_metadata};
use crate::pipeline::{Identity, Pipeline};
use crate::storage::{LocalStorage, StorageBackend};
use crate::store::{open_store, write_store, RecordStore};
use crate::value::{CategoryId, Metadata, Sample, Value};

/// Key under which every served sample carries its own index.
pub const SAMPLE_IDX_KEY: &str = "sample_idx";

/// State produced by a successful `full_init`.
#[derive(Debug)]
struct Committed {
    store: RecordStore,
    metainfo: Metadata,
}

/// Builds a [`BaseDataset`].
pub struct BaseDatasetBuilder {
    config: DatasetConfig,
    parser: Arc<dyn AnnotationParser>,
    pipeline: Arc<dyn Pipeline>,
    loader: Option<Arc<dyn AnnotationLoader>>,
    storage: Option<Arc<dyn StorageBackend>>,
}

impl BaseDatasetBuilder {
    /// Preprocessing applied on every indexed read. Defaults to [`Identity`].
    pub fn pipeline(mut self, pipeline: Arc<dyn Pipeline>) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Annotation loader. Defaults to a JSON loader over `storage`.
    pub fn loader(mut self, loader: Arc<dyn AnnotationLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Storage used for annotation reads and record cache exports.
    pub fn storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Validates the configuration, resolves metadata and, unless lazy
    /// initialization is configured, runs `full_init`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for invalid settings, and any
    /// initialization error when eager initialization is requested.
    pub fn build(self) -> Result<BaseDataset> {
        self.config.validate()?;

        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(LocalStorage::new(&self.config.storage)));
        let loader = self
            .loader
            .unwrap_or_else(|| Arc::new(JsonAnnotationLoader::new(storage.clone())));

        let meta = resolve_metadata(
            &self.config.user_metainfo(),
            &self.parser.default_metainfo(),
            &Metadata::new(),
        );
        let data_prefix = self.config.resolved_data_prefix();

        let dataset = BaseDataset {
            config: Arc::new(self.config),
            parser: self.parser,
            pipeline: self.pipeline,
            loader,
            storage,
            meta,
            data_prefix: Arc::new(data_prefix),
            selection: None,
            committed: InitGuard::new(),
        };

        tracing::debug!(
            "Constructed dataset '{}' with parser '{}' (lazy_init: {})",
            dataset.config.ann_file.display(),
            dataset.parser.name(),
            dataset.config.lazy_init
        );

        if !dataset.config.lazy_init {
            dataset.full_init()?;
        }
        Ok(dataset)
    }
}

/// A dataset over one annotation source.
pub struct BaseDataset {
    config: Arc<DatasetConfig>,
    parser: Arc<dyn AnnotationParser>,
    pipeline: Arc<dyn Pipeline>,
    loader: Arc<dyn AnnotationLoader>,
    storage: Arc<dyn StorageBackend>,
    /// Resolved from user and class metadata at construction.
    meta: Metadata,
    data_prefix: Arc<BTreeMap<String, PathBuf>>,
    /// Hash of the index selections applied by `subset`, if any.
    selection: Option<u64>,
    committed: InitGuard<Committed>,
}

impl BaseDataset {
    pub fn builder(config: DatasetConfig, parser: Arc<dyn AnnotationParser>) -> BaseDatasetBuilder {
        BaseDatasetBuilder {
            config,
            parser,
            pipeline: Arc::new(Identity),
            loader: None,
            storage: None,
        }
    }

    /// Builds a dataset reading JSON annotations from the local filesystem
    /// with an identity pipeline.
    pub fn new(config: DatasetConfig, parser: Arc<dyn AnnotationParser>) -> Result<Self> {
        Self::builder(config, parser).build()
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn parser(&self) -> &Arc<dyn AnnotationParser> {
        &self.parser
    }

    pub fn state(&self) -> InitState {
        if self.committed.is_initialized() {
            InitState::FullyInitialized
        } else {
            InitState::MetaOnly
        }
    }

    /// The committed record store, if initialization has completed.
    pub fn record_store(&self) -> Option<&RecordStore> {
        self.committed.get().map(|c| &c.store)
    }

    /// A fully initialized dataset holding only the selected samples.
    ///
    /// Configuration, parser and pipeline are shared with `self`.
    pub fn subset(&self, selector: &IndexSelector) -> Result<Self> {
        let committed = self.committed_or_init("subset")?;
        let picks = selector.resolve(committed.store.len())?;
        let store = committed.store.select(&picks)?;

        let mut hasher = XxHash64::with_seed(self.selection.unwrap_or_default());
        hasher.write_u64(picks.len() as u64);
        for &pick in &picks {
            hasher.write_u64(pick as u64);
        }

        Ok(Self {
            config: self.config.clone(),
            parser: self.parser.clone(),
            pipeline: self.pipeline.clone(),
            loader: self.loader.clone(),
            storage: self.storage.clone(),
            meta: self.meta.clone(),
            data_prefix: self.data_prefix.clone(),
            selection: Some(hasher.finish()),
            committed: InitGuard::with_value(Committed {
                store,
                metainfo: committed.metainfo.clone(),
            }),
        })
    }

    /// Writes the committed serialized store to `path` so sibling processes
    /// can map it through `record_cache`.
    ///
    /// A store exported from a [`subset`](Self::subset) is fingerprinted with
    /// its selection, so datasets built from the parent configuration treat
    /// it as a cache miss.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the store is not serialized.
    pub fn export_store(&self, path: &Path) -> Result<()> {
        let committed = self.committed_or_init("export_store")?;
        let records = committed.store.as_serialized().ok_or_else(|| {
            DatasetError::config("exporting a record store requires serialize_data = true")
        })?;
        let fingerprint = self.fingerprint(&self.config.resolved_ann_file())?;
        write_store(
            self.storage.as_ref(),
            path,
            records,
            fingerprint,
            &committed.metainfo,
        )?;
        tracing::info!(
            "Exported {} records ({} bytes) to {}",
            records.len(),
            records.byte_len(),
            path.display()
        );
        Ok(())
    }

    fn committed_or_init(&self, accessor: &str) -> Result<&Committed> {
        if let Some(committed) = self.committed.get() {
            return Ok(committed);
        }
        tracing::warn!(
            "{}() triggered lazy initialization of '{}'; call full_init() before spawning readers to avoid duplicated loading",
            accessor,
            self.config.ann_file.display()
        );
        self.committed.get_or_try_init(|| self.load_and_commit())
    }

    fn load_and_commit(&self) -> Result<Committed> {
        let ann_file = self.config.resolved_ann_file();

        if let Some(cache) = &self.config.record_cache {
            let fingerprint = self.fingerprint(&ann_file)?;
            if let Some(committed) = self.open_cache(cache, fingerprint)? {
                return Ok(committed);
            }
        }

        tracing::debug!(
            "Loading annotations from {} with '{}' loader",
            ann_file.display(),
            self.loader.name()
        );
        let annotations = self.loader.load(&ann_file)?;

        let mut metainfo = self.meta.clone();
        merge_file_declared(&mut metainfo, &annotations.metainfo);

        let ctx = ParseContext {
            data_prefix: &self.data_prefix,
            metainfo: &metainfo,
            test_mode: self.config.test_mode,
        };
        let mut samples = Vec::with_capacity(annotations.data_list.len());
        for (index, raw) in annotations.data_list.iter().enumerate() {
            let expanded = self
                .parser
                .parse_data_info(raw, &ctx)
                .map_err(|e| DatasetError::expansion(index, e.to_string()))?;
            samples.extend(expanded.into_vec());
        }
        tracing::debug!(
            "Expanded {} raw records into {} samples",
            annotations.data_list.len(),
            samples.len()
        );

        let samples = self.parser.filter_data(samples, &self.config.filter);
        let samples = match &self.config.indices {
            Some(selector) => {
                let picks = selector.resolve(samples.len())?;
                picks
                    .into_iter()
                    .map(|i| {
                        samples
                            .get(i)
                            .cloned()
                            .ok_or_else(|| DatasetError::index(i, samples.len()))
                    })
                    .collect::<Result<Vec<_>>>()?
            }
            None => samples,
        };

        let store = RecordStore::commit(samples, self.config.serialize_data)?;
        tracing::info!(
            "Committed {} samples from {} ({} store)",
            store.len(),
            ann_file.display(),
            store.kind()
        );

        if let (Some(cache), Some(records)) = (&self.config.record_cache, store.as_serialized()) {
            let fingerprint = self.fingerprint(&ann_file)?;
            match write_store(self.storage.as_ref(), cache, records, fingerprint, &metainfo) {
                Ok(()) => tracing::info!("Wrote record cache {}", cache.display()),
                Err(e) => tracing::warn!("Failed to write record cache {}: {}", cache.display(), e),
            }
        }

        Ok(Committed { store, metainfo })
    }

    /// Maps a previously exported store. A missing, stale or corrupted cache
    /// is a miss, not an error.
    fn open_cache(&self, cache: &Path, fingerprint: u64) -> Result<Option<Committed>> {
        if !self.storage.exists(cache)? {
            tracing::debug!("Record cache {} not found", cache.display());
            return Ok(None);
        }

        match open_store(cache, Some(fingerprint)) {
            Ok((records, file_meta)) => {
                let mut metainfo = self.meta.clone();
                merge_file_declared(&mut metainfo, &file_meta);
                let store = RecordStore::Serialized(records);
                tracing::info!(
                    "Mapped {} samples from record cache {}",
                    store.len(),
                    cache.display()
                );
                Ok(Some(Committed { store, metainfo }))
            }
            Err(e) => {
                tracing::warn!("Ignoring record cache {}: {}", cache.display(), e);
                Ok(None)
            }
        }
    }

    /// Identifies everything that shapes the committed store: the annotation
    /// file (path, size, mtime), loader, parser settings, prefixes, filter,
    /// subsample, subset selection and pre-file metadata.
    fn fingerprint(&self, ann_file: &Path) -> Result<u64> {
        let mut hasher = XxHash64::with_seed(0);
        write_field(&mut hasher, ann_file.to_string_lossy().as_bytes());
        match self.storage.metadata(ann_file) {
            Ok(meta) => {
                hasher.write_u8(1);
                hasher.write_u64(meta.size);
                if let Some(since_epoch) =
                    meta.modified.and_then(|m| m.duration_since(UNIX_EPOCH).ok())
                {
                    hasher.write_u128(since_epoch.as_nanos());
                }
            }
            Err(e) => {
                hasher.write_u8(0);
                tracing::warn!(
                    "Record cache key for {} omits file size and mtime: {}",
                    ann_file.display(),
                    e
                );
            }
        }
        write_field(&mut hasher, self.loader.name().as_bytes());

        let parser_key = self.parser.cache_key().map_err(|e| {
            DatasetError::serialization(format!(
                "failed to fingerprint parser '{}': {e}",
                self.parser.name()
            ))
        })?;
        write_field(&mut hasher, &parser_key);

        let settings = bincode::serialize(&(
            self.data_prefix.as_ref(),
            &self.config.filter,
            &self.config.indices,
            &self.meta,
        ))
        .map_err(|e| DatasetError::serialization(format!("failed to fingerprint configuration: {e}")))?;
        write_field(&mut hasher, &settings);

        match self.selection {
            Some(selection) => {
                hasher.write_u8(1);
                hasher.write_u64(selection);
            }
            None => hasher.write_u8(0),
        }

        Ok(hasher.finish())
    }

    /// Deterministic fallback index for refetch `attempt` of `idx`.
    fn fallback_index(idx: usize, attempt: usize, len: usize) -> usize {
        let mut hasher = XxHash64::with_seed(attempt as u64);
        hasher.write_u64(idx as u64);
        (hasher.finish() % len as u64) as usize
    }
}

/// Length-prefixed so adjacent fields cannot run into each other.
fn write_field(hasher: &mut XxHash64, bytes: &[u8]) {
    hasher.write_u64(bytes.len() as u64);
    hasher.write(bytes);
}

impl Dataset for BaseDataset {
    fn metainfo(&self) -> Metadata {
        match self.committed.get() {
            Some(committed) => committed.metainfo.clone(),
            None => self.meta.clone(),
        }
    }

    fn full_init(&self) -> Result<()> {
        self.committed
            .get_or_try_init(|| self.load_and_commit())
            .map(|_| ())
    }

    fn is_fully_initialized(&self) -> bool {
        self.committed.is_initialized()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.committed_or_init("len")?.store.len())
    }

    fn get_data_info(&self, idx: usize) -> Result<Sample> {
        let mut sample = self.committed_or_init("get_data_info")?.store.get(idx)?;
        sample.insert(SAMPLE_IDX_KEY.to_string(), Value::from(idx));
        Ok(sample)
    }

    /// Applies the pipeline to the sample at `idx`.
    ///
    /// A pipeline dropping a sample (`Ok(None)`) is an error in test mode.
    /// Otherwise the read moves to a deterministic fallback index, at most
    /// `max_refetch` times.
    fn get(&self, idx: usize) -> Result<Sample> {
        let len = self.len()?;
        if idx >= len {
            return Err(DatasetError::index(idx, len));
        }

        if self.config.test_mode {
            let sample = self.get_data_info(idx)?;
            return match self.pipeline.apply(sample).map_err(DatasetError::pipeline)? {
                Some(processed) => Ok(processed),
                None => Err(DatasetError::pipeline(
                    format!("pipeline returned no data for index {idx} in test mode").into(),
                )),
            };
        }

        let mut current = idx;
        for attempt in 0..=self.config.max_refetch {
            let sample = self.get_data_info(current)?;
            if let Some(processed) = self.pipeline.apply(sample).map_err(DatasetError::pipeline)? {
                return Ok(processed);
            }
            let next = Self::fallback_index(idx, attempt + 1, len);
            tracing::warn!(
                "Pipeline dropped sample {}, refetching index {}",
                current,
                next
            );
            current = next;
        }

        Err(DatasetError::pipeline(
            format!(
                "cannot find valid data after {} refetches starting from index {}",
                self.config.max_refetch, idx
            )
            .into(),
        ))
    }

    fn supports_cat_ids(&self) -> bool {
        self.parser.supports_cat_ids()
    }

    fn get_cat_ids(&self, idx: usize) -> Result<Vec<CategoryId>> {
        if !self.parser.supports_cat_ids() {
            return Err(DatasetError::missing_capability("category lookup"));
        }
        let sample = self.get_data_info(idx)?;
        self.parser.cat_ids(&sample)
    }
}

impl fmt::Debug for BaseDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseDataset")
            .field("ann_file", &self.config.ann_file)
            .field("parser", &self.parser.name())
            .field("state", &self.state())
            .field("len", &self.record_store().map(RecordStore::len))
            .finish()
    }
}
