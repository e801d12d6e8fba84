// rust/dataset-core/src/dataset/concat.rs

use std::fmt;
use std::sync::Arc;

use super::init::InitGuard;
use super::traits::Dataset;
use crate::error::{DatasetError, Result};
use crate::meta::first_mismatch;
use crate::value::{CategoryId, Metadata, Sample};

/// Datasets served back to back as one index space.
///
/// Constituents must agree on metadata (apart from `ignore_keys`). The check
/// runs at construction, and again once every constituent has loaded its
/// file-declared metadata.
pub struct ConcatDataset {
    datasets: Vec<Arc<dyn Dataset>>,
    ignore_keys: Vec<String>,
    /// Running totals of constituent lengths.
    cumulative_sizes: InitGuard<Vec<usize>>,
}

impl ConcatDataset {
    pub fn new(datasets: Vec<Arc<dyn Dataset>>) -> Result<Self> {
        Self::with_options(datasets, Vec::new(), true)
    }

    /// # Errors
    ///
    /// Returns a configuration error for an empty dataset list or mismatched
    /// metadata, and any initialization error when `lazy_init` is false.
    pub fn with_options(
        datasets: Vec<Arc<dyn Dataset>>,
        ignore_keys: Vec<String>,
        lazy_init: bool,
    ) -> Result<Self> {
        if datasets.is_empty() {
            return Err(DatasetError::config(
                "ConcatDataset requires at least one dataset",
            ));
        }

        let concat = Self {
            datasets,
            ignore_keys,
            cumulative_sizes: InitGuard::new(),
        };
        concat.check_metainfo()?;

        if !lazy_init {
            concat.full_init()?;
        }
        Ok(concat)
    }

    pub fn datasets(&self) -> &[Arc<dyn Dataset>] {
        &self.datasets
    }

    /// Maps a global index to `(dataset, local index)`.
    pub fn locate(&self, idx: usize) -> Result<(usize, usize)> {
        let cumulative = self.cumulative_sizes()?;
        let total = cumulative.last().copied().unwrap_or(0);
        if idx >= total {
            return Err(DatasetError::index(idx, total));
        }

        let dataset_idx = cumulative.partition_point(|&end| end <= idx);
        let start = match dataset_idx {
            0 => 0,
            k => cumulative[k - 1],
        };
        Ok((dataset_idx, idx - start))
    }

    fn check_metainfo(&self) -> Result<()> {
        let reference = self.datasets[0].metainfo();
        for (i, dataset) in self.datasets.iter().enumerate().skip(1) {
            let meta = dataset.metainfo();
            if let Some(key) = first_mismatch(&reference, &meta, &self.ignore_keys) {
                return Err(DatasetError::config(format!(
                    "metainfo of dataset {i} differs from dataset 0 at key '{key}'; \
                     add it to ignore_keys if the difference is intended"
                )));
            }
        }
        Ok(())
    }

    fn cumulative_sizes(&self) -> Result<&Vec<usize>> {
        self.cumulative_sizes.get_or_try_init(|| {
            for dataset in &self.datasets {
                dataset.full_init()?;
            }
            self.check_metainfo()?;

            let mut total = 0;
            let mut cumulative = Vec::with_capacity(self.datasets.len());
            for dataset in &self.datasets {
                total += dataset.len()?;
                cumulative.push(total);
            }
            tracing::debug!(
                "Concatenated {} datasets into {} samples",
                self.datasets.len(),
                total
            );
            Ok(cumulative)
        })
    }
}

impl Dataset for ConcatDataset {
    /// Metadata of the first dataset.
    fn metainfo(&self) -> Metadata {
        self.datasets[0].metainfo()
    }

    fn full_init(&self) -> Result<()> {
        self.cumulative_sizes().map(|_| ())
    }

    fn is_fully_initialized(&self) -> bool {
        self.cumulative_sizes.is_initialized()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.cumulative_sizes()?.last().copied().unwrap_or(0))
    }

    fn get_data_info(&self, idx: usize) -> Result<Sample> {
        let (dataset_idx, local) = self.locate(idx)?;
        self.datasets[dataset_idx].get_data_info(local)
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        let (dataset_idx, local) = self.locate(idx)?;
        self.datasets[dataset_idx].get(local)
    }

    fn supports_cat_ids(&self) -> bool {
        self.datasets.iter().all(|d| d.supports_cat_ids())
    }

    fn get_cat_ids(&self, idx: usize) -> Result<Vec<CategoryId>> {
        let (dataset_idx, local) = self.locate(idx)?;
        self.datasets[dataset_idx].get_cat_ids(local)
    }
}

impl fmt::Debug for ConcatDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcatDataset")
            .field("datasets", &self.datasets.len())
            .field("ignore_keys", &self.ignore_keys)
            .field("cumulative_sizes", &self.cumulative_sizes.get())
            .finish()
    }
}
