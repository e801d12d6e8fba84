// rust/dataset-core/src/dataset/repeat.rs

use std::fmt;
use std::sync::Arc;

use super::init::InitGuard;
use super::traits::Dataset;
use crate::error::{DatasetError, Result};
use crate::value::{CategoryId, Metadata, Sample};

/// Serves a dataset `times` times in a row without copying it.
pub struct RepeatDataset {
    dataset: Arc<dyn Dataset>,
    times: usize,
    /// Length of the wrapped dataset.
    inner_len: InitGuard<usize>,
}

impl RepeatDataset {
    pub fn new(dataset: Arc<dyn Dataset>, times: usize) -> Result<Self> {
        Self::with_options(dataset, times, true)
    }

    /// # Errors
    ///
    /// Returns a configuration error when `times` is zero.
    pub fn with_options(dataset: Arc<dyn Dataset>, times: usize, lazy_init: bool) -> Result<Self> {
        if times == 0 {
            return Err(DatasetError::config("RepeatDataset requires times >= 1"));
        }

        let repeat = Self {
            dataset,
            times,
            inner_len: InitGuard::new(),
        };
        if !lazy_init {
            repeat.full_init()?;
        }
        Ok(repeat)
    }

    pub fn times(&self) -> usize {
        self.times
    }

    pub fn inner(&self) -> &Arc<dyn Dataset> {
        &self.dataset
    }

    fn inner_len(&self) -> Result<usize> {
        self.inner_len
            .get_or_try_init(|| {
                self.dataset.full_init()?;
                self.dataset.len()
            })
            .copied()
    }

    /// Folds a repeated index onto the wrapped dataset.
    pub fn local_index(&self, idx: usize) -> Result<usize> {
        let inner_len = self.inner_len()?;
        let total = inner_len * self.times;
        if idx >= total {
            return Err(DatasetError::index(idx, total));
        }
        Ok(idx % inner_len)
    }
}

impl Dataset for RepeatDataset {
    fn metainfo(&self) -> Metadata {
        self.dataset.metainfo()
    }

    fn full_init(&self) -> Result<()> {
        self.inner_len().map(|_| ())
    }

    fn is_fully_initialized(&self) -> bool {
        self.inner_len.is_initialized()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.inner_len()? * self.times)
    }

    fn get_data_info(&self, idx: usize) -> Result<Sample> {
        self.dataset.get_data_info(self.local_index(idx)?)
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        self.dataset.get(self.local_index(idx)?)
    }

    fn supports_cat_ids(&self) -> bool {
        self.dataset.supports_cat_ids()
    }

    fn get_cat_ids(&self, idx: usize) -> Result<Vec<CategoryId>> {
        self.dataset.get_cat_ids(self.local_index(idx)?)
    }
}

impl fmt::Debug for RepeatDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepeatDataset")
            .field("times", &self.times)
            .field("inner_len", &self.inner_len.get())
            .finish()
    }
}
