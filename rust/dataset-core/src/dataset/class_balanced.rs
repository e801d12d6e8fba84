// rust/dataset-core/src/dataset/class_balanced.rs

//! Class-balanced oversampling.
//!
//! Rare categories are repeated with the square-root inverse-frequency rule:
//!
//! ```text
//! f(c) = samples containing c / total samples
//! r(c) = max(1, sqrt(t / f(c)))
//! r(i) = ceil(max over categories c of sample i of r(c))
//! ```
//!
//! Sample `i` then appears `r(i)` times, consecutively, in the expanded index
//! list. A sample without categories appears once.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use super::init::InitGuard;
use super::traits::Dataset;
use crate::error::{DatasetError, Result};
use crate::value::{CategoryId, Metadata, Sample};

pub struct ClassBalancedDataset {
    dataset: Arc<dyn Dataset>,
    oversample_thr: f64,
    repeat_indices: InitGuard<Vec<usize>>,
}

impl ClassBalancedDataset {
    pub fn new(dataset: Arc<dyn Dataset>, oversample_thr: f64) -> Result<Self> {
        Self::with_options(dataset, oversample_thr, true)
    }

    /// # Errors
    ///
    /// Returns an error when the wrapped dataset has no category lookup or
    /// the threshold lies outside (0, 1).
    pub fn with_options(
        dataset: Arc<dyn Dataset>,
        oversample_thr: f64,
        lazy_init: bool,
    ) -> Result<Self> {
        if !dataset.supports_cat_ids() {
            return Err(DatasetError::missing_capability("category lookup"));
        }
        if !(oversample_thr > 0.0 && oversample_thr < 1.0) {
            return Err(DatasetError::config(format!(
                "oversample_thr must be in (0, 1), got {oversample_thr}"
            )));
        }

        let balanced = Self {
            dataset,
            oversample_thr,
            repeat_indices: InitGuard::new(),
        };
        if !lazy_init {
            balanced.full_init()?;
        }
        Ok(balanced)
    }

    pub fn oversample_thr(&self) -> f64 {
        self.oversample_thr
    }

    /// Expanded index list: each wrapped index repeated by its factor.
    pub fn repeat_indices(&self) -> Result<&[usize]> {
        self.repeat_indices
            .get_or_try_init(|| self.build_repeat_indices())
            .map(Vec::as_slice)
    }

    fn build_repeat_indices(&self) -> Result<Vec<usize>> {
        self.dataset.full_init()?;
        let num_samples = self.dataset.len()?;

        let categories = (0..num_samples)
            .map(|idx| {
                self.dataset
                    .get_cat_ids(idx)
                    .map(|ids| ids.into_iter().collect::<BTreeSet<CategoryId>>())
            })
            .collect::<Result<Vec<_>>>()?;

        let mut counts: BTreeMap<CategoryId, usize> = BTreeMap::new();
        for cat_ids in &categories {
            for &cat_id in cat_ids {
                *counts.entry(cat_id).or_default() += 1;
            }
        }

        let category_repeat: BTreeMap<CategoryId, f64> = counts
            .into_iter()
            .map(|(cat_id, count)| {
                let freq = count as f64 / num_samples as f64;
                (cat_id, category_repeat_factor(self.oversample_thr, freq))
            })
            .collect();

        let mut repeat_indices = Vec::with_capacity(num_samples);
        for (idx, cat_ids) in categories.iter().enumerate() {
            let factor = cat_ids
                .iter()
                .filter_map(|c| category_repeat.get(c).copied())
                .fold(1.0_f64, f64::max);
            let repeats = factor.ceil() as usize;
            repeat_indices.extend(std::iter::repeat(idx).take(repeats));
        }

        tracing::debug!(
            "Class-balanced oversampling expanded {} samples to {} (threshold {})",
            num_samples,
            repeat_indices.len(),
            self.oversample_thr
        );
        Ok(repeat_indices)
    }

    fn local_index(&self, idx: usize) -> Result<usize> {
        let indices = self.repeat_indices()?;
        indices
            .get(idx)
            .copied()
            .ok_or_else(|| DatasetError::index(idx, indices.len()))
    }
}

/// `max(1, sqrt(thr / freq))`.
fn category_repeat_factor(oversample_thr: f64, freq: f64) -> f64 {
    (oversample_thr / freq).sqrt().max(1.0)
}

impl Dataset for ClassBalancedDataset {
    fn metainfo(&self) -> Metadata {
        self.dataset.metainfo()
    }

    fn full_init(&self) -> Result<()> {
        self.repeat_indices().map(|_| ())
    }

    fn is_fully_initialized(&self) -> bool {
        self.repeat_indices.is_initialized()
    }

    fn len(&self) -> Result<usize> {
        Ok(self.repeat_indices()?.len())
    }

    fn get_data_info(&self, idx: usize) -> Result<Sample> {
        self.dataset.get_data_info(self.local_index(idx)?)
    }

    fn get(&self, idx: usize) -> Result<Sample> {
        self.dataset.get(self.local_index(idx)?)
    }

    fn supports_cat_ids(&self) -> bool {
        true
    }

    fn get_cat_ids(&self, idx: usize) -> Result<Vec<CategoryId>> {
        self.dataset.get_cat_ids(self.local_index(idx)?)
    }
}

impl fmt::Debug for ClassBalancedDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBalancedDataset")
            .field("oversample_thr", &self.oversample_thr)
            .field("len", &self.repeat_indices.get().map(Vec::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::testing::{labelled, multi_labelled, Toy};
    use crate::dataset::RepeatDataset;
    use crate::value::Value;

    #[test]
    fn test_rare_category_repeated_twice() {
        // Category 7 is in 1 of 10 samples, category 3 in 5, category 4 in 4
        let labels = [7, 3, 3, 3, 3, 3, 4, 4, 4, 4];
        let balanced =
            ClassBalancedDataset::new(Toy::new("a", labelled(&labels)).build(), 0.4).unwrap();

        let indices = balanced.repeat_indices().unwrap();
        assert_eq!(indices, &[0, 0, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(balanced.len().unwrap(), 11);
        assert_eq!(balanced.get(1).unwrap()["label"], Value::Int(7));
        assert_eq!(balanced.get_cat_ids(2).unwrap(), vec![3]);
    }

    #[test]
    fn test_repeat_factor_rule() {
        assert_eq!(category_repeat_factor(0.4, 0.1), 2.0);
        assert_eq!(category_repeat_factor(0.4, 0.5), 1.0);
        assert_eq!(category_repeat_factor(0.4, 0.4), 1.0);
        assert!((category_repeat_factor(0.5, 0.2) - 2.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_max_over_categories_then_ceil() {
        // Category 1: f = 0.1 -> sqrt(5) ~ 2.24; category 2: f = 0.2 -> sqrt(2.5) ~ 1.58
        let sets: [&[CategoryId]; 10] = [
            &[1, 2],
            &[2],
            &[0],
            &[0],
            &[0],
            &[0],
            &[0],
            &[0],
            &[0],
            &[],
        ];
        let balanced =
            ClassBalancedDataset::new(Toy::new("a", multi_labelled(&sets)).build(), 0.5).unwrap();

        let indices = balanced.repeat_indices().unwrap();
        assert_eq!(indices.iter().filter(|&&i| i == 0).count(), 3);
        assert_eq!(indices.iter().filter(|&&i| i == 1).count(), 2);
        assert_eq!(indices.iter().filter(|&&i| i == 9).count(), 1);
        assert_eq!(indices.len(), 3 + 2 + 8);
        // Original order is kept
        assert!(indices.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_duplicate_categories_count_once() {
        let sets: [&[CategoryId]; 5] = [&[5, 5, 5], &[1], &[1], &[1], &[1]];
        let balanced =
            ClassBalancedDataset::new(Toy::new("a", multi_labelled(&sets)).build(), 0.5).unwrap();
        // f(5) = 0.2 -> sqrt(2.5) ~ 1.58 -> 2; counted three times it would reach the threshold
        assert_eq!(balanced.repeat_indices().unwrap(), &[0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_requires_category_lookup() {
        let plain = Toy::new("a", labelled(&[1])).without_categories().build();
        assert!(matches!(
            ClassBalancedDataset::new(plain, 0.5),
            Err(DatasetError::MissingCapability { .. })
        ));
    }

    #[test]
    fn test_threshold_bounds() {
        for thr in [0.0, 1.0, -0.5, 2.0] {
            let inner = Toy::new("a", labelled(&[1])).build();
            assert!(matches!(
                ClassBalancedDataset::new(inner, thr),
                Err(DatasetError::Config { .. })
            ));
        }
    }

    #[test]
    fn test_lazy_until_accessed() {
        let inner = Toy::new("a", labelled(&[1, 2])).build();
        let balanced = ClassBalancedDataset::new(inner.clone(), 0.5).unwrap();
        assert!(!balanced.is_fully_initialized());
        assert!(!inner.is_fully_initialized());

        balanced.full_init().unwrap();
        assert!(balanced.is_fully_initialized());
        assert!(matches!(
            balanced.get(balanced.len().unwrap()),
            Err(DatasetError::Index { .. })
        ));
    }

    #[test]
    fn test_nested_wrappers() {
        let balanced =
            ClassBalancedDataset::new(Toy::new("a", labelled(&[7, 3, 3, 3])).build(), 0.5).unwrap();
        let repeat = RepeatDataset::new(Arc::new(balanced), 2).unwrap();
        // f(7) = 0.25 -> sqrt(2) -> 2 repeats; 5 per pass, 2 passes
        assert_eq!(repeat.len().unwrap(), 10);
        assert_eq!(repeat.get(6).unwrap()["label"], Value::Int(7));
    }
}
