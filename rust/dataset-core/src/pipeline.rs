// rust/dataset-core/src/pipeline.rs

//! Per-sample preprocessing.
//!
//! The dataset treats preprocessing as an opaque stage: it hands over the
//! stored sample and returns whatever the stage produces. A stage may also
//! decline a sample by returning `Ok(None)`, in which case the dataset decides
//! whether to fall back to another index or fail (see
//! [`Dataset::get`](crate::Dataset::get)).

use std::fmt;
use std::sync::Arc;

use crate::error::BoxError;
use crate::value::Sample;

/// Outcome of one pipeline application. `Ok(None)` drops the sample.
pub type PipelineResult = std::result::Result<Option<Sample>, BoxError>;

/// A preprocessing stage applied on every indexed read.
pub trait Pipeline: Send + Sync {
    fn apply(&self, sample: Sample) -> PipelineResult;
}

impl<F> Pipeline for F
where
    F: Fn(Sample) -> PipelineResult + Send + Sync,
{
    fn apply(&self, sample: Sample) -> PipelineResult {
        self(sample)
    }
}

/// Returns every sample unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Pipeline for Identity {
    fn apply(&self, sample: Sample) -> PipelineResult {
        Ok(Some(sample))
    }
}

/// Runs transforms in order, stopping at the first one that drops the sample.
#[derive(Clone, Default)]
pub struct Compose {
    transforms: Vec<Arc<dyn Pipeline>>,
}

impl Compose {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transform.
    #[must_use]
    pub fn then(mut self, transform: impl Pipeline + 'static) -> Self {
        self.transforms.push(Arc::new(transform));
        self
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl fmt::Debug for Compose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compose")
            .field("transforms", &self.transforms.len())
            .finish()
    }
}

impl Pipeline for Compose {
    fn apply(&self, sample: Sample) -> PipelineResult {
        let mut current = sample;
        for transform in &self.transforms {
            match transform.apply(current)? {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> Sample {
        let mut s = Sample::new();
        s.insert("img_path".into(), Value::from("a.jpg"));
        s
    }

    #[test]
    fn test_identity() {
        assert_eq!(Identity.apply(sample()).unwrap(), Some(sample()));
    }

    #[test]
    fn test_closure_pipeline() {
        let tag = |mut s: Sample| -> PipelineResult {
            s.insert("loaded".into(), Value::Bool(true));
            Ok(Some(s))
        };
        let out = tag.apply(sample()).unwrap().unwrap();
        assert_eq!(out["loaded"], Value::Bool(true));
    }

    #[test]
    fn test_compose_runs_in_order() {
        let pipeline = Compose::new()
            .then(|mut s: Sample| -> PipelineResult {
                s.insert("step".into(), Value::Int(1));
                Ok(Some(s))
            })
            .then(|mut s: Sample| -> PipelineResult {
                let prev = s["step"].as_i64().unwrap_or_default();
                s.insert("step".into(), Value::Int(prev * 10 + 2));
                Ok(Some(s))
            });

        assert_eq!(pipeline.len(), 2);
        let out = pipeline.apply(sample()).unwrap().unwrap();
        assert_eq!(out["step"], Value::Int(12));
    }

    #[test]
    fn test_compose_stops_at_drop() {
        let after = Arc::new(AtomicUsize::new(0));
        let counter = after.clone();
        let pipeline = Compose::new()
            .then(|_s: Sample| -> PipelineResult { Ok(None) })
            .then(move |s: Sample| -> PipelineResult {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Some(s))
            });

        assert!(pipeline.apply(sample()).unwrap().is_none());
        assert_eq!(after.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_compose_propagates_errors() {
        let pipeline = Compose::new().then(|_s: Sample| -> PipelineResult {
            Err("image decode failed".into())
        });
        let err = pipeline.apply(sample()).unwrap_err();
        assert_eq!(err.to_string(), "image decode failed");
    }

    #[test]
    fn test_empty_compose_is_identity() {
        let pipeline = Compose::new();
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.apply(sample()).unwrap(), Some(sample()));
    }
}
