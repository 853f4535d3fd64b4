//! # Data Collaborator
//!
//! The sampler consumes a finite, restartable sequence of
//! `(input_batch, label_batch)` pairs once per epoch. Loading and
//! augmentation live behind this trait; the core never touches files.

use ndarray::{Array1, Array2, Axis, s};

use crate::error::SamplerError;
use crate::params::Elem;

/// One minibatch: row-major inputs `(batch, features)` and class labels.
pub type Batch = (Array2<Elem>, Array1<usize>);

/// A finite, restartable source of minibatches.
///
/// `batches()` returns a fresh iterator each call; the runner calls it once
/// per epoch and the evaluator once per snapshot, so implementations must not
/// exhaust internal state across calls.
pub trait DataSource {
    /// Total number of examples (the effective sample size handed to the
    /// loss collaborator).
    fn num_examples(&self) -> usize;

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_>;
}

/// An in-memory dataset split into fixed-size batches in storage order.
/// Shuffling, augmentation, and prefetch belong to richer collaborators.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    inputs: Array2<Elem>,
    labels: Array1<usize>,
    batch_size: usize,
}

impl InMemoryDataset {
    /// # Errors
    /// `InvalidArgument` when inputs and labels disagree on length, the
    /// dataset is empty, or `batch_size` is zero.
    pub fn new(
        inputs: Array2<Elem>,
        labels: Array1<usize>,
        batch_size: usize,
    ) -> Result<Self, SamplerError> {
        if inputs.nrows() != labels.len() {
            return Err(SamplerError::InvalidArgument(format!(
                "dataset has {} input rows but {} labels",
                inputs.nrows(),
                labels.len()
            )));
        }
        if inputs.nrows() == 0 {
            return Err(SamplerError::InvalidArgument(
                "dataset must contain at least one example".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(SamplerError::InvalidArgument(
                "batch_size must be positive".to_string(),
            ));
        }
        Ok(Self {
            inputs,
            labels,
            batch_size,
        })
    }

    /// Number of minibatches per epoch (last batch may be short).
    pub fn num_batches(&self) -> usize {
        (self.inputs.nrows() + self.batch_size - 1) / self.batch_size
    }
}

impl DataSource for InMemoryDataset {
    fn num_examples(&self) -> usize {
        self.inputs.nrows()
    }

    fn batches(&self) -> Box<dyn Iterator<Item = Batch> + '_> {
        let n = self.inputs.nrows();
        let bs = self.batch_size;
        let iter = (0..self.num_batches()).map(move |i| {
            let lo = i * bs;
            let hi = usize::min(lo + bs, n);
            let x = self.inputs.slice(s![lo..hi, ..]).to_owned();
            let y = self.labels.slice(s![lo..hi]).to_owned();
            (x, y)
        });
        Box::new(iter)
    }
}

/// Concatenates every batch back into one `(inputs, labels)` pair.
/// Used by the evaluator, which needs logits over the whole held-out set.
pub(crate) fn collect_all(data: &dyn DataSource) -> Result<Batch, SamplerError> {
    let mut xs: Vec<Array2<Elem>> = Vec::new();
    let mut ys: Vec<usize> = Vec::new();
    for (x, y) in data.batches() {
        ys.extend(y.iter().copied());
        xs.push(x);
    }
    if xs.is_empty() {
        return Err(SamplerError::InvalidArgument(
            "data source produced no batches".to_string(),
        ));
    }
    let views: Vec<_> = xs.iter().map(|x| x.view()).collect();
    let inputs = ndarray::concatenate(Axis(0), &views).map_err(|e| {
        SamplerError::InvalidArgument(format!("batches have inconsistent widths: {e}"))
    })?;
    Ok((inputs, Array1::from(ys)))
}
