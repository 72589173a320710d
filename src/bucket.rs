//! Length bucketing and padding.
//!
//! Sequences sorted by length are grouped greedily into buckets whose total
//! timestep count stays near `bucket_size`, so padding inside a bucket is
//! small. A sequence that would push the running total past the budget
//! starts a new bucket, so only a single sequence longer than the budget can
//! produce an over-budget bucket.

use candle_core::{Device, Tensor};

use crate::dataset::SequenceExample;
use crate::error::{PlasmaError, Result};

/// Group `items` into consecutive buckets of roughly `bucket_size` timesteps.
///
/// Every item lands in exactly one bucket and order is preserved. An item
/// longer than the budget forms a bucket on its own.
///
/// ```rust
/// use plasma_rnn_rs::bucket::make_buckets;
///
/// let buckets = make_buckets(vec![3usize, 5, 8], 10, |len| *len);
/// assert_eq!(buckets, vec![vec![3, 5], vec![8]]);
/// ```
pub fn make_buckets<T, F>(items: impl IntoIterator<Item = T>, bucket_size: usize, len: F) -> Vec<Vec<T>>
where
    F: Fn(&T) -> usize,
{
    let mut buckets = Vec::new();
    let mut current = Vec::new();
    let mut current_len = 0usize;

    for item in items {
        let item_len = len(&item);
        if !current.is_empty() && current_len + item_len > bucket_size {
            buckets.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current_len += item_len;
        current.push(item);
    }
    if !current.is_empty() {
        buckets.push(current);
    }

    buckets
}

/// A padded batch built from one bucket.
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    /// `(batch, max_len, input_dim)` inputs, zero beyond each length.
    pub inputs: Tensor,
    /// `(batch, max_len, state_dim)` targets, zero beyond each length.
    pub targets: Tensor,
    /// True length of every sequence.
    pub lengths: Vec<usize>,
}

impl SequenceBatch {
    /// Pad `examples` to the longest sequence and move them to `device`.
    ///
    /// Fails on an empty bucket or on examples with differing widths.
    pub fn pad(examples: &[&SequenceExample], device: &Device) -> Result<Self> {
        let first = examples
            .first()
            .ok_or_else(|| PlasmaError::Dataset("cannot pad an empty bucket".into()))?;
        let dims = first.dims();
        if let Some(other) = examples.iter().find(|e| e.dims() != dims) {
            return Err(PlasmaError::shape_mismatch(dims, other.dims()));
        }

        let lengths: Vec<usize> = examples.iter().map(|e| e.len()).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len == 0 {
            return Err(PlasmaError::Dataset("bucket has no timesteps".into()));
        }

        let batch = examples.len();
        let input_dim = dims.input_dim();
        let state_dim = dims.state_dim;
        let mut inputs = vec![0f32; batch * max_len * input_dim];
        let mut targets = vec![0f32; batch * max_len * state_dim];
        for (i, example) in examples.iter().enumerate() {
            let start = i * max_len * input_dim;
            inputs[start..start + example.inputs().len()].copy_from_slice(example.inputs());
            let start = i * max_len * state_dim;
            targets[start..start + example.targets().len()].copy_from_slice(example.targets());
        }

        Ok(Self {
            inputs: Tensor::from_vec(inputs, (batch, max_len, input_dim), device)?,
            targets: Tensor::from_vec(targets, (batch, max_len, state_dim), device)?,
            lengths,
        })
    }

    /// Number of sequences.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.lengths.len()
    }

    /// Sum of true lengths.
    #[must_use]
    pub fn total_steps(&self) -> usize {
        self.lengths.iter().sum()
    }
}
