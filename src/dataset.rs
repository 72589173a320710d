//! Dataset loading and splitting.
//!
//! The preprocessed dataset is a JSON-lines file with one shot per line:
//!
//! ```json
//! {"shot": 163303, "times": [0.0, 0.02], "input": [[...], [...]], "output": [[...], [...]]}
//! ```
//!
//! Each `input` row is `state ++ actuators(t) ++ actuators(t+1)` and each
//! `output` row is the state at t+1. Values are already normalized.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::{DataConfig, ModelDims};
use crate::error::{PlasmaError, Result};
use crate::partition::{ShotPartition, Split};

/// One shot: a (time, feature) input sequence and its (time, state) target.
///
/// Rows are stored flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceExample {
    shot: u64,
    times: Vec<f64>,
    input: Vec<f32>,
    target: Vec<f32>,
    len: usize,
    dims: ModelDims,
}

impl SequenceExample {
    /// Build an example from per-timestep rows, checking every row width.
    ///
    /// ```rust
    /// use plasma_rnn_rs::config::ModelDims;
    /// use plasma_rnn_rs::dataset::SequenceExample;
    ///
    /// # fn main() -> plasma_rnn_rs::Result<()> {
    /// let dims = ModelDims::new(2, 1);
    /// let example = SequenceExample::new(
    ///     163_303,
    ///     vec![],
    ///     vec![vec![0.1, 0.2, 1.0, 1.1], vec![0.2, 0.3, 1.1, 1.2]],
    ///     vec![vec![0.2, 0.3], vec![0.3, 0.4]],
    ///     dims,
    /// )?;
    /// assert_eq!(example.len(), 2);
    /// assert_eq!(example.input_row(1), &[0.2, 0.3, 1.1, 1.2]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(
        shot: u64,
        times: Vec<f64>,
        input: Vec<Vec<f32>>,
        target: Vec<Vec<f32>>,
        dims: ModelDims,
    ) -> Result<Self> {
        if input.is_empty() {
            return Err(PlasmaError::Dataset(format!("shot {shot} has no timesteps")));
        }
        if input.len() != target.len() {
            return Err(PlasmaError::Dataset(format!(
                "shot {shot}: {} input rows but {} output rows",
                input.len(),
                target.len()
            )));
        }
        if !times.is_empty() && times.len() != input.len() {
            return Err(PlasmaError::Dataset(format!(
                "shot {shot}: {} times for {} rows",
                times.len(),
                input.len()
            )));
        }

        let input_dim = dims.input_dim();
        if let Some((t, row)) = input.iter().enumerate().find(|(_, r)| r.len() != input_dim) {
            return Err(PlasmaError::Dataset(format!(
                "shot {shot}: input row {t} has width {}, expected {input_dim}",
                row.len()
            )));
        }
        if let Some((t, row)) = target
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != dims.state_dim)
        {
            return Err(PlasmaError::Dataset(format!(
                "shot {shot}: output row {t} has width {}, expected {}",
                row.len(),
                dims.state_dim
            )));
        }

        let len = input.len();
        Ok(Self {
            shot,
            times,
            input: input.into_iter().flatten().collect(),
            target: target.into_iter().flatten().collect(),
            len,
            dims,
        })
    }

    /// Shot number.
    #[must_use]
    pub fn shot(&self) -> u64 {
        self.shot
    }

    /// Timestamps, empty when the file did not carry them.
    #[must_use]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Number of timesteps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false for a constructed example.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Feature widths.
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    /// Flattened `(len, input_dim)` inputs.
    #[must_use]
    pub fn inputs(&self) -> &[f32] {
        &self.input
    }

    /// Flattened `(len, state_dim)` targets.
    #[must_use]
    pub fn targets(&self) -> &[f32] {
        &self.target
    }

    /// Input row at timestep `t`.
    #[must_use]
    pub fn input_row(&self, t: usize) -> &[f32] {
        let width = self.dims.input_dim();
        &self.input[t * width..(t + 1) * width]
    }

    /// Target row at timestep `t`.
    #[must_use]
    pub fn target_row(&self, t: usize) -> &[f32] {
        let width = self.dims.state_dim;
        &self.target[t * width..(t + 1) * width]
    }
}

#[derive(Deserialize, Serialize)]
struct ShotRecord {
    shot: u64,
    #[serde(default)]
    times: Vec<f64>,
    input: Vec<Vec<f32>>,
    output: Vec<Vec<f32>>,
}

/// Train, validation and test sequences.
#[derive(Debug, Default)]
pub struct SequenceDataset {
    /// Training sequences.
    pub train: Vec<SequenceExample>,
    /// Validation sequences.
    pub validation: Vec<SequenceExample>,
    /// Held-out test sequences.
    pub test: Vec<SequenceExample>,
}

impl SequenceDataset {
    /// Load and split the dataset described by `config`.
    ///
    /// Shots outside the partition's range are dropped with a warning. Each
    /// split is sorted by ascending length when `config.sort_by_size` is set.
    pub fn load(config: &DataConfig, dims: ModelDims, partition: &ShotPartition) -> Result<Self> {
        let path = Path::new(&config.path);
        if !path.exists() {
            return Err(PlasmaError::Dataset(format!(
                "Dataset not found: {}",
                config.path
            )));
        }

        let examples = load_jsonl(path, dims)?;
        Ok(Self::from_examples(examples, partition, config.sort_by_size))
    }

    /// Route already-built examples into splits.
    #[must_use]
    pub fn from_examples(
        examples: Vec<SequenceExample>,
        partition: &ShotPartition,
        sort_by_size: bool,
    ) -> Self {
        let mut dataset = Self::default();
        let mut dropped = 0usize;
        for example in examples {
            match partition.split_of(example.shot) {
                Some(Split::Train) => dataset.train.push(example),
                Some(Split::Validation) => dataset.validation.push(example),
                Some(Split::Test) => dataset.test.push(example),
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(
                "Dropped {} shots outside [{}, {})",
                dropped,
                partition.min_shot,
                partition.max_shot
            );
        }

        if sort_by_size {
            for split in [
                &mut dataset.train,
                &mut dataset.validation,
                &mut dataset.test,
            ] {
                split.sort_by_key(SequenceExample::len);
            }
        }
        dataset
    }

    /// Number of training sequences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.train.len()
    }

    /// True when there are no training sequences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.train.is_empty()
    }
}

fn load_jsonl(path: &Path, dims: ModelDims) -> Result<Vec<SequenceExample>> {
    let content = std::fs::read_to_string(path)?;
    let mut examples = Vec::new();

    for (index, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let record: ShotRecord = serde_json::from_str(line).map_err(|e| {
            PlasmaError::Dataset(format!("Failed to parse line {}: {e}", index + 1))
        })?;
        let example = SequenceExample::new(record.shot, record.times, record.input, record.output, dims)
            .map_err(|e| match e {
                PlasmaError::Dataset(msg) => {
                    PlasmaError::Dataset(format!("line {}: {msg}", index + 1))
                }
                other => other,
            })?;
        examples.push(example);
    }

    Ok(examples)
}
