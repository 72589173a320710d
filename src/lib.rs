//! # plasma-rnn-rs
//!
//! Recurrent models of tokamak plasma state evolution, trained with
//! scheduled sampling on length-bucketed shot sequences.
//!
//! Each timestep's input is the plasma state (radial profiles on a fixed
//! grid plus scalar parameters) concatenated with the actuator values at the
//! current and next timestep. The model predicts the next state.
//!
//! ## Features
//!
//! - **YAML Configuration** - One file describes signals, model and optimization
//! - **Two model families** - Encoder/cell/decoder RNN (LSTM or linear cell) and
//!   latent linear dynamics
//! - **Scheduled sampling** - Annealed autoregression over the second half of training
//! - **Checkpoints** - safetensors parameters and optimizer moments with JSON metadata
//!
//! ## Quick Start (CLI)
//!
//! ```bash
//! # Write a starting configuration
//! plasma-rnn init config.yaml --preset rnn-lstm
//!
//! # Validate configuration
//! plasma-rnn validate config.yaml
//!
//! # Start training
//! plasma-rnn train config.yaml
//!
//! # Inspect a checkpoint
//! plasma-rnn inspect ./outputs/model
//! ```
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use plasma_rnn_rs::{PlasmaConfig, Trainer};
//!
//! # fn main() -> plasma_rnn_rs::Result<()> {
//! let config = PlasmaConfig::from_file("config.yaml")?;
//! let mut trainer = Trainer::new(config)?;
//! trainer.train()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Running a model
//!
//! ```rust
//! use candle_core::{Device, Tensor};
//! use plasma_rnn_rs::{ModelConfig, ModelDims, ScheduledSampling, SequenceModel};
//!
//! # fn main() -> plasma_rnn_rs::Result<()> {
//! let dims = ModelDims::new(4, 2);
//! let (_varmap, model) = SequenceModel::init(&ModelConfig::default(), dims, &Device::Cpu)?;
//!
//! let input = Tensor::zeros((3, 5, dims.input_dim()), candle_core::DType::F32, &Device::Cpu)?;
//! let sampling = ScheduledSampling::new(0.5, 1)?;
//! let output = model.forward(&input, &sampling, &mut rand::thread_rng())?;
//! assert_eq!(output.dims(), &[3, 5, 4]);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

pub mod bucket;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod loss;
pub mod model;
pub mod optimizer;
pub mod partition;
pub mod sampling;
pub mod trainer;

pub use bucket::{make_buckets, SequenceBatch};
pub use checkpoint::{CheckpointMetadata, LoadedCheckpoint};
pub use config::{ModelConfig, ModelDims, PlasmaConfig};
pub use dataset::{SequenceDataset, SequenceExample};
pub use error::{PlasmaError, Result};
pub use loss::masked_mse;
pub use model::SequenceModel;
pub use optimizer::{Adam, OptimizerConfig};
pub use partition::{ShotPartition, Split};
pub use sampling::{AutoregressionSchedule, ScheduledSampling};
pub use trainer::{Trainer, TrainingReport};
