//! Training loop.

use std::path::PathBuf;
use std::time::Instant;

use candle_core::Device;
use candle_nn::VarMap;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::bucket::{make_buckets, SequenceBatch};
use crate::checkpoint::{self, CheckpointMetadata};
use crate::config::PlasmaConfig;
use crate::dataset::{SequenceDataset, SequenceExample};
use crate::error::{PlasmaError, Result};
use crate::loss::masked_mse;
use crate::model::{parameter_bytes, parameter_count, SequenceModel};
use crate::optimizer::{Adam, OptimizerConfig};
use crate::partition::ShotPartition;
use crate::sampling::{AutoregressionSchedule, ScheduledSampling};

type Bucket<'a> = Vec<&'a SequenceExample>;

/// Outcome of a [`Trainer::fit`] run.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingReport {
    /// Mean training loss per epoch.
    pub train_losses: Vec<f64>,
    /// Mean validation loss per epoch.
    pub val_losses: Vec<f64>,
    /// Epochs after which a checkpoint was written.
    pub checkpoint_epochs: Vec<usize>,
    /// Directory checkpoints were written to.
    pub checkpoint_dir: PathBuf,
}

/// Training orchestrator.
///
/// # Example
///
/// ```no_run
/// use plasma_rnn_rs::{PlasmaConfig, Trainer};
///
/// # fn main() -> plasma_rnn_rs::Result<()> {
/// let config = PlasmaConfig::from_file("configs/default.yaml")?;
/// let mut trainer = Trainer::new(config)?;
/// let report = trainer.train()?;
/// println!("best validation loss: {:?}", report.val_losses.iter().cloned().fold(f64::INFINITY, f64::min));
/// # Ok(())
/// # }
/// ```
pub struct Trainer {
    config: PlasmaConfig,
    device: Device,
    partition: ShotPartition,
    schedule: AutoregressionSchedule,
    varmap: VarMap,
    model: SequenceModel,
    optimizer: Adam,
    rng: ChaCha8Rng,
    train_losses: Vec<f64>,
    val_losses: Vec<f64>,
}

impl Trainer {
    /// Create a trainer on the preferred device.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the model cannot
    /// be built.
    pub fn new(config: PlasmaConfig) -> Result<Self> {
        config.validate()?;
        let device = select_device();
        Self::with_device(config, device)
    }

    /// Create a trainer on an explicit device.
    pub fn with_device(config: PlasmaConfig, device: Device) -> Result<Self> {
        config.validate()?;

        let partition = ShotPartition::from_config(&config.partition);
        let dims = config.signals.dims();
        let (varmap, model) = SequenceModel::init(&config.model, dims, &device)?;

        let optimizer = OptimizerConfig {
            learning_rate: config.optimization.lr,
            weight_decay: config.optimization.weight_decay,
            ..OptimizerConfig::default()
        }
        .build_adam(&varmap)?;

        let opt = &config.optimization;
        let schedule =
            AutoregressionSchedule::new(opt.n_epochs, opt.effective_autoregression_num_steps());
        let rng = ChaCha8Rng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            device,
            partition,
            schedule,
            varmap,
            model,
            optimizer,
            rng,
            train_losses: Vec::new(),
            val_losses: Vec::new(),
        })
    }

    /// Shot partition drawn at construction.
    #[must_use]
    pub fn partition(&self) -> &ShotPartition {
        &self.partition
    }

    /// The model being trained.
    #[must_use]
    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    /// Parameters of the model being trained.
    #[must_use]
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Device the model lives on.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Mean training loss of every finished epoch.
    #[must_use]
    pub fn train_losses(&self) -> &[f64] {
        &self.train_losses
    }

    /// Mean validation loss of every finished epoch.
    #[must_use]
    pub fn val_losses(&self) -> &[f64] {
        &self.val_losses
    }

    /// `<output_dir>/<output_filename_base>`.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output_dir).join(&self.config.output_filename_base)
    }

    /// Load the configured dataset and split it with this trainer's partition.
    pub fn load_dataset(&self) -> Result<SequenceDataset> {
        let start = Instant::now();
        let dataset =
            SequenceDataset::load(&self.config.data, self.config.signals.dims(), &self.partition)?;
        tracing::info!(
            "Loaded {} train, {} validation, {} test shots in {:.2}s",
            dataset.train.len(),
            dataset.validation.len(),
            dataset.test.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(dataset)
    }

    /// Load the configured dataset and train on it.
    pub fn train(&mut self) -> Result<TrainingReport> {
        let dataset = self.load_dataset()?;
        self.fit(&dataset)
    }

    /// Run every epoch over `dataset`.
    ///
    /// # Errors
    ///
    /// Returns an error if either the training or the validation split is
    /// empty, or if a forward, backward or checkpoint step fails.
    pub fn fit(&mut self, dataset: &SequenceDataset) -> Result<TrainingReport> {
        if dataset.train.is_empty() {
            return Err(PlasmaError::Training("no training sequences".into()));
        }
        if dataset.validation.is_empty() {
            return Err(PlasmaError::Training("no validation sequences".into()));
        }

        let opt = self.config.optimization.clone();
        let mut train_buckets: Vec<Bucket> = make_buckets(&dataset.train, opt.bucket_size, |e| e.len());
        let val_buckets: Vec<Bucket> = make_buckets(&dataset.validation, opt.bucket_size, |e| e.len());

        tracing::info!("Starting training");
        tracing::info!("  Model: {}", self.config.model.model_type());
        tracing::info!("  Epochs: {}", opt.n_epochs);
        tracing::info!(
            "  Buckets: {} train, {} validation (bucket_size {})",
            train_buckets.len(),
            val_buckets.len(),
            opt.bucket_size
        );
        tracing::info!("  Validation shot digits: {:?}", self.partition.val_indices);
        tracing::info!(
            "  Autoregression from epoch {} up to {} steps",
            self.schedule.start_epoch() + 1,
            opt.effective_autoregression_num_steps()
        );
        tracing::info!(
            "model size: {:.3}MB ({} parameters)",
            parameter_bytes(&self.varmap) as f64 / 1024f64.powi(2),
            parameter_count(&self.varmap)
        );
        if opt.lr_gamma != 1.0 || opt.l1_lambda != 0.0 || opt.l2_lambda != 0.0 {
            tracing::warn!(
                "lr_gamma={}, lr_stop_epoch={}, l1_lambda={}, l2_lambda={} are recorded but not applied",
                opt.lr_gamma,
                opt.lr_stop_epoch,
                opt.l1_lambda,
                opt.l2_lambda
            );
        }

        let checkpoint_dir = self.checkpoint_dir();
        let mut checkpoint_epochs = Vec::new();
        let start = Instant::now();
        let mut prev = start;

        for epoch in 0..opt.n_epochs {
            let sampling = self.schedule.sampling(epoch, opt.nwarmup);
            tracing::debug!(
                "epoch {}: reset_probability {:.4} (avg {:.2} steps)",
                epoch + 1,
                sampling.reset_probability(),
                self.schedule.average_steps(epoch)
            );

            let train_loss = self.train_epoch(&mut train_buckets, &sampling)?;
            let val_loss = self.evaluate(&val_buckets, &sampling)?;
            for (split, loss) in [("train", train_loss), ("val", val_loss)] {
                if !loss.is_finite() {
                    tracing::warn!("epoch {}: {split} loss is {loss}", epoch + 1);
                }
            }
            self.train_losses.push(train_loss);
            self.val_losses.push(val_loss);

            let now = Instant::now();
            tracing::info!(
                "{:4}/{}({:.2}s)... train: {:.2e}, val: {:.2e};",
                epoch + 1,
                opt.n_epochs,
                now.duration_since(prev).as_secs_f64(),
                train_loss,
                val_loss
            );
            prev = now;

            if should_checkpoint(opt.early_saving, &self.val_losses) {
                self.save_checkpoint(epoch)?;
                checkpoint_epochs.push(epoch);
                tracing::info!("...saving checkpoint to {}", checkpoint_dir.display());
            }
        }

        tracing::info!(
            "Training complete in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        Ok(TrainingReport {
            train_losses: self.train_losses.clone(),
            val_losses: self.val_losses.clone(),
            checkpoint_epochs,
            checkpoint_dir,
        })
    }

    /// One pass over shuffled training buckets with an update per bucket.
    fn train_epoch(&mut self, buckets: &mut [Bucket], sampling: &ScheduledSampling) -> Result<f64> {
        buckets.shuffle(&mut self.rng);
        for bucket in buckets.iter_mut() {
            bucket.shuffle(&mut self.rng);
        }

        let pb = ProgressBar::new(buckets.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos:>7}/{len:7} {msg}")?
                .progress_chars("#>-"),
        );

        let mut losses = Vec::with_capacity(buckets.len());
        for bucket in buckets.iter() {
            let batch = SequenceBatch::pad(bucket, &self.device)?;
            let output = self.model.forward(&batch.inputs, sampling, &mut self.rng)?;
            let loss = masked_mse(&output, &batch.targets, &batch.lengths)?;
            self.optimizer.backward_step(&loss)?;

            let value = f64::from(loss.to_scalar::<f32>()?);
            tracing::debug!(
                "bucket of {} shots ({} steps): loss {:.4e}",
                batch.batch_size(),
                batch.total_steps(),
                value
            );
            losses.push(value);
            pb.set_message(format!("{value:.4e}"));
            pb.inc(1);
        }
        pb.finish_and_clear();

        mean(&losses)
    }

    /// Mean loss over validation buckets in their stored order, without updates.
    fn evaluate(&mut self, buckets: &[Bucket], sampling: &ScheduledSampling) -> Result<f64> {
        let mut losses = Vec::with_capacity(buckets.len());
        for bucket in buckets {
            let batch = SequenceBatch::pad(bucket, &self.device)?;
            let output = self
                .model
                .forward(&batch.inputs, sampling, &mut self.rng)?
                .detach();
            let loss = masked_mse(&output, &batch.targets, &batch.lengths)?;
            losses.push(f64::from(loss.to_scalar::<f32>()?));
        }
        mean(&losses)
    }

    fn save_checkpoint(&self, epoch: usize) -> Result<()> {
        let metadata = CheckpointMetadata {
            epoch,
            val_indices: self.partition.val_indices.clone(),
            train_losses: self.train_losses.clone(),
            val_losses: self.val_losses.clone(),
            signals: self.config.signals.clone(),
            model: self.config.model.clone(),
            optimizer: *self.optimizer.config(),
            optimizer_steps: self.optimizer.steps(),
        };
        checkpoint::save(&self.checkpoint_dir(), &metadata, &self.varmap, &self.optimizer)
    }
}

/// Whether to write a checkpoint after the latest epoch.
///
/// Without early saving every epoch is saved; with it, only epochs whose
/// validation loss equals the lowest seen so far.
#[must_use]
pub fn should_checkpoint(early_saving: bool, val_losses: &[f64]) -> bool {
    if !early_saving {
        return true;
    }
    let Some(&latest) = val_losses.last() else {
        return false;
    };
    let best = val_losses.iter().copied().fold(f64::INFINITY, f64::min);
    latest == best
}

fn mean(values: &[f64]) -> Result<f64> {
    if values.is_empty() {
        return Err(PlasmaError::Training("mean of zero buckets".into()));
    }
    Ok(values.iter().sum::<f64>() / values.len() as f64)
}

/// CUDA when built with the `cuda` feature and a device is present, CPU otherwise.
fn select_device() -> Device {
    let force_cpu = std::env::var("PLASMA_FORCE_CPU")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    let cuda_device = std::env::var("PLASMA_CUDA_DEVICE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    if !force_cpu && cfg!(feature = "cuda") {
        match Device::cuda_if_available(cuda_device) {
            Ok(device @ Device::Cuda(_)) => {
                tracing::info!("Training device: CUDA (device {})", cuda_device);
                device
            }
            Ok(_) => {
                tracing::warn!("CUDA not available; falling back to CPU");
                Device::Cpu
            }
            Err(err) => {
                tracing::warn!("CUDA init failed ({err}); falling back to CPU");
                Device::Cpu
            }
        }
    } else {
        if force_cpu {
            tracing::info!("CPU mode forced via PLASMA_FORCE_CPU");
        }
        tracing::info!("Training device: CPU");
        Device::Cpu
    }
}
