//! Checkpoint directories.
//!
//! ```text
//! <output_dir>/<output_filename_base>/
//!     checkpoint.json        epoch, loss history, signals, hyperparameters
//!     model.safetensors      model parameters
//!     optimizer.safetensors  Adam moments (absent before the first update)
//! ```

use std::collections::HashMap;
use std::path::Path;

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::{ModelConfig, ModelDims, SignalConfig};
use crate::error::{PlasmaError, Result};
use crate::model::SequenceModel;
use crate::optimizer::{Adam, OptimizerConfig};

/// Metadata file name.
pub const METADATA_FILE: &str = "checkpoint.json";
/// Model parameter file name.
pub const MODEL_FILE: &str = "model.safetensors";
/// Optimizer moment file name.
pub const OPTIMIZER_FILE: &str = "optimizer.safetensors";

/// Everything needed to rebuild a model and interpret its loss history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Zero-based epoch the checkpoint was written after.
    pub epoch: usize,
    /// Shot last digits used for validation.
    pub val_indices: Vec<u64>,
    /// Mean training loss per epoch. Non-finite values are stored as null.
    #[serde(deserialize_with = "nan_for_null")]
    pub train_losses: Vec<f64>,
    /// Mean validation loss per epoch. Non-finite values are stored as null.
    #[serde(deserialize_with = "nan_for_null")]
    pub val_losses: Vec<f64>,
    /// Signal names and grid size.
    #[serde(flatten)]
    pub signals: SignalConfig,
    /// Architecture and hyperparameters, tagged by `model_type`.
    pub model: ModelConfig,
    /// Optimizer hyperparameters.
    pub optimizer: OptimizerConfig,
    /// Optimizer updates applied.
    pub optimizer_steps: usize,
}

fn nan_for_null<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<f64>, D::Error> {
    let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
    Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

impl CheckpointMetadata {
    /// Feature widths implied by the signal lists.
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        self.signals.dims()
    }

    /// Epoch with the lowest finite validation loss.
    #[must_use]
    pub fn best_epoch(&self) -> Option<usize> {
        self.val_losses
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_finite())
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
    }
}

/// Write a checkpoint into `dir`, creating it if needed.
pub fn save(dir: &Path, metadata: &CheckpointMetadata, varmap: &VarMap, optimizer: &Adam) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    varmap.save(dir.join(MODEL_FILE))?;

    let moments = optimizer.moment_tensors();
    let optimizer_path = dir.join(OPTIMIZER_FILE);
    if moments.is_empty() {
        if optimizer_path.exists() {
            std::fs::remove_file(&optimizer_path)?;
        }
    } else {
        candle_core::safetensors::save(&moments, &optimizer_path)?;
    }

    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(dir.join(METADATA_FILE), json)?;

    tracing::debug!("Saved checkpoint to {}", dir.display());
    Ok(())
}

/// Read only the metadata of the checkpoint in `dir`.
pub fn load_metadata(dir: &Path) -> Result<CheckpointMetadata> {
    let path = dir.join(METADATA_FILE);
    if !path.exists() {
        return Err(PlasmaError::Checkpoint(format!(
            "no {METADATA_FILE} in {}",
            dir.display()
        )));
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// A checkpoint read back into memory.
pub struct LoadedCheckpoint {
    /// Metadata.
    pub metadata: CheckpointMetadata,
    /// Parameters, owned by the rebuilt model.
    pub varmap: VarMap,
    /// Rebuilt model.
    pub model: SequenceModel,
    /// Adam moments keyed `m.<param>` / `v.<param>`.
    pub optimizer_moments: HashMap<String, Tensor>,
}

impl LoadedCheckpoint {
    /// Adam optimizer over the loaded parameters with its saved moments.
    pub fn optimizer(&self) -> Result<Adam> {
        let mut adam = self.metadata.optimizer.build_adam(&self.varmap)?;
        adam.load_moments(self.optimizer_moments.clone(), self.metadata.optimizer_steps)?;
        Ok(adam)
    }
}

/// Rebuild the model stored in `dir` on `device`.
pub fn load(dir: &Path, device: &Device) -> Result<LoadedCheckpoint> {
    let metadata = load_metadata(dir)?;

    let model_path = dir.join(MODEL_FILE);
    if !model_path.exists() {
        return Err(PlasmaError::Checkpoint(format!(
            "no {MODEL_FILE} in {}",
            dir.display()
        )));
    }
    let (mut varmap, model) = SequenceModel::init(&metadata.model, metadata.dims(), device)?;
    varmap.load(&model_path)?;

    let optimizer_path = dir.join(OPTIMIZER_FILE);
    let optimizer_moments = if optimizer_path.exists() {
        candle_core::safetensors::load(&optimizer_path, device)?
    } else {
        HashMap::new()
    };

    Ok(LoadedCheckpoint {
        metadata,
        varmap,
        model,
        optimizer_moments,
    })
}
