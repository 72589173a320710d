//! Configuration parsing and validation.
//!
//! A run is described by one YAML file:
//!
//! ```yaml
//! data:
//!   path: ./data/preprocessed.jsonl
//! signals:
//!   profiles: [zipfit_etempfit_rho, zipfit_edensfit_rho]
//!   actuators: [pinj, tinj]
//!   parameters: [li_EFIT01]
//! model:
//!   model_type: rnn
//!   rnn_type: lstm
//! optimization:
//!   n_epochs: 100
//!   bucket_size: 5000
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PlasmaError, Result};

/// Main configuration structure.
///
/// # Example
///
/// ```rust
/// use plasma_rnn_rs::PlasmaConfig;
///
/// # fn main() -> plasma_rnn_rs::Result<()> {
/// let config = PlasmaConfig::from_preset("rnn-lstm")?;
/// config.validate()?;
/// assert_eq!(config.signals.profile_grid_points, 33);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlasmaConfig {
    /// Preprocessed dataset location.
    #[serde(default)]
    pub data: DataConfig,

    /// Signal names that make up the state and actuator vectors.
    #[serde(default)]
    pub signals: SignalConfig,

    /// Shot-number split into train/validation/test.
    #[serde(default)]
    pub partition: PartitionConfig,

    /// Model architecture and hyperparameters.
    #[serde(default)]
    pub model: ModelConfig,

    /// Optimization settings.
    #[serde(default)]
    pub optimization: OptimizationConfig,

    /// Directory checkpoints are written under.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Checkpoint directory name inside `output_dir`.
    #[serde(default = "default_output_filename_base")]
    pub output_filename_base: String,

    /// Seed for shuffling and scheduled-sampling draws.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_output_dir() -> String {
    "./outputs".into()
}

fn default_output_filename_base() -> String {
    "model".into()
}

fn default_seed() -> u64 {
    42
}

impl Default for PlasmaConfig {
    fn default() -> Self {
        Self {
            data: DataConfig::default(),
            signals: SignalConfig::default(),
            partition: PartitionConfig::default(),
            model: ModelConfig::default(),
            optimization: OptimizationConfig::default(),
            output_dir: default_output_dir(),
            output_filename_base: default_output_filename_base(),
            seed: default_seed(),
        }
    }
}

/// Dataset configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the JSON-lines file of preprocessed shots.
    #[serde(default = "default_data_path")]
    pub path: String,

    /// Sort each split by sequence length before bucketing.
    #[serde(default = "default_true")]
    pub sort_by_size: bool,
}

fn default_data_path() -> String {
    "./data/preprocessed.jsonl".into()
}

fn default_true() -> bool {
    true
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: default_data_path(),
            sort_by_size: true,
        }
    }
}

/// Names of the signals that make up each timestep.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SignalConfig {
    /// Radial profiles, each sampled on `profile_grid_points` points.
    #[serde(default = "default_profiles")]
    pub profiles: Vec<String>,

    /// Control actuators (present at t and t+1 in every input row).
    #[serde(default = "default_actuators")]
    pub actuators: Vec<String>,

    /// Scalar equilibrium parameters.
    #[serde(default = "default_parameters")]
    pub parameters: Vec<String>,

    /// Number of radial grid points per profile.
    #[serde(default = "default_profile_grid_points")]
    pub profile_grid_points: usize,
}

fn default_profiles() -> Vec<String> {
    vec![
        "zipfit_etempfit_rho".into(),
        "zipfit_edensfit_rho".into(),
        "zipfit_itempfit_rho".into(),
        "zipfit_trotfit_rho".into(),
    ]
}

fn default_actuators() -> Vec<String> {
    vec!["pinj".into(), "tinj".into(), "ip".into(), "bt".into()]
}

fn default_parameters() -> Vec<String> {
    vec![
        "li_EFIT01".into(),
        "tribot_EFIT01".into(),
        "tritop_EFIT01".into(),
        "kappa_EFIT01".into(),
        "volume_EFIT01".into(),
    ]
}

fn default_profile_grid_points() -> usize {
    33
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            actuators: default_actuators(),
            parameters: default_parameters(),
            profile_grid_points: default_profile_grid_points(),
        }
    }
}

impl SignalConfig {
    /// Width of the state vector: every profile grid plus the scalar parameters.
    #[must_use]
    pub fn state_dim(&self) -> usize {
        self.profiles.len() * self.profile_grid_points + self.parameters.len()
    }

    /// Number of actuators.
    #[must_use]
    pub fn actuator_dim(&self) -> usize {
        self.actuators.len()
    }

    /// Width of each input row: state plus actuators at t and t+1.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.dims().input_dim()
    }

    /// State and actuator widths as a [`ModelDims`].
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        ModelDims::new(self.state_dim(), self.actuator_dim())
    }
}

/// Feature widths shared by the dataset and the models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDims {
    /// Width of the predicted state vector.
    pub state_dim: usize,
    /// Number of actuators.
    pub actuator_dim: usize,
}

impl ModelDims {
    /// Create dims from state and actuator widths.
    #[must_use]
    pub fn new(state_dim: usize, actuator_dim: usize) -> Self {
        Self {
            state_dim,
            actuator_dim,
        }
    }

    /// Input row width: state, actuators at t, actuators at t+1.
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.state_dim + 2 * self.actuator_dim
    }
}

/// Shot-number partition settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PartitionConfig {
    /// Seed used to draw the validation digit.
    #[serde(default)]
    pub seed: u64,

    /// First shot (inclusive) considered for any split.
    #[serde(default = "default_min_shot")]
    pub min_shot: u64,

    /// Last shot (exclusive) considered for any split.
    #[serde(default = "default_max_shot")]
    pub max_shot: u64,
}

fn default_min_shot() -> u64 {
    140_888
}

fn default_max_shot() -> u64 {
    200_000
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            min_shot: default_min_shot(),
            max_shot: default_max_shot(),
        }
    }
}

/// Model architecture, tagged by `model_type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "model_type", rename_all = "snake_case")]
pub enum ModelConfig {
    /// Encoder, recurrent cell, decoder.
    Rnn(RnnSettings),
    /// Latent linear dynamics `z' = A z + B u`.
    LinearDynamics(LinearDynamicsSettings),
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::Rnn(RnnSettings::default())
    }
}

impl ModelConfig {
    /// The `model_type` tag as written in config files.
    #[must_use]
    pub fn model_type(&self) -> &'static str {
        match self {
            ModelConfig::Rnn(_) => "rnn",
            ModelConfig::LinearDynamics(_) => "linear_dynamics",
        }
    }
}

/// Recurrent cell variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    /// Long short-term memory cell.
    #[default]
    Lstm,
    /// Stateless affine map applied per timestep.
    Linear,
}

/// Hyperparameters for the encoder/cell/decoder model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RnnSettings {
    /// Encoder width.
    #[serde(default = "default_hidden_dim")]
    pub encoder_dim: usize,

    /// Encoder layers after the input layer.
    #[serde(default = "default_extra_layers")]
    pub encoder_extra_layers: usize,

    /// Recurrent cell width.
    #[serde(default = "default_hidden_dim")]
    pub rnn_dim: usize,

    /// Stacked LSTM layers.
    #[serde(default = "default_rnn_num_layers")]
    pub rnn_num_layers: usize,

    /// Decoder width.
    #[serde(default = "default_hidden_dim")]
    pub decoder_dim: usize,

    /// Decoder hidden layers after the first.
    #[serde(default = "default_extra_layers")]
    pub decoder_extra_layers: usize,

    /// Cell variant.
    #[serde(default)]
    pub rnn_type: CellType,
}

fn default_hidden_dim() -> usize {
    100
}

fn default_extra_layers() -> usize {
    1
}

fn default_rnn_num_layers() -> usize {
    1
}

impl Default for RnnSettings {
    fn default() -> Self {
        Self {
            encoder_dim: default_hidden_dim(),
            encoder_extra_layers: default_extra_layers(),
            rnn_dim: default_hidden_dim(),
            rnn_num_layers: default_rnn_num_layers(),
            decoder_dim: default_hidden_dim(),
            decoder_extra_layers: default_extra_layers(),
            rnn_type: CellType::Lstm,
        }
    }
}

/// Hyperparameters for the latent linear-dynamics model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LinearDynamicsSettings {
    /// Encoder layers after the first.
    #[serde(default = "default_extra_layers")]
    pub encoder_extra_layers: usize,

    /// Decoder layers after the first.
    #[serde(default = "default_extra_layers")]
    pub decoder_extra_layers: usize,
}

impl Default for LinearDynamicsSettings {
    fn default() -> Self {
        Self {
            encoder_extra_layers: default_extra_layers(),
            decoder_extra_layers: default_extra_layers(),
        }
    }
}

/// Optimization and training-loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Cumulative timestep budget per bucket.
    #[serde(default = "default_bucket_size")]
    pub bucket_size: usize,

    /// Number of epochs.
    #[serde(default = "default_n_epochs")]
    pub n_epochs: usize,

    /// Adam learning rate.
    #[serde(default = "default_lr")]
    pub lr: f64,

    /// Learning-rate decay factor. Parsed and recorded, not applied.
    #[serde(default = "default_lr_gamma")]
    pub lr_gamma: f64,

    /// Epoch after which decay would stop. Parsed and recorded, not applied.
    #[serde(default = "default_lr_stop_epoch")]
    pub lr_stop_epoch: usize,

    /// Only checkpoint when validation loss reaches a new minimum.
    #[serde(default = "default_true")]
    pub early_saving: bool,

    /// L1 penalty weight. Parsed and recorded, not applied.
    #[serde(default)]
    pub l1_lambda: f64,

    /// L2 penalty weight. Parsed and recorded, not applied.
    #[serde(default)]
    pub l2_lambda: f64,

    /// Average autoregressive rollout length reached by the final epoch.
    #[serde(default = "default_autoregression_num_steps")]
    pub autoregression_num_steps: usize,

    /// Leading timesteps that always use the true state.
    #[serde(default)]
    pub nwarmup: usize,

    /// Coupled L2 weight decay applied by the optimizer.
    #[serde(default = "default_weight_decay")]
    pub weight_decay: f64,
}

fn default_bucket_size() -> usize {
    5000
}

fn default_n_epochs() -> usize {
    100
}

fn default_lr() -> f64 {
    1e-4
}

fn default_lr_gamma() -> f64 {
    1.0
}

fn default_lr_stop_epoch() -> usize {
    10
}

fn default_autoregression_num_steps() -> usize {
    1
}

fn default_weight_decay() -> f64 {
    1e-5
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            bucket_size: default_bucket_size(),
            n_epochs: default_n_epochs(),
            lr: default_lr(),
            lr_gamma: default_lr_gamma(),
            lr_stop_epoch: default_lr_stop_epoch(),
            early_saving: true,
            l1_lambda: 0.0,
            l2_lambda: 0.0,
            autoregression_num_steps: default_autoregression_num_steps(),
            nwarmup: 0,
            weight_decay: default_weight_decay(),
        }
    }
}

impl OptimizationConfig {
    /// `autoregression_num_steps` clamped to at least one step.
    #[must_use]
    pub fn effective_autoregression_num_steps(&self) -> usize {
        self.autoregression_num_steps.max(1)
    }
}

impl PlasmaConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Example
    ///
    /// ```rust
    /// use plasma_rnn_rs::PlasmaConfig;
    ///
    /// # fn main() -> plasma_rnn_rs::Result<()> {
    /// let config = PlasmaConfig::from_file("configs/default.yaml")?;
    /// assert_eq!(config.model.model_type(), "rnn");
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Create a configuration from a preset.
    ///
    /// Available presets:
    /// - `"rnn-lstm"` - encoder/LSTM/decoder
    /// - `"rnn-linear"` - encoder/stateless linear cell/decoder
    /// - `"linear-dynamics"` - latent `A z + B u` model
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "rnn-lstm" => Ok(Self::default()),
            "rnn-linear" => Ok(Self {
                model: ModelConfig::Rnn(RnnSettings {
                    rnn_type: CellType::Linear,
                    ..RnnSettings::default()
                }),
                ..Self::default()
            }),
            "linear-dynamics" => Ok(Self {
                model: ModelConfig::LinearDynamics(LinearDynamicsSettings::default()),
                ..Self::default()
            }),
            _ => Err(PlasmaError::Config(format!("Unknown preset: {preset}"))),
        }
    }

    /// Validate configuration.
    ///
    /// ```rust
    /// use plasma_rnn_rs::PlasmaConfig;
    ///
    /// let mut config = PlasmaConfig::default();
    /// config.optimization.bucket_size = 0;
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.data.path.is_empty() {
            return Err(PlasmaError::Config("data.path is required".into()));
        }

        let signals = &self.signals;
        if signals.profiles.is_empty() && signals.parameters.is_empty() {
            return Err(PlasmaError::Config(
                "at least one profile or parameter is required".into(),
            ));
        }
        if !signals.profiles.is_empty() && signals.profile_grid_points == 0 {
            return Err(PlasmaError::Config(
                "signals.profile_grid_points must be > 0".into(),
            ));
        }
        if signals.actuators.is_empty() {
            return Err(PlasmaError::Config(
                "at least one actuator is required".into(),
            ));
        }

        if self.partition.min_shot >= self.partition.max_shot {
            return Err(PlasmaError::Config(format!(
                "partition.min_shot ({}) must be below partition.max_shot ({})",
                self.partition.min_shot, self.partition.max_shot
            )));
        }

        match &self.model {
            ModelConfig::Rnn(rnn) => {
                if rnn.encoder_dim == 0 || rnn.rnn_dim == 0 || rnn.decoder_dim == 0 {
                    return Err(PlasmaError::Config(
                        "encoder_dim, rnn_dim and decoder_dim must be > 0".into(),
                    ));
                }
                if rnn.rnn_num_layers == 0 {
                    return Err(PlasmaError::Config("rnn_num_layers must be > 0".into()));
                }
            }
            ModelConfig::LinearDynamics(_) => {}
        }

        let opt = &self.optimization;
        if opt.n_epochs == 0 {
            return Err(PlasmaError::Config(
                "optimization.n_epochs must be > 0".into(),
            ));
        }
        if opt.bucket_size == 0 {
            return Err(PlasmaError::Config(
                "optimization.bucket_size must be > 0".into(),
            ));
        }
        if !(opt.lr.is_finite() && opt.lr > 0.0) {
            return Err(PlasmaError::Config(format!(
                "optimization.lr must be a positive number, got {}",
                opt.lr
            )));
        }
        if !(opt.weight_decay.is_finite() && opt.weight_decay >= 0.0) {
            return Err(PlasmaError::Config(
                "optimization.weight_decay must be >= 0".into(),
            ));
        }
        for (name, value) in [
            ("lr_gamma", opt.lr_gamma),
            ("l1_lambda", opt.l1_lambda),
            ("l2_lambda", opt.l2_lambda),
        ] {
            if !value.is_finite() {
                return Err(PlasmaError::Config(format!(
                    "optimization.{name} must be finite"
                )));
            }
        }
        if opt.autoregression_num_steps < 1 {
            tracing::warn!(
                "autoregression_num_steps={} is below 1; using 1",
                opt.autoregression_num_steps
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_serialization() {
        let config = PlasmaConfig::from_preset("linear-dynamics").unwrap();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let restored: PlasmaConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.model, restored.model);
        assert_eq!(config.signals, restored.signals);
    }

    #[test]
    fn test_dims_follow_signal_lists() {
        let signals = SignalConfig {
            profiles: vec!["te".into(), "ne".into()],
            actuators: vec!["pinj".into()],
            parameters: vec!["li".into(), "kappa".into(), "volume".into()],
            profile_grid_points: 33,
        };
        assert_eq!(signals.state_dim(), 2 * 33 + 3);
        assert_eq!(signals.actuator_dim(), 1);
        assert_eq!(signals.input_dim(), 69 + 2);
    }

    #[test]
    fn test_presets() {
        assert!(PlasmaConfig::from_preset("rnn-lstm").is_ok());
        assert!(PlasmaConfig::from_preset("rnn-linear").is_ok());
        assert!(PlasmaConfig::from_preset("linear-dynamics").is_ok());
        assert!(PlasmaConfig::from_preset("invalid").is_err());

        let linear = PlasmaConfig::from_preset("rnn-linear").unwrap();
        match linear.model {
            ModelConfig::Rnn(rnn) => assert_eq!(rnn.rnn_type, CellType::Linear),
            other => panic!("unexpected model {other:?}"),
        }
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = PlasmaConfig::default();
        assert!(config.validate().is_ok());

        config.optimization.n_epochs = 0;
        assert!(config.validate().is_err());
        config.optimization.n_epochs = 10;

        config.optimization.lr = 0.0;
        assert!(config.validate().is_err());
        config.optimization.lr = f64::NAN;
        assert!(config.validate().is_err());
        config.optimization.lr = 1e-3;

        config.signals.actuators.clear();
        assert!(config.validate().is_err());
        config.signals.actuators = vec!["pinj".into()];

        config.partition.min_shot = config.partition.max_shot;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_width_model() {
        let mut config = PlasmaConfig::default();
        config.model = ModelConfig::Rnn(RnnSettings {
            rnn_num_layers: 0,
            ..RnnSettings::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_autoregression_steps_clamped() {
        let mut opt = OptimizationConfig::default();
        opt.autoregression_num_steps = 0;
        assert_eq!(opt.effective_autoregression_num_steps(), 1);
        opt.autoregression_num_steps = 4;
        assert_eq!(opt.effective_autoregression_num_steps(), 4);
    }

    #[test]
    fn test_yaml_defaults_fill_missing_fields() {
        let yaml = r#"
signals:
  profiles: [zipfit_etempfit_rho]
  actuators: [pinj]
  parameters: []
model:
  model_type: rnn
  rnn_type: linear
  rnn_dim: 16
optimization:
  n_epochs: 4
"#;
        let config: PlasmaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.optimization.n_epochs, 4);
        assert_eq!(config.optimization.bucket_size, 5000);
        assert_eq!(config.signals.state_dim(), 33);
        match config.model {
            ModelConfig::Rnn(rnn) => {
                assert_eq!(rnn.rnn_type, CellType::Linear);
                assert_eq!(rnn.rnn_dim, 16);
                assert_eq!(rnn.encoder_dim, 100);
            }
            other => panic!("unexpected model {other:?}"),
        }
    }

    #[test]
    fn test_unknown_model_type_fails_to_parse() {
        let yaml = "model:\n  model_type: transformer\n";
        assert!(serde_yaml::from_str::<PlasmaConfig>(yaml).is_err());
    }

    #[test]
    fn test_from_file_and_to_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "model:\n  model_type: linear_dynamics\n  encoder_extra_layers: 2\noutput_filename_base: hiro"
        )
        .unwrap();

        let config = PlasmaConfig::from_file(file.path()).unwrap();
        assert_eq!(config.output_filename_base, "hiro");
        assert_eq!(
            config.model,
            ModelConfig::LinearDynamics(LinearDynamicsSettings {
                encoder_extra_layers: 2,
                decoder_extra_layers: 1,
            })
        );

        let out = NamedTempFile::new().unwrap();
        config.to_file(out.path()).unwrap();
        let restored = PlasmaConfig::from_file(out.path()).unwrap();
        assert_eq!(restored.model, config.model);
    }
}
