//! Sequence models that predict the next plasma state.
//!
//! Both variants share one contract: given a padded
//! `(batch, time, state_dim + 2 * actuator_dim)` input they return a
//! `(batch, time, state_dim)` prediction. Under full teacher forcing the
//! whole sequence is evaluated in one pass; otherwise the model is unrolled
//! step by step and [`ScheduledSampling`] decides at every step whether the
//! previous prediction replaces the true state.

pub mod cell;
pub mod layers;
pub mod linear_dynamics;
pub mod rnn;
pub(crate) mod rollout;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use rand::Rng;

use crate::config::{ModelConfig, ModelDims};
use crate::error::{PlasmaError, Result};
use crate::sampling::ScheduledSampling;

pub use cell::{CellState, RecurrentCell};
pub use linear_dynamics::LinearDynamicsModel;
pub use rnn::RnnModel;

/// Any supported sequence model.
pub enum SequenceModel {
    /// Encoder, recurrent cell, decoder.
    Rnn(RnnModel),
    /// Latent linear dynamics.
    LinearDynamics(LinearDynamicsModel),
}

impl SequenceModel {
    /// Build the architecture described by `config`, registering parameters in `vb`.
    pub fn new(config: &ModelConfig, dims: ModelDims, vb: VarBuilder) -> Result<Self> {
        if dims.state_dim == 0 || dims.actuator_dim == 0 {
            return Err(PlasmaError::Model(format!(
                "state_dim and actuator_dim must be > 0, got {dims:?}"
            )));
        }
        let model = match config {
            ModelConfig::Rnn(settings) => SequenceModel::Rnn(RnnModel::new(settings, dims, vb)?),
            ModelConfig::LinearDynamics(settings) => {
                SequenceModel::LinearDynamics(LinearDynamicsModel::new(settings, dims, vb)?)
            }
        };
        Ok(model)
    }

    /// Build a model with fresh parameters owned by a new [`VarMap`].
    ///
    /// ```rust
    /// use candle_core::{Device, Tensor};
    /// use plasma_rnn_rs::config::{ModelConfig, ModelDims};
    /// use plasma_rnn_rs::model::SequenceModel;
    /// use plasma_rnn_rs::sampling::ScheduledSampling;
    ///
    /// # fn main() -> plasma_rnn_rs::Result<()> {
    /// let dims = ModelDims::new(3, 2);
    /// let (_varmap, model) = SequenceModel::init(&ModelConfig::default(), dims, &Device::Cpu)?;
    /// let input = Tensor::zeros((4, 6, dims.input_dim()), candle_core::DType::F32, &Device::Cpu)?;
    /// let output = model.forward(&input, &ScheduledSampling::teacher_forced(), &mut rand::thread_rng())?;
    /// assert_eq!(output.dims(), &[4, 6, 3]);
    /// # Ok(())
    /// # }
    /// ```
    pub fn init(config: &ModelConfig, dims: ModelDims, device: &Device) -> Result<(VarMap, Self)> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
        let model = Self::new(config, dims, vb)?;
        Ok((varmap, model))
    }

    /// Feature widths.
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        match self {
            SequenceModel::Rnn(m) => m.dims(),
            SequenceModel::LinearDynamics(m) => m.dims(),
        }
    }

    /// Predict next states, taking the whole-sequence path when `sampling`
    /// is fully teacher-forced and the stepwise path otherwise.
    pub fn forward<R: Rng + ?Sized>(
        &self,
        input: &Tensor,
        sampling: &ScheduledSampling,
        rng: &mut R,
    ) -> Result<Tensor> {
        if sampling.is_teacher_forced() {
            self.forward_teacher_forced(input)
        } else {
            self.forward_stepwise(input, sampling, rng)
        }
    }

    /// Whole-sequence pass using the true state at every step.
    pub fn forward_teacher_forced(&self, input: &Tensor) -> Result<Tensor> {
        self.check_input(input)?;
        let output = match self {
            SequenceModel::Rnn(m) => m.forward_teacher_forced(input)?,
            SequenceModel::LinearDynamics(m) => m.forward_teacher_forced(input)?,
        };
        Ok(output)
    }

    /// Step-by-step pass under `sampling`, regardless of its reset probability.
    pub fn forward_stepwise<R: Rng + ?Sized>(
        &self,
        input: &Tensor,
        sampling: &ScheduledSampling,
        rng: &mut R,
    ) -> Result<Tensor> {
        self.check_input(input)?;
        let output = match self {
            SequenceModel::Rnn(m) => m.forward_stepwise(input, sampling, rng)?,
            SequenceModel::LinearDynamics(m) => m.forward_stepwise(input, sampling, rng)?,
        };
        Ok(output)
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        let dims = self.dims();
        let (batch, time, width) = input
            .dims3()
            .map_err(|_| PlasmaError::shape_mismatch(("batch", "time", dims.input_dim()), input.dims()))?;
        if batch == 0 || time == 0 {
            return Err(PlasmaError::Model(format!(
                "empty input batch of shape {:?}",
                input.dims()
            )));
        }
        if width != dims.input_dim() {
            return Err(PlasmaError::shape_mismatch(
                (batch, time, dims.input_dim()),
                (batch, time, width),
            ));
        }
        Ok(())
    }
}

/// Bytes held by every parameter in `varmap`.
#[must_use]
pub fn parameter_bytes(varmap: &VarMap) -> usize {
    varmap
        .all_vars()
        .iter()
        .map(|v| v.elem_count() * v.dtype().size_in_bytes())
        .sum()
}

/// Number of scalar parameters in `varmap`.
#[must_use]
pub fn parameter_count(varmap: &VarMap) -> usize {
    varmap.all_vars().iter().map(|v| v.elem_count()).sum()
}
