//! Latent linear dynamics: `z(t+1) = A z(t) + B u(t)`.
//!
//! The state is lifted into a latent space by leaky-ReLU layers, evolved
//! linearly under the current actuators, and mapped back by
//! inverse-leaky-ReLU layers. The decoder is not constrained to invert the
//! encoder exactly.

use candle_core::{Result, Tensor, D};
use candle_nn::{linear, Linear, Module, VarBuilder};
use rand::Rng;

use super::layers::{Activation, LayerStack, LEAKY_SLOPE};
use super::rollout::{rollout, StepUpdate};
use crate::config::{LinearDynamicsSettings, ModelDims};
use crate::sampling::ScheduledSampling;

/// Encoder, linear `A`/`B` evolution, decoder.
pub struct LinearDynamicsModel {
    encoder: LayerStack,
    a: Linear,
    b: Linear,
    decoder: LayerStack,
    dims: ModelDims,
}

impl LinearDynamicsModel {
    /// Register parameters under `encoder`, `a`, `b` and `decoder`.
    pub fn new(settings: &LinearDynamicsSettings, dims: ModelDims, vb: VarBuilder) -> Result<Self> {
        let state = dims.state_dim;

        let enc_vb = vb.pp("encoder");
        let mut encoder = LayerStack::new();
        for _ in 0..=settings.encoder_extra_layers {
            encoder = encoder
                .affine(state, state, &enc_vb)?
                .activation(Activation::LeakyRelu(LEAKY_SLOPE));
        }

        let a = linear(state, state, vb.pp("a"))?;
        let b = linear(dims.actuator_dim, state, vb.pp("b"))?;

        let dec_vb = vb.pp("decoder");
        let mut decoder = LayerStack::new();
        for _ in 0..=settings.decoder_extra_layers {
            decoder = decoder
                .activation(Activation::InverseLeakyRelu(LEAKY_SLOPE))
                .affine(state, state, &dec_vb)?;
        }

        Ok(Self {
            encoder,
            a,
            b,
            decoder,
            dims,
        })
    }

    /// Feature widths.
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    /// Split `(batch, time, input_dim)` into the state and the actuators at t.
    fn split(&self, input: &Tensor) -> Result<(Tensor, Tensor)> {
        let state = input.narrow(D::Minus1, 0, self.dims.state_dim)?.contiguous()?;
        let actuators = input
            .narrow(D::Minus1, self.dims.state_dim, self.dims.actuator_dim)?
            .contiguous()?;
        Ok((state, actuators))
    }

    fn evolve(&self, latent: &Tensor, actuators: &Tensor) -> Result<Tensor> {
        self.a.forward(latent)? + self.b.forward(actuators)?
    }

    /// Whole-sequence pass with every step using the true latent.
    pub fn forward_teacher_forced(&self, input: &Tensor) -> Result<Tensor> {
        let (state, actuators) = self.split(input)?;
        let latent = self.encoder.forward(&state)?;
        let evolved = self.evolve(&latent, &actuators)?;
        self.decoder.forward(&evolved)
    }

    /// Step-by-step pass under `sampling`; autoregression feeds back the
    /// previous latent.
    pub fn forward_stepwise<R: Rng + ?Sized>(
        &self,
        input: &Tensor,
        sampling: &ScheduledSampling,
        rng: &mut R,
    ) -> Result<Tensor> {
        let (state, actuators) = self.split(input)?;
        let latent = self.encoder.forward(&state)?;
        let source = Tensor::cat(&[&latent, &actuators], D::Minus1)?;
        let evolved = rollout(self, &source, sampling, rng)?;
        self.decoder.forward(&evolved)
    }
}

impl StepUpdate for LinearDynamicsModel {
    type State = ();

    fn feedback_dim(&self) -> usize {
        self.dims.state_dim
    }

    fn step(&self, step_input: &Tensor, _prior: Option<&()>) -> Result<(Tensor, ())> {
        let latent = step_input.narrow(1, 0, self.dims.state_dim)?.contiguous()?;
        let actuators = step_input
            .narrow(1, self.dims.state_dim, self.dims.actuator_dim)?
            .contiguous()?;
        Ok((self.evolve(&latent, &actuators)?, ()))
    }
}
