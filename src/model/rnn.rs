//! Encoder, recurrent cell, decoder.

use candle_core::{Result, Tensor};
use candle_nn::{Module, VarBuilder};
use rand::Rng;

use super::cell::{CellState, RecurrentCell};
use super::layers::{Activation, LayerStack};
use super::rollout::{rollout, StepUpdate};
use crate::config::{ModelDims, RnnSettings};
use crate::sampling::ScheduledSampling;

/// Predicts the next state from `state ++ actuators(t) ++ actuators(t+1)`.
///
/// The encoder is an affine+ReLU input layer followed by
/// `encoder_extra_layers` more; the decoder is `1 + decoder_extra_layers`
/// affine+ReLU layers and a final affine projection to the state width.
pub struct RnnModel {
    encoder: LayerStack,
    cell: RecurrentCell,
    decoder: LayerStack,
    dims: ModelDims,
}

impl RnnModel {
    /// Register parameters under `encoder`, `cell` and `decoder`.
    pub fn new(settings: &RnnSettings, dims: ModelDims, vb: VarBuilder) -> Result<Self> {
        let enc_vb = vb.pp("encoder");
        let mut encoder = LayerStack::new()
            .affine(dims.input_dim(), settings.encoder_dim, &enc_vb)?
            .activation(Activation::Relu);
        for _ in 0..settings.encoder_extra_layers {
            encoder = encoder
                .affine(settings.encoder_dim, settings.encoder_dim, &enc_vb)?
                .activation(Activation::Relu);
        }

        let cell = RecurrentCell::new(
            settings.rnn_type,
            settings.encoder_dim,
            settings.rnn_dim,
            settings.rnn_num_layers,
            vb.pp("cell"),
        )?;

        let dec_vb = vb.pp("decoder");
        let mut decoder = LayerStack::new()
            .affine(settings.rnn_dim, settings.decoder_dim, &dec_vb)?
            .activation(Activation::Relu);
        for _ in 0..settings.decoder_extra_layers {
            decoder = decoder
                .affine(settings.decoder_dim, settings.decoder_dim, &dec_vb)?
                .activation(Activation::Relu);
        }
        let decoder = decoder.affine(settings.decoder_dim, dims.state_dim, &dec_vb)?;

        Ok(Self {
            encoder,
            cell,
            decoder,
            dims,
        })
    }

    /// Feature widths.
    #[must_use]
    pub fn dims(&self) -> ModelDims {
        self.dims
    }

    /// Whole-sequence pass with every step using the true input.
    pub fn forward_teacher_forced(&self, input: &Tensor) -> Result<Tensor> {
        let embedding = self.encoder.forward(input)?;
        let evolved = self.cell.evolve_sequence(&embedding)?;
        self.decoder.forward(&evolved)
    }

    /// Step-by-step pass under `sampling`.
    pub fn forward_stepwise<R: Rng + ?Sized>(
        &self,
        input: &Tensor,
        sampling: &ScheduledSampling,
        rng: &mut R,
    ) -> Result<Tensor> {
        rollout(self, input, sampling, rng)
    }
}

impl StepUpdate for RnnModel {
    type State = CellState;

    fn feedback_dim(&self) -> usize {
        self.dims.state_dim
    }

    fn step(&self, step_input: &Tensor, prior: Option<&CellState>) -> Result<(Tensor, CellState)> {
        let embedding = self.encoder.forward(step_input)?;
        let (evolved, state) = self.cell.advance(&embedding, prior)?;
        Ok((self.decoder.forward(&evolved)?, state))
    }
}
