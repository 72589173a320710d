//! Recurrent cells.

use candle_core::{bail, Result, Tensor};
use candle_nn::rnn::{lstm, LSTMConfig, LSTMState, LSTM, RNN};
use candle_nn::{linear, Linear, Module, VarBuilder};

use crate::config::CellType;

/// Memory carried from one timestep to the next.
#[derive(Debug, Clone)]
pub enum CellState {
    /// One `(h, c)` pair per stacked LSTM layer.
    Lstm(Vec<LSTMState>),
    /// The linear cell keeps nothing.
    Stateless,
}

/// Cell that evolves an embedding by one timestep.
#[derive(Debug, Clone)]
pub enum RecurrentCell {
    /// Stacked LSTM layers.
    Lstm(Vec<LSTM>),
    /// Affine map applied independently at every timestep.
    Linear(Linear),
}

impl RecurrentCell {
    /// Build a cell of `cell_type` mapping `in_dim` to `hidden_dim`.
    ///
    /// `num_layers` only affects the LSTM variant.
    pub fn new(
        cell_type: CellType,
        in_dim: usize,
        hidden_dim: usize,
        num_layers: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        match cell_type {
            CellType::Lstm => {
                if num_layers == 0 {
                    bail!("lstm cell needs at least one layer");
                }
                let layers = (0..num_layers)
                    .map(|i| {
                        let layer_in = if i == 0 { in_dim } else { hidden_dim };
                        lstm(
                            layer_in,
                            hidden_dim,
                            LSTMConfig::default(),
                            vb.pp(format!("lstm.{i}")),
                        )
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(RecurrentCell::Lstm(layers))
            }
            CellType::Linear => Ok(RecurrentCell::Linear(linear(
                in_dim,
                hidden_dim,
                vb.pp("linear"),
            )?)),
        }
    }

    /// Evolve a `(batch, features)` embedding by one step.
    ///
    /// `prior` is `None` on the first timestep, which starts the LSTM from a
    /// zero state.
    pub fn advance(&self, embedding: &Tensor, prior: Option<&CellState>) -> Result<(Tensor, CellState)> {
        match self {
            RecurrentCell::Lstm(layers) => {
                let prior_states = match prior {
                    None => None,
                    Some(CellState::Lstm(states)) if states.len() == layers.len() => Some(states),
                    Some(_) => bail!("lstm cell received an incompatible prior state"),
                };

                let batch = embedding.dim(0)?;
                let mut x = embedding.contiguous()?;
                let mut next = Vec::with_capacity(layers.len());
                for (i, layer) in layers.iter().enumerate() {
                    let state = match prior_states {
                        Some(states) => layer.step(&x, &states[i])?,
                        None => layer.step(&x, &layer.zero_state(batch)?)?,
                    };
                    x = state.h().clone();
                    next.push(state);
                }
                Ok((x, CellState::Lstm(next)))
            }
            RecurrentCell::Linear(layer) => Ok((layer.forward(embedding)?, CellState::Stateless)),
        }
    }

    /// Evolve a whole `(batch, time, features)` sequence from a zero state.
    pub fn evolve_sequence(&self, embedding: &Tensor) -> Result<Tensor> {
        match self {
            RecurrentCell::Lstm(layers) => {
                let mut x = embedding.contiguous()?;
                for layer in layers {
                    let states = layer.seq(&x)?;
                    x = layer.states_to_tensor(&states)?;
                }
                Ok(x)
            }
            RecurrentCell::Linear(layer) => layer.forward(embedding),
        }
    }
}
