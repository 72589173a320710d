//! Affine stacks with pointwise activations.

use candle_core::{Result, Tensor};
use candle_nn::{linear, Linear, Module, VarBuilder};

/// Negative slope used by the latent encoder and its inverse.
pub const LEAKY_SLOPE: f64 = 0.01;

/// Pointwise nonlinearity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Activation {
    /// `max(x, 0)`
    Relu,
    /// `x` for `x >= 0`, `slope * x` otherwise. Requires `0 < slope < 1`.
    LeakyRelu(f64),
    /// `x` for `x >= 0`, `x / slope` otherwise. Requires `0 < slope < 1`.
    InverseLeakyRelu(f64),
}

impl Activation {
    /// Apply the activation.
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        match *self {
            Activation::Relu => x.relu(),
            Activation::LeakyRelu(slope) => leaky_relu(x, slope),
            Activation::InverseLeakyRelu(slope) => inverse_leaky_relu(x, slope),
        }
    }
}

/// Leaky ReLU, written as `max(x, slope * x)`.
pub fn leaky_relu(x: &Tensor, slope: f64) -> Result<Tensor> {
    x.maximum(&x.affine(slope, 0.0)?)
}

/// Inverse of [`leaky_relu`], written as `min(x, x / slope)`.
pub fn inverse_leaky_relu(x: &Tensor, slope: f64) -> Result<Tensor> {
    x.minimum(&x.affine(1.0 / slope, 0.0)?)
}

enum Stage {
    Affine(Linear),
    Activation(Activation),
}

/// Ordered stack of affine layers and activations.
///
/// Parameters are registered under `<prefix>.<index>` in the order affine
/// layers are added.
#[derive(Default)]
pub struct LayerStack {
    stages: Vec<Stage>,
    affine_count: usize,
}

impl LayerStack {
    /// Empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an affine layer `in_dim -> out_dim` registered as `vb.<n>`.
    pub fn affine(mut self, in_dim: usize, out_dim: usize, vb: &VarBuilder) -> Result<Self> {
        let layer = linear(in_dim, out_dim, vb.pp(self.affine_count.to_string()))?;
        self.affine_count += 1;
        self.stages.push(Stage::Affine(layer));
        Ok(self)
    }

    /// Append an activation.
    #[must_use]
    pub fn activation(mut self, activation: Activation) -> Self {
        self.stages.push(Stage::Activation(activation));
        self
    }

    /// Number of affine layers.
    #[must_use]
    pub fn affine_layers(&self) -> usize {
        self.affine_count
    }
}

impl Module for LayerStack {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let mut x = xs.clone();
        for stage in &self.stages {
            x = match stage {
                Stage::Affine(layer) => layer.forward(&x)?,
                Stage::Activation(activation) => activation.apply(&x)?,
            };
        }
        Ok(x)
    }
}
