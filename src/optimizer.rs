//! Adam with coupled L2 weight decay and exportable moment state.

use std::collections::HashMap;

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use crate::error::{PlasmaError, Result};

/// Optimizer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Beta1 for Adam
    pub beta1: f64,
    /// Beta2 for Adam
    pub beta2: f64,
    /// L2 penalty added to the gradient before the moment updates
    pub weight_decay: f64,
    /// Epsilon for numerical stability
    pub eps: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            weight_decay: 1e-5,
            eps: 1e-8,
        }
    }
}

impl OptimizerConfig {
    /// Create an Adam optimizer over every variable in `varmap`.
    pub fn build_adam(&self, varmap: &VarMap) -> Result<Adam> {
        let vars = {
            let data = varmap
                .data()
                .lock()
                .map_err(|_| PlasmaError::Training("parameter store lock poisoned".into()))?;
            let mut vars: Vec<(String, Var)> =
                data.iter().map(|(name, var)| (name.clone(), var.clone())).collect();
            vars.sort_by(|a, b| a.0.cmp(&b.0));
            vars
        };
        if vars.is_empty() {
            return Err(PlasmaError::Training(
                "optimizer created with no parameters".into(),
            ));
        }

        Ok(Adam {
            config: *self,
            vars,
            m: HashMap::new(),
            v: HashMap::new(),
            t: 0,
        })
    }
}

/// Adam optimizer.
///
/// Moments are keyed by parameter name so they can be saved next to the
/// parameters and restored into a rebuilt model.
pub struct Adam {
    config: OptimizerConfig,
    vars: Vec<(String, Var)>,
    /// First moment estimates
    m: HashMap<String, Tensor>,
    /// Second moment estimates
    v: HashMap<String, Tensor>,
    /// Step counter for bias correction
    t: usize,
}

impl Adam {
    /// Backpropagate `loss` and apply one update.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step(&grads)
    }

    /// Apply one update from precomputed gradients. Parameters without a
    /// gradient are left untouched.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.t += 1;
        let OptimizerConfig {
            learning_rate,
            beta1,
            beta2,
            weight_decay,
            eps,
        } = self.config;

        // Bias correction factors
        let bc1 = 1.0 - beta1.powi(self.t as i32);
        let bc2 = 1.0 - beta2.powi(self.t as i32);

        for (name, var) in &self.vars {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let weights = var.as_tensor().detach();
            let grad = if weight_decay > 0.0 {
                (grad + (&weights * weight_decay)?)?
            } else {
                grad.clone()
            };

            let m = match self.m.get(name) {
                Some(m) => ((m * beta1)? + (&grad * (1.0 - beta1))?)?,
                None => (&grad * (1.0 - beta1))?,
            };
            let v = match self.v.get(name) {
                Some(v) => ((v * beta2)? + (grad.sqr()? * (1.0 - beta2))?)?,
                None => (grad.sqr()? * (1.0 - beta2))?,
            };

            let m_hat = (&m / bc1)?;
            let v_hat = (&v / bc2)?;
            let update = ((m_hat / (v_hat.sqrt()? + eps)?)? * learning_rate)?;
            var.set(&(weights - update)?)?;

            self.m.insert(name.clone(), m);
            self.v.insert(name.clone(), v);
        }

        Ok(())
    }

    /// Hyperparameters.
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Number of updates applied so far.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.t
    }

    /// Moment tensors keyed `m.<param>` and `v.<param>`.
    #[must_use]
    pub fn moment_tensors(&self) -> HashMap<String, Tensor> {
        let first = self.m.iter().map(|(k, t)| (format!("m.{k}"), t.clone()));
        let second = self.v.iter().map(|(k, t)| (format!("v.{k}"), t.clone()));
        first.chain(second).collect()
    }

    /// Restore moments written by [`Adam::moment_tensors`] and the step count.
    pub fn load_moments(&mut self, tensors: HashMap<String, Tensor>, steps: usize) -> Result<()> {
        let mut m = HashMap::new();
        let mut v = HashMap::new();
        for (key, tensor) in tensors {
            let (kind, name) = key.split_once('.').ok_or_else(|| {
                PlasmaError::Checkpoint(format!("unexpected optimizer tensor {key}"))
            })?;
            let Some((_, var)) = self.vars.iter().find(|(n, _)| n == name) else {
                return Err(PlasmaError::Checkpoint(format!(
                    "optimizer state for unknown parameter {name}"
                )));
            };
            if var.dims() != tensor.dims() {
                return Err(PlasmaError::shape_mismatch(var.dims(), tensor.dims()));
            }
            let tensor = tensor.to_device(var.device())?;
            match kind {
                "m" => m.insert(name.to_string(), tensor),
                "v" => v.insert(name.to_string(), tensor),
                _ => {
                    return Err(PlasmaError::Checkpoint(format!(
                        "unexpected optimizer tensor {key}"
                    )))
                }
            };
        }
        self.m = m;
        self.v = v;
        self.t = steps;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarBuilder;

    fn scalar_param(init: f32) -> (VarMap, Tensor) {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let w = vb
            .get_with_hints(1, "w", candle_nn::Init::Const(f64::from(init)))
            .unwrap();
        (varmap, w)
    }

    #[test]
    fn test_first_step_moves_by_learning_rate() {
        let (varmap, w) = scalar_param(3.0);
        let config = OptimizerConfig {
            learning_rate: 0.1,
            weight_decay: 0.0,
            ..OptimizerConfig::default()
        };
        let mut adam = config.build_adam(&varmap).unwrap();

        let loss = w.sqr().unwrap().sum_all().unwrap();
        adam.backward_step(&loss).unwrap();

        // Bias-corrected first Adam step is lr * sign(grad).
        let value = varmap.all_vars()[0].to_vec1::<f32>().unwrap()[0];
        assert!((value - 2.9).abs() < 1e-5, "{value}");
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_minimizes_quadratic() {
        let (varmap, w) = scalar_param(2.0);
        let config = OptimizerConfig {
            learning_rate: 0.05,
            ..OptimizerConfig::default()
        };
        let mut adam = config.build_adam(&varmap).unwrap();
        for _ in 0..400 {
            let loss = (&w - 0.5).unwrap().sqr().unwrap().sum_all().unwrap();
            adam.backward_step(&loss).unwrap();
        }
        let value = varmap.all_vars()[0].to_vec1::<f32>().unwrap()[0];
        assert!((value - 0.5).abs() < 0.1, "{value}");
    }

    #[test]
    fn test_weight_decay_shrinks_without_loss_gradient() {
        let (varmap, w) = scalar_param(1.0);
        let config = OptimizerConfig {
            learning_rate: 0.01,
            weight_decay: 0.5,
            ..OptimizerConfig::default()
        };
        let mut adam = config.build_adam(&varmap).unwrap();
        // (w - w)^2 keeps w in the graph with a zero gradient, so only the
        // L2 term acts.
        let loss = (&w - &w.detach()).unwrap().sqr().unwrap().sum_all().unwrap();
        let grads = loss.backward().unwrap();
        let vars = varmap.all_vars();
        let var = &vars[0];
        let grad = grads.get(var).expect("w keeps a gradient");
        assert_eq!(grad.to_vec1::<f32>().unwrap(), vec![0.0]);

        adam.step(&grads).unwrap();
        let value = var.to_vec1::<f32>().unwrap()[0];
        assert!((value - 0.99).abs() < 1e-5, "{value}");
        assert_eq!(adam.steps(), 1);
    }

    #[test]
    fn test_moments_round_trip() {
        let (varmap, w) = scalar_param(1.5);
        let mut adam = OptimizerConfig::default().build_adam(&varmap).unwrap();
        let loss = w.sqr().unwrap().sum_all().unwrap();
        adam.backward_step(&loss).unwrap();

        let exported = adam.moment_tensors();
        assert!(exported.contains_key("m.w"));
        assert!(exported.contains_key("v.w"));

        let mut restored = OptimizerConfig::default().build_adam(&varmap).unwrap();
        restored.load_moments(exported, adam.steps()).unwrap();
        assert_eq!(restored.steps(), 1);
        assert_eq!(restored.moment_tensors().len(), 2);
    }

    #[test]
    fn test_load_rejects_unknown_parameter() {
        let (varmap, _w) = scalar_param(1.0);
        let mut adam = OptimizerConfig::default().build_adam(&varmap).unwrap();
        let mut tensors = HashMap::new();
        tensors.insert(
            "m.missing".to_string(),
            Tensor::zeros(1, DType::F32, &Device::Cpu).unwrap(),
        );
        assert!(adam.load_moments(tensors, 1).is_err());
    }

    #[test]
    fn test_empty_varmap_rejected() {
        assert!(OptimizerConfig::default().build_adam(&VarMap::new()).is_err());
    }
}
