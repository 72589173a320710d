//! Length-masked mean squared error.

use candle_core::{DType, Tensor};

use crate::error::{PlasmaError, Result};

/// Mean squared error over the valid positions of a padded batch.
///
/// Positions at or beyond `lengths[i]` are zeroed in both `output` and
/// `target`, the squared error is summed, and the sum is divided by
/// `sum(lengths) * state_dim`. The padded time dimension never enters the
/// denominator.
///
/// ```rust
/// use candle_core::{Device, Tensor};
/// use plasma_rnn_rs::loss::masked_mse;
///
/// # fn main() -> plasma_rnn_rs::Result<()> {
/// let output = Tensor::new(&[[[1f32], [5.0]]], &Device::Cpu)?;
/// let target = Tensor::new(&[[[0f32], [0.0]]], &Device::Cpu)?;
/// let loss = masked_mse(&output, &target, &[1])?;
/// assert_eq!(loss.to_scalar::<f32>()?, 1.0);
/// # Ok(())
/// # }
/// ```
pub fn masked_mse(output: &Tensor, target: &Tensor, lengths: &[usize]) -> Result<Tensor> {
    if output.dims() != target.dims() {
        return Err(PlasmaError::shape_mismatch(target.dims(), output.dims()));
    }
    let (batch, time, features) = output.dims3()?;
    if lengths.len() != batch {
        return Err(PlasmaError::shape_mismatch(
            format!("{batch} lengths"),
            format!("{} lengths", lengths.len()),
        ));
    }
    if let Some(len) = lengths.iter().find(|&&l| l > time) {
        return Err(PlasmaError::Training(format!(
            "sequence length {len} exceeds padded length {time}"
        )));
    }
    let total: usize = lengths.iter().sum();
    if total == 0 {
        return Err(PlasmaError::Training(
            "masked loss over zero valid timesteps".into(),
        ));
    }

    let mask = length_mask(lengths, time, output.device())?
        .to_dtype(output.dtype())?
        .unsqueeze(2)?;
    let output = output.broadcast_mul(&mask)?;
    let target = target.broadcast_mul(&mask)?;
    let squared = (output - target)?.sqr()?.sum_all()?;

    let denom = (total * features) as f64;
    Ok(squared.affine(1.0 / denom, 0.0)?)
}

/// `(batch, time)` mask with ones at `t < lengths[i]`.
pub fn length_mask(lengths: &[usize], time: usize, device: &candle_core::Device) -> Result<Tensor> {
    let mut mask = vec![0u8; lengths.len() * time];
    for (i, &len) in lengths.iter().enumerate() {
        let len = len.min(time);
        mask[i * time..i * time + len].fill(1);
    }
    Ok(Tensor::from_vec(mask, (lengths.len(), time), device)?.to_dtype(DType::F32)?)
}
