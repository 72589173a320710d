//! Scheduled-sampling rollout shared by every recurrent model.

use candle_core::{IndexOp, Result, Tensor};
use rand::Rng;

use crate::sampling::ScheduledSampling;

/// One timestep of a model.
///
/// Each step input is `feedback ++ exogenous`: the leading
/// `feedback_dim()` features are what the model predicts and can replace
/// with its own previous output, the rest are always taken from the data.
pub(crate) trait StepUpdate {
    /// Memory carried between steps.
    type State;

    /// Width of the predicted, autoregressable prefix.
    fn feedback_dim(&self) -> usize;

    /// Map a `(batch, width)` step input to a `(batch, feedback_dim)` output.
    fn step(&self, step_input: &Tensor, prior: Option<&Self::State>) -> Result<(Tensor, Self::State)>;
}

/// Run `update` over the time axis of a `(batch, time, width)` source.
///
/// Step `t` uses the source row when the sampling policy says so, and
/// otherwise replaces its feedback prefix with the previous step's output.
/// Step 0 always uses the source row. Returns `(batch, time, feedback_dim)`.
pub(crate) fn rollout<U, R>(
    update: &U,
    source: &Tensor,
    sampling: &ScheduledSampling,
    rng: &mut R,
) -> Result<Tensor>
where
    U: StepUpdate + ?Sized,
    R: Rng + ?Sized,
{
    let (_batch, time, width) = source.dims3()?;
    let feedback = update.feedback_dim();

    let mut outputs = Vec::with_capacity(time);
    let mut prev_output: Option<Tensor> = None;
    let mut state: Option<U::State> = None;

    for t in 0..time {
        let truth = source.i((.., t, ..))?;
        let step_input = match prev_output.as_ref() {
            Some(prev) if !sampling.use_truth(t, rng) => {
                let exogenous = truth.narrow(1, feedback, width - feedback)?;
                Tensor::cat(&[prev, &exogenous], 1)?
            }
            _ => truth,
        };

        let (output, next_state) = update.step(&step_input.contiguous()?, state.as_ref())?;
        outputs.push(output.clone());
        prev_output = Some(output);
        state = Some(next_state);
    }

    Tensor::stack(&outputs, 1)
}
