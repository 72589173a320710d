//! Scheduled sampling: when to feed the model its own predictions.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PlasmaError, Result};

/// Per-forward-pass teacher-forcing policy.
///
/// At timestep `t` the true input is used when `t <= nwarmup` or a fresh
/// uniform draw falls below `reset_probability`; otherwise the model's
/// previous prediction is fed back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScheduledSampling {
    reset_probability: f64,
    nwarmup: usize,
}

impl ScheduledSampling {
    /// Create a policy. `reset_probability` must be a non-negative number;
    /// values above one behave like one.
    pub fn new(reset_probability: f64, nwarmup: usize) -> Result<Self> {
        if reset_probability.is_nan() || reset_probability < 0.0 {
            return Err(PlasmaError::Config(format!(
                "reset_probability must be >= 0, got {reset_probability}"
            )));
        }
        Ok(Self {
            reset_probability,
            nwarmup,
        })
    }

    /// Always use the true input.
    #[must_use]
    pub fn teacher_forced() -> Self {
        Self {
            reset_probability: 1.0,
            nwarmup: 0,
        }
    }

    /// Probability of using the true input after warmup.
    #[must_use]
    pub fn reset_probability(&self) -> f64 {
        self.reset_probability
    }

    /// Leading timesteps that never autoregress.
    #[must_use]
    pub fn nwarmup(&self) -> usize {
        self.nwarmup
    }

    /// True when every step uses the true input, so the whole sequence can
    /// be evaluated at once.
    #[must_use]
    pub fn is_teacher_forced(&self) -> bool {
        self.reset_probability >= 1.0
    }

    /// Whether step `t` uses the true input. No draw is made during warmup.
    pub fn use_truth<R: Rng + ?Sized>(&self, t: usize, rng: &mut R) -> bool {
        t <= self.nwarmup || rng.gen::<f64>() < self.reset_probability
    }
}

/// Epoch-wise annealing of the reset probability.
///
/// The first half of training is fully teacher-forced. Afterwards the
/// expected autoregressive rollout length grows linearly from one step to
/// `num_steps` at the final epoch, and the reset probability is its inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoregressionSchedule {
    n_epochs: usize,
    start_epoch: usize,
    num_steps: usize,
}

impl AutoregressionSchedule {
    /// Schedule over `n_epochs`, starting autoregression after `n_epochs / 2`.
    /// `num_steps` below one is treated as one.
    ///
    /// ```rust
    /// use plasma_rnn_rs::sampling::AutoregressionSchedule;
    ///
    /// let schedule = AutoregressionSchedule::new(10, 4);
    /// assert_eq!(schedule.reset_probability(0), 1.0);
    /// assert!((schedule.reset_probability(9) - 0.25).abs() < 1e-12);
    /// ```
    #[must_use]
    pub fn new(n_epochs: usize, num_steps: usize) -> Self {
        Self {
            n_epochs,
            start_epoch: n_epochs / 2,
            num_steps: num_steps.max(1),
        }
    }

    /// Last fully teacher-forced epoch.
    #[must_use]
    pub fn start_epoch(&self) -> usize {
        self.start_epoch
    }

    /// Expected rollout length at `epoch`.
    #[must_use]
    pub fn average_steps(&self, epoch: usize) -> f64 {
        if epoch <= self.start_epoch {
            return 1.0;
        }
        let k = self.num_steps as f64;
        let span = (self.n_epochs - self.start_epoch) as f64;
        let slope = (1.0 - k) / span;
        let remaining = self.n_epochs as f64 - (epoch as f64 + 1.0);
        slope * remaining + k
    }

    /// Probability of using the true input at `epoch`.
    #[must_use]
    pub fn reset_probability(&self, epoch: usize) -> f64 {
        if epoch <= self.start_epoch {
            1.0
        } else {
            1.0 / self.average_steps(epoch)
        }
    }

    /// Sampling policy for `epoch` with `nwarmup` warmup steps.
    #[must_use]
    pub fn sampling(&self, epoch: usize, nwarmup: usize) -> ScheduledSampling {
        ScheduledSampling {
            reset_probability: self.reset_probability(epoch),
            nwarmup,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Source whose every uniform draw is zero.
    pub(crate) struct ZeroRng;

    impl RngCore for ZeroRng {
        fn next_u32(&mut self) -> u32 {
            0
        }

        fn next_u64(&mut self) -> u64 {
            0
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            dest.fill(0);
            Ok(())
        }
    }

    /// Counts draws and never falls below any positive probability.
    struct CountingRng {
        draws: usize,
    }

    impl RngCore for CountingRng {
        fn next_u32(&mut self) -> u32 {
            self.draws += 1;
            u32::MAX
        }

        fn next_u64(&mut self) -> u64 {
            self.draws += 1;
            u64::MAX
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(0xff);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
            dest.fill(0xff);
            Ok(())
        }
    }

    #[test]
    fn test_warmup_never_draws() {
        let sampling = ScheduledSampling::new(0.0, 3).unwrap();
        let mut rng = CountingRng { draws: 0 };
        for t in 0..=3 {
            assert!(sampling.use_truth(t, &mut rng));
        }
        assert_eq!(rng.draws, 0);
        assert!(!sampling.use_truth(4, &mut rng));
        assert_eq!(rng.draws, 1);
    }

    #[test]
    fn test_zero_draw_uses_truth_for_positive_probability() {
        let sampling = ScheduledSampling::new(0.5, 0).unwrap();
        assert!(sampling.use_truth(7, &mut ZeroRng));
        let never = ScheduledSampling::new(0.0, 0).unwrap();
        assert!(!never.use_truth(7, &mut ZeroRng));
        assert!(never.use_truth(0, &mut ZeroRng));
    }

    #[test]
    fn test_invalid_probability_rejected() {
        assert!(ScheduledSampling::new(-0.1, 0).is_err());
        assert!(ScheduledSampling::new(f64::NAN, 0).is_err());
        assert!(ScheduledSampling::new(1.5, 0).unwrap().is_teacher_forced());
    }

    #[test]
    fn test_draw_rate_tracks_probability() {
        let sampling = ScheduledSampling::new(0.3, 0).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let hits = (1..=10_000).filter(|&t| sampling.use_truth(t, &mut rng)).count();
        let rate = hits as f64 / 10_000.0;
        assert!((rate - 0.3).abs() < 0.03, "rate {rate}");
    }

    #[test]
    fn test_schedule_starts_teacher_forced() {
        let schedule = AutoregressionSchedule::new(100, 5);
        assert_eq!(schedule.start_epoch(), 50);
        for epoch in 0..=50 {
            assert_eq!(schedule.reset_probability(epoch), 1.0);
        }
    }

    #[test]
    fn test_schedule_reaches_inverse_num_steps() {
        for (n_epochs, k) in [(10, 4), (100, 5), (7, 3)] {
            let schedule = AutoregressionSchedule::new(n_epochs, k);
            let last = schedule.reset_probability(n_epochs - 1);
            assert!((last - 1.0 / k as f64).abs() < 1e-12, "{n_epochs} {k}: {last}");
        }
    }

    #[test]
    fn test_schedule_non_increasing() {
        let schedule = AutoregressionSchedule::new(40, 8);
        let probs: Vec<f64> = (0..40).map(|e| schedule.reset_probability(e)).collect();
        for pair in probs.windows(2) {
            assert!(pair[1] <= pair[0] + 1e-12, "{pair:?}");
        }
        assert!(probs.iter().all(|p| *p > 0.0 && *p <= 1.0));
    }

    #[test]
    fn test_single_step_schedule_stays_teacher_forced() {
        let schedule = AutoregressionSchedule::new(10, 0);
        for epoch in 0..10 {
            assert!((schedule.reset_probability(epoch) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_sampling_for_epoch() {
        let schedule = AutoregressionSchedule::new(10, 2);
        let sampling = schedule.sampling(9, 3);
        assert_eq!(sampling.nwarmup(), 3);
        assert!((sampling.reset_probability() - 0.5).abs() < 1e-12);
    }
}
