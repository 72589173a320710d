//! Deterministic train/validation/test assignment of shots.
//!
//! Shots are split by their last decimal digit: digit 0 is held out for
//! testing, one seeded digit in `1..=9` goes to validation, and the remaining
//! eight digits train.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::PartitionConfig;

/// Which split a shot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Split {
    /// Used for gradient updates.
    Train,
    /// Used for model selection.
    Validation,
    /// Held out.
    Test,
}

/// Shot-digit partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShotPartition {
    /// Last digits routed to validation.
    pub val_indices: Vec<u64>,
    /// Last digits routed to test.
    pub test_indices: Vec<u64>,
    /// First shot (inclusive).
    pub min_shot: u64,
    /// Last shot (exclusive).
    pub max_shot: u64,
}

impl ShotPartition {
    /// Draws the validation digit from a `ChaCha8Rng` seeded with `seed`.
    ///
    /// ```rust
    /// use plasma_rnn_rs::partition::{ShotPartition, Split};
    ///
    /// let a = ShotPartition::from_seed(7, 140_888, 200_000);
    /// let b = ShotPartition::from_seed(7, 140_888, 200_000);
    /// assert_eq!(a, b);
    /// assert_eq!(a.split_of(163_300), Some(Split::Test));
    /// ```
    #[must_use]
    pub fn from_seed(seed: u64, min_shot: u64, max_shot: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self {
            val_indices: vec![rng.gen_range(1..10)],
            test_indices: vec![0],
            min_shot,
            max_shot,
        }
    }

    /// Partition described by a [`PartitionConfig`].
    #[must_use]
    pub fn from_config(config: &PartitionConfig) -> Self {
        Self::from_seed(config.seed, config.min_shot, config.max_shot)
    }

    /// Split for `shot`, or `None` when it lies outside `[min_shot, max_shot)`.
    #[must_use]
    pub fn split_of(&self, shot: u64) -> Option<Split> {
        if shot < self.min_shot || shot >= self.max_shot {
            return None;
        }
        let digit = shot % 10;
        if self.test_indices.contains(&digit) {
            Some(Split::Test)
        } else if self.val_indices.contains(&digit) {
            Some(Split::Validation)
        } else {
            Some(Split::Train)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_partition() {
        for seed in 0..20 {
            let a = ShotPartition::from_seed(seed, 0, 100);
            let b = ShotPartition::from_seed(seed, 0, 100);
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_validation_digit_in_range() {
        for seed in 0..200 {
            let partition = ShotPartition::from_seed(seed, 0, 100);
            assert_eq!(partition.val_indices.len(), 1);
            let digit = partition.val_indices[0];
            assert!((1..=9).contains(&digit), "digit {digit} for seed {seed}");
            assert_eq!(partition.test_indices, vec![0]);
        }
    }

    #[test]
    fn test_splits_are_disjoint_and_cover_range() {
        let partition = ShotPartition::from_seed(3, 140_888, 141_888);
        let val_digit = partition.val_indices[0];
        let mut counts = [0usize; 3];
        for shot in 140_888..141_888 {
            match partition.split_of(shot) {
                Some(Split::Train) => {
                    assert_ne!(shot % 10, 0);
                    assert_ne!(shot % 10, val_digit);
                    counts[0] += 1;
                }
                Some(Split::Validation) => {
                    assert_eq!(shot % 10, val_digit);
                    counts[1] += 1;
                }
                Some(Split::Test) => {
                    assert_eq!(shot % 10, 0);
                    counts[2] += 1;
                }
                None => panic!("shot {shot} inside range was unassigned"),
            }
        }
        assert_eq!(counts.iter().sum::<usize>(), 1000);
        assert_eq!(counts, [800, 100, 100]);
    }

    #[test]
    fn test_out_of_range_shots_unassigned() {
        let partition = ShotPartition::from_seed(0, 140_888, 200_000);
        assert_eq!(partition.split_of(140_887), None);
        assert_eq!(partition.split_of(200_000), None);
        assert!(partition.split_of(140_888).is_some());
    }
}
