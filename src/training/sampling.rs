//! Sample bookkeeping and mini-batch index generation.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::core::{Partition, Result, Samples, TrialError};

/// Samples drawn for the three partitions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    pub training: Option<Samples>,
    pub validation: Option<Samples>,
    pub test: Option<Samples>,
}

impl SampleSet {
    /// Take every partition present in `fresh`; absent ones keep their
    /// previous samples.
    pub fn merge(&mut self, fresh: SampleSet) {
        if let Some(s) = fresh.training {
            self.training = Some(s);
        }
        if let Some(s) = fresh.validation {
            self.validation = Some(s);
        }
        if let Some(s) = fresh.test {
            self.test = Some(s);
        }
    }

    pub fn get(&self, partition: Partition) -> Option<&Samples> {
        match partition {
            Partition::Training => self.training.as_ref(),
            Partition::Validation => self.validation.as_ref(),
            Partition::Test => self.test.as_ref(),
        }
    }

    pub fn require(&self, partition: Partition) -> Result<&Samples> {
        self.get(partition).ok_or_else(|| {
            TrialError::Collaborator(format!("no {} samples drawn", partition.name()))
        })
    }
}

/// Split `0..n_batches * batch_size` into `n_batches` equal chunks, where
/// `n_batches = epoch_size / batch_size`.
///
/// Indices are shuffled unless `sequential` is set; time series keep their
/// order.
pub fn batch_indices<R: Rng + ?Sized>(
    epoch_size: usize,
    batch_size: usize,
    sequential: bool,
    rng: &mut R,
) -> Vec<Vec<usize>> {
    if batch_size == 0 {
        return Vec::new();
    }
    let n_batches = epoch_size / batch_size;
    let mut idcs: Vec<usize> = (0..n_batches * batch_size).collect();
    if !sequential {
        idcs.shuffle(rng);
    }
    idcs.chunks(batch_size).map(<[usize]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn samples(v: f64) -> Samples {
        Samples::new(array![[v]], array![[v]]).unwrap()
    }

    #[test]
    fn test_merge_keeps_existing_partitions() {
        let mut set = SampleSet {
            training: Some(samples(1.0)),
            validation: Some(samples(2.0)),
            test: Some(samples(3.0)),
        };
        set.merge(SampleSet {
            training: Some(samples(4.0)),
            ..SampleSet::default()
        });
        assert_eq!(set.training, Some(samples(4.0)));
        assert_eq!(set.validation, Some(samples(2.0)));
        assert_eq!(set.test, Some(samples(3.0)));
    }

    #[test]
    fn test_require_missing_partition() {
        let set = SampleSet::default();
        assert!(set.require(Partition::Test).is_err());
    }

    #[test]
    fn test_batch_indices_sequential() {
        let mut rng = StdRng::seed_from_u64(0);
        let batches = batch_indices(7, 3, true, &mut rng);
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn test_batch_indices_shuffled_is_permutation() {
        let mut rng = StdRng::seed_from_u64(1);
        let batches = batch_indices(20, 5, false, &mut rng);
        assert_eq!(batches.len(), 4);
        assert!(batches.iter().all(|b| b.len() == 5));
        let mut all: Vec<usize> = batches.concat();
        all.sort_unstable();
        assert_eq!(all, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_single_batch_when_batch_covers_epoch() {
        let mut rng = StdRng::seed_from_u64(2);
        assert_eq!(batch_indices(10, 10, false, &mut rng).len(), 1);
    }
}
