//! Finite dataset over fixed sample pools.
//!
//! Each partition owns a pool of samples. `sample(n, ..)` returns `n`
//! distinct samples from the pool in random order; asking for more samples
//! than the pool holds is an error.

use ndarray::{s, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::core::{Dataset, Partition, Result, Samples, TrialError};
use crate::utils::{rmse, select_rows};

/// Finite dataset with fixed training, validation and test pools.
#[derive(Debug, Clone)]
pub struct ArrayDataset {
    training: Samples,
    validation: Samples,
    test: Samples,
    rng: StdRng,
}

impl ArrayDataset {
    /// Build from three pools. All pools must share input/output dimensions.
    pub fn new(training: Samples, validation: Samples, test: Samples, seed: u64) -> Result<Self> {
        for (name, pool) in [("validation", &validation), ("test", &test)] {
            if pool.xs.ncols() != training.xs.ncols() || pool.ys.ncols() != training.ys.ncols() {
                return Err(TrialError::ShapeMismatch(format!(
                    "{name} pool has shape ({}, {}), training has ({}, {})",
                    pool.xs.ncols(),
                    pool.ys.ncols(),
                    training.xs.ncols(),
                    training.ys.ncols()
                )));
            }
        }
        Ok(Self {
            training,
            validation,
            test,
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// Split one pool of samples into training, validation and test parts.
    ///
    /// Rows are taken in order: the first `n_training` for training, the
    /// next `n_validation` for validation, the rest for testing.
    pub fn from_split(
        xs: &Array2<f64>,
        ys: &Array2<f64>,
        n_training: usize,
        n_validation: usize,
        seed: u64,
    ) -> Result<Self> {
        let n = xs.nrows();
        if n_training + n_validation > n {
            return Err(TrialError::InvalidConfig(format!(
                "cannot take {n_training} training and {n_validation} validation samples from {n}"
            )));
        }
        let v = n_training + n_validation;
        let part = |lo: usize, hi: usize| {
            Samples::new(
                xs.slice(s![lo..hi, ..]).to_owned(),
                ys.slice(s![lo..hi, ..]).to_owned(),
            )
        };
        Self::new(part(0, n_training)?, part(n_training, v)?, part(v, n)?, seed)
    }

    fn pool(&self, partition: Partition) -> &Samples {
        match partition {
            Partition::Training => &self.training,
            Partition::Validation => &self.validation,
            Partition::Test => &self.test,
        }
    }
}

impl Dataset for ArrayDataset {
    fn is_finite(&self) -> bool {
        true
    }

    fn n_dim_in(&self) -> usize {
        self.training.xs.ncols()
    }

    fn n_dim_out(&self) -> usize {
        self.training.ys.ncols()
    }

    fn n_max_smpls_training(&self) -> usize {
        self.training.len()
    }

    fn n_max_smpls_validation(&self) -> usize {
        self.validation.len()
    }

    fn n_max_smpls_test(&self) -> usize {
        self.test.len()
    }

    fn sample(&mut self, n: usize, partition: Partition) -> Result<Samples> {
        let cap = self.pool(partition).len();
        if n > cap {
            return Err(TrialError::InvalidConfig(format!(
                "requested {n} {} samples, pool holds {cap}",
                partition.name()
            )));
        }
        let mut idcs: Vec<usize> = (0..cap).collect();
        idcs.shuffle(&mut self.rng);
        idcs.truncate(n);
        let pool = self.pool(partition);
        Samples::new(select_rows(&pool.xs, &idcs), select_rows(&pool.ys, &idcs))
    }

    fn error(&self, ys: &Array2<f64>, ys_hat: &Array2<f64>) -> Result<f64> {
        rmse(ys, ys_hat)
    }
}

/// Number of training and validation samples for the given fractions of `n`.
///
/// The test partition receives the remainder.
pub fn split_fractions(n: usize, training: f64, validation: f64) -> (usize, usize) {
    let n_trn = ((n as f64) * training) as usize;
    let n_val = (((n as f64) * validation) as usize).min(n - n_trn);
    (n_trn, n_val)
}
