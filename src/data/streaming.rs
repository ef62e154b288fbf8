//! Streaming dataset built from closures.

use ndarray::Array2;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::core::{Dataset, Partition, Result, Samples, TrialError};
use crate::utils::rmse;

type InputFn = Box<dyn FnMut(&mut StdRng, usize) -> Array2<f64> + Send>;
type TargetFn = Box<dyn Fn(&Array2<f64>) -> Array2<f64> + Send>;

/// Infinite dataset: every call to `sample` draws fresh inputs.
///
/// All partitions share the generator, so validation and test samples are
/// independent draws from the same distribution as the training samples.
pub struct FnDataset {
    n_dim_in: usize,
    n_dim_out: usize,
    inputs: InputFn,
    targets: TargetFn,
    rng: StdRng,
}

impl std::fmt::Debug for FnDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnDataset")
            .field("n_dim_in", &self.n_dim_in)
            .field("n_dim_out", &self.n_dim_out)
            .finish_non_exhaustive()
    }
}

impl FnDataset {
    pub fn new(
        n_dim_in: usize,
        n_dim_out: usize,
        inputs: impl FnMut(&mut StdRng, usize) -> Array2<f64> + Send + 'static,
        targets: impl Fn(&Array2<f64>) -> Array2<f64> + Send + 'static,
        seed: u64,
    ) -> Self {
        Self {
            n_dim_in,
            n_dim_out,
            inputs: Box::new(inputs),
            targets: Box::new(targets),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Inputs uniform in [-1, 1]^n_dim_in.
    pub fn uniform(
        n_dim_in: usize,
        n_dim_out: usize,
        targets: impl Fn(&Array2<f64>) -> Array2<f64> + Send + 'static,
        seed: u64,
    ) -> Self {
        Self::new(
            n_dim_in,
            n_dim_out,
            move |rng, n| Array2::random_using((n, n_dim_in), Uniform::new(-1.0, 1.0), rng),
            targets,
            seed,
        )
    }
}

impl Dataset for FnDataset {
    fn is_finite(&self) -> bool {
        false
    }

    fn n_dim_in(&self) -> usize {
        self.n_dim_in
    }

    fn n_dim_out(&self) -> usize {
        self.n_dim_out
    }

    fn sample(&mut self, n: usize, partition: Partition) -> Result<Samples> {
        let xs = (self.inputs)(&mut self.rng, n);
        let ys = (self.targets)(&xs);
        if xs.dim() != (n, self.n_dim_in) || ys.dim() != (n, self.n_dim_out) {
            return Err(TrialError::ShapeMismatch(format!(
                "{} generator produced {:?} -> {:?}",
                partition.name(),
                xs.dim(),
                ys.dim()
            )));
        }
        Samples::new(xs, ys)
    }

    fn error(&self, ys: &Array2<f64>, ys_hat: &Array2<f64>) -> Result<f64> {
        rmse(ys, ys_hat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum_target(xs: &Array2<f64>) -> Array2<f64> {
        xs.sum_axis(ndarray::Axis(1)).insert_axis(ndarray::Axis(1))
    }

    #[test]
    fn test_uniform_shapes_and_range() {
        let mut ds = FnDataset::uniform(3, 1, sum_target, 1);
        assert!(!ds.is_finite());
        let s = ds.sample(50, Partition::Training).unwrap();
        assert_eq!(s.xs.dim(), (50, 3));
        assert_eq!(s.ys.dim(), (50, 1));
        assert!(s.xs.iter().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_fresh_draws() {
        let mut ds = FnDataset::uniform(2, 1, sum_target, 1);
        let a = ds.sample(5, Partition::Training).unwrap();
        let b = ds.sample(5, Partition::Training).unwrap();
        assert_ne!(a.xs, b.xs);
    }

    #[test]
    fn test_generator_shape_checked() {
        let mut ds = FnDataset::new(2, 1, |_, n| Array2::zeros((n, 3)), sum_target, 0);
        assert!(ds.sample(4, Partition::Test).is_err());
    }
}
