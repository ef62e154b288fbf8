//! Scripted collaborators shared by the integration tests.

#![allow(dead_code)]

use encoder_bench::numeric::NumericFault;
use encoder_bench::{
    Dataset, DecoderLearningRule, EncoderLearningRule, Network, ParamMap, Partition, Result,
    Samples, TrialError,
};
use ndarray::{Array, Array2, Array3, Axis};
use std::cell::RefCell;
use std::rc::Rc;

/// Finite dataset `y = x0 - 0.5 x1` that logs every `sample` call.
pub struct LoggingDataset {
    pub n_training: usize,
    pub n_validation: usize,
    pub n_test: usize,
    pub finite: bool,
    pub calls: Rc<RefCell<Vec<(Partition, usize)>>>,
    /// Test targets are NaN, so the test error is invalid.
    pub poison_test: bool,
    counter: f64,
}

impl LoggingDataset {
    pub fn finite(n_training: usize, n_validation: usize, n_test: usize) -> Self {
        Self {
            n_training,
            n_validation,
            n_test,
            finite: true,
            calls: Rc::new(RefCell::new(Vec::new())),
            poison_test: false,
            counter: 0.0,
        }
    }

    pub fn streaming() -> Self {
        Self {
            finite: false,
            ..Self::finite(0, 0, 0)
        }
    }

    pub fn count(&self, partition: Partition) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|(p, _)| *p == partition)
            .count()
    }
}

impl Dataset for LoggingDataset {
    fn is_finite(&self) -> bool {
        self.finite
    }

    fn n_dim_in(&self) -> usize {
        2
    }

    fn n_dim_out(&self) -> usize {
        1
    }

    fn n_max_smpls_training(&self) -> usize {
        self.n_training
    }

    fn n_max_smpls_validation(&self) -> usize {
        self.n_validation
    }

    fn n_max_smpls_test(&self) -> usize {
        self.n_test
    }

    fn sample(&mut self, n: usize, partition: Partition) -> Result<Samples> {
        self.calls.borrow_mut().push((partition, n));
        // Each call yields distinct inputs
        self.counter += 1.0;
        let offset = self.counter;
        let xs = Array::from_shape_fn((n, 2), |(i, j)| {
            ((i as f64 + offset) * 0.37 + j as f64 * 0.11).sin()
        });
        let mut ys = (&xs.column(0) - &(0.5 * &xs.column(1))).insert_axis(Axis(1));
        if self.poison_test && partition == Partition::Test {
            ys.fill(f64::NAN);
        }
        Samples::new(xs, ys)
    }

    fn error(&self, ys: &Array2<f64>, ys_hat: &Array2<f64>) -> Result<f64> {
        let diff = ys - ys_hat;
        Ok(diff.mapv(|v| v * v).mean().unwrap_or(f64::NAN).sqrt())
    }
}

/// Linear network `A = xs Wᵀ` with `n_hidden` fixed random-ish encoders.
pub struct LinearNet {
    params: ParamMap,
    pub normalize_calls: usize,
}

impl LinearNet {
    pub fn new(n_in: usize, n_hidden: usize) -> Self {
        let w = Array::from_shape_fn((n_hidden, n_in), |(i, j)| ((i * 3 + j * 7) as f64).cos());
        let mut params = ParamMap::new();
        params.insert("W".to_string(), w);
        Self {
            params,
            normalize_calls: 0,
        }
    }
}

impl Network for LinearNet {
    fn n_dim_in(&self) -> usize {
        self.params["W"].ncols()
    }

    fn n_dim_hidden(&self) -> usize {
        self.params["W"].nrows()
    }

    fn parameters(&self) -> &ParamMap {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    fn activities(&self, xs: &Array2<f64>) -> Result<Array2<f64>> {
        Ok(xs.dot(&self.params["W"].t()))
    }

    fn normalize_parameters(&mut self) -> Result<()> {
        self.normalize_calls += 1;
        Ok(())
    }

    /// Constant Jacobian `W` for every sample.
    fn jacobian(&self, xs: &Array2<f64>) -> Result<Array3<f64>> {
        let w = &self.params["W"];
        let (h, i) = w.dim();
        let mut jac = Array3::zeros((xs.nrows(), h, i));
        for mut jn in jac.outer_iter_mut() {
            jn.assign(w);
        }
        Ok(jac)
    }
}

/// Decoder rule counting its calls; gradient mode returns `errsᵀ A / N`,
/// direct mode returns the rule's own least-squares-free estimate
/// `D + 0.1 * errsᵀ A / N` scaled to stay finite.
pub struct CountingDecoder {
    pub gradient: bool,
    pub calls: usize,
    pub batch_sizes: Vec<usize>,
}

impl CountingDecoder {
    pub fn new(gradient: bool) -> Self {
        Self {
            gradient,
            calls: 0,
            batch_sizes: Vec::new(),
        }
    }
}

impl DecoderLearningRule for CountingDecoder {
    fn returns_gradient(&self) -> bool {
        self.gradient
    }

    fn step(
        &mut self,
        activities: &Array2<f64>,
        _ys: &Array2<f64>,
        errs: &Array2<f64>,
        d: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        self.calls += 1;
        self.batch_sizes.push(activities.nrows());
        let grad = errs.t().dot(activities) / activities.nrows() as f64;
        if self.gradient {
            Ok(grad)
        } else {
            Ok(d - &(0.1 * &grad))
        }
    }
}

/// How [`FaultyEncoder`] misbehaves at the trigger batch.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Return a `NumericFault::Overflow` error.
    Raise,
    /// Return a delta containing an infinity.
    Infinite,
    /// Return a non-numeric collaborator error.
    Fail,
}

/// Encoder rule returning small constant deltas, faulting at one batch.
pub struct FaultyEncoder {
    pub trigger: Option<(usize, usize)>,
    pub fault: Fault,
    pub calls: usize,
    pub n_batches_seen: usize,
    pub jacobian_seen: Vec<bool>,
    epoch: usize,
    batch: usize,
    per_epoch: usize,
}

impl FaultyEncoder {
    /// `per_epoch` is the number of batches the trial forms per epoch.
    pub fn new(trigger: Option<(usize, usize)>, fault: Fault, per_epoch: usize) -> Self {
        Self {
            trigger,
            fault,
            calls: 0,
            n_batches_seen: 0,
            jacobian_seen: Vec::new(),
            epoch: 0,
            batch: 0,
            per_epoch,
        }
    }
}

impl EncoderLearningRule for FaultyEncoder {
    fn step(
        &mut self,
        _activities: &Array2<f64>,
        _xs: &Array2<f64>,
        _errs: &Array2<f64>,
        _d: &Array2<f64>,
        jacobian: Option<&Array3<f64>>,
        network: &dyn Network,
    ) -> Result<ParamMap> {
        let position = (self.epoch, self.batch);
        self.calls += 1;
        self.n_batches_seen += 1;
        self.jacobian_seen.push(jacobian.is_some());
        self.batch += 1;
        if self.batch == self.per_epoch {
            self.batch = 0;
            self.epoch += 1;
        }

        let w = &network.parameters()["W"];
        let mut delta = Array2::from_elem(w.dim(), 1e-3);
        if self.trigger == Some(position) {
            match self.fault {
                Fault::Raise => {
                    return Err(TrialError::Numeric(NumericFault::Overflow(
                        "encoder step".to_string(),
                    )))
                }
                Fault::Infinite => delta[[0, 0]] = f64::MAX * 10.0,
                Fault::Fail => {
                    return Err(TrialError::Collaborator("encoder failed".to_string()))
                }
            }
        }
        let mut deltas = ParamMap::new();
        deltas.insert("W".to_string(), delta);
        Ok(deltas)
    }
}
