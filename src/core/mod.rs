//! Collaborator contracts and error types for a training trial.
//!
//! A trial composes five pluggable pieces:
//! - [`Dataset`] — labeled samples (finite or streaming) and an error metric
//! - [`Network`] — hidden activities, parameters, normalization, Jacobian
//! - [`DecoderLearningRule`] — gradient or direct value for the decoder `D`
//! - [`EncoderLearningRule`] — parameter deltas for the network
//! - [`Optimizer`] — applies deltas to a [`ParamMap`] in place
//!
//! ## Shapes
//!
//! ```text
//! inputs      xs : (N, n_dim_in)
//! targets     ys : (N, n_dim_out)
//! activities  As : (N, n_dim_hidden)
//! decoder     D  : (n_dim_out, n_dim_hidden)
//! prediction     = As · Dᵀ
//! residual       = prediction - ys
//! ```

use ndarray::{Array2, Array3};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::numeric::NumericFault;

/// Named parameter arrays. The trial stores the decoder under [`DECODER_KEY`].
pub type ParamMap = BTreeMap<String, Array2<f64>>;

/// Key of the decoder matrix inside the trial's parameter mapping.
pub const DECODER_KEY: &str = "D";

/// Error type for trial operations.
#[derive(Debug, Clone, Error)]
pub enum TrialError {
    /// Invalid trial arguments, reported before any work is done
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    /// Shape mismatch in matrix operations
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A collaborator was asked for an optional capability it lacks
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    /// Floating point fault raised outside of the epoch loop
    #[error(transparent)]
    Numeric(#[from] NumericFault),
    /// Floating point fault raised during training; traces are marked
    #[error("{0}")]
    Aborted(Box<AbortReport>),
    /// Any other collaborator failure
    #[error("Collaborator error: {0}")]
    Collaborator(String),
}

impl From<ndarray::ShapeError> for TrialError {
    fn from(err: ndarray::ShapeError) -> Self {
        TrialError::ShapeMismatch(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrialError>;

/// Error traces of a trial cut short by a numeric fault.
///
/// Training slots from `epoch` onward and the validation slot at `epoch` are
/// NaN; earlier slots hold the errors recorded before the fault.
#[derive(Debug, Clone)]
pub struct AbortReport {
    pub epoch: usize,
    pub fault: NumericFault,
    pub errs_training: Vec<f64>,
    pub errs_validation: Vec<f64>,
    pub err_test: Option<f64>,
}

impl fmt::Display for AbortReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trial aborted in epoch {}: {}", self.epoch, self.fault)
    }
}

/// Dataset partition to draw samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Training,
    Validation,
    Test,
}

impl Partition {
    pub fn name(&self) -> &'static str {
        match self {
            Partition::Training => "training",
            Partition::Validation => "validation",
            Partition::Test => "test",
        }
    }
}

/// A batch of inputs and matching targets.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    /// Shape (N, n_dim_in)
    pub xs: Array2<f64>,
    /// Shape (N, n_dim_out)
    pub ys: Array2<f64>,
}

impl Samples {
    pub fn new(xs: Array2<f64>, ys: Array2<f64>) -> Result<Self> {
        if xs.nrows() != ys.nrows() {
            return Err(TrialError::ShapeMismatch(format!(
                "{} inputs but {} targets",
                xs.nrows(),
                ys.nrows()
            )));
        }
        Ok(Self { xs, ys })
    }

    pub fn len(&self) -> usize {
        self.xs.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.xs.nrows() == 0
    }
}

/// Source of labeled samples and the error metric used for reporting.
pub trait Dataset {
    /// `false` for streaming datasets, which are resampled every epoch.
    fn is_finite(&self) -> bool;

    fn n_dim_in(&self) -> usize;

    fn n_dim_out(&self) -> usize;

    /// Size of the finite training pool. Ignored for streaming datasets.
    fn n_max_smpls_training(&self) -> usize {
        usize::MAX
    }

    fn n_max_smpls_validation(&self) -> usize {
        usize::MAX
    }

    fn n_max_smpls_test(&self) -> usize {
        usize::MAX
    }

    /// Draw `n` samples from the given partition.
    fn sample(&mut self, n: usize, partition: Partition) -> Result<Samples>;

    /// Scalar error between targets and predictions.
    fn error(&self, ys: &Array2<f64>, ys_hat: &Array2<f64>) -> Result<f64>;
}

/// Parametric map from inputs to hidden activities.
pub trait Network {
    fn n_dim_in(&self) -> usize;

    fn n_dim_hidden(&self) -> usize;

    fn parameters(&self) -> &ParamMap;

    /// Mutable access for the optimizer step.
    ///
    /// During the step the trial temporarily inserts the decoder under
    /// [`DECODER_KEY`]; it is removed again before any other call.
    fn parameters_mut(&mut self) -> &mut ParamMap;

    /// Hidden activities for a batch, shape (N, n_dim_hidden).
    fn activities(&self, xs: &Array2<f64>) -> Result<Array2<f64>>;

    /// Bring parameters back into their canonical range after an update.
    fn normalize_parameters(&mut self) -> Result<()> {
        Ok(())
    }

    /// Per-sample Jacobian of this network's activities with respect to its
    /// input, evaluated at `xs`; shape (N, n_dim_hidden, n_dim_in).
    fn jacobian(&self, _xs: &Array2<f64>) -> Result<Array3<f64>> {
        Err(TrialError::Unsupported(
            "network does not provide a Jacobian".to_string(),
        ))
    }

    /// Gradients of a loss with respect to every parameter, given the
    /// loss gradient `d_activities` with respect to the activities at `xs`.
    ///
    /// Keys match [`parameters`](Self::parameters).
    fn parameter_gradients(
        &self,
        _xs: &Array2<f64>,
        _d_activities: &Array2<f64>,
    ) -> Result<ParamMap> {
        Err(TrialError::Unsupported(
            "network does not provide parameter gradients".to_string(),
        ))
    }

    /// Name for debugging
    fn name(&self) -> &'static str {
        "network"
    }
}

/// Learning rule for the linear decoder `D`.
pub trait DecoderLearningRule {
    /// `true` if [`step`](Self::step) returns a delta for the optimizer,
    /// `false` if it returns the new decoder directly.
    fn returns_gradient(&self) -> bool;

    /// Shape of the output matches `d`.
    fn step(
        &mut self,
        activities: &Array2<f64>,
        ys: &Array2<f64>,
        errs: &Array2<f64>,
        d: &Array2<f64>,
    ) -> Result<Array2<f64>>;

    fn name(&self) -> &'static str {
        "decoder"
    }
}

/// Learning rule for the network's own parameters.
pub trait EncoderLearningRule {
    /// Returns deltas keyed like [`Network::parameters`].
    ///
    /// `jacobian` is the passthrough network's Jacobian at the primary
    /// network's activities, if a passthrough is configured.
    fn step(
        &mut self,
        activities: &Array2<f64>,
        xs: &Array2<f64>,
        errs: &Array2<f64>,
        d: &Array2<f64>,
        jacobian: Option<&Array3<f64>>,
        network: &dyn Network,
    ) -> Result<ParamMap>;

    fn name(&self) -> &'static str {
        "encoder"
    }
}

/// Applies parameter deltas in place.
pub trait Optimizer {
    /// Keys of `deltas` missing from `params` are an error.
    fn step(&mut self, params: &mut ParamMap, deltas: &ParamMap) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_samples_row_mismatch() {
        let xs = array![[1.0, 2.0], [3.0, 4.0]];
        let ys = array![[1.0]];
        assert!(matches!(
            Samples::new(xs, ys),
            Err(TrialError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_samples_len() {
        let s = Samples::new(array![[1.0], [2.0], [3.0]], array![[0.0], [0.0], [0.0]]).unwrap();
        assert_eq!(s.len(), 3);
        assert!(!s.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = TrialError::InvalidConfig("batch_size must be positive".to_string());
        assert!(format!("{err}").contains("Invalid config"));
        assert!(format!("{err}").contains("batch_size"));
    }

    #[test]
    fn test_partition_names() {
        assert_eq!(Partition::Training.name(), "training");
        assert_eq!(Partition::Validation.name(), "validation");
        assert_eq!(Partition::Test.name(), "test");
    }
}
