//! Reference learning rules.
//!
//! - [`DeltaRule`] — gradient of the mean squared residual w.r.t. `D`
//! - [`LstsqDecoder`] — closed-form ridge regression for `D`
//! - [`BackpropEncoder`] — backpropagates the residual into the network,
//!   through the passthrough Jacobian when one is given

use ndarray::{Array2, Array3};

use crate::core::{DecoderLearningRule, EncoderLearningRule, Network, ParamMap, Result, TrialError};
use crate::utils::cholesky_solve;

/// Decoder gradient `errsᵀ As / N`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaRule;

impl DecoderLearningRule for DeltaRule {
    fn returns_gradient(&self) -> bool {
        true
    }

    fn step(
        &mut self,
        activities: &Array2<f64>,
        _ys: &Array2<f64>,
        errs: &Array2<f64>,
        d: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        let n = activities.nrows().max(1) as f64;
        let grad = errs.t().dot(activities) / n;
        if grad.dim() != d.dim() {
            return Err(TrialError::ShapeMismatch(format!(
                "decoder gradient {:?} vs decoder {:?}",
                grad.dim(),
                d.dim()
            )));
        }
        Ok(grad)
    }

    fn name(&self) -> &'static str {
        "delta"
    }
}

/// Regularized least squares decoder.
///
/// Solves `(AᵀA + N σ² I) Dᵀ = Aᵀ Y` over the activities it is given.
#[derive(Debug, Clone, Copy)]
pub struct LstsqDecoder {
    /// Regularization relative to the maximum activity, squared.
    pub sigma: f64,
}

impl Default for LstsqDecoder {
    fn default() -> Self {
        Self { sigma: 0.1 }
    }
}

impl DecoderLearningRule for LstsqDecoder {
    fn returns_gradient(&self) -> bool {
        false
    }

    fn step(
        &mut self,
        activities: &Array2<f64>,
        ys: &Array2<f64>,
        _errs: &Array2<f64>,
        d: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        let (n, n_hidden) = activities.dim();
        if d.dim() != (ys.ncols(), n_hidden) {
            return Err(TrialError::ShapeMismatch(format!(
                "decoder {:?} for {} hidden units and {} outputs",
                d.dim(),
                n_hidden,
                ys.ncols()
            )));
        }
        let a_max = activities.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let reg = (n as f64) * (self.sigma * a_max.max(1.0)).powi(2);
        let mut gram = activities.t().dot(activities);
        gram.diag_mut().mapv_inplace(|v| v + reg);
        let rhs = activities.t().dot(ys);
        Ok(cholesky_solve(&gram, &rhs)?.reversed_axes())
    }

    fn name(&self) -> &'static str {
        "lstsq"
    }
}

/// Gradient descent on the network parameters via backpropagation.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackpropEncoder;

/// `out[n, :] = g[n, :] · J[n]` for `g` (N, k) and `J` (N, k, m).
fn apply_jacobian(g: &Array2<f64>, jacobian: &Array3<f64>) -> Result<Array2<f64>> {
    let (n, k, m) = jacobian.dim();
    if g.dim() != (n, k) {
        return Err(TrialError::ShapeMismatch(format!(
            "gradient {:?} vs Jacobian {:?}",
            g.dim(),
            jacobian.dim()
        )));
    }
    let mut out = Array2::zeros((n, m));
    for ((mut row, gn), jn) in out
        .outer_iter_mut()
        .zip(g.outer_iter())
        .zip(jacobian.outer_iter())
    {
        row.assign(&gn.dot(&jn));
    }
    Ok(out)
}

impl EncoderLearningRule for BackpropEncoder {
    fn step(
        &mut self,
        _activities: &Array2<f64>,
        xs: &Array2<f64>,
        errs: &Array2<f64>,
        d: &Array2<f64>,
        jacobian: Option<&Array3<f64>>,
        network: &dyn Network,
    ) -> Result<ParamMap> {
        // dL/dA for L = ½ mean ||A Dᵀ - Y||²
        let d_out = errs.dot(d);
        let d_hidden = match jacobian {
            Some(jac) => apply_jacobian(&d_out, jac)?,
            None => d_out,
        };
        network.parameter_gradients(xs, &d_hidden)
    }

    fn name(&self) -> &'static str {
        "backprop"
    }
}
