//! Model evaluation helpers and the per-batch callback snapshot.

use ndarray::Array2;

use crate::core::{Network, Result, TrialError};
use crate::numeric::check_array;

/// Activities (through the passthrough, if any) and predictions `As · Dᵀ`.
pub fn eval_net(
    network: &dyn Network,
    passthrough: Option<&dyn Network>,
    xs: &Array2<f64>,
    d: &Array2<f64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let mut acts = network.activities(xs)?;
    if let Some(pt) = passthrough {
        acts = pt.activities(&acts)?;
    }
    check_array(&acts, "activities")?;
    if acts.ncols() != d.ncols() {
        return Err(TrialError::ShapeMismatch(format!(
            "activities have {} columns, decoder {:?}",
            acts.ncols(),
            d.dim()
        )));
    }
    let ys_hat = acts.dot(&d.t());
    check_array(&ys_hat, "prediction")?;
    Ok((acts, ys_hat))
}

/// Activities and the residual `prediction - ys`.
pub fn eval_net_and_errs(
    network: &dyn Network,
    passthrough: Option<&dyn Network>,
    xs: &Array2<f64>,
    ys: &Array2<f64>,
    d: &Array2<f64>,
) -> Result<(Array2<f64>, Array2<f64>)> {
    let (acts, ys_hat) = eval_net(network, passthrough, xs, d)?;
    if ys_hat.dim() != ys.dim() {
        return Err(TrialError::ShapeMismatch(format!(
            "prediction {:?} vs targets {:?}",
            ys_hat.dim(),
            ys.dim()
        )));
    }
    Ok((acts, ys_hat - ys))
}

/// State handed to the batch callback after each mini-batch update.
///
/// Everything is borrowed from the running trial; `d` already reflects this
/// batch's update.
pub struct BatchSnapshot<'a> {
    pub i_epoch: usize,
    pub i_batch: usize,
    pub n_epochs: usize,
    pub n_batches: usize,
    pub xs_trn_batch: &'a Array2<f64>,
    pub ys_trn_batch: &'a Array2<f64>,
    pub xs_trn: &'a Array2<f64>,
    pub ys_trn: &'a Array2<f64>,
    pub d: &'a Array2<f64>,
    pub network: &'a dyn Network,
    pub passthrough: Option<&'a dyn Network>,
}

impl<'a> BatchSnapshot<'a> {
    /// [`eval_net`] with this trial's networks.
    pub fn eval_net(&self, xs: &Array2<f64>, d: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        eval_net(self.network, self.passthrough, xs, d)
    }

    /// [`eval_net_and_errs`] with this trial's networks.
    pub fn eval_net_and_errs(
        &self,
        xs: &Array2<f64>,
        ys: &Array2<f64>,
        d: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        eval_net_and_errs(self.network, self.passthrough, xs, ys, d)
    }
}

impl std::fmt::Debug for BatchSnapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchSnapshot")
            .field("i_epoch", &self.i_epoch)
            .field("i_batch", &self.i_batch)
            .field("n_epochs", &self.n_epochs)
            .field("n_batches", &self.n_batches)
            .field("batch", &self.xs_trn_batch.nrows())
            .field("network", &self.network.name())
            .finish_non_exhaustive()
    }
}
