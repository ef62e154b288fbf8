//! The trial driver.
//!
//! [`run_single_trial`] owns the decoder `D`, the error traces and the
//! sampled data for one run. Every collaborator is borrowed for the length
//! of the call and nothing is retained afterwards.
//!
//! ## Epoch
//!
//! ```text
//! sample (epoch 0, or every epoch for streaming datasets)
//! for each mini-batch:
//!     As, errs   = eval(batch)
//!     deltas     = decoder gradient, encoder deltas
//!     optimizer.step({D} ∪ network.parameters, deltas)
//!     network.normalize_parameters()
//!     D          = decoder(full epoch)        (direct decoders only)
//!     callback(snapshot)
//! D = decoder(full epoch)                     (no encoder, direct decoder)
//! record training / validation error, progress(...)
//! ```
//!
//! Mini-batches are formed only when something consumes them: an encoder
//! rule, or a decoder rule that returns a gradient.

mod progress;
mod result;
mod sampling;
mod snapshot;

pub use progress::{print_json_progress, print_progress};
pub use result::TrialResult;
pub use sampling::{batch_indices, SampleSet};
pub use snapshot::{eval_net, eval_net_and_errs, BatchSnapshot};

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::{debug, info, trace, warn};

use crate::core::{
    AbortReport, Dataset, DecoderLearningRule, EncoderLearningRule, Network, Optimizer, ParamMap,
    Partition, Result, Samples, TrialError, DECODER_KEY,
};
use crate::numeric::{check_array, check_scalar, ErrPolicy, ErrStateGuard};
use crate::utils::select_rows;
use crate::TrialConfig;

type ProgressFn<'a> = Box<dyn FnMut(usize, usize, f64, f64) + 'a>;
type CallbackFn<'a> = Box<dyn FnMut(&BatchSnapshot<'_>) + 'a>;

/// Everything a trial borrows from its caller.
pub struct Collaborators<'a> {
    pub optimizer: &'a mut dyn Optimizer,
    pub dataset: &'a mut dyn Dataset,
    pub network: &'a mut dyn Network,
    pub decoder_learner: &'a mut dyn DecoderLearningRule,
    pub encoder_learner: Option<&'a mut dyn EncoderLearningRule>,
    /// Applied to the network's activities before decoding.
    pub passthrough: Option<&'a dyn Network>,
    /// Seeds the trial's private generator; not used afterwards.
    pub rng: &'a mut dyn RngCore,
    /// Called once per completed epoch with
    /// `(epoch, n_epochs, err_training, err_validation)`.
    pub progress: Option<ProgressFn<'a>>,
    /// Called once per mini-batch.
    pub callback: Option<CallbackFn<'a>>,
}

impl<'a> Collaborators<'a> {
    /// Required collaborators; progress defaults to [`print_progress`].
    pub fn new(
        optimizer: &'a mut dyn Optimizer,
        dataset: &'a mut dyn Dataset,
        network: &'a mut dyn Network,
        decoder_learner: &'a mut dyn DecoderLearningRule,
        rng: &'a mut dyn RngCore,
    ) -> Self {
        Self {
            optimizer,
            dataset,
            network,
            decoder_learner,
            encoder_learner: None,
            passthrough: None,
            rng,
            progress: Some(Box::new(print_progress)),
            callback: None,
        }
    }

    pub fn with_encoder(mut self, encoder_learner: &'a mut dyn EncoderLearningRule) -> Self {
        self.encoder_learner = Some(encoder_learner);
        self
    }

    pub fn with_passthrough(mut self, passthrough: &'a dyn Network) -> Self {
        self.passthrough = Some(passthrough);
        self
    }

    pub fn with_progress(mut self, progress: impl FnMut(usize, usize, f64, f64) + 'a) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    pub fn without_progress(mut self) -> Self {
        self.progress = None;
        self
    }

    pub fn with_callback(mut self, callback: impl FnMut(&BatchSnapshot<'_>) + 'a) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }
}

/// Sizes derived from the config and the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialPlan {
    pub epoch_size: usize,
    pub batch_size: usize,
    pub n_epochs: usize,
    pub n_smpls_training: usize,
    pub n_smpls_validation: usize,
    pub n_smpls_test: usize,
}

impl TrialPlan {
    /// Validate `config` against `dataset` and derive effective sizes.
    ///
    /// # Errors
    /// - `InvalidConfig` for a zero epoch size, batch size or epoch count,
    ///   or when no whole batch fits into the effective epoch
    pub fn new(config: &TrialConfig, dataset: &dyn Dataset) -> Result<Self> {
        if config.epoch_size == Some(0) {
            return Err(TrialError::InvalidConfig(
                "epoch_size must be positive".to_string(),
            ));
        }
        if config.batch_size == 0 {
            return Err(TrialError::InvalidConfig(
                "batch_size must be positive".to_string(),
            ));
        }
        if config.n_epochs == 0 {
            return Err(TrialError::InvalidConfig(
                "n_epochs must be positive".to_string(),
            ));
        }

        let finite = dataset.is_finite();
        let mut epoch_size = match config.epoch_size {
            Some(n) => n,
            None if finite => dataset.n_max_smpls_training(),
            None => config.n_smpls_per_epoch,
        };
        if finite {
            epoch_size = epoch_size.min(dataset.n_max_smpls_training());
        }

        let batch_size = config.batch_size.min(epoch_size);
        if batch_size == 0 || epoch_size / batch_size == 0 {
            return Err(TrialError::InvalidConfig(format!(
                "epoch of {epoch_size} samples holds no batch of {} samples",
                config.batch_size
            )));
        }

        let cap = |limit: usize| if finite { epoch_size.min(limit) } else { epoch_size };
        Ok(Self {
            epoch_size,
            batch_size,
            n_epochs: config.n_epochs,
            n_smpls_training: cap(dataset.n_max_smpls_training()),
            n_smpls_validation: cap(dataset.n_max_smpls_validation()),
            n_smpls_test: cap(dataset.n_max_smpls_test()),
        })
    }

    pub fn n_batches(&self) -> usize {
        self.epoch_size / self.batch_size
    }
}

/// Where a numeric fault interrupted the trial.
#[derive(Debug, Clone, Copy)]
enum Stage {
    Epoch(usize),
    Test,
}

struct Trial<'a> {
    optimizer: &'a mut dyn Optimizer,
    dataset: &'a mut dyn Dataset,
    network: &'a mut dyn Network,
    decoder_learner: &'a mut dyn DecoderLearningRule,
    encoder_learner: Option<&'a mut dyn EncoderLearningRule>,
    passthrough: Option<&'a dyn Network>,
    progress: Option<ProgressFn<'a>>,
    callback: Option<CallbackFn<'a>>,
    rng: StdRng,
    plan: TrialPlan,
    sequential: bool,
    compute_test_error: bool,
    d: Array2<f64>,
    errs_training: Vec<f64>,
    errs_validation: Vec<f64>,
    stage: Stage,
}

/// Run one training trial.
///
/// # Errors
/// - `InvalidConfig` / `ShapeMismatch` before any training if the
///   arguments are inconsistent
/// - `Aborted` if a floating point fault occurs during training; the
///   report carries the error traces with the unfinished slots set to NaN
/// - any error returned by a collaborator, unchanged
pub fn run_single_trial(config: &TrialConfig, collaborators: Collaborators<'_>) -> Result<TrialResult> {
    let Collaborators {
        optimizer,
        dataset,
        network,
        decoder_learner,
        encoder_learner,
        passthrough,
        rng,
        progress,
        callback,
    } = collaborators;

    let plan = TrialPlan::new(config, &*dataset)?;

    if network.parameters().contains_key(DECODER_KEY) {
        return Err(TrialError::InvalidConfig(format!(
            "network parameter name {DECODER_KEY:?} is reserved for the decoder"
        )));
    }
    if network.n_dim_in() != dataset.n_dim_in() {
        return Err(TrialError::ShapeMismatch(format!(
            "network expects {} inputs, dataset provides {}",
            network.n_dim_in(),
            dataset.n_dim_in()
        )));
    }
    let n_dim_hidden = match passthrough {
        Some(pt) if pt.n_dim_in() != network.n_dim_hidden() => {
            return Err(TrialError::ShapeMismatch(format!(
                "passthrough expects {} inputs, network has {} hidden units",
                pt.n_dim_in(),
                network.n_dim_hidden()
            )));
        }
        Some(pt) => pt.n_dim_hidden(),
        None => network.n_dim_hidden(),
    };

    let rng = StdRng::from_rng(rng).map_err(|e| TrialError::Collaborator(e.to_string()))?;

    let d = Array2::zeros((dataset.n_dim_out(), n_dim_hidden));
    let mut params_initial: ParamMap = network.parameters().clone();
    params_initial.insert(DECODER_KEY.to_string(), d.clone());

    info!(
        n_dim_in = dataset.n_dim_in(),
        n_dim_hidden,
        n_dim_out = dataset.n_dim_out(),
        epoch_size = plan.epoch_size,
        batch_size = plan.batch_size,
        n_epochs = plan.n_epochs,
        finite = dataset.is_finite(),
        network = network.name(),
        decoder = decoder_learner.name(),
        encoder = encoder_learner.as_ref().map(|e| e.name()),
        "starting trial"
    );

    let mut trial = Trial {
        optimizer,
        dataset,
        network,
        decoder_learner,
        encoder_learner,
        passthrough,
        progress,
        callback,
        rng,
        plan,
        sequential: config.sequential,
        compute_test_error: config.compute_test_error,
        d,
        errs_training: vec![f64::NAN; plan.n_epochs],
        errs_validation: vec![f64::NAN; plan.n_epochs],
        stage: Stage::Epoch(0),
    };

    let outcome = {
        let _strict = ErrStateGuard::install(ErrPolicy::strict());
        trial.run()
    };

    match outcome {
        Ok(err_test) => {
            let mut p_final = trial.network.parameters().clone();
            p_final.insert(DECODER_KEY.to_string(), trial.d);
            info!(
                err_training = trial.errs_training.last().copied(),
                err_validation = trial.errs_validation.last().copied(),
                err_test,
                "trial finished"
            );
            Ok(TrialResult::new(
                trial.errs_training,
                trial.errs_validation,
                err_test,
                params_initial,
                p_final,
            ))
        }
        Err(TrialError::Numeric(fault)) => {
            let mut errs_training = trial.errs_training;
            let mut errs_validation = trial.errs_validation;
            let epoch = match trial.stage {
                Stage::Epoch(i_epoch) => {
                    errs_training[i_epoch..].fill(f64::NAN);
                    errs_validation[i_epoch] = f64::NAN;
                    i_epoch
                }
                Stage::Test => plan.n_epochs,
            };
            let err_test = config.compute_test_error.then_some(f64::NAN);
            warn!(epoch, %fault, "numeric fault, aborting trial");
            Err(TrialError::Aborted(Box::new(AbortReport {
                epoch,
                fault,
                errs_training,
                errs_validation,
                err_test,
            })))
        }
        Err(err) => Err(err),
    }
}

impl<'a> Trial<'a> {
    /// Epoch loop plus the optional test error.
    fn run(&mut self) -> Result<Option<f64>> {
        let mut samples = SampleSet::default();
        for i_epoch in 0..self.plan.n_epochs {
            self.stage = Stage::Epoch(i_epoch);
            let first_epoch = i_epoch == 0;
            if first_epoch || !self.dataset.is_finite() {
                let fresh = self.sample(first_epoch, first_epoch && self.compute_test_error)?;
                samples.merge(fresh);
            }
            let training = samples.require(Partition::Training)?;
            let validation = samples.require(Partition::Validation)?;
            self.run_epoch(i_epoch, training, validation)?;
        }

        if !self.compute_test_error {
            return Ok(None);
        }
        self.stage = Stage::Test;
        let test = samples.require(Partition::Test)?;
        let (_, ys_hat) = self.eval_net(&test.xs)?;
        let err = self.dataset.error(&test.ys, &ys_hat)?;
        Ok(Some(check_scalar(err, "test error")?))
    }

    fn sample(&mut self, validation: bool, test: bool) -> Result<SampleSet> {
        let plan = self.plan;
        let draw = |dataset: &mut dyn Dataset, n: usize, partition: Partition| -> Result<Samples> {
            let s = dataset.sample(n, partition)?;
            if s.xs.ncols() != dataset.n_dim_in() || s.ys.ncols() != dataset.n_dim_out() {
                return Err(TrialError::ShapeMismatch(format!(
                    "{} samples have shape {:?} -> {:?}",
                    partition.name(),
                    s.xs.dim(),
                    s.ys.dim()
                )));
            }
            Ok(s)
        };

        let mut set = SampleSet {
            training: Some(draw(&mut *self.dataset, plan.n_smpls_training, Partition::Training)?),
            ..SampleSet::default()
        };
        if validation {
            set.validation = Some(draw(
                &mut *self.dataset,
                plan.n_smpls_validation,
                Partition::Validation,
            )?);
        }
        if test {
            set.test = Some(draw(&mut *self.dataset, plan.n_smpls_test, Partition::Test)?);
        }
        Ok(set)
    }

    fn run_epoch(&mut self, i_epoch: usize, trn: &Samples, val: &Samples) -> Result<()> {
        let batched = self.encoder_learner.is_some() || self.decoder_learner.returns_gradient();
        let batches = if batched {
            batch_indices(
                self.plan.epoch_size.min(trn.len()),
                self.plan.batch_size,
                self.sequential,
                &mut self.rng,
            )
        } else {
            Vec::new()
        };

        let n_batches = batches.len();
        for (i_batch, idcs) in batches.iter().enumerate() {
            self.run_batch(i_epoch, i_batch, n_batches, idcs, trn)?;
        }

        if self.encoder_learner.is_none() && !self.decoder_learner.returns_gradient() {
            self.fit_decoder(trn)?;
        }

        let (_, ys_trn_hat) = self.eval_net(&trn.xs)?;
        let (_, ys_val_hat) = self.eval_net(&val.xs)?;
        let err_trn = check_scalar(self.dataset.error(&trn.ys, &ys_trn_hat)?, "training error")?;
        let err_val = check_scalar(self.dataset.error(&val.ys, &ys_val_hat)?, "validation error")?;
        self.errs_training[i_epoch] = err_trn;
        self.errs_validation[i_epoch] = err_val;
        debug!(epoch = i_epoch + 1, n_batches, err_trn, err_val, "epoch done");

        if let Some(progress) = self.progress.as_mut() {
            progress(i_epoch + 1, self.plan.n_epochs, err_trn, err_val);
        }
        Ok(())
    }

    fn run_batch(
        &mut self,
        i_epoch: usize,
        i_batch: usize,
        n_batches: usize,
        idcs: &[usize],
        trn: &Samples,
    ) -> Result<()> {
        let xs_batch = select_rows(&trn.xs, idcs);
        let ys_batch = select_rows(&trn.ys, idcs);

        let (acts, errs) = self.eval_net_and_errs(&xs_batch, &ys_batch)?;

        let mut deltas = ParamMap::new();
        if self.decoder_learner.returns_gradient() {
            let delta = self.decoder_learner.step(&acts, &ys_batch, &errs, &self.d)?;
            check_array(&delta, "decoder delta")?;
            deltas.insert(DECODER_KEY.to_string(), delta);
        }

        let jacobian = match self.passthrough {
            Some(pt) => {
                let jac = pt.jacobian(&self.network.activities(&xs_batch)?)?;
                check_array(&jac, "passthrough jacobian")?;
                Some(jac)
            }
            None => None,
        };

        if let Some(encoder) = self.encoder_learner.as_mut() {
            let encoder_deltas = encoder.step(
                &acts,
                &xs_batch,
                &errs,
                &self.d,
                jacobian.as_ref(),
                &*self.network,
            )?;
            for (key, delta) in encoder_deltas {
                check_array(&delta, "encoder delta")?;
                deltas.insert(key, delta);
            }
        }

        self.apply_deltas(&deltas)?;
        self.network.normalize_parameters()?;
        for values in self.network.parameters().values() {
            check_array(values, "network parameters")?;
        }

        // Keep the decoder matched to the encoders the callback sees
        if !self.decoder_learner.returns_gradient() {
            self.fit_decoder(trn)?;
        }

        trace!(epoch = i_epoch + 1, batch = i_batch + 1, n_batches, "batch done");

        if let Some(callback) = self.callback.as_mut() {
            callback(&BatchSnapshot {
                i_epoch,
                i_batch,
                n_epochs: self.plan.n_epochs,
                n_batches,
                xs_trn_batch: &xs_batch,
                ys_trn_batch: &ys_batch,
                xs_trn: &trn.xs,
                ys_trn: &trn.ys,
                d: &self.d,
                network: &*self.network,
                passthrough: self.passthrough,
            });
        }
        Ok(())
    }

    /// Run the optimizer over `{D} ∪ network.parameters`.
    fn apply_deltas(&mut self, deltas: &ParamMap) -> Result<()> {
        let params = self.network.parameters_mut();
        params.insert(DECODER_KEY.to_string(), std::mem::take(&mut self.d));
        let stepped = self.optimizer.step(params, deltas);
        self.d = params.remove(DECODER_KEY).ok_or_else(|| {
            TrialError::Collaborator("optimizer removed the decoder".to_string())
        })?;
        stepped?;
        check_array(&self.d, "decoder")?;
        Ok(())
    }

    /// Replace `D` by the direct decoder rule's solution over `trn`.
    fn fit_decoder(&mut self, trn: &Samples) -> Result<()> {
        let (acts, errs) = self.eval_net_and_errs(&trn.xs, &trn.ys)?;
        let d = self.decoder_learner.step(&acts, &trn.ys, &errs, &self.d)?;
        if d.dim() != self.d.dim() {
            return Err(TrialError::ShapeMismatch(format!(
                "decoder rule returned {:?}, expected {:?}",
                d.dim(),
                self.d.dim()
            )));
        }
        check_array(&d, "decoder")?;
        self.d = d;
        Ok(())
    }

    fn eval_net(&self, xs: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        eval_net(&*self.network, self.passthrough, xs, &self.d)
    }

    fn eval_net_and_errs(
        &self,
        xs: &Array2<f64>,
        ys: &Array2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        eval_net_and_errs(&*self.network, self.passthrough, xs, ys, &self.d)
    }
}
