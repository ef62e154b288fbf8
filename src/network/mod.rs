//! Reference single-layer rate network.
//!
//! ## Model
//!
//! ```text
//! z = gain ⊙ (x Wᵀ) + bias
//! a = f(z)
//! ```
//!
//! with encoders `W` of shape (n_dim_hidden, n_dim_in) and row vectors
//! `gain`, `bias` of shape (1, n_dim_hidden). After every update the
//! encoder rows are renormalized to unit length, so the gains carry the
//! scale.

mod activation;

pub use activation::{Activation, IdentityActivation, TanhActivation};

use ndarray::{Array2, Array3, Axis};
use ndarray_rand::rand_distr::StandardNormal;
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::Rng;

use crate::core::{Network, ParamMap, Result, TrialError};

/// Parameter keys of [`RateNetwork`].
pub const ENCODERS: &str = "W";
pub const GAINS: &str = "gain";
pub const BIASES: &str = "bias";

/// Single hidden layer with unit-norm encoders.
pub struct RateNetwork {
    n_dim_in: usize,
    n_dim_hidden: usize,
    params: ParamMap,
    activation: Box<dyn Activation>,
}

impl std::fmt::Debug for RateNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateNetwork")
            .field("n_dim_in", &self.n_dim_in)
            .field("n_dim_hidden", &self.n_dim_hidden)
            .field("params", &format!("<{} parameter arrays>", self.params.len()))
            .field(
                "activation",
                &format!("<{} activation>", self.activation.name()),
            )
            .finish()
    }
}

impl RateNetwork {
    /// Random unit-norm encoders, gains in [0.5, 2.0), biases in [-1, 1).
    ///
    /// # Errors
    /// - `InvalidConfig` if either dimension is zero
    pub fn new<R: Rng + ?Sized>(
        n_dim_in: usize,
        n_dim_hidden: usize,
        activation: Box<dyn Activation>,
        rng: &mut R,
    ) -> Result<Self> {
        if n_dim_in == 0 || n_dim_hidden == 0 {
            return Err(TrialError::InvalidConfig(
                "network dimensions must be positive".to_string(),
            ));
        }
        let w = Array2::random_using((n_dim_hidden, n_dim_in), StandardNormal, rng);
        let gain = Array2::random_using((1, n_dim_hidden), Uniform::new(0.5, 2.0), rng);
        let bias = Array2::random_using((1, n_dim_hidden), Uniform::new(-1.0, 1.0), rng);
        Self::from_parts(w, gain, bias, activation)
    }

    /// Build from explicit parameters; encoders are normalized.
    pub fn from_parts(
        w: Array2<f64>,
        gain: Array2<f64>,
        bias: Array2<f64>,
        activation: Box<dyn Activation>,
    ) -> Result<Self> {
        let (n_dim_hidden, n_dim_in) = w.dim();
        if gain.dim() != (1, n_dim_hidden) || bias.dim() != (1, n_dim_hidden) {
            return Err(TrialError::ShapeMismatch(format!(
                "gain {:?} / bias {:?} do not match {n_dim_hidden} hidden units",
                gain.dim(),
                bias.dim()
            )));
        }
        let mut params = ParamMap::new();
        params.insert(ENCODERS.to_string(), w);
        params.insert(GAINS.to_string(), gain);
        params.insert(BIASES.to_string(), bias);
        let mut net = Self {
            n_dim_in,
            n_dim_hidden,
            params,
            activation,
        };
        net.normalize_parameters()?;
        Ok(net)
    }

    fn param(&self, key: &str) -> Result<&Array2<f64>> {
        self.params
            .get(key)
            .ok_or_else(|| TrialError::Collaborator(format!("missing network parameter {key}")))
    }

    /// Pre-activations `z`, shape (N, n_dim_hidden).
    fn currents(&self, xs: &Array2<f64>) -> Result<Array2<f64>> {
        if xs.ncols() != self.n_dim_in {
            return Err(TrialError::ShapeMismatch(format!(
                "expected {} input dimensions, got {}",
                self.n_dim_in,
                xs.ncols()
            )));
        }
        let w = self.param(ENCODERS)?;
        let z = xs.dot(&w.t()) * self.param(GAINS)? + self.param(BIASES)?;
        Ok(z)
    }
}

impl Network for RateNetwork {
    fn n_dim_in(&self) -> usize {
        self.n_dim_in
    }

    fn n_dim_hidden(&self) -> usize {
        self.n_dim_hidden
    }

    fn parameters(&self) -> &ParamMap {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut ParamMap {
        &mut self.params
    }

    fn activities(&self, xs: &Array2<f64>) -> Result<Array2<f64>> {
        let z = self.currents(xs)?;
        Ok(self.activation.apply_matrix(&z))
    }

    fn normalize_parameters(&mut self) -> Result<()> {
        let w = self
            .params
            .get_mut(ENCODERS)
            .ok_or_else(|| TrialError::Collaborator("missing encoders".to_string()))?;
        for mut row in w.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }
        Ok(())
    }

    /// `J[n, i, j] = f'(z[n, i]) · gain[i] · W[i, j]`
    fn jacobian(&self, xs: &Array2<f64>) -> Result<Array3<f64>> {
        let z = self.currents(xs)?;
        let df = self.activation.derivative_matrix(&z) * self.param(GAINS)?;
        let w = self.param(ENCODERS)?;
        let n = xs.nrows();
        let mut jac = Array3::zeros((n, self.n_dim_hidden, self.n_dim_in));
        for (mut jn, dfn) in jac.outer_iter_mut().zip(df.outer_iter()) {
            jn.assign(&(w * &dfn.insert_axis(Axis(1))));
        }
        Ok(jac)
    }

    /// Batch-averaged gradients of the loss with respect to `W`, `gain` and
    /// `bias`, given `dL/da` of shape (N, n_dim_hidden).
    fn parameter_gradients(&self, xs: &Array2<f64>, d_activities: &Array2<f64>) -> Result<ParamMap> {
        let z = self.currents(xs)?;
        if d_activities.dim() != z.dim() {
            return Err(TrialError::ShapeMismatch(format!(
                "activity gradient {:?} vs activities {:?}",
                d_activities.dim(),
                z.dim()
            )));
        }
        let n = xs.nrows().max(1) as f64;
        // dL/dz
        let dz = d_activities * &self.activation.derivative_matrix(&z);
        let gain = self.param(GAINS)?;
        let w = self.param(ENCODERS)?;
        let proj = xs.dot(&w.t());

        let mut grads = ParamMap::new();
        grads.insert(
            ENCODERS.to_string(),
            (&dz * gain).t().dot(xs) / n,
        );
        grads.insert(
            GAINS.to_string(),
            (&dz * &proj).sum_axis(Axis(0)).insert_axis(Axis(0)) / n,
        );
        grads.insert(
            BIASES.to_string(),
            dz.sum_axis(Axis(0)).insert_axis(Axis(0)) / n,
        );
        Ok(grads)
    }

    fn name(&self) -> &'static str {
        "rate"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn net(n_in: usize, n_hidden: usize) -> RateNetwork {
        let mut rng = StdRng::seed_from_u64(3);
        RateNetwork::new(n_in, n_hidden, Box::new(TanhActivation), &mut rng).unwrap()
    }

    #[test]
    fn test_network_init() {
        let net = net(2, 5);
        assert_eq!(net.n_dim_in(), 2);
        assert_eq!(net.n_dim_hidden(), 5);
        assert_eq!(net.parameters()[ENCODERS].dim(), (5, 2));
        assert_eq!(net.parameters()[GAINS].dim(), (1, 5));
        assert_eq!(net.parameters()[BIASES].dim(), (1, 5));
    }

    #[test]
    fn test_invalid_dims() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(RateNetwork::new(0, 3, Box::new(TanhActivation), &mut rng).is_err());
    }

    #[test]
    fn test_encoders_unit_norm() {
        let mut net = net(3, 4);
        net.parameters_mut().get_mut(ENCODERS).unwrap().mapv_inplace(|v| v * 7.0);
        net.normalize_parameters().unwrap();
        for row in net.parameters()[ENCODERS].rows() {
            assert_abs_diff_eq!(row.dot(&row), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_activities_identity() {
        let net = RateNetwork::from_parts(
            array![[1.0, 0.0], [0.0, 2.0]],
            array![[2.0, 1.0]],
            array![[0.5, -0.5]],
            Box::new(IdentityActivation),
        )
        .unwrap();
        let a = net.activities(&array![[1.0, 3.0]]).unwrap();
        // Second encoder is normalized to [0, 1]
        assert_eq!(a, array![[2.5, 2.5]]);
    }

    #[test]
    fn test_activities_input_mismatch() {
        let net = net(2, 3);
        assert!(net.activities(&array![[1.0, 2.0, 3.0]]).is_err());
    }

    #[test]
    fn test_jacobian_matches_finite_differences() {
        let net = net(2, 3);
        let x = array![[0.3, -0.2]];
        let jac = net.jacobian(&x).unwrap();
        assert_eq!(jac.dim(), (1, 3, 2));
        let h = 1e-6;
        for j in 0..2 {
            let mut xp = x.clone();
            xp[[0, j]] += h;
            let mut xm = x.clone();
            xm[[0, j]] -= h;
            let diff = (net.activities(&xp).unwrap() - net.activities(&xm).unwrap()) / (2.0 * h);
            for i in 0..3 {
                assert_abs_diff_eq!(jac[[0, i, j]], diff[[0, i]], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_bias_gradient_is_mean_dz() {
        let net = RateNetwork::from_parts(
            array![[1.0, 0.0]],
            array![[1.0]],
            array![[0.0]],
            Box::new(IdentityActivation),
        )
        .unwrap();
        let xs = array![[1.0, 0.0], [3.0, 0.0]];
        let grads = net
            .parameter_gradients(&xs, &array![[1.0], [3.0]])
            .unwrap();
        assert_abs_diff_eq!(grads[BIASES][[0, 0]], 2.0, epsilon = 1e-12);
        // gain gradient: mean(dz * proj) = (1*1 + 3*3) / 2
        assert_abs_diff_eq!(grads[GAINS][[0, 0]], 5.0, epsilon = 1e-12);
        assert_eq!(grads[ENCODERS].dim(), (1, 2));
    }
}
