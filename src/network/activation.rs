//! Elementwise nonlinearities.

use ndarray::Array2;

/// Activation function trait for layer nonlinearities.
///
/// Implementations provide both the activation and its derivative for gradient-based updates.
pub trait Activation: Send + Sync {
    /// Apply activation to a matrix (elementwise): f(X)
    fn apply_matrix(&self, x: &Array2<f64>) -> Array2<f64>;

    /// Derivative of activation applied to matrix (elementwise): f'(X)
    fn derivative_matrix(&self, x: &Array2<f64>) -> Array2<f64>;

    /// Name for debugging
    fn name(&self) -> &'static str;
}

/// Identity activation: f(x) = x, f'(x) = 1
#[derive(Debug, Clone, Copy)]
pub struct IdentityActivation;

impl Activation for IdentityActivation {
    fn apply_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        x.clone()
    }

    fn derivative_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        Array2::ones(x.dim())
    }

    fn name(&self) -> &'static str {
        "identity"
    }
}

/// Tanh activation: f(x) = tanh(x), f'(x) = 1 - tanh²(x)
#[derive(Debug, Clone, Copy)]
pub struct TanhActivation;

impl Activation for TanhActivation {
    fn apply_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        x.mapv(f64::tanh)
    }

    fn derivative_matrix(&self, x: &Array2<f64>) -> Array2<f64> {
        x.mapv(|v| {
            let tanh_v = v.tanh();
            1.0 - tanh_v * tanh_v
        })
    }

    fn name(&self) -> &'static str {
        "tanh"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_tanh_activation() {
        let act = TanhActivation;
        let x = array![[0.0, 1.0, -1.0]];
        let fx = act.apply_matrix(&x);

        assert!((fx[[0, 0]] - 0.0).abs() < 1e-12);
        assert!(fx[[0, 1]] > 0.7 && fx[[0, 1]] < 0.8);
        assert!(fx[[0, 2]] < -0.7 && fx[[0, 2]] > -0.8);
        assert!((act.derivative_matrix(&x)[[0, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_identity_activation() {
        let act = IdentityActivation;
        let x = array![[0.0, 1.0, -1.0]];
        assert_eq!(act.apply_matrix(&x), x);
        assert_eq!(act.derivative_matrix(&x), array![[1.0, 1.0, 1.0]]);
    }
}
