//! Math helpers shared by the reference collaborators.

use ndarray::{Array1, Array2, Axis};

use crate::core::{Result, TrialError};

/// Root mean squared error over all elements.
///
/// Returns NaN for empty inputs.
pub fn rmse(ys: &Array2<f64>, ys_hat: &Array2<f64>) -> Result<f64> {
    if ys.dim() != ys_hat.dim() {
        return Err(TrialError::ShapeMismatch(format!(
            "targets {:?} vs predictions {:?}",
            ys.dim(),
            ys_hat.dim()
        )));
    }
    let diff = ys - ys_hat;
    Ok(diff.mapv(|v| v * v).mean().map_or(f64::NAN, f64::sqrt))
}

/// Rows of `a` at `idcs`, in order.
pub fn select_rows(a: &Array2<f64>, idcs: &[usize]) -> Array2<f64> {
    a.select(Axis(0), idcs)
}

/// Solve `A X = B` for symmetric positive definite `A` via Cholesky.
///
/// `A` is (n, n), `B` is (n, m). Returns `X` with shape (n, m).
///
/// # Errors
/// - `ShapeMismatch` if the dimensions disagree
/// - `Collaborator` if `A` is not positive definite
pub fn cholesky_solve(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    if a.ncols() != n || b.nrows() != n {
        return Err(TrialError::ShapeMismatch(format!(
            "cannot solve {:?} against {:?}",
            a.dim(),
            b.dim()
        )));
    }

    // A = L Lᵀ
    let mut l = Array2::<f64>::zeros((n, n));
    for i in 0..n {
        for j in 0..=i {
            let mut sum = a[[i, j]];
            for k in 0..j {
                sum -= l[[i, k]] * l[[j, k]];
            }
            if i == j {
                if sum <= 0.0 {
                    return Err(TrialError::Collaborator(
                        "matrix is not positive definite".to_string(),
                    ));
                }
                l[[i, i]] = sum.sqrt();
            } else {
                l[[i, j]] = sum / l[[j, j]];
            }
        }
    }

    let mut x = Array2::<f64>::zeros(b.dim());
    for (col, mut out) in b.columns().into_iter().zip(x.columns_mut()) {
        // Forward: L y = b
        let mut y = Array1::<f64>::zeros(n);
        for i in 0..n {
            let s: f64 = (0..i).map(|k| l[[i, k]] * y[k]).sum();
            y[i] = (col[i] - s) / l[[i, i]];
        }
        // Backward: Lᵀ x = y
        for i in (0..n).rev() {
            let s: f64 = (i + 1..n).map(|k| l[[k, i]] * out[k]).sum();
            out[i] = (y[i] - s) / l[[i, i]];
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_rmse() {
        let ys = array![[1.0], [2.0]];
        let ys_hat = array![[1.0], [4.0]];
        assert_abs_diff_eq!(rmse(&ys, &ys_hat).unwrap(), 2.0f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_rmse_shape_mismatch() {
        assert!(rmse(&array![[1.0, 2.0]], &array![[1.0]]).is_err());
    }

    #[test]
    fn test_select_rows() {
        let a = array![[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        assert_eq!(select_rows(&a, &[2, 0]), array![[2.0, 2.0], [0.0, 0.0]]);
    }

    #[test]
    fn test_cholesky_solve() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let b = array![[2.0, 4.0], [1.0, 5.0]];
        let x = cholesky_solve(&a, &b).unwrap();
        let back = a.dot(&x);
        for (u, v) in back.iter().zip(b.iter()) {
            assert_abs_diff_eq!(*u, *v, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = array![[1.0, 2.0], [2.0, 1.0]];
        assert!(cholesky_solve(&a, &array![[1.0], [1.0]]).is_err());
    }
}
