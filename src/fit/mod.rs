//! # Mode fitting
//!
//! Solvers that express an observation (or a block of observations) as a combination of a fixed
//! set of elementary modes. The columns of the design matrix are the selected modes, the targets
//! are flux vectors.

use log::trace;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::PemaError;

/// How observations are fitted onto the selected modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FitMethod {
    /// Lawson-Hanson non-negative least squares. Modes only combine with weights `>= 0`.
    #[default]
    NonNegative,
    /// Unconstrained least squares through the SVD pseudo-inverse.
    LeastSquares,
}

/// Inner iterations allowed per column before [`nnls`] gives up.
const ITERATIONS_PER_COLUMN: usize = 30;

/// Solves `min ||a·x - b||` subject to `x >= 0` (Lawson-Hanson active set).
///
/// `tolerance` scales the optimality threshold on the dual vector. The solver fails with
/// [`PemaError::Numerical`] when it does not converge within `30·n` inner iterations.
pub fn nnls(a: &DMatrix<f64>, b: &DVector<f64>, tolerance: f64) -> anyhow::Result<DVector<f64>> {
    nnls_with_limit(a, b, tolerance, ITERATIONS_PER_COLUMN * a.ncols())
}

pub(crate) fn nnls_with_limit(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    tolerance: f64,
    max_iterations: usize,
) -> anyhow::Result<DVector<f64>> {
    let n = a.ncols();
    let mut x = DVector::zeros(n);
    if n == 0 {
        return Ok(x);
    }

    let dual_tolerance = tolerance * a.norm().max(1.0) * b.norm().max(1.0);
    let mut iterations = 0;
    let mut passive = vec![false; n];
    let mut w = a.tr_mul(&(b - a * &x));

    'outer: loop {
        let mut entering = None;
        let mut largest = dual_tolerance;
        for j in 0..n {
            if !passive[j] && w[j] > largest {
                largest = w[j];
                entering = Some(j);
            }
        }
        let Some(j) = entering else {
            break;
        };
        passive[j] = true;
        let mut just_entered = true;

        loop {
            iterations += 1;
            if iterations > max_iterations {
                return Err(PemaError::numerical(format!(
                    "NNLS did not converge within {} iterations",
                    max_iterations
                ))
                .into());
            }

            let active: Vec<usize> = (0..n).filter(|&p| passive[p]).collect();
            let z = solve_columns(a, b, &active)?;

            if just_entered {
                just_entered = false;
                let k = active.iter().position(|&p| p == j).unwrap_or_default();
                if z[k] <= 0.0 {
                    // the entering column cannot carry a positive weight at this iterate
                    trace!("NNLS: column {} rejected on entry", j);
                    passive[j] = false;
                    w[j] = 0.0;
                    continue 'outer;
                }
            }

            if z.iter().all(|&v| v > 0.0) {
                x.fill(0.0);
                for (k, &p) in active.iter().enumerate() {
                    x[p] = z[k];
                }
                break;
            }

            // every passive column except the entering one holds a positive weight, so some
            // column with z <= 0 bounds the step
            let mut alpha = f64::INFINITY;
            for (k, &p) in active.iter().enumerate() {
                if z[k] <= 0.0 {
                    let denom = x[p] - z[k];
                    if denom > 0.0 {
                        alpha = alpha.min(x[p] / denom);
                    }
                }
            }
            if !alpha.is_finite() {
                return Err(
                    PemaError::numerical("NNLS line search found no feasible step").into(),
                );
            }

            for (k, &p) in active.iter().enumerate() {
                x[p] += alpha * (z[k] - x[p]);
                if x[p] <= tolerance {
                    x[p] = 0.0;
                    passive[p] = false;
                }
            }
        }

        w = a.tr_mul(&(b - a * &x));
    }

    Ok(x)
}

/// Least-squares solution of `a·x = b` for every column of `b`. Rank deficiency is handled by the
/// pseudo-inverse, so the minimum-norm solution is returned.
pub fn least_squares(a: &DMatrix<f64>, b: &DMatrix<f64>) -> anyhow::Result<DMatrix<f64>> {
    let svd = a.clone().svd(true, true);
    let eps = singular_value_cutoff(&svd.singular_values, a.nrows(), a.ncols());
    svd.solve(b, eps)
        .map_err(|e| PemaError::numerical(format!("least-squares solve failed: {}", e)).into())
}

/// Unconstrained least squares restricted to the listed columns of `a`.
fn solve_columns(
    a: &DMatrix<f64>,
    b: &DVector<f64>,
    columns: &[usize],
) -> anyhow::Result<DVector<f64>> {
    let sub = DMatrix::from_fn(a.nrows(), columns.len(), |i, k| a[(i, columns[k])]);
    let svd = sub.svd(true, true);
    let eps = singular_value_cutoff(&svd.singular_values, a.nrows(), columns.len());
    svd.solve(b, eps)
        .map_err(|e| PemaError::numerical(format!("NNLS subproblem failed: {}", e)).into())
}

fn singular_value_cutoff(singular_values: &DVector<f64>, nrows: usize, ncols: usize) -> f64 {
    let largest = singular_values.iter().copied().fold(0.0, f64::max);
    largest * (nrows.max(ncols) as f64) * f64::EPSILON
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_nnls_matches_unconstrained_when_feasible() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        let x = nnls(&a, &b, 1e-12).unwrap();

        assert_relative_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_nnls_clamps_negative_direction() {
        // Unconstrained solution is (2, -1).
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 1.0, 2.0]);
        let b = DVector::from_vec(vec![1.0, 0.0]);
        let x = nnls(&a, &b, 1e-12).unwrap();

        assert_relative_eq!(x[0], 0.5, epsilon = 1e-10);
        assert_relative_eq!(x[1], 0.0);
    }

    #[test]
    fn test_nnls_zero_target() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let b = DVector::zeros(2);
        let x = nnls(&a, &b, 1e-12).unwrap();
        assert_eq!(x, DVector::zeros(2));
    }

    #[test]
    fn test_nnls_all_negative_target() {
        let a = DMatrix::identity(2, 2);
        let b = DVector::from_vec(vec![-1.0, -3.0]);
        let x = nnls(&a, &b, 1e-12).unwrap();
        assert_eq!(x, DVector::zeros(2));
    }

    #[test]
    fn test_nnls_iteration_limit_is_an_error() {
        // needs two inner iterations: column 1 enters first, then column 0
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 2.0, 3.0]);

        let err = nnls_with_limit(&a, &b, 1e-12, 1).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PemaError>(),
            Some(PemaError::Numerical { .. })
        ));

        let x = nnls_with_limit(&a, &b, 1e-12, 2).unwrap();
        assert_relative_eq!(x[0], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[1], 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_nnls_dependent_columns() {
        // third column is the sum of the first two
        let a = DMatrix::from_row_slice(2, 3, &[1.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let b = DVector::from_vec(vec![2.0, 1.0]);
        let x = nnls(&a, &b, 1e-12).unwrap();

        assert!(x.iter().all(|&v| v >= 0.0));
        let fitted = &a * &x;
        assert_relative_eq!(fitted[0], 2.0, epsilon = 1e-10);
        assert_relative_eq!(fitted[1], 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_least_squares_block() {
        let a = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let b = DMatrix::from_row_slice(3, 2, &[1.0, -1.0, 2.0, 0.0, 3.0, -1.0]);
        let x = least_squares(&a, &b).unwrap();

        assert_eq!(x.shape(), (2, 2));
        assert_relative_eq!(x[(0, 0)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[(1, 0)], 2.0, epsilon = 1e-10);
        assert_relative_eq!(x[(0, 1)], -1.0, epsilon = 1e-10);
        assert_relative_eq!(x[(1, 1)], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_least_squares_rank_deficient() {
        // Two identical columns share the weight evenly (minimum norm).
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 0.0]);
        let b = DMatrix::from_row_slice(2, 1, &[2.0, 0.0]);
        let x = least_squares(&a, &b).unwrap();

        assert_relative_eq!(x[(0, 0)], 1.0, epsilon = 1e-10);
        assert_relative_eq!(x[(1, 0)], 1.0, epsilon = 1e-10);
    }
}
