use nalgebra::{DMatrix, DVector};

/// Column access on a dense `fluxes × modes` matrix.
pub trait ColumnSelect {
    /// Copies the listed columns, in order, into a `nrows × indices.len()` matrix.
    fn select_columns(&self, indices: &[usize]) -> DMatrix<f64>;

    /// Copies a single column.
    fn column_vector(&self, index: usize) -> DVector<f64>;

    fn column_norm(&self, index: usize) -> f64;
}

pub trait SumSquares {
    /// Sum of squared entries.
    fn sum_squares(&self) -> f64;

    /// Sum of squared entries per row.
    fn row_sum_squares(&self) -> Vec<f64>;
}

/// Orthonormal basis of the span of `columns` (modified Gram-Schmidt).
///
/// Columns whose remainder falls below `tolerance` relative to their own norm add nothing to the
/// span and are skipped.
pub fn orthonormal_basis(columns: &[DVector<f64>], tolerance: f64) -> Vec<DVector<f64>> {
    let mut basis: Vec<DVector<f64>> = Vec::with_capacity(columns.len());
    for column in columns {
        let norm = column.norm();
        if norm <= tolerance {
            continue;
        }
        let remainder = project_out(column, &basis);
        let remainder_norm = remainder.norm();
        if remainder_norm > tolerance * norm {
            basis.push(remainder / remainder_norm);
        }
    }
    basis
}

/// Removes the components of `v` along each (orthonormal) basis vector.
pub fn project_out(v: &DVector<f64>, basis: &[DVector<f64>]) -> DVector<f64> {
    let mut remainder = v.clone();
    for q in basis {
        let coefficient = q.dot(&remainder);
        remainder.axpy(-coefficient, q, 1.0);
    }
    remainder
}
