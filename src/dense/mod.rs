use nalgebra::{DMatrix, DVector};
use ndarray::{ArrayBase, Axis, Data, Ix2};

use crate::utils::{ColumnSelect, SumSquares};

impl<S> ColumnSelect for ArrayBase<S, Ix2>
where
    S: Data<Elem = f64>,
{
    fn select_columns(&self, indices: &[usize]) -> DMatrix<f64> {
        DMatrix::from_fn(self.nrows(), indices.len(), |i, j| self[[i, indices[j]]])
    }

    fn column_vector(&self, index: usize) -> DVector<f64> {
        DVector::from_iterator(self.nrows(), self.column(index).iter().copied())
    }

    fn column_norm(&self, index: usize) -> f64 {
        self.column(index).iter().map(|&v| v * v).sum::<f64>().sqrt()
    }
}

impl<S> SumSquares for ArrayBase<S, Ix2>
where
    S: Data<Elem = f64>,
{
    fn sum_squares(&self) -> f64 {
        self.iter().map(|&v| v * v).sum()
    }

    fn row_sum_squares(&self) -> Vec<f64> {
        self.axis_iter(Axis(0))
            .map(|row| row.iter().map(|&v| v * v).sum())
            .collect()
    }
}
