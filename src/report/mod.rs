//! # Reporting data
//!
//! Everything a plotting front-end needs to show a chosen PEM solution: the weighting matrix,
//! observed versus predicted fluxes, the flux pattern of each PEM and the variance explained per
//! PEM and per observation. Nothing here draws; the numbers are computed once and only read.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::score::{explained_percentage, ScoreProvider};
use crate::utils::{ColumnSelect, SumSquares};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub modes: Vec<usize>,
    /// observations × fluxes
    pub observed: Array2<f64>,
    /// observations × fluxes, on the scale of `observed`
    pub reconstruction: Array2<f64>,
    /// observations × PEMs
    pub weights: Array2<f64>,
    /// fluxes × PEMs, the selected columns of `EM`
    pub pem_patterns: Array2<f64>,
    pub explained_variance: f64,
    /// Share of the total sum of squares carried by each PEM's own contribution. Modes that
    /// overlap on fluxes interact, so these need not add up to `explained_variance`.
    pub mode_variance: Vec<f64>,
    pub observation_variance: Vec<f64>,
}

impl Decomposition {
    pub fn compute(
        x: ArrayView2<f64>,
        em: ArrayView2<f64>,
        modes: &[usize],
        provider: &ScoreProvider,
    ) -> anyhow::Result<Self> {
        ScoreProvider::validate_inputs(x, em)?;
        let target = provider.target(x)?;
        let fit = provider.fit_target(&target, em, modes)?;
        let total = target.total_sum_squares();

        let mode_variance = modes
            .iter()
            .enumerate()
            .map(|(j, &mode)| {
                let weight_ss: f64 = fit.weights.column(j).iter().map(|&w| w * w).sum();
                let pattern_ss = em.column_norm(mode).powi(2);
                100.0 * weight_ss * pattern_ss / total
            })
            .collect();

        let residuals = &target.data() - &fit.reconstruction;
        let observation_variance = target
            .data()
            .row_sum_squares()
            .into_iter()
            .zip(residuals.row_sum_squares())
            .map(|(row_total, row_residual)| {
                if row_total > 0.0 {
                    explained_percentage(row_residual, row_total)
                } else {
                    100.0
                }
            })
            .collect();

        let pem_patterns = Array2::from_shape_fn((em.nrows(), modes.len()), |(f, j)| {
            em[[f, modes[j]]]
        });

        Ok(Decomposition {
            modes: modes.to_vec(),
            observed: x.to_owned(),
            reconstruction: target.restore(&fit.reconstruction),
            weights: fit.weights,
            pem_patterns,
            explained_variance: fit.explained_variance,
            mode_variance,
            observation_variance,
        })
    }

    /// Observed minus predicted fluxes.
    pub fn residuals(&self) -> Array2<f64> {
        &self.observed - &self.reconstruction
    }

    /// `(observed, predicted)` pairs for every observation and flux, row-major.
    pub fn observed_vs_predicted(&self) -> Vec<(f64, f64)> {
        self.observed
            .iter()
            .zip(self.reconstruction.iter())
            .map(|(&o, &p)| (o, p))
            .collect()
    }

    /// Weights of each observation scaled to sum to one across PEMs (all-zero rows stay zero).
    pub fn relative_weights(&self) -> Array2<f64> {
        let mut relative = self.weights.clone();
        for mut row in relative.axis_iter_mut(Axis(0)) {
            let sum: f64 = row.iter().map(|w| w.abs()).sum();
            if sum > 0.0 {
                row.mapv_inplace(|w| w / sum);
            }
        }
        relative
    }

    pub fn pem_count(&self) -> usize {
        self.modes.len()
    }
}
