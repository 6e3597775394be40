//! # Explained-variance scoring
//!
//! Fits every observation of a flux matrix `X` (observations × fluxes) onto a subset of the
//! columns of an elementary mode matrix `EM` (fluxes × modes) and reports how much of the total
//! sum of squares of `X` the reconstruction reproduces.
//!
//! Scoring is pure: `X` and `EM` are only read, all intermediate buffers belong to the call.

use nalgebra::DVector;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::PemaError;
use crate::fit::{least_squares, nnls, FitMethod};
use crate::utils::{ColumnSelect, SumSquares};

pub const DEFAULT_TOLERANCE: f64 = 1e-10;

/// Configured scorer. Copying it is cheap; it holds no buffers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreProvider {
    fit_method: FitMethod,
    center: bool,
    tolerance: f64,
}

impl Default for ScoreProvider {
    fn default() -> Self {
        Self {
            fit_method: FitMethod::default(),
            center: false,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// The flux data a search fits against, prepared once per run.
#[derive(Debug, Clone)]
pub struct FluxTarget {
    data: Array2<f64>,
    mean: Option<Array1<f64>>,
    total_sum_squares: f64,
}

impl FluxTarget {
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn total_sum_squares(&self) -> f64 {
        self.total_sum_squares
    }

    /// Maps a reconstruction of the (possibly centred) target back onto the scale of `X`.
    pub fn restore(&self, reconstruction: &Array2<f64>) -> Array2<f64> {
        match &self.mean {
            Some(mean) => reconstruction + &mean.view().insert_axis(Axis(0)),
            None => reconstruction.clone(),
        }
    }
}

/// Result of fitting `X` onto a mode subset.
#[derive(Debug, Clone)]
pub struct ModeFit {
    pub modes: Vec<usize>,
    /// observations × modes
    pub weights: Array2<f64>,
    /// observations × fluxes, on the scale of the fitted target
    pub reconstruction: Array2<f64>,
    pub residual_sum_squares: f64,
    pub explained_variance: f64,
}

impl ScoreProvider {
    /// Creates an uncentred provider with the default tolerance.
    ///
    /// # Parameters
    /// - `fit_method`: how each observation is fitted onto the selected modes
    pub fn new(fit_method: FitMethod) -> Self {
        Self {
            fit_method,
            ..Self::default()
        }
    }

    /// # Parameters
    /// - `center`: whether to subtract the column means of `X` before fitting, so that variance
    ///   is measured around the mean flux instead of around zero
    pub fn with_center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    /// # Parameters
    /// - `tolerance`: optimality threshold of the NNLS solver, relative to the input norms
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn fit_method(&self) -> FitMethod {
        self.fit_method
    }

    pub fn is_centered(&self) -> bool {
        self.center
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Checks that `X` and `EM` are non-empty and agree on the number of fluxes.
    pub fn validate_inputs(x: ArrayView2<f64>, em: ArrayView2<f64>) -> anyhow::Result<()> {
        let (n_obs, n_flux) = x.dim();
        if n_obs == 0 || n_flux == 0 {
            return Err(PemaError::insufficient_data(format!(
                "flux matrix is {} × {}, needs at least one observation and one flux",
                n_obs, n_flux
            ))
            .into());
        }
        if em.nrows() == 0 || em.ncols() == 0 {
            return Err(PemaError::insufficient_data(format!(
                "elementary mode matrix is {} × {}, needs at least one flux and one mode",
                em.nrows(),
                em.ncols()
            ))
            .into());
        }
        if em.nrows() != n_flux {
            return Err(PemaError::dimension_mismatch(format!(
                "elementary mode matrix has {} rows but the flux matrix has {} fluxes",
                em.nrows(),
                n_flux
            ))
            .into());
        }
        Ok(())
    }

    /// Checks that `subset` is non-empty, within EM's columns and free of duplicates.
    pub fn validate_subset(em: ArrayView2<f64>, subset: &[usize]) -> anyhow::Result<()> {
        if subset.is_empty() {
            return Err(PemaError::invalid_subset(subset, "subset is empty").into());
        }
        let n_modes = em.ncols();
        let mut seen = vec![false; n_modes];
        for &mode in subset {
            if mode >= n_modes {
                return Err(PemaError::invalid_subset(
                    subset,
                    format!("mode {} is out of range for {} modes", mode, n_modes),
                )
                .into());
            }
            if seen[mode] {
                return Err(
                    PemaError::invalid_subset(subset, format!("mode {} appears twice", mode)).into(),
                );
            }
            seen[mode] = true;
        }
        Ok(())
    }

    /// Copies `X` (centring its columns when configured) and records its total sum of squares.
    pub fn target(&self, x: ArrayView2<f64>) -> anyhow::Result<FluxTarget> {
        let (n_obs, n_flux) = x.dim();
        if n_obs == 0 || n_flux == 0 {
            return Err(PemaError::insufficient_data(format!(
                "flux matrix is {} × {}",
                n_obs, n_flux
            ))
            .into());
        }

        let mut data = x.to_owned();
        let mean = if self.center {
            let mean = x
                .mean_axis(Axis(0))
                .ok_or_else(|| PemaError::insufficient_data("flux matrix has no observations"))?;
            data -= &mean.view().insert_axis(Axis(0));
            Some(mean)
        } else {
            None
        };

        let total_sum_squares = data.sum_squares();
        if total_sum_squares <= 0.0 {
            return Err(PemaError::insufficient_data(
                "flux matrix carries no variance to explain",
            )
            .into());
        }

        Ok(FluxTarget {
            data,
            mean,
            total_sum_squares,
        })
    }

    /// Fits the prepared target onto the modes in `subset`.
    pub fn fit_target(
        &self,
        target: &FluxTarget,
        em: ArrayView2<f64>,
        subset: &[usize],
    ) -> anyhow::Result<ModeFit> {
        let (n_obs, n_flux) = target.data.dim();
        if em.nrows() != n_flux {
            return Err(PemaError::dimension_mismatch(format!(
                "elementary mode matrix has {} rows but the flux matrix has {} fluxes",
                em.nrows(),
                n_flux
            ))
            .into());
        }
        Self::validate_subset(em, subset)?;

        let modes = em.select_columns(subset);
        let k = subset.len();

        let weights = match self.fit_method {
            FitMethod::NonNegative => {
                let mut weights = Array2::zeros((n_obs, k));
                for (row, mut w_row) in target
                    .data
                    .axis_iter(Axis(0))
                    .zip(weights.axis_iter_mut(Axis(0)))
                {
                    let b = DVector::from_iterator(n_flux, row.iter().copied());
                    let w = nnls(&modes, &b, self.tolerance)?;
                    w_row.iter_mut().zip(w.iter()).for_each(|(dst, &v)| *dst = v);
                }
                weights
            }
            FitMethod::LeastSquares => {
                let b = nalgebra::DMatrix::from_fn(n_flux, n_obs, |f, i| target.data[[i, f]]);
                let w = least_squares(&modes, &b)?;
                Array2::from_shape_fn((n_obs, k), |(i, j)| w[(j, i)])
            }
        };

        let reconstruction = Array2::from_shape_fn((n_obs, n_flux), |(i, f)| {
            (0..k).map(|j| weights[[i, j]] * modes[(f, j)]).sum::<f64>()
        });
        let residual_sum_squares = (&target.data - &reconstruction).sum_squares();

        Ok(ModeFit {
            modes: subset.to_vec(),
            weights,
            reconstruction,
            residual_sum_squares,
            explained_variance: explained_percentage(
                residual_sum_squares,
                target.total_sum_squares,
            ),
        })
    }

    pub fn score_target(
        &self,
        target: &FluxTarget,
        em: ArrayView2<f64>,
        subset: &[usize],
    ) -> anyhow::Result<f64> {
        Ok(self.fit_target(target, em, subset)?.explained_variance)
    }

    pub fn fit(
        &self,
        x: ArrayView2<f64>,
        em: ArrayView2<f64>,
        subset: &[usize],
    ) -> anyhow::Result<ModeFit> {
        Self::validate_inputs(x, em)?;
        let target = self.target(x)?;
        self.fit_target(&target, em, subset)
    }

    pub fn score(
        &self,
        x: ArrayView2<f64>,
        em: ArrayView2<f64>,
        subset: &[usize],
    ) -> anyhow::Result<f64> {
        Ok(self.fit(x, em, subset)?.explained_variance)
    }
}

/// Percentage of variance explained by `subset` with the default (non-negative, uncentred) fit.
pub fn score(x: ArrayView2<f64>, em: ArrayView2<f64>, subset: &[usize]) -> anyhow::Result<f64> {
    ScoreProvider::default().score(x, em, subset)
}

/// `100·(1 - SS_res / SS_tot)`, clamped to `[0, 100]`.
pub fn explained_percentage(residual_sum_squares: f64, total_sum_squares: f64) -> f64 {
    if total_sum_squares <= 0.0 {
        return 0.0;
    }
    (100.0 * (1.0 - residual_sum_squares / total_sum_squares)).clamp(0.0, 100.0)
}
