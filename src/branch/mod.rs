//! # Branch topology
//!
//! Structural constraints on which elementary modes may be combined into one PEM solution.
//!
//! A mode is admissible next to an already selected subset when
//! - it is not selected yet and its column is non-zero,
//! - it is not redundant: under the non-negative fit it must not be a non-negative combination
//!   of the selected modes, under the unconstrained fit it must not lie in their span,
//! - at every branch point it never carries a flux in the opposite direction of a selected mode.
//!
//! Branch points either come from a stoichiometric network ([`BranchTopology::from_network`]) or
//! are inferred from the mode matrix alone ([`BranchTopology::infer`]).

use log::debug;
use nalgebra::{DMatrix, DVector};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::error::PemaError;
use crate::fit::{nnls, FitMethod};
use crate::network::MetabolicNetwork;
use crate::score::DEFAULT_TOLERANCE;
use crate::utils::{orthonormal_basis, project_out, ColumnSelect};

/// A node of the network where routes diverge, given by the fluxes (rows of `EM`) meeting there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchPoint {
    /// Metabolite index in the stoichiometric matrix, `None` when inferred from `EM`.
    pub metabolite: Option<usize>,
    pub fluxes: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTopology {
    branch_points: Vec<BranchPoint>,
    tolerance: f64,
}

impl Default for BranchTopology {
    fn default() -> Self {
        Self::unconstrained()
    }
}

impl BranchTopology {
    pub fn new(branch_points: Vec<BranchPoint>) -> Self {
        Self {
            branch_points,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// No branch points: only the redundancy rules apply.
    pub fn unconstrained() -> Self {
        Self::new(Vec::new())
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Infers up to `nbranch` single-flux branch points from `EM`.
    ///
    /// A flux is a branch candidate when it splits the non-zero modes into users and non-users,
    /// or when modes cross it in both directions. Candidates are ranked by
    /// (used in both directions, `min(users, non-users)`, lowest row).
    pub fn infer(em: ArrayView2<f64>, nbranch: usize, tolerance: f64) -> Self {
        let nonzero_modes: Vec<usize> = (0..em.ncols())
            .filter(|&c| em.column_norm(c) > tolerance)
            .collect();

        let mut ranked: Vec<(bool, usize, usize)> = (0..em.nrows())
            .filter_map(|r| {
                let (mut forward, mut backward) = (0usize, 0usize);
                for &c in &nonzero_modes {
                    let v = em[[r, c]];
                    if v > tolerance {
                        forward += 1;
                    } else if v < -tolerance {
                        backward += 1;
                    }
                }
                let users = forward + backward;
                let split = users.min(nonzero_modes.len() - users);
                let bidirectional = forward > 0 && backward > 0;
                (bidirectional || split > 0).then_some((bidirectional, split, r))
            })
            .collect();

        ranked.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));

        let branch_points: Vec<BranchPoint> = ranked
            .into_iter()
            .take(nbranch)
            .map(|(_, _, r)| BranchPoint {
                metabolite: None,
                fluxes: vec![r],
            })
            .collect();

        if branch_points.len() < nbranch {
            debug!(
                "Requested {} branch points, only {} fluxes split the modes",
                nbranch,
                branch_points.len()
            );
        }

        Self::new(branch_points).with_tolerance(tolerance)
    }

    /// Takes the branch points of a metabolic network. When the network has more than `nbranch`
    /// of them, the best connected ones are kept (ties to the lowest metabolite index).
    pub fn from_network(network: &MetabolicNetwork, nbranch: usize) -> Self {
        let mut branch_points = network.branch_points();
        if branch_points.len() != nbranch {
            debug!(
                "Network has {} branch points, {} requested",
                branch_points.len(),
                nbranch
            );
        }
        branch_points.sort_by(|a, b| {
            b.fluxes
                .len()
                .cmp(&a.fluxes.len())
                .then(a.metabolite.cmp(&b.metabolite))
        });
        branch_points.truncate(nbranch);
        branch_points.sort_by_key(|bp| bp.metabolite);
        Self::new(branch_points)
    }

    pub fn branch_points(&self) -> &[BranchPoint] {
        &self.branch_points
    }

    pub fn len(&self) -> usize {
        self.branch_points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branch_points.is_empty()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Fails when a branch point names a flux outside a mode matrix with `n_fluxes` rows.
    pub fn validate(&self, n_fluxes: usize) -> anyhow::Result<()> {
        for bp in &self.branch_points {
            if let Some(&flux) = bp.fluxes.iter().find(|&&f| f >= n_fluxes) {
                return Err(PemaError::dimension_mismatch(format!(
                    "branch point {:?} names flux {} but the mode matrix has {} fluxes",
                    bp.metabolite, flux, n_fluxes
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Whether modes `a` and `b` cross every branch point in compatible directions.
    pub fn is_consistent(&self, em: ArrayView2<f64>, a: usize, b: usize) -> bool {
        let tol = self.tolerance;
        self.branch_points.iter().all(|bp| {
            bp.fluxes.iter().all(|&f| {
                let (va, vb) = (em[[f, a]], em[[f, b]]);
                !(va.abs() > tol && vb.abs() > tol && va.signum() != vb.signum())
            })
        })
    }

    /// Modes that may extend `selected`, in ascending index order.
    ///
    /// # Parameters
    /// - `em`: fluxes × modes
    /// - `selected`: modes already in the solution
    /// - `fit_method`: decides redundancy; conic combinations for [`FitMethod::NonNegative`],
    ///   linear ones for [`FitMethod::LeastSquares`]
    pub fn admissible(
        &self,
        em: ArrayView2<f64>,
        selected: &[usize],
        fit_method: FitMethod,
    ) -> anyhow::Result<Vec<usize>> {
        let tol = self.tolerance;
        let redundancy = match fit_method {
            FitMethod::NonNegative => Redundancy::Conic(em.select_columns(selected)),
            FitMethod::LeastSquares => {
                let columns: Vec<_> = selected.iter().map(|&m| em.column_vector(m)).collect();
                Redundancy::Linear(orthonormal_basis(&columns, tol))
            }
        };

        let mut pool = Vec::new();
        for c in (0..em.ncols()).filter(|c| !selected.contains(c)) {
            let v = em.column_vector(c);
            let norm = v.norm();
            if norm <= tol || redundancy.covers(&v, norm, tol)? {
                continue;
            }
            if selected.iter().all(|&s| self.is_consistent(em, c, s)) {
                pool.push(c);
            }
        }
        Ok(pool)
    }
}

/// What the selected modes can already reproduce.
enum Redundancy {
    /// Selected columns, combined with non-negative weights.
    Conic(DMatrix<f64>),
    /// Orthonormal basis of the selected columns' span.
    Linear(Vec<DVector<f64>>),
}

impl Redundancy {
    fn covers(&self, v: &DVector<f64>, norm: f64, tol: f64) -> anyhow::Result<bool> {
        let remainder = match self {
            Redundancy::Conic(selected) if selected.ncols() == 0 => norm,
            Redundancy::Conic(selected) => {
                let weights = nnls(selected, v, tol)?;
                (v - selected * weights).norm()
            }
            Redundancy::Linear(basis) => project_out(v, basis).norm(),
        };
        Ok(remainder <= tol * norm)
    }
}
