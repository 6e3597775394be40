//! # Principal Elementary Mode Analysis
//!
//! Searches for the few elementary modes that best reconstruct a flux matrix. Solutions are
//! nested: the `k`-mode solution extends the `(k-1)`-mode one by the admissible mode that explains
//! the most variance, after which up to `relaxations` swap rounds may exchange any selected mode
//! for an unselected one while that strictly improves the fit.
//!
//! ```no_run
//! use ndarray::array;
//! use single_pema::dimred::pema::PemaBuilder;
//!
//! let em = array![[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
//! let x = array![[2.0, 3.0, 1.0], [1.0, 1.0, 0.0]];
//! let table = PemaBuilder::new()
//!     .relaxations(3)
//!     .branch_points(1)
//!     .max_pems(2)
//!     .build()
//!     .run(x.view(), em.view())?;
//! println!("{}", table);
//! # Ok::<(), anyhow::Error>(())
//! ```

use log::{debug, info, trace};
use ndarray::ArrayView2;
use rayon::prelude::*;

mod result;
mod subset;

pub use result::{CandidateSolution, ResultTable};
pub use subset::ModeSubset;

use crate::branch::BranchTopology;
use crate::error::PemaError;
use crate::fit::FitMethod;
use crate::score::{FluxTarget, ScoreProvider, DEFAULT_TOLERANCE};

pub struct PemaBuilder {
    relaxations: usize,
    branch_points: usize,
    max_pems: usize,
    fit_method: FitMethod,
    center: bool,
    tolerance: f64,
    topology: Option<BranchTopology>,
    n_threads: Option<usize>,
}

impl Default for PemaBuilder {
    fn default() -> Self {
        PemaBuilder {
            relaxations: 3,
            branch_points: 1,
            max_pems: 5,
            fit_method: FitMethod::default(),
            center: false,
            tolerance: DEFAULT_TOLERANCE,
            topology: None,
            n_threads: None,
        }
    }
}

impl PemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap rounds allowed after each extension step.
    pub fn relaxations(mut self, relaxations: usize) -> Self {
        self.relaxations = relaxations;
        self
    }

    /// Number of branch points inferred from the mode matrix. Ignored when a topology is set.
    pub fn branch_points(mut self, branch_points: usize) -> Self {
        self.branch_points = branch_points;
        self
    }

    /// Largest solution size to extract. The table has one row per size `1..=max_pems`, fewer
    /// when the admissible modes run out. Must be at least 1.
    pub fn max_pems(mut self, max_pems: usize) -> Self {
        self.max_pems = max_pems;
        self
    }

    /// Fit used for scoring, and for deciding which modes are redundant.
    ///
    /// # Parameters
    /// - `fit_method`: [`FitMethod::NonNegative`] (default) combines modes conically,
    ///   [`FitMethod::LeastSquares`] allows negative weights
    pub fn fit_method(mut self, fit_method: FitMethod) -> Self {
        self.fit_method = fit_method;
        self
    }

    /// Measures explained variance around the column means of `X` instead of around zero.
    pub fn center(mut self, center: bool) -> Self {
        self.center = center;
        self
    }

    /// Numerical tolerance for zero fluxes, linear dependence and score improvements.
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Uses an explicit topology (e.g. from a stoichiometric network) instead of inferring one.
    pub fn topology(mut self, topology: BranchTopology) -> Self {
        self.topology = Some(topology);
        self
    }

    /// Runs candidate scoring on a dedicated pool of `n_threads` workers.
    pub fn n_threads(mut self, n_threads: usize) -> Self {
        self.n_threads = Some(n_threads);
        self
    }

    pub fn build(self) -> Pema {
        Pema {
            relaxations: self.relaxations,
            branch_points: self.branch_points,
            max_pems: self.max_pems,
            tolerance: self.tolerance,
            topology: self.topology,
            n_threads: self.n_threads,
            provider: ScoreProvider::new(self.fit_method)
                .with_center(self.center)
                .with_tolerance(self.tolerance),
        }
    }
}

/// Configured PEM search. Holds no state between runs.
pub struct Pema {
    relaxations: usize,
    branch_points: usize,
    max_pems: usize,
    tolerance: f64,
    topology: Option<BranchTopology>,
    n_threads: Option<usize>,
    provider: ScoreProvider,
}

impl Pema {
    /// Scoring configuration shared by every candidate, e.g. for [`crate::Decomposition::compute`].
    pub fn provider(&self) -> &ScoreProvider {
        &self.provider
    }

    /// Extracts solutions with 1, 2, … up to `max_pems` modes.
    ///
    /// # Parameters
    /// - `x`: flux matrix (observations × fluxes)
    /// - `em`: elementary mode matrix (fluxes × modes)
    ///
    /// # Returns
    /// - `Ok(ResultTable)`: one row per solution size, in increasing order
    /// - `Err`: invalid parameters or inputs, or a failed fit; no partial table is returned
    ///
    /// The table is shorter than `max_pems` when the admissible modes run out first.
    pub fn run(&self, x: ArrayView2<f64>, em: ArrayView2<f64>) -> anyhow::Result<ResultTable> {
        if self.max_pems == 0 {
            return Err(PemaError::invalid_parameter("max_pems must be at least 1").into());
        }

        match self.n_threads {
            Some(n_threads) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n_threads)
                    .build()
                    .map_err(|e| {
                        PemaError::invalid_parameter(format!("cannot build thread pool: {}", e))
                    })?;
                pool.install(|| self.search(x, em))
            }
            None => self.search(x, em),
        }
    }

    fn search(&self, x: ArrayView2<f64>, em: ArrayView2<f64>) -> anyhow::Result<ResultTable> {
        ScoreProvider::validate_inputs(x, em)?;
        let target = self.provider.target(x)?;

        let topology = match &self.topology {
            Some(topology) => topology.clone(),
            None => BranchTopology::infer(em, self.branch_points, self.tolerance),
        };
        topology.validate(em.nrows())?;

        info!(
            "PEM search: {} observations, {} fluxes, {} modes, {} branch points, up to {} PEMs",
            x.nrows(),
            x.ncols(),
            em.ncols(),
            topology.len(),
            self.max_pems
        );

        let mut rows = Vec::with_capacity(self.max_pems.min(em.ncols()));
        let mut subset = ModeSubset::empty();

        for k in 1..=self.max_pems {
            let pool = topology.admissible(em, subset.indices(), self.provider.fit_method())?;
            if pool.is_empty() {
                info!(
                    "No admissible mode left after {} PEMs, stopping early",
                    k - 1
                );
                break;
            }

            let (mut current, mut variance) = self.best_extension(&target, em, &subset, &pool)?;
            debug!("k = {}: greedy pick {} explains {:.4}%", k, current, variance);

            for round in 0..self.relaxations {
                match self.best_swap(&target, em, &topology, &current, variance)? {
                    Some((swapped, improved)) => {
                        debug!(
                            "k = {}, relaxation {}: {} -> {} ({:.4}% -> {:.4}%)",
                            k,
                            round + 1,
                            current,
                            swapped,
                            variance,
                            improved
                        );
                        current = swapped;
                        variance = improved;
                    }
                    None => {
                        trace!("k = {}, relaxation {}: no improving swap", k, round + 1);
                        break;
                    }
                }
            }

            rows.push(CandidateSolution {
                modes: current.clone(),
                explained_variance: variance,
            });
            subset = current;
        }

        info!("PEM search finished with {} solutions", rows.len());
        Ok(ResultTable::new(rows))
    }

    /// Scores `subset ∪ {c}` for every `c` in `pool` (ascending) and keeps the best; ties go to
    /// the lowest mode index.
    fn best_extension(
        &self,
        target: &FluxTarget,
        em: ArrayView2<f64>,
        subset: &ModeSubset,
        pool: &[usize],
    ) -> anyhow::Result<(ModeSubset, f64)> {
        let scored: Vec<(usize, f64)> = pool
            .par_iter()
            .map(|&mode| {
                let variance =
                    self.provider
                        .score_target(target, em, subset.extended(mode).indices())?;
                Ok::<_, anyhow::Error>((mode, variance))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let (mode, variance) = scored
            .into_iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best })
            .ok_or_else(|| PemaError::insufficient_data("no candidate mode to score"))?;

        Ok((subset.extended(mode), variance))
    }

    /// Evaluates every single swap of a selected mode for an admissible unselected one and
    /// returns the best one if it beats `current_variance` by more than the tolerance. Ties go to
    /// the lowest incoming mode, then to the lowest position.
    fn best_swap(
        &self,
        target: &FluxTarget,
        em: ArrayView2<f64>,
        topology: &BranchTopology,
        subset: &ModeSubset,
        current_variance: f64,
    ) -> anyhow::Result<Option<(ModeSubset, f64)>> {
        let mut moves: Vec<(usize, usize)> = Vec::new();
        for position in 0..subset.len() {
            let outgoing = subset.indices()[position];
            let base = subset.without(position);
            for mode in topology.admissible(em, base.indices(), self.provider.fit_method())? {
                if mode != outgoing {
                    moves.push((mode, position));
                }
            }
        }
        moves.sort_unstable();

        if moves.is_empty() {
            return Ok(None);
        }

        let scored: Vec<(ModeSubset, f64)> = moves
            .par_iter()
            .map(|&(mode, position)| {
                let candidate = subset.replaced(position, mode);
                let variance = self
                    .provider
                    .score_target(target, em, candidate.indices())?;
                Ok::<_, anyhow::Error>((candidate, variance))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let best = scored
            .into_iter()
            .reduce(|best, next| if next.1 > best.1 { next } else { best });

        Ok(best.filter(|(_, variance)| *variance > current_variance + self.tolerance))
    }
}

/// Runs the PEM search with the default fit: `nrel` relaxation rounds, `nbranch` inferred branch
/// points and at most `max_pems` modes.
pub fn run(
    x: ArrayView2<f64>,
    em: ArrayView2<f64>,
    nrel: usize,
    nbranch: usize,
    max_pems: usize,
) -> anyhow::Result<ResultTable> {
    PemaBuilder::new()
        .relaxations(nrel)
        .branch_points(nbranch)
        .max_pems(max_pems)
        .build()
        .run(x, em)
}
