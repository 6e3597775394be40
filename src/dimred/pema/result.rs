use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::subset::ModeSubset;
use crate::error::PemaError;

/// One extracted solution: the selected modes and the variance they explain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSolution {
    pub modes: ModeSubset,
    /// Percentage in `[0, 100]`.
    pub explained_variance: f64,
}

impl CandidateSolution {
    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

/// Nested PEM solutions, row `k` (1-based) holding exactly `k` modes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultTable {
    rows: Vec<CandidateSolution>,
}

impl ResultTable {
    pub(crate) fn new(rows: Vec<CandidateSolution>) -> Self {
        Self { rows }
    }

    /// Builds a table from externally supplied rows, checking that row `k` holds `k` distinct
    /// modes and a variance within `[0, 100]`.
    pub fn from_rows(rows: Vec<CandidateSolution>) -> anyhow::Result<Self> {
        for (i, row) in rows.iter().enumerate() {
            let k = i + 1;
            if row.modes.len() != k {
                return Err(PemaError::invalid_subset(
                    row.modes.indices(),
                    format!("row {} must hold {} modes", k, k),
                )
                .into());
            }
            let mut sorted = row.modes.indices().to_vec();
            sorted.sort_unstable();
            sorted.dedup();
            if sorted.len() != k {
                return Err(PemaError::invalid_subset(
                    row.modes.indices(),
                    format!("row {} repeats a mode", k),
                )
                .into());
            }
            if !(0.0..=100.0).contains(&row.explained_variance) {
                return Err(PemaError::invalid_parameter(format!(
                    "row {} explains {}% of the variance",
                    k, row.explained_variance
                ))
                .into());
            }
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[CandidateSolution] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The solution with `k` PEMs (1-based).
    pub fn solution(&self, k: usize) -> Option<&CandidateSolution> {
        k.checked_sub(1).and_then(|i| self.rows.get(i))
    }

    /// The largest solution.
    pub fn last(&self) -> Option<&CandidateSolution> {
        self.rows.last()
    }

    pub fn explained_variances(&self) -> Vec<f64> {
        self.rows.iter().map(|r| r.explained_variance).collect()
    }

    /// `(k, explained variance)` pairs, the data of a scree plot.
    pub fn scree(&self) -> Vec<(usize, f64)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, r)| (i + 1, r.explained_variance))
            .collect()
    }

    /// Row-wise matrix `[variance, index_1, …, index_k]`, right-padded with `NaN`.
    pub fn to_array(&self) -> Array2<f64> {
        let width = 1 + self.rows.iter().map(|r| r.modes.len()).max().unwrap_or(0);
        let mut table = Array2::from_elem((self.rows.len(), width), f64::NAN);
        for (i, row) in self.rows.iter().enumerate() {
            table[[i, 0]] = row.explained_variance;
            for (j, &mode) in row.modes.indices().iter().enumerate() {
                table[[i, j + 1]] = mode as f64;
            }
        }
        table
    }
}

impl fmt::Display for ResultTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:>4}  {:>10}  modes", "PEMs", "variance %")?;
        for (i, row) in self.rows.iter().enumerate() {
            writeln!(
                f,
                "{:>4}  {:>10.4}  {}",
                i + 1,
                row.explained_variance,
                row.modes
            )?;
        }
        Ok(())
    }
}
