use serde::{Deserialize, Serialize};
use std::fmt;

/// Ordered set of elementary mode indices (columns of `EM`).
///
/// Subsets are values: growing or swapping produces a new subset and leaves the original alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeSubset(Vec<usize>);

impl ModeSubset {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, mode: usize) -> bool {
        self.0.contains(&mode)
    }

    /// Whether every index is below `n_modes` and no index repeats.
    pub fn is_valid_for(&self, n_modes: usize) -> bool {
        let mut seen = vec![false; n_modes];
        self.0.iter().all(|&m| {
            if m >= n_modes || seen[m] {
                false
            } else {
                seen[m] = true;
                true
            }
        })
    }

    /// A new subset with `mode` appended.
    pub fn extended(&self, mode: usize) -> Self {
        let mut indices = Vec::with_capacity(self.0.len() + 1);
        indices.extend_from_slice(&self.0);
        indices.push(mode);
        Self(indices)
    }

    /// A new subset with the mode at `position` replaced by `mode`.
    pub fn replaced(&self, position: usize, mode: usize) -> Self {
        let mut indices = self.0.clone();
        indices[position] = mode;
        Self(indices)
    }

    /// A new subset without the mode at `position`.
    pub fn without(&self, position: usize) -> Self {
        let mut indices = self.0.clone();
        indices.remove(position);
        Self(indices)
    }

    pub fn into_inner(self) -> Vec<usize> {
        self.0
    }
}

impl AsRef<[usize]> for ModeSubset {
    fn as_ref(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for ModeSubset {
    fn from(indices: Vec<usize>) -> Self {
        Self(indices)
    }
}

impl fmt::Display for ModeSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, mode) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", mode)?;
        }
        write!(f, "]")
    }
}
