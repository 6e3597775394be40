//! # Error kinds
//!
//! All fallible operations in this crate return `anyhow::Result`. The failures they raise are
//! [`PemaError`] values, so callers that need to branch on the kind can
//! `downcast_ref::<PemaError>()` the returned error.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PemaError {
    /// The elementary mode matrix and the flux matrix disagree on the number of fluxes
    #[error("Dimension mismatch: {message}")]
    DimensionMismatch { message: String },

    /// A mode subset is empty, names a mode outside EM or names a mode twice
    #[error("Invalid mode subset {subset:?}: {message}")]
    InvalidSubset { subset: Vec<usize>, message: String },

    /// Degenerate input (no observations, no fluxes, no modes, no variance)
    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },

    /// A persisted matrix or result file is missing or malformed
    #[error("File format error in {path}: {message}")]
    FileFormat { path: PathBuf, message: String },

    /// A search parameter is outside its admissible range
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The least-squares solver failed
    #[error("Numerical error: {message}")]
    Numerical { message: String },
}

impl PemaError {
    pub fn dimension_mismatch(message: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            message: message.into(),
        }
    }

    pub fn invalid_subset(subset: &[usize], message: impl Into<String>) -> Self {
        Self::InvalidSubset {
            subset: subset.to_vec(),
            message: message.into(),
        }
    }

    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData {
            message: message.into(),
        }
    }

    pub fn file_format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FileFormat {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::Numerical {
            message: message.into(),
        }
    }
}

/// Returns the [`PemaError`] carried by an `anyhow::Error`, if any.
pub fn kind(err: &anyhow::Error) -> Option<&PemaError> {
    err.downcast_ref::<PemaError>()
}
