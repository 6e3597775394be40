//! JSON persistence for the analysis inputs and results.
//!
//! A matrix file is a JSON object holding the flux matrix under `"X"` (observations × fluxes) and
//! the elementary mode matrix under `"EM"` (fluxes × modes), each as an array of rows:
//!
//! ```json
//! { "X": [[1.0, 2.0, 0.5]], "EM": [[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]] }
//! ```
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use log::debug;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::dimred::pema::{CandidateSolution, ResultTable};
use crate::error::PemaError;

#[derive(Serialize, Deserialize)]
struct MatrixFile {
    #[serde(rename = "X")]
    x: Option<Vec<Vec<f64>>>,
    #[serde(rename = "EM")]
    em: Option<Vec<Vec<f64>>>,
}

#[derive(Serialize, Deserialize)]
struct ResultFile {
    rows: Vec<CandidateSolution>,
}

/// Reads `(X, EM)` from a JSON matrix file.
pub fn load_matrices<P: AsRef<Path>>(path: P) -> anyhow::Result<(Array2<f64>, Array2<f64>)> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| PemaError::file_format(path, format!("cannot open file: {}", e)))?;
    let contents: MatrixFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PemaError::file_format(path, format!("invalid JSON: {}", e)))?;

    let x = rows_to_array(path, "X", contents.x)?;
    let em = rows_to_array(path, "EM", contents.em)?;
    debug!(
        "Loaded X ({} × {}) and EM ({} × {}) from {}",
        x.nrows(),
        x.ncols(),
        em.nrows(),
        em.ncols(),
        path.display()
    );
    Ok((x, em))
}

/// Writes `(X, EM)` in the format read by [`load_matrices`].
pub fn save_matrices<P: AsRef<Path>>(
    path: P,
    x: ArrayView2<f64>,
    em: ArrayView2<f64>,
) -> anyhow::Result<()> {
    let contents = MatrixFile {
        x: Some(array_to_rows(x)),
        em: Some(array_to_rows(em)),
    };
    let file = File::create(path.as_ref())?;
    serde_json::to_writer(BufWriter::new(file), &contents)?;
    Ok(())
}

pub fn save_result_table<P: AsRef<Path>>(path: P, table: &ResultTable) -> anyhow::Result<()> {
    let contents = ResultFile {
        rows: table.rows().to_vec(),
    };
    let file = File::create(path.as_ref())?;
    serde_json::to_writer_pretty(BufWriter::new(file), &contents)?;
    Ok(())
}

pub fn load_result_table<P: AsRef<Path>>(path: P) -> anyhow::Result<ResultTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| PemaError::file_format(path, format!("cannot open file: {}", e)))?;
    let contents: ResultFile = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PemaError::file_format(path, format!("invalid JSON: {}", e)))?;
    ResultTable::from_rows(contents.rows)
        .map_err(|e| PemaError::file_format(path, format!("inconsistent result table: {}", e)).into())
}

fn rows_to_array(
    path: &Path,
    name: &str,
    rows: Option<Vec<Vec<f64>>>,
) -> anyhow::Result<Array2<f64>> {
    let rows =
        rows.ok_or_else(|| PemaError::file_format(path, format!("missing matrix \"{}\"", name)))?;

    let ncols = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.is_empty() || ncols == 0 {
        return Err(PemaError::file_format(path, format!("matrix \"{}\" is empty", name)).into());
    }
    if let Some(i) = rows.iter().position(|r| r.len() != ncols) {
        return Err(PemaError::file_format(
            path,
            format!(
                "matrix \"{}\" row {} has {} entries, expected {}",
                name,
                i,
                rows[i].len(),
                ncols
            ),
        )
        .into());
    }
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PemaError::file_format(
            path,
            format!("matrix \"{}\" holds a non-finite value", name),
        )
        .into());
    }

    let nrows = rows.len();
    let data: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((nrows, ncols), data)
        .map_err(|e| PemaError::file_format(path, format!("matrix \"{}\": {}", name, e)).into())
}

fn array_to_rows(a: ArrayView2<f64>) -> Vec<Vec<f64>> {
    a.axis_iter(Axis(0)).map(|row| row.to_vec()).collect()
}
