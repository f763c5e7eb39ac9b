//! JSON test cases: input rows and expected predictions.
//!
//! A case directory holds a model file next to `input.json` and
//! `expected.json`.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::Deserialize;

/// Input features for a test case.
///
/// Expects JSON format:
/// ```json
/// {
///   "features": [[1.0, 2.0, null], [3.0, 4.0, 5.0]],
///   "num_rows": 2,
///   "num_features": 3
/// }
/// ```
///
/// `null` stands for a missing (NaN) value.
#[derive(Debug, Deserialize)]
pub struct TestInput {
    pub features: Vec<Vec<Option<f64>>>,
    #[serde(rename = "num_rows")]
    pub n_rows: usize,
    #[serde(rename = "num_features")]
    pub n_features: usize,
}

impl TestInput {
    /// Rows with `null` mapped to NaN.
    pub fn to_rows(&self) -> Vec<Vec<f64>> {
        self.features
            .iter()
            .map(|row| row.iter().map(|x| x.unwrap_or(f64::NAN)).collect())
            .collect()
    }

    /// Dense `[n_rows, n_features]` matrix; short rows are padded with NaN.
    pub fn to_array(&self) -> Array2<f64> {
        let mut out = Array2::from_elem((self.n_rows, self.n_features), f64::NAN);
        for (mut dst, row) in out.rows_mut().into_iter().zip(&self.features) {
            for (d, x) in dst.iter_mut().zip(row) {
                *d = x.unwrap_or(f64::NAN);
            }
        }
        out
    }
}

/// Expected predictions for a test case.
///
/// `predictions` holds raw scores, `predictions_transformed` the output
/// after the model's transform. Either is a flat list (one output per row)
/// or a list of rows.
#[derive(Debug, Deserialize)]
pub struct TestExpected {
    pub predictions: serde_json::Value,
    #[serde(default)]
    pub predictions_transformed: Option<serde_json::Value>,
    #[serde(default)]
    pub objective: Option<String>,
}

fn as_rows(value: &serde_json::Value) -> Vec<Vec<f64>> {
    if let Ok(flat) = serde_json::from_value::<Vec<f64>>(value.clone()) {
        return flat.into_iter().map(|x| vec![x]).collect();
    }
    serde_json::from_value(value.clone()).expect("predictions must be a list of numbers or rows")
}

impl TestExpected {
    /// Raw predictions, one row per input row.
    pub fn raw_rows(&self) -> Vec<Vec<f64>> {
        as_rows(&self.predictions)
    }

    /// Transformed predictions, when present.
    pub fn transformed_rows(&self) -> Option<Vec<Vec<f64>>> {
        self.predictions_transformed.as_ref().map(as_rows)
    }
}

/// A case directory.
#[derive(Debug, Clone)]
pub struct TestCase {
    dir: PathBuf,
}

impl TestCase {
    /// A case under `tests/test-cases`.
    pub fn new(relative: &str) -> Self {
        Self {
            dir: super::fixture_path(relative),
        }
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    pub fn input(&self) -> TestInput {
        read_json(&self.path("input.json"))
    }

    pub fn expected(&self) -> TestExpected {
        read_json(&self.path("expected.json"))
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> T {
    let file = File::open(path).unwrap_or_else(|e| panic!("cannot open {}: {e}", path.display()));
    serde_json::from_reader(BufReader::new(file)).unwrap_or_else(|e| panic!("cannot parse {}: {e}", path.display()))
}
