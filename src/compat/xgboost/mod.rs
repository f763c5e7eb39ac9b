//! XGBoost model format support.
//!
//! Two encodings are read:
//! - **JSON** (`save_model("model.json")`, XGBoost >= 1.0).
//! - **Binary** (the legacy `save_model("model.bin")` layout, including
//!   pre-1.0 files without the `binf` magic).
//!
//! Boosters `gbtree`, `dart` and `gblinear` are supported. Tree models are
//! grouped by `tree_info`; dart trees carry their `weight_drop` factor.
//! Categorical splits and multi-target trees are rejected.
//!
//! [`from_file`] accepts either encoding: it parses JSON and falls back to
//! the binary reader only when the bytes are not JSON at all.

mod binary;
mod convert;
mod json;

use std::fs;
use std::path::Path;

pub use binary::load_binary;
pub use convert::TreeError;
pub use json::load_json;

use crate::io::BinaryReadError;
use crate::model::{Ensemble, LoadOptions, TransformMismatch};
use crate::repr::gbdt::ForestValidationError;

/// Error while loading an XGBoost model.
#[derive(Debug, thiserror::Error)]
pub enum XgboostError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("binary format: {0}")]
    Binary(#[from] BinaryReadError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported booster {0:?}")]
    UnsupportedBooster(String),

    #[error("model declares no features")]
    NoFeatures,

    #[error("model has no trees")]
    NoTrees,

    #[error("booster declares {booster} features, learner {header}")]
    BoosterFeatures { booster: i32, header: u32 },

    #[error("only single-root trees are supported, got num_roots = {0}")]
    Roots(i32),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("tree_info has {actual} entries, expected {expected}")]
    TreeInfoLen { expected: usize, actual: usize },

    #[error("tree {index} is in group {group}, expected {expected}")]
    TreeInfoPattern { index: usize, group: i32, expected: i32 },

    #[error("weight_drop has {actual} entries, expected {expected}")]
    WeightDropLen { expected: usize, actual: usize },

    #[error("linear model has {actual} weights, expected {expected}")]
    LinearWeights { expected: usize, actual: usize },

    #[error("linear weights: {0}")]
    LinearShape(#[from] ndarray::ShapeError),

    #[error("unsupported objective {0:?}")]
    UnsupportedObjective(String),

    #[error(transparent)]
    Transform(#[from] TransformMismatch),

    #[error(transparent)]
    Forest(#[from] ForestValidationError),

    #[error("error while reading tree {index}: {source}")]
    Tree {
        index: usize,
        #[source]
        source: TreeError,
    },
}

/// Load a model file in either encoding.
///
/// The file is parsed as JSON first. Input that is not JSON (a syntax error
/// or premature end) is retried as binary; any other JSON error, such as a
/// missing field, is returned as is.
pub fn from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let bytes = fs::read(path)?;
    match load_json(bytes.as_slice(), options) {
        Err(XgboostError::Json(err)) if err.is_syntax() || err.is_eof() => {
            tracing::debug!(error = %err, "not a JSON model, reading as binary");
            load_binary(&bytes, options)
        }
        result => result,
    }
}

/// Load a JSON model file.
pub fn json_from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let file = fs::File::open(path)?;
    load_json(std::io::BufReader::new(file), options)
}

/// Load a binary model file.
pub fn binary_from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let bytes = fs::read(path)?;
    load_binary(&bytes, options)
}
