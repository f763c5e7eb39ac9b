//! LightGBM model format support.
//!
//! Two encodings of the same model are read:
//! - **Text** (`Booster.save_model()`): a header block of `key=value` lines
//!   followed by one block per tree, with trees stored as parallel arrays.
//! - **JSON** (`Booster.dump_model()`): each tree as a nested
//!   `tree_structure` object.
//!
//! Both normalize to the same canonical [`Tree`](crate::repr::gbdt::Tree)
//! layout. Trees are grouped by fixed striding: tree `i` belongs to output
//! group `i % num_tree_per_iteration`.
//!
//! Differences from XGBoost worth knowing:
//! - Leaf indices are encoded as negative values in the child arrays.
//! - `decision_type` packs the categorical flag, default direction and
//!   missing type into one integer.
//! - Categorical splits reference bitsets, inline or in a per-tree pool.
//!
//! # Example
//!
//! ```ignore
//! use canopy::compat::lightgbm;
//! use canopy::model::{LoadOptions, PredictOptions};
//!
//! let model = lightgbm::from_file("model.txt", &LoadOptions::with_transform())?;
//! let score = model.predict_single(&[0.0, 1.5], &PredictOptions::default())?;
//! ```

mod convert;
mod json;
mod text;

pub use convert::TreeError;
pub use json::{json_from_file, load_json};
pub use text::{from_file, load_text};

use crate::io::ParamsError;
use crate::model::TransformMismatch;
use crate::repr::gbdt::ForestValidationError;

/// Error while loading a LightGBM model.
#[derive(Debug, thiserror::Error)]
pub enum LightGbmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Params(#[from] ParamsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported {field}: {actual}")]
    Unsupported { field: &'static str, actual: String },

    #[error("num_class ({num_class}) and num_tree_per_iteration ({num_tree_per_iteration}) must be equal and positive")]
    GroupMismatch {
        num_class: i64,
        num_tree_per_iteration: i64,
    },

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("model has no trees")]
    NoTrees,

    #[error("{n_trees} trees cannot be split into {n_groups} groups")]
    TreeCount { n_trees: usize, n_groups: usize },

    #[error("unsupported objective {0:?}")]
    UnsupportedObjective(String),

    #[error("output transforms are not available for JSON models")]
    TransformUnsupported,

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
