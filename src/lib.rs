//! canopy: gradient boosted model inference for Rust.
//!
//! Loads models trained by LightGBM, XGBoost and scikit-learn into one
//! canonical tree representation and predicts over dense or sparse
//! feature matrices.
//!
//! # Key Types
//!
//! - [`Ensemble`] - A loaded model with its output transform
//! - [`LoadOptions`] / [`PredictOptions`] - Loading and prediction settings
//! - [`Forest`] / [`Tree`] - The canonical tree representation
//! - [`CsrView`] - Sparse input rows
//!
//! # Loading Models
//!
//! Use [`Ensemble::from_file`] with a [`ModelFormat`], or the format-specific
//! entry points in [`compat`].
//!
//! ```ignore
//! use canopy::{Ensemble, LoadOptions, ModelFormat, PredictOptions};
//!
//! let model = Ensemble::from_file("model.json", ModelFormat::Xgboost, &LoadOptions::with_transform())?;
//! let mut out = vec![0.0; n_rows * model.n_outputs()];
//! model.predict_dense(features.view(), &PredictOptions::default(), &mut out)?;
//! ```

// Re-export approx traits for users who want to compare predictions
pub use approx;

pub mod compat;
pub mod data;
pub mod error;
pub mod inference;
pub mod io;
pub mod model;
pub mod repr;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

// Models and options
pub use model::{Booster, Ensemble, LoadOptions, ModelFormat, OutputTransform, PredictOptions};

// Errors
pub use error::{LoadError, PredictError};

// Canonical representation
pub use repr::gbdt::{Forest, Node, Tree};
pub use repr::gblinear::LinearModel;

// Input data
pub use data::{CsrMatrix, CsrView};

// Shared utilities
pub use utils::{Parallelism, run_with_threads};
