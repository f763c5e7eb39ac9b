//! Loaded models and their prediction API.
//!
//! # Overview
//!
//! - [`Ensemble`]: a booster plus output transform, returned by every loader
//! - [`OutputTransform`]: raw-score to output mapping (logistic, softmax, ...)
//! - [`LoadOptions`] / [`PredictOptions`]: per-call configuration
//!
//! # Example
//!
//! ```ignore
//! use canopy::model::{Ensemble, LoadOptions, ModelFormat, PredictOptions};
//!
//! let model = Ensemble::from_file("model.txt", ModelFormat::LightGbmText, &LoadOptions::with_transform())?;
//! let options = PredictOptions::builder().n_threads(4).build();
//! let predictions = model.predict_dense_alloc(features.view(), &options)?;
//! ```

mod ensemble;
mod options;
mod transform;

pub use ensemble::{Booster, Ensemble, ModelFormat};
pub use options::{LoadOptions, PredictOptions};
pub use transform::{OutputTransform, TransformMismatch, sigmoid, softmax_inplace};
