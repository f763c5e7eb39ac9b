//! Crate-level error types.
//!
//! Each loader has its own error enum next to it; [`LoadError`] wraps them
//! for callers that dispatch on the format at runtime.

use thiserror::Error;

use crate::compat::lightgbm::LightGbmError;
use crate::compat::sklearn::SklearnError;
use crate::compat::xgboost::XgboostError;
use crate::data::CsrError;

/// Error from loading a model of any supported format.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("lightgbm: {0}")]
    LightGbm(#[from] LightGbmError),

    #[error("xgboost: {0}")]
    Xgboost(#[from] XgboostError),

    #[error("sklearn: {0}")]
    Sklearn(#[from] SklearnError),
}

/// Error from a prediction call.
///
/// Raised before any tree is walked, so the output buffer is left untouched.
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("output buffer too short: need {required} values, got {actual}")]
    OutputTooShort { required: usize, actual: usize },

    #[error("feature matrix has {actual} columns, model reads {required}")]
    TooFewColumns { required: usize, actual: usize },

    #[error("invalid CSR input: {0}")]
    InvalidCsr(#[from] CsrError),

    #[error("{0} is not supported for this model")]
    Unsupported(&'static str),

    #[error("failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
