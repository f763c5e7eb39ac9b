//! Loaders for models trained by other libraries.
//!
//! - [`lightgbm`]: `save_model()` text and `dump_model()` JSON
//! - [`xgboost`]: JSON and legacy binary (`gbtree`, `dart`, `gblinear`)
//! - [`sklearn`]: pickled `GradientBoostingClassifier`
//!
//! Each loader produces an [`Ensemble`](crate::model::Ensemble).

pub mod lightgbm;
pub mod sklearn;
pub mod xgboost;

pub(crate) mod reindex;
