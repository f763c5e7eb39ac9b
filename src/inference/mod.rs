//! Inference infrastructure for loaded models.
//!
//! # Module Structure
//!
//! - [`gbdt`]: Tree decisions, traversal and per-row forest accumulation
//! - [`gblinear`]: Linear model inference
//! - [`batch`]: Batched, multi-threaded evaluation over dense and CSR matrices

pub mod batch;
pub mod gbdt;
pub mod gblinear;

pub use batch::{BATCH_SIZE, RowScorer, predict_csr, predict_dense};
pub use gbdt::{Predictor, traverse_to_leaf};
pub use gblinear::LinearModelPredict;
