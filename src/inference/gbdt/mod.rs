//! GBDT inference: decisions, traversal and per-row accumulation.

mod predictor;
mod traversal;

pub use predictor::Predictor;
pub use traversal::{categorical_decision, decision, numerical_decision, traverse_to_leaf};
