//! Gradient-boosted decision tree (GBDT) canonical representations.

pub mod bitset;
pub mod forest;
pub mod node;
pub mod tree;

pub use forest::{Forest, ForestValidationError};
pub use node::{CategoricalKind, MissingType, Node, NodeFlags, ZERO_THRESHOLD, is_zero};
pub use tree::{Tree, TreeValidationError};
