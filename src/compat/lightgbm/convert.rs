//! Node conversion shared by the LightGBM text and JSON readers.

use crate::io::ParamsError;
use crate::repr::gbdt::bitset::{count_set_bits, first_set_bit};
use crate::repr::gbdt::{CategoricalKind, MissingType, Node, Tree, TreeValidationError};

// =============================================================================
// Error types
// =============================================================================

/// Error while converting one LightGBM tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error(transparent)]
    Params(#[from] ParamsError),
    #[error("num_leaves must be at least 1 (got {0})")]
    NoLeaves(i64),
    #[error("array size mismatch for {field}: expected {expected}, got {actual}")]
    ArraySizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("unknown missing type {0}")]
    UnknownMissingType(String),
    #[error("unknown decision type {0:?}")]
    UnknownDecisionType(String),
    #[error("categorical split at node {node} has no bits set")]
    NoBitsSet { node: usize },
    #[error("categorical split at node {node} references bitset {index}, but {n_cat} are stored")]
    CategoryIndexOutOfRange { node: usize, index: usize, n_cat: usize },
    #[error("invalid threshold at node {node}: {message}")]
    InvalidThreshold { node: usize, message: String },
    #[error("node is neither a split nor a leaf: {0}")]
    UnknownNode(String),
    #[error("malformed node: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] TreeValidationError),
}

/// Fail unless `actual == expected`.
pub(super) fn check_len(field: &'static str, actual: usize, expected: usize) -> Result<(), TreeError> {
    if actual != expected {
        return Err(TreeError::ArraySizeMismatch {
            field,
            expected,
            actual,
        });
    }
    Ok(())
}

// =============================================================================
// Decision type
// =============================================================================

/// Decoded `decision_type` bitfield of the text format.
///
/// Bit 0 marks a categorical split, bit 1 default-left, bits 2-3 the missing
/// type (0 none, 1 zero, 2 NaN).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DecisionType {
    pub categorical: bool,
    pub default_left: bool,
    pub missing: MissingType,
}

impl DecisionType {
    pub fn from_bits(bits: u32) -> Result<Self, TreeError> {
        let missing = match (bits >> 2) & 3 {
            0 => MissingType::None,
            1 => MissingType::Zero,
            2 => MissingType::NaN,
            other => return Err(TreeError::UnknownMissingType(other.to_string())),
        };
        Ok(Self {
            categorical: bits & 1 != 0,
            default_left: bits & 2 != 0,
            missing,
        })
    }
}

/// Missing type name used by the JSON dump.
pub(super) fn missing_from_name(name: &str) -> Result<MissingType, TreeError> {
    match name {
        "None" => Ok(MissingType::None),
        "Zero" => Ok(MissingType::Zero),
        "NaN" => Ok(MissingType::NaN),
        other => Err(TreeError::UnknownMissingType(format!("{other:?}"))),
    }
}

// =============================================================================
// Categorical splits
// =============================================================================

/// Large category bitsets of the tree being built.
#[derive(Debug, Default)]
pub(super) struct CategoryPool {
    boundaries: Vec<u32>,
    thresholds: Vec<u32>,
}

impl CategoryPool {
    /// Store `words` and return their pool index.
    fn push(&mut self, words: &[u32]) -> u32 {
        if self.boundaries.is_empty() {
            self.boundaries.push(0);
        }
        let index = (self.boundaries.len() - 1) as u32;
        self.thresholds.extend_from_slice(words);
        self.boundaries.push(self.thresholds.len() as u32);
        index
    }

    /// Assemble and validate the finished tree.
    pub fn finish(self, nodes: Vec<Node>, leaf_values: Vec<f64>) -> Result<Tree, TreeError> {
        let tree = Tree::new(nodes, leaf_values, self.boundaries, self.thresholds);
        tree.validate()?;
        Ok(tree)
    }
}

/// Categorical node for the category set `words`.
///
/// A single category becomes a one-hot test, a set that fits one word is
/// stored inline, anything larger goes to the pool.
pub(super) fn categorical_node(
    node_idx: usize,
    feature: u32,
    words: &[u32],
    missing: MissingType,
    pool: &mut CategoryPool,
) -> Result<Node, TreeError> {
    let node = match count_set_bits(words) {
        0 => return Err(TreeError::NoBitsSet { node: node_idx }),
        1 => {
            let category = first_set_bit(words).ok_or(TreeError::NoBitsSet { node: node_idx })?;
            Node::categorical(feature, category, missing, CategoricalKind::OneHot)
        }
        _ if words.len() == 1 => Node::categorical(feature, words[0], missing, CategoricalKind::Small),
        _ => {
            let index = pool.push(words);
            Node::categorical(feature, index, missing, CategoricalKind::Large)
        }
    };
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::gbdt::NodeFlags;

    #[test]
    fn decision_type_bits() {
        let dt = DecisionType::from_bits(9).unwrap();
        assert!(dt.categorical);
        assert!(!dt.default_left);
        assert_eq!(dt.missing, MissingType::NaN);

        let dt = DecisionType::from_bits(2).unwrap();
        assert!(!dt.categorical);
        assert!(dt.default_left);
        assert_eq!(dt.missing, MissingType::None);

        let dt = DecisionType::from_bits(4 | 2).unwrap();
        assert_eq!(dt.missing, MissingType::Zero);

        assert!(matches!(
            DecisionType::from_bits(12),
            Err(TreeError::UnknownMissingType(_))
        ));
    }

    #[test]
    fn categorical_encodings() {
        let mut pool = CategoryPool::default();

        let one_hot = categorical_node(0, 1, &[0, 0, 0, 16], MissingType::NaN, &mut pool).unwrap();
        assert_eq!(one_hot.categorical_kind(), Some(CategoricalKind::OneHot));
        assert_eq!(one_hot.threshold, 100.0);
        assert!(one_hot.flags.contains(NodeFlags::MISSING_NAN));

        let small = categorical_node(1, 1, &[0b1010], MissingType::None, &mut pool).unwrap();
        assert_eq!(small.categorical_kind(), Some(CategoricalKind::Small));
        assert_eq!(small.threshold, 10.0);

        let large = categorical_node(2, 1, &[1, 1], MissingType::None, &mut pool).unwrap();
        assert_eq!(large.categorical_kind(), Some(CategoricalKind::Large));
        assert_eq!(large.threshold, 0.0);
        let second = categorical_node(3, 1, &[0, 3, 4], MissingType::None, &mut pool).unwrap();
        assert_eq!(second.threshold, 1.0);

        assert_eq!(pool.boundaries, vec![0, 2, 5]);
        assert_eq!(pool.thresholds, vec![1, 1, 0, 3, 4]);

        assert!(matches!(
            categorical_node(4, 1, &[0, 0], MissingType::None, &mut pool),
            Err(TreeError::NoBitsSet { node: 4 })
        ));
    }

    #[test]
    fn missing_names() {
        assert_eq!(missing_from_name("NaN").unwrap(), MissingType::NaN);
        assert_eq!(missing_from_name("Zero").unwrap(), MissingType::Zero);
        assert_eq!(missing_from_name("None").unwrap(), MissingType::None);
        assert!(missing_from_name("nan").is_err());
    }
}
