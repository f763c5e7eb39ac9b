//! Conversion of fitted regression trees into canonical trees.

use crate::compat::reindex::{FlatSplit, reindex};
use crate::repr::gbdt::{MissingType, Node, Tree, TreeValidationError};

use super::extract::SklearnTree;

/// Error while converting one scikit-learn tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("tree has no nodes")]
    NoNodes,

    #[error("tree has {leaves} leaves for {splits} splits")]
    LeafCount { leaves: usize, splits: usize },

    #[error("split {node} has negative feature {feature}")]
    NegativeFeature { node: usize, feature: i64 },

    #[error("split {node} has invalid {side} child {child}")]
    InvalidChild {
        node: usize,
        side: &'static str,
        child: i64,
    },

    #[error(transparent)]
    Invalid(#[from] TreeValidationError),
}

/// Convert one tree, mapping each leaf value `v` to `v * scale + base`.
///
/// Splits are numerical `x <= threshold` tests without missing-value
/// handling.
pub(super) fn convert_tree(tree: &SklearnTree, scale: f64, base: f64) -> Result<Tree, TreeError> {
    let nodes = &tree.nodes;
    let leaf = |idx: usize| tree.values[idx] * scale + base;

    let leaves = nodes.iter().filter(|n| n.is_leaf()).count();
    let splits = nodes.len() - leaves;
    if nodes.is_empty() {
        return Err(TreeError::NoNodes);
    }
    if leaves != splits + 1 {
        return Err(TreeError::LeafCount { leaves, splits });
    }
    if splits == 0 {
        return Ok(Tree::constant(leaf(0)));
    }

    let child = |node: usize, id: i64, side: &'static str| {
        usize::try_from(id)
            .ok()
            .filter(|&c| c < nodes.len())
            .ok_or(TreeError::InvalidChild { node, side, child: id })
    };

    let mut leaf_values = Vec::with_capacity(leaves);
    let converted = reindex(nodes.len(), 0, |idx| {
        let src = &nodes[idx];
        let feature = u32::try_from(src.feature).map_err(|_| TreeError::NegativeFeature {
            node: idx,
            feature: src.feature,
        })?;
        let mut node = Node::numerical(feature, src.threshold, MissingType::None, false);

        let left = child(idx, src.left_child, "left")?;
        let right = child(idx, src.right_child, "right")?;
        let left_is_leaf = nodes[left].is_leaf();
        let right_is_leaf = nodes[right].is_leaf();
        if left_is_leaf {
            node.set_left_leaf(leaf_values.len() as u32);
            leaf_values.push(leaf(left));
        }
        if right_is_leaf {
            node.set_right_leaf(leaf_values.len() as u32);
            leaf_values.push(leaf(right));
        }

        Ok::<_, TreeError>(FlatSplit {
            node,
            left: (!left_is_leaf).then_some(left),
            right: (!right_is_leaf).then_some(right),
        })
    })?;

    let tree = Tree::new(converted, leaf_values, Vec::new(), Vec::new());
    tree.validate()?;
    Ok(tree)
}
