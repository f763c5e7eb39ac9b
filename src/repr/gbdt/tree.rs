//! Canonical tree storage.
//!
//! A [`Tree`] is a flat array of split [`Node`]s rooted at index 0, a flat
//! array of leaf values, and a pool of large categorical bitsets. A tree with
//! no split nodes is a constant tree that always returns `leaf_values[0]`.

use super::bitset;
use super::node::{CategoricalKind, Node};

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeValidationError {
    /// Tree has no leaf values.
    #[error("tree has no leaf values")]
    NoLeaves,
    /// A constant tree must have exactly one leaf.
    #[error("constant tree has {n_leaves} leaves, expected 1")]
    ConstantLeafCount { n_leaves: usize },
    /// A node child slot points past the node array.
    #[error("node {node}: {side} child {child} out of bounds ({n_nodes} nodes)")]
    ChildOutOfBounds {
        node: u32,
        side: &'static str,
        child: u32,
        n_nodes: usize,
    },
    /// A leaf slot points past the leaf array.
    #[error("node {node}: {side} leaf {leaf} out of bounds ({n_leaves} leaves)")]
    LeafOutOfBounds {
        node: u32,
        side: &'static str,
        leaf: u32,
        n_leaves: usize,
    },
    /// A node was reached by more than one path or through a cycle.
    #[error("node {node} reached more than once")]
    DuplicateVisit { node: u32 },
    /// A node exists in storage but is unreachable from the root.
    #[error("node {node} is unreachable from the root")]
    UnreachableNode { node: u32 },
    /// A large categorical split references a missing pool entry.
    #[error("node {node}: categorical pool index {index} out of bounds")]
    CategoryPoolOutOfBounds { node: u32, index: u32 },
}

// ============================================================================
// Tree
// ============================================================================

/// Flattened decision tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    leaf_values: Vec<f64>,
    cat_boundaries: Vec<u32>,
    cat_thresholds: Vec<u32>,
}

impl Tree {
    /// Create a tree from its parts.
    ///
    /// `cat_boundaries` delimits the bitsets stored in `cat_thresholds`: bitset
    /// `i` is `cat_thresholds[cat_boundaries[i]..cat_boundaries[i + 1]]`.
    pub fn new(
        nodes: Vec<Node>,
        leaf_values: Vec<f64>,
        cat_boundaries: Vec<u32>,
        cat_thresholds: Vec<u32>,
    ) -> Self {
        Self {
            nodes,
            leaf_values,
            cat_boundaries,
            cat_thresholds,
        }
    }

    /// A tree without splits that always evaluates to `value`.
    pub fn constant(value: f64) -> Self {
        Self {
            nodes: Vec::new(),
            leaf_values: vec![value],
            cat_boundaries: Vec::new(),
            cat_thresholds: Vec::new(),
        }
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, idx: u32) -> &Node {
        &self.nodes[idx as usize]
    }

    #[inline]
    pub fn leaf_values(&self) -> &[f64] {
        &self.leaf_values
    }

    #[inline]
    pub fn leaf_value(&self, leaf_idx: u32) -> f64 {
        self.leaf_values[leaf_idx as usize]
    }

    #[inline]
    pub fn cat_boundaries(&self) -> &[u32] {
        &self.cat_boundaries
    }

    #[inline]
    pub fn cat_thresholds(&self) -> &[u32] {
        &self.cat_thresholds
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn n_leaves(&self) -> usize {
        self.leaf_values.len()
    }

    /// Returns `true` for a tree without split nodes.
    #[inline]
    pub fn is_constant(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of categorical split nodes.
    pub fn n_categorical(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_categorical()).count()
    }

    /// Membership test of category `pos` in pool bitset `idx`.
    ///
    /// Categories past the stored words are not members.
    #[inline]
    pub fn find_in_pool(&self, idx: u32, pos: u32) -> bool {
        let idx = idx as usize;
        match (self.cat_boundaries.get(idx), self.cat_boundaries.get(idx + 1)) {
            (Some(&start), Some(&end)) => {
                bitset::find_in_bitset(&self.cat_thresholds[start as usize..end as usize], pos)
            }
            _ => false,
        }
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate basic structural invariants for this tree.
    ///
    /// Checks leaf and node bounds, that every node is reachable from the root
    /// exactly once, and that large categorical splits reference the pool.
    pub fn validate(&self) -> Result<(), TreeValidationError> {
        let n_leaves = self.leaf_values.len();
        if n_leaves == 0 {
            return Err(TreeValidationError::NoLeaves);
        }
        let n_nodes = self.nodes.len();
        if n_nodes == 0 {
            if n_leaves != 1 {
                return Err(TreeValidationError::ConstantLeafCount { n_leaves });
            }
            return Ok(());
        }

        let mut visited = vec![false; n_nodes];
        let mut stack: Vec<u32> = vec![0];

        while let Some(node_idx) = stack.pop() {
            let seen = &mut visited[node_idx as usize];
            if *seen {
                return Err(TreeValidationError::DuplicateVisit { node: node_idx });
            }
            *seen = true;

            let node = &self.nodes[node_idx as usize];
            if node.categorical_kind() == Some(CategoricalKind::Large) {
                let index = node.threshold as u32;
                if index as usize + 1 >= self.cat_boundaries.len() {
                    return Err(TreeValidationError::CategoryPoolOutOfBounds {
                        node: node_idx,
                        index,
                    });
                }
            }

            for (side, child, is_leaf) in [
                ("right", node.right, node.right_is_leaf()),
                ("left", node.left, node.left_is_leaf()),
            ] {
                if is_leaf {
                    if child as usize >= n_leaves {
                        return Err(TreeValidationError::LeafOutOfBounds {
                            node: node_idx,
                            side,
                            leaf: child,
                            n_leaves,
                        });
                    }
                } else if child as usize >= n_nodes {
                    return Err(TreeValidationError::ChildOutOfBounds {
                        node: node_idx,
                        side,
                        child,
                        n_nodes,
                    });
                } else {
                    stack.push(child);
                }
            }
        }

        if let Some(node) = visited.iter().position(|&v| !v) {
            return Err(TreeValidationError::UnreachableNode { node: node as u32 });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::gbdt::MissingType;

    fn stump(threshold: f64, left: f64, right: f64) -> Tree {
        let mut root = Node::numerical(0, threshold, MissingType::None, false);
        root.set_left_leaf(0);
        root.set_right_leaf(1);
        Tree::new(vec![root], vec![left, right], Vec::new(), Vec::new())
    }

    #[test]
    fn constant_tree() {
        let tree = Tree::constant(1.5);
        assert!(tree.is_constant());
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(tree.leaf_value(0), 1.5);
        assert_eq!(tree.validate(), Ok(()));
    }

    #[test]
    fn validate_stump() {
        assert_eq!(stump(0.5, 1.0, 2.0).validate(), Ok(()));
    }

    #[test]
    fn validate_rejects_empty_and_bad_constant() {
        let empty = Tree::new(Vec::new(), Vec::new(), Vec::new(), Vec::new());
        assert_eq!(empty.validate(), Err(TreeValidationError::NoLeaves));

        let two = Tree::new(Vec::new(), vec![1.0, 2.0], Vec::new(), Vec::new());
        assert_eq!(
            two.validate(),
            Err(TreeValidationError::ConstantLeafCount { n_leaves: 2 })
        );
    }

    #[test]
    fn validate_rejects_leaf_out_of_bounds() {
        let mut tree = stump(0.5, 1.0, 2.0);
        tree.nodes[0].set_right_leaf(5);
        assert!(matches!(
            tree.validate(),
            Err(TreeValidationError::LeafOutOfBounds { leaf: 5, .. })
        ));
    }

    #[test]
    fn validate_rejects_cycle() {
        let mut root = Node::numerical(0, 0.5, MissingType::None, false);
        root.set_left_node(0);
        root.set_right_leaf(0);
        let tree = Tree::new(vec![root], vec![1.0], Vec::new(), Vec::new());
        assert_eq!(
            tree.validate(),
            Err(TreeValidationError::DuplicateVisit { node: 0 })
        );
    }

    #[test]
    fn validate_rejects_unreachable() {
        let mut tree = stump(0.5, 1.0, 2.0);
        tree.nodes.push(Node::numerical(0, 0.0, MissingType::None, false));
        assert_eq!(
            tree.validate(),
            Err(TreeValidationError::UnreachableNode { node: 1 })
        );
    }

    #[test]
    fn find_in_pool_respects_boundaries() {
        let mut root = Node::categorical(0, 1, MissingType::None, CategoricalKind::Large);
        root.set_left_leaf(0);
        root.set_right_leaf(1);
        // Pool: bitset 0 = [1], bitset 1 = [0, 0, 0, 16] (category 100).
        let tree = Tree::new(vec![root], vec![1.0, 2.0], vec![0, 1, 5], vec![1, 0, 0, 0, 16]);
        assert!(tree.find_in_pool(0, 0));
        assert!(!tree.find_in_pool(0, 32));
        assert!(tree.find_in_pool(1, 100));
        assert!(!tree.find_in_pool(1, 0));
        assert!(!tree.find_in_pool(1, 200));
        assert!(!tree.find_in_pool(7, 0));
        assert_eq!(tree.validate(), Ok(()));
    }
}
