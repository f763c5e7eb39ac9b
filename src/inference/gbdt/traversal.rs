//! Tree traversal for prediction.
//!
//! Every tree, whatever format it was loaded from, is walked by the same
//! decision procedure:
//!
//! - numeric splits go left when `fval <= threshold`
//! - NaN is evaluated as 0.0 unless the node treats NaN as missing
//! - a missing value (zero under `MISSING_ZERO`, NaN under `MISSING_NAN`)
//!   follows the node's default direction
//! - categorical splits go left when the integer category is in the node's set;
//!   negative categories always go right
//!
//! Feature indices past the end of the row read as 0.0.

use crate::repr::gbdt::{CategoricalKind, Node, NodeFlags, Tree, bitset, is_zero};

// =============================================================================
// Decisions
// =============================================================================

/// Numeric split decision. Returns `true` for the left child.
#[inline]
pub fn numerical_decision(node: &Node, fval: f64) -> bool {
    let nan = fval.is_nan();
    if nan && !node.flags.contains(NodeFlags::MISSING_NAN) {
        return numerical_decision(node, 0.0);
    }
    if (node.flags.contains(NodeFlags::MISSING_ZERO) && is_zero(fval))
        || (node.flags.contains(NodeFlags::MISSING_NAN) && nan)
    {
        return node.default_left();
    }
    fval <= node.threshold
}

/// Categorical split decision. Returns `true` for the left child.
#[inline]
pub fn categorical_decision(tree: &Tree, node: &Node, fval: f64) -> bool {
    let category = if fval.is_nan() {
        if node.flags.contains(NodeFlags::MISSING_NAN) {
            return false;
        }
        0
    } else {
        let category = fval as i32;
        if category < 0 {
            return false;
        }
        category
    };

    match node.categorical_kind() {
        Some(CategoricalKind::OneHot) => node.threshold as i32 == category,
        Some(CategoricalKind::Small) => bitset::find_in_word(node.threshold as u32, category as u32),
        _ => tree.find_in_pool(node.threshold as u32, category as u32),
    }
}

/// Split decision for any node. Returns `true` for the left child.
#[inline]
pub fn decision(tree: &Tree, node: &Node, fval: f64) -> bool {
    if node.is_categorical() {
        categorical_decision(tree, node, fval)
    } else {
        numerical_decision(node, fval)
    }
}

// =============================================================================
// Traversal
// =============================================================================

/// Walk `tree` with `features` and return the index of the leaf reached.
///
/// Constant trees always return leaf 0.
#[inline]
pub fn traverse_to_leaf(tree: &Tree, features: &[f64]) -> u32 {
    let nodes = tree.nodes();
    if nodes.is_empty() {
        return 0;
    }
    let mut idx = 0usize;
    loop {
        let node = &nodes[idx];
        let fval = features.get(node.feature as usize).copied().unwrap_or(0.0);
        if decision(tree, node, fval) {
            if node.left_is_leaf() {
                return node.left;
            }
            idx = node.left as usize;
        } else {
            if node.right_is_leaf() {
                return node.right;
            }
            idx = node.right as usize;
        }
    }
}

impl Tree {
    /// Leaf value reached by `features`.
    #[inline]
    pub fn predict(&self, features: &[f64]) -> f64 {
        self.leaf_value(traverse_to_leaf(self, features))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::gbdt::{MissingType, bitset::construct_bitset};
    use rstest::rstest;

    fn stump(mut root: Node) -> Tree {
        root.set_left_leaf(0);
        root.set_right_leaf(1);
        Tree::new(vec![root], vec![-1.0, 1.0], Vec::new(), Vec::new())
    }

    #[rstest]
    #[case(0.5, -1.0)]
    #[case(0.49, -1.0)]
    #[case(0.51, 1.0)]
    #[case(f64::NAN, -1.0)] // NaN evaluated as 0.0
    fn numeric_split_inclusive(#[case] fval: f64, #[case] expected: f64) {
        let tree = stump(Node::numerical(0, 0.5, MissingType::None, false));
        assert_eq!(tree.predict(&[fval]), expected);
    }

    #[rstest]
    #[case(MissingType::NaN, true, f64::NAN, -1.0)]
    #[case(MissingType::NaN, false, f64::NAN, 1.0)]
    #[case(MissingType::NaN, false, 0.0, -1.0)]
    #[case(MissingType::Zero, false, 0.0, 1.0)]
    #[case(MissingType::Zero, false, f64::NAN, 1.0)]
    #[case(MissingType::Zero, true, 1e-36, -1.0)]
    #[case(MissingType::Zero, false, -0.5, -1.0)]
    fn missing_policies(
        #[case] missing: MissingType,
        #[case] default_left: bool,
        #[case] fval: f64,
        #[case] expected: f64,
    ) {
        // Threshold 0.0: a plain comparison sends 0.0 left.
        let tree = stump(Node::numerical(0, 0.0, missing, default_left));
        assert_eq!(tree.predict(&[fval]), expected);
    }

    #[test]
    fn short_row_reads_zero() {
        let tree = stump(Node::numerical(3, 0.0, MissingType::None, false));
        assert_eq!(tree.predict(&[]), -1.0);
        assert_eq!(tree.predict(&[5.0]), tree.predict(&[5.0, 0.0, 0.0, 0.0]));
    }

    #[test]
    fn constant_tree_ignores_input() {
        let tree = Tree::constant(0.25);
        assert_eq!(tree.predict(&[]), 0.25);
        assert_eq!(tree.predict(&[f64::NAN, f64::NAN]), 0.25);
        assert_eq!(traverse_to_leaf(&tree, &[1.0]), 0);
    }

    #[test]
    fn categorical_encodings_agree() {
        let check = |set: &[u32]| {
            let words = construct_bitset(set);

            let mut large = Node::categorical(0, 1, MissingType::None, CategoricalKind::Large);
            large.set_left_leaf(0);
            large.set_right_leaf(1);
            // Pool entry 0 is an empty sentinel, entry 1 holds the set.
            let mut boundaries = vec![0u32, 0];
            boundaries.push(words.len() as u32);
            let large_tree = Tree::new(vec![large], vec![-1.0, 1.0], boundaries, words.clone());

            let small_tree = (words.len() == 1).then(|| {
                stump(Node::categorical(0, words[0], MissingType::None, CategoricalKind::Small))
            });
            let one_hot_tree = (set.len() == 1).then(|| {
                stump(Node::categorical(0, set[0], MissingType::None, CategoricalKind::OneHot))
            });

            for category in 0..128u32 {
                let row = [f64::from(category)];
                let expected = if set.contains(&category) { -1.0 } else { 1.0 };
                assert_eq!(large_tree.predict(&row), expected, "large, category {category}");
                if let Some(tree) = &small_tree {
                    assert_eq!(tree.predict(&row), expected, "small, category {category}");
                }
                if let Some(tree) = &one_hot_tree {
                    assert_eq!(tree.predict(&row), expected, "one-hot, category {category}");
                }
            }
        };

        check(&[5]);
        check(&[0]);
        check(&[31]);
        check(&[1, 4, 30]);
        check(&[100]);
        check(&[2, 64, 127]);
    }

    #[rstest]
    #[case(MissingType::None, f64::NAN, -1.0)] // NaN -> category 0
    #[case(MissingType::NaN, f64::NAN, 1.0)]
    #[case(MissingType::None, -1.0, 1.0)]
    #[case(MissingType::None, 0.7, -1.0)] // truncates to 0
    fn categorical_special_values(
        #[case] missing: MissingType,
        #[case] fval: f64,
        #[case] expected: f64,
    ) {
        let tree = stump(Node::categorical(0, 0, missing, CategoricalKind::OneHot));
        assert_eq!(tree.predict(&[fval]), expected);
    }

    #[test]
    fn deeper_tree_uses_explicit_children() {
        // root -> right child is node 2, left child is node 1
        let mut root = Node::numerical(0, 0.0, MissingType::None, false);
        root.set_left_node(1);
        root.set_right_node(2);
        let mut left = Node::numerical(1, 0.0, MissingType::None, false);
        left.set_left_leaf(0);
        left.set_right_leaf(1);
        let mut right = Node::numerical(1, 10.0, MissingType::None, false);
        right.set_left_leaf(2);
        right.set_right_leaf(3);
        let tree = Tree::new(vec![root, left, right], vec![1.0, 2.0, 3.0, 4.0], Vec::new(), Vec::new());

        assert_eq!(tree.predict(&[-1.0, -1.0]), 1.0);
        assert_eq!(tree.predict(&[-1.0, 1.0]), 2.0);
        assert_eq!(tree.predict(&[1.0, 5.0]), 3.0);
        assert_eq!(tree.predict(&[1.0, 50.0]), 4.0);
        assert_eq!(traverse_to_leaf(&tree, &[1.0, 50.0]), 3);
    }
}
