//! Canonical forest representation (collection of trees).

use super::tree::{Tree, TreeValidationError};

/// Structural validation errors for [`Forest`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ForestValidationError {
    #[error("forest must have at least one output group")]
    NoGroups,
    #[error("{n_trees} trees is not a multiple of {n_groups} groups")]
    TreesNotMultipleOfGroups { n_trees: usize, n_groups: usize },
    #[error("tree_groups has {len} entries for {n_trees} trees")]
    TreeGroupsLenMismatch { n_trees: usize, len: usize },
    #[error("weights has {len} entries for {n_trees} trees")]
    WeightsLenMismatch { n_trees: usize, len: usize },
    #[error("tree {tree_idx} assigned to group {group} of {n_groups}")]
    TreeGroupOutOfRange {
        tree_idx: usize,
        group: u32,
        n_groups: usize,
    },
    #[error("tree {tree_idx} splits on feature {feature} past max_feature_idx {max_feature_idx}")]
    FeatureOutOfRange {
        tree_idx: usize,
        feature: u32,
        max_feature_idx: u32,
    },
    #[error("tree {tree_idx}: {error}")]
    InvalidTree {
        tree_idx: usize,
        #[source]
        error: TreeValidationError,
    },
}

/// Forest of decision trees.
///
/// Stores trees with their output group, a per-tree weight (1.0 unless the
/// source model is DART) and a scalar base score shared by all groups. Tree
/// `i` contributes `leaf * weights[i]` to output `tree_groups[i]`.
#[derive(Debug, Clone)]
pub struct Forest {
    trees: Vec<Tree>,
    tree_groups: Vec<u32>,
    weights: Vec<f64>,
    n_groups: usize,
    base_score: f64,
    max_feature_idx: u32,
    average_output: bool,
    absent_value: f64,
}

impl Forest {
    /// Create an empty forest with the given number of groups.
    pub fn new(n_groups: usize) -> Self {
        Self {
            trees: Vec::new(),
            tree_groups: Vec::new(),
            weights: Vec::new(),
            n_groups,
            base_score: 0.0,
            max_feature_idx: 0,
            average_output: false,
            absent_value: 0.0,
        }
    }

    /// Create a forest for regression (single output group).
    pub fn for_regression() -> Self {
        Self::new(1)
    }

    /// Set the base score added to every group.
    pub fn with_base_score(mut self, base_score: f64) -> Self {
        self.base_score = base_score;
        self
    }

    /// Set the highest feature index the model reads.
    pub fn with_max_feature_idx(mut self, max_feature_idx: u32) -> Self {
        self.max_feature_idx = max_feature_idx;
        self
    }

    /// Average tree outputs over the rounds used (random forest mode).
    pub fn with_average_output(mut self, average_output: bool) -> Self {
        self.average_output = average_output;
        self
    }

    /// Value used for features absent from a sparse row.
    pub fn with_absent_value(mut self, absent_value: f64) -> Self {
        self.absent_value = absent_value;
        self
    }

    /// Add a tree with unit weight.
    pub fn push_tree(&mut self, tree: Tree, group: u32) {
        self.push_weighted_tree(tree, group, 1.0);
    }

    /// Add a tree with an explicit weight.
    pub fn push_weighted_tree(&mut self, tree: Tree, group: u32, weight: f64) {
        debug_assert!((group as usize) < self.n_groups, "group out of range");
        self.trees.push(tree);
        self.tree_groups.push(group);
        self.weights.push(weight);
    }

    /// Number of trees.
    #[inline]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Number of output groups.
    #[inline]
    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    /// Number of boosting rounds (trees per group).
    #[inline]
    pub fn n_rounds(&self) -> usize {
        self.trees.len() / self.n_groups.max(1)
    }

    /// Number of features the model reads.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.max_feature_idx as usize + 1
    }

    #[inline]
    pub fn max_feature_idx(&self) -> u32 {
        self.max_feature_idx
    }

    #[inline]
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    #[inline]
    pub fn average_output(&self) -> bool {
        self.average_output
    }

    #[inline]
    pub fn absent_value(&self) -> f64 {
        self.absent_value
    }

    /// Get a reference to a specific tree.
    #[inline]
    pub fn tree(&self, idx: usize) -> &Tree {
        &self.trees[idx]
    }

    /// Get all tree group assignments as a slice.
    #[inline]
    pub fn tree_groups(&self) -> &[u32] {
        &self.tree_groups
    }

    #[inline]
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Iterate over trees.
    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }

    /// Iterate over trees with their group and weight.
    pub fn trees_with_groups(&self) -> impl Iterator<Item = (&Tree, u32, f64)> {
        self.trees
            .iter()
            .zip(self.tree_groups.iter())
            .zip(self.weights.iter())
            .map(|((t, &g), &w)| (t, g, w))
    }

    /// Resolve a requested round count.
    ///
    /// `0` means all rounds; anything above the total is clamped.
    #[inline]
    pub fn adjust_rounds(&self, requested: usize) -> usize {
        let total = self.n_rounds();
        if requested == 0 { total } else { requested.min(total) }
    }

    /// Validate structural invariants for this forest (trees, group assignments, weights).
    pub fn validate(&self) -> Result<(), ForestValidationError> {
        if self.n_groups == 0 {
            return Err(ForestValidationError::NoGroups);
        }
        let n_trees = self.trees.len();
        if n_trees % self.n_groups != 0 {
            return Err(ForestValidationError::TreesNotMultipleOfGroups {
                n_trees,
                n_groups: self.n_groups,
            });
        }
        if self.tree_groups.len() != n_trees {
            return Err(ForestValidationError::TreeGroupsLenMismatch {
                n_trees,
                len: self.tree_groups.len(),
            });
        }
        if self.weights.len() != n_trees {
            return Err(ForestValidationError::WeightsLenMismatch {
                n_trees,
                len: self.weights.len(),
            });
        }

        for (i, &g) in self.tree_groups.iter().enumerate() {
            if g as usize >= self.n_groups {
                return Err(ForestValidationError::TreeGroupOutOfRange {
                    tree_idx: i,
                    group: g,
                    n_groups: self.n_groups,
                });
            }
        }

        for (i, tree) in self.trees.iter().enumerate() {
            tree.validate()
                .map_err(|e| ForestValidationError::InvalidTree { tree_idx: i, error: e })?;
            if let Some(node) = tree.nodes().iter().find(|n| n.feature > self.max_feature_idx) {
                return Err(ForestValidationError::FeatureOutOfRange {
                    tree_idx: i,
                    feature: node.feature,
                    max_feature_idx: self.max_feature_idx,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repr::gbdt::{MissingType, Node};

    #[test]
    fn forest_rounds_and_groups() {
        let mut forest = Forest::new(3);
        for i in 0..6u32 {
            forest.push_tree(Tree::constant(i as f64), i % 3);
        }
        assert_eq!(forest.n_trees(), 6);
        assert_eq!(forest.n_rounds(), 2);
        assert_eq!(forest.tree_groups(), &[0, 1, 2, 0, 1, 2]);
        assert_eq!(forest.weights(), &[1.0; 6]);
        assert_eq!(forest.validate(), Ok(()));
    }

    #[test]
    fn adjust_rounds_clamps() {
        let mut forest = Forest::new(2);
        for i in 0..10u32 {
            forest.push_tree(Tree::constant(0.0), i % 2);
        }
        assert_eq!(forest.adjust_rounds(0), 5);
        assert_eq!(forest.adjust_rounds(3), 3);
        assert_eq!(forest.adjust_rounds(5), 5);
        assert_eq!(forest.adjust_rounds(100), 5);
    }

    #[test]
    fn validate_rejects_partial_round() {
        let mut forest = Forest::new(2);
        forest.push_tree(Tree::constant(0.0), 0);
        assert_eq!(
            forest.validate(),
            Err(ForestValidationError::TreesNotMultipleOfGroups { n_trees: 1, n_groups: 2 })
        );
    }

    #[test]
    fn validate_reports_invalid_tree() {
        let mut forest = Forest::for_regression();
        forest.push_tree(Tree::new(Vec::new(), Vec::new(), Vec::new(), Vec::new()), 0);
        assert!(matches!(
            forest.validate(),
            Err(ForestValidationError::InvalidTree { tree_idx: 0, .. })
        ));
    }

    #[test]
    fn validate_rejects_feature_past_max() {
        let mut node = Node::numerical(3, 0.5, MissingType::None, false);
        node.set_left_leaf(0);
        node.set_right_leaf(1);
        let tree = Tree::new(vec![node], vec![-1.0, 1.0], Vec::new(), Vec::new());

        let mut forest = Forest::for_regression().with_max_feature_idx(2);
        forest.push_tree(tree.clone(), 0);
        assert_eq!(
            forest.validate(),
            Err(ForestValidationError::FeatureOutOfRange {
                tree_idx: 0,
                feature: 3,
                max_feature_idx: 2
            })
        );

        let mut forest = Forest::for_regression().with_max_feature_idx(3);
        forest.push_tree(tree, 0);
        assert_eq!(forest.validate(), Ok(()));
    }

    #[test]
    fn builder_settings() {
        let forest = Forest::for_regression()
            .with_base_score(0.5)
            .with_max_feature_idx(9)
            .with_average_output(true)
            .with_absent_value(f64::NAN);
        assert_eq!(forest.base_score(), 0.5);
        assert_eq!(forest.n_features(), 10);
        assert!(forest.average_output());
        assert!(forest.absent_value().is_nan());
        assert_eq!(forest.n_rounds(), 0);
    }
}
