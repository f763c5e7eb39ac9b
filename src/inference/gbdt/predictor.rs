//! Row-level forest evaluation.
//!
//! [`Predictor`] accumulates tree outputs for one feature row. Batching,
//! sparse scratch handling and threading live in [`crate::inference::batch`].

use crate::repr::gbdt::Forest;

use super::traversal::traverse_to_leaf;

/// Evaluates a [`Forest`] one row at a time.
#[derive(Debug, Clone, Copy)]
pub struct Predictor<'f> {
    forest: &'f Forest,
}

impl<'f> Predictor<'f> {
    #[inline]
    pub fn new(forest: &'f Forest) -> Self {
        Self { forest }
    }

    /// Get a reference to the underlying forest.
    #[inline]
    pub fn forest(&self) -> &'f Forest {
        self.forest
    }

    /// Number of output groups.
    #[inline]
    pub fn n_groups(&self) -> usize {
        self.forest.n_groups()
    }

    /// Number of trees used for `n_rounds` rounds.
    #[inline]
    pub fn n_trees_used(&self, n_rounds: usize) -> usize {
        (n_rounds * self.forest.n_groups()).min(self.forest.n_trees())
    }

    /// Raw scores of the first `n_rounds` rounds.
    ///
    /// `n_rounds` is used as given; resolve it with [`Forest::adjust_rounds`]
    /// first. Every group starts at the base score, then tree `i` adds
    /// `leaf * weights[i]` to group `tree_groups[i]`. Averaged forests scale
    /// each contribution by `1 / n_rounds`.
    pub fn predict_row_into(&self, features: &[f64], n_rounds: usize, output: &mut [f64]) {
        assert_eq!(output.len(), self.n_groups(), "output length must equal n_groups");

        output.fill(self.forest.base_score());

        let coef = if self.forest.average_output() && n_rounds > 0 {
            1.0 / n_rounds as f64
        } else {
            1.0
        };

        let n_trees = self.n_trees_used(n_rounds);
        for (tree, group, weight) in self.forest.trees_with_groups().take(n_trees) {
            output[group as usize] += tree.predict(features) * weight * coef;
        }
    }

    /// Leaf index reached in each of the first `n_rounds` rounds' trees.
    pub fn predict_leaf_indices_into(&self, features: &[f64], n_rounds: usize, output: &mut [u32]) {
        let n_trees = self.n_trees_used(n_rounds);
        assert_eq!(output.len(), n_trees, "output length must equal the number of trees used");

        for (out, tree) in output.iter_mut().zip(self.forest.trees()) {
            *out = traverse_to_leaf(tree, features);
        }
    }
}
