//! Conversion of XGBoost boosters into canonical models.
//!
//! The binary and JSON readers both reduce a booster to the binary layout
//! (a [`TreeParam`] plus a flat [`BinaryNode`] array per tree) and hand it
//! here, so tree building and ensemble assembly are shared.

use crate::compat::reindex::{FlatSplit, reindex};
use crate::io::binary::{BinaryNode, BinaryReadError, TreeParam};
use crate::model::{Ensemble, LoadOptions, OutputTransform};
use crate::repr::gbdt::{Forest, MissingType, Node, Tree, TreeValidationError};
use crate::repr::gblinear::LinearModel;

use super::XgboostError;

// =============================================================================
// Error types
// =============================================================================

/// Error while converting one XGBoost tree.
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    #[error("tree number of features {tree}, but header number of features {header}")]
    FeatureMismatch { tree: i32, header: u32 },

    #[error("only trees with 1 root are supported (got {0})")]
    Roots(i32),

    #[error("tree has zero nodes")]
    NoNodes,

    #[error("array size mismatch for {field}: expected {expected}, got {actual}")]
    ArraySizeMismatch {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("split node {node} has a negative {side} child")]
    NegativeChild { node: usize, side: &'static str },

    #[error("categorical split at node {node} is not supported")]
    CategoricalSplit { node: usize },

    #[error(transparent)]
    Read(#[from] BinaryReadError),

    #[error(transparent)]
    Invalid(#[from] TreeValidationError),
}

// =============================================================================
// Learner parameters
// =============================================================================

/// Raw output groups for a learner `num_class`; 0 means a single group.
pub(super) fn n_groups(num_class: i64) -> usize {
    if num_class > 0 { num_class as usize } else { 1 }
}

/// `num_feature` of the learner, which must be positive.
pub(super) fn n_features(num_feature: i64) -> Result<u32, XgboostError> {
    match u32::try_from(num_feature) {
        Ok(0) | Err(_) => Err(XgboostError::NoFeatures),
        Ok(n) => Ok(n),
    }
}

/// Booster name as exposed by [`Ensemble::name`].
pub(super) fn model_name(booster: &str) -> Result<&'static str, XgboostError> {
    match booster {
        "gbtree" => Ok("xgboost.gbtree"),
        "dart" => Ok("xgboost.dart"),
        "gblinear" => Ok("xgboost.gblinear"),
        other => Err(XgboostError::UnsupportedBooster(other.to_string())),
    }
}

/// Convert a stored `base_score` into margin space.
///
/// Models written by XGBoost >= 1.0 keep `base_score` in the space of the
/// objective's output, so it is mapped back through the inverse link.
pub(super) fn base_margin(objective: &str, base_score: f32) -> f64 {
    let p = f64::from(base_score);
    match objective {
        "binary:logistic" | "reg:logistic" | "binary:logitraw" => (p / (1.0 - p)).ln(),
        "count:poisson" | "reg:gamma" | "reg:tweedie" => p.ln(),
        _ => p,
    }
}

/// Output transform for an objective name.
pub(super) fn objective_transform(objective: &str) -> Result<OutputTransform, XgboostError> {
    match objective {
        "binary:logistic" | "reg:logistic" => Ok(OutputTransform::Logistic),
        "multi:softprob" | "multi:softmax" => Ok(OutputTransform::Softmax),
        "count:poisson" | "reg:gamma" | "reg:tweedie" => Ok(OutputTransform::Exponential),
        "reg:squarederror" | "reg:linear" | "binary:logitraw" | "reg:pseudohubererror" | "reg:absoluteerror" => {
            Ok(OutputTransform::Raw)
        }
        other => Err(XgboostError::UnsupportedObjective(other.to_string())),
    }
}

fn select_transform(objective: &str, options: &LoadOptions) -> Result<OutputTransform, XgboostError> {
    if options.load_transform {
        objective_transform(objective)
    } else {
        Ok(OutputTransform::Raw)
    }
}

/// `tree_info` must cycle through the groups: `0, 1, .., G-1, 0, 1, ..`.
pub(super) fn check_tree_info(tree_info: &[i32], n_groups: usize) -> Result<(), XgboostError> {
    for (index, &group) in tree_info.iter().enumerate() {
        let expected = (index % n_groups) as i32;
        if group != expected {
            return Err(XgboostError::TreeInfoPattern { index, group, expected });
        }
    }
    Ok(())
}

// =============================================================================
// Tree conversion
// =============================================================================

/// Convert one tree stored as a flat node array.
///
/// Every split routes NaN to its default child; leaves carry their value in
/// `info`.
pub(super) fn convert_tree(param: &TreeParam, nodes: &[BinaryNode], header_features: u32) -> Result<Tree, TreeError> {
    if i64::from(param.num_feature) > i64::from(header_features) {
        return Err(TreeError::FeatureMismatch {
            tree: param.num_feature,
            header: header_features,
        });
    }
    if param.num_roots != 1 {
        return Err(TreeError::Roots(param.num_roots));
    }
    match nodes {
        [] => return Err(TreeError::NoNodes),
        [single] => return Ok(Tree::constant(f64::from(single.info))),
        _ => {}
    }
    if param.num_deleted > 0 {
        tracing::warn!(num_deleted = param.num_deleted, "tree contains deleted nodes");
    }

    let n_nodes = nodes.len();
    let mut leaf_values = Vec::new();
    let converted = reindex(n_nodes, 0, |idx| {
        let src = &nodes[idx];
        let mut node = Node::numerical(src.split_index(), f64::from(src.info), MissingType::NaN, src.default_left());

        let left = split_child(nodes, idx, src.cleft, "left")?;
        if let Some(leaf) = leaf_value(nodes, left) {
            node.set_left_leaf(leaf_values.len() as u32);
            leaf_values.push(leaf);
        }
        let right = split_child(nodes, idx, src.cright, "right")?;
        if let Some(leaf) = leaf_value(nodes, right) {
            node.set_right_leaf(leaf_values.len() as u32);
            leaf_values.push(leaf);
        }

        Ok::<_, TreeError>(FlatSplit {
            node,
            left: leaf_value(nodes, left).is_none().then_some(left),
            right: leaf_value(nodes, right).is_none().then_some(right),
        })
    })?;

    let tree = Tree::new(converted, leaf_values, Vec::new(), Vec::new());
    tree.validate()?;
    Ok(tree)
}

/// Child id of a split, bounds-checked against the node array.
fn split_child(nodes: &[BinaryNode], node: usize, child: i32, side: &'static str) -> Result<usize, TreeError> {
    if child < 0 {
        return Err(TreeError::NegativeChild { node, side });
    }
    let child = child as usize;
    if child >= nodes.len() {
        return Err(TreeValidationError::ChildOutOfBounds {
            node: node as u32,
            side,
            child: child as u32,
            n_nodes: nodes.len(),
        }
        .into());
    }
    Ok(child)
}

fn leaf_value(nodes: &[BinaryNode], idx: usize) -> Option<f64> {
    let node = &nodes[idx];
    node.is_leaf().then(|| f64::from(node.info))
}

// =============================================================================
// Ensemble assembly
// =============================================================================

/// A tree booster decoded from either encoding.
pub(super) struct TreeBooster {
    pub booster: String,
    pub objective: String,
    pub n_groups: usize,
    pub n_features: u32,
    pub base_score: f64,
    pub trees: Vec<Tree>,
    pub tree_info: Vec<i32>,
    /// `weight_drop` for DART, `None` for gbtree.
    pub weight_drop: Option<Vec<f32>>,
}

/// Validate group assignment and weights, then build the ensemble.
pub(super) fn assemble_trees(model: TreeBooster, options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let name = model_name(&model.booster)?;
    let n_trees = model.trees.len();
    if n_trees == 0 {
        return Err(XgboostError::NoTrees);
    }
    if model.tree_info.len() != n_trees {
        return Err(XgboostError::TreeInfoLen {
            expected: n_trees,
            actual: model.tree_info.len(),
        });
    }
    check_tree_info(&model.tree_info, model.n_groups)?;

    let weights: Vec<f64> = match model.weight_drop {
        Some(weight_drop) => {
            if weight_drop.len() != n_trees {
                return Err(XgboostError::WeightDropLen {
                    expected: n_trees,
                    actual: weight_drop.len(),
                });
            }
            weight_drop.into_iter().map(f64::from).collect()
        }
        None => vec![1.0; n_trees],
    };

    let transform = select_transform(&model.objective, options)?;
    let mut forest = Forest::new(model.n_groups)
        .with_base_score(model.base_score)
        .with_max_feature_idx(model.n_features - 1)
        .with_absent_value(f64::NAN);
    for ((tree, group), weight) in model.trees.into_iter().zip(model.tree_info).zip(weights) {
        forest.push_weighted_tree(tree, group as u32, weight);
    }
    forest.validate()?;

    tracing::debug!(
        format = "xgboost",
        name,
        n_trees,
        n_groups = model.n_groups,
        n_features = model.n_features,
        transform = %transform,
        "model loaded"
    );
    Ok(Ensemble::from_forest(name, forest, transform)?)
}

/// A linear booster decoded from either encoding.
pub(super) struct LinearBooster {
    pub objective: String,
    pub n_groups: usize,
    pub n_features: usize,
    pub base_score: f64,
    pub weights: Vec<f32>,
}

/// Build a `gblinear` ensemble.
pub(super) fn assemble_linear(model: LinearBooster, options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let expected = (model.n_features + 1) * model.n_groups;
    if model.weights.len() != expected {
        return Err(XgboostError::LinearWeights {
            expected,
            actual: model.weights.len(),
        });
    }
    let weights = model.weights.into_iter().map(f64::from).collect();
    let linear = LinearModel::from_flat(weights, model.n_features, model.n_groups, model.base_score)?;

    let transform = select_transform(&model.objective, options)?;
    tracing::debug!(
        format = "xgboost",
        name = "xgboost.gblinear",
        n_groups = model.n_groups,
        n_features = model.n_features,
        transform = %transform,
        "model loaded"
    );
    Ok(Ensemble::from_linear("xgboost.gblinear", linear, transform)?)
}
