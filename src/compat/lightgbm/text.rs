//! LightGBM text model reader.
//!
//! Reads the format written by `Booster.save_model()`: a header block of
//! `key=value` lines, then one block per tree, each terminated by a blank
//! line. Trailing sections (feature importances, parameters) are not read.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::compat::reindex::{FlatSplit, reindex};
use crate::io::Params;
use crate::model::{Ensemble, LoadOptions, OutputTransform};
use crate::repr::gbdt::{Forest, Node, Tree};

use super::LightGbmError;
use super::convert::{CategoryPool, DecisionType, TreeError, categorical_node, check_len};

/// Text format versions this reader understands.
pub(super) const SUPPORTED_VERSIONS: [&str; 3] = ["v2", "v3", "v4"];

// =============================================================================
// Objective
// =============================================================================

/// Output transform for a LightGBM `objective` line.
///
/// The line is the objective name followed by `key:value` parameters, e.g.
/// `binary sigmoid:1` or `multiclass num_class:3`.
pub(super) fn objective_transform(objective: &str, n_groups: usize) -> Result<OutputTransform, LightGbmError> {
    let unsupported = || LightGbmError::UnsupportedObjective(objective.to_string());

    let mut tokens = objective.split_whitespace();
    let name = tokens.next().ok_or_else(unsupported)?;
    let param = |key: &str| {
        objective
            .split_whitespace()
            .skip(1)
            .find_map(|token| token.strip_prefix(key)?.strip_prefix(':'))
    };

    match name {
        "binary" => match param("sigmoid") {
            Some("1") => Ok(OutputTransform::Logistic),
            _ => Err(unsupported()),
        },
        "multiclass" => match param("num_class").map(str::parse::<usize>) {
            Some(Ok(n)) if n == n_groups => Ok(OutputTransform::Softmax),
            _ => Err(unsupported()),
        },
        "regression" | "regression_l1" | "huber" | "fair" | "quantile" | "mape" => Ok(OutputTransform::Raw),
        "poisson" | "gamma" | "tweedie" => Ok(OutputTransform::Exponential),
        _ => Err(unsupported()),
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Load a text model from a file.
pub fn from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Ensemble, LightGbmError> {
    let file = File::open(path)?;
    load_text(BufReader::new(file), options)
}

/// Load a text model.
///
/// The ensemble is named `lightgbm.gbdt`, or `lightgbm.rf` for averaged
/// (random forest) models, which never carry a transform.
pub fn load_text<R: BufRead>(mut reader: R, options: &LoadOptions) -> Result<Ensemble, LightGbmError> {
    let header = Params::read_until_blank(&mut reader)?;

    let version = header.string("version")?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(LightGbmError::Unsupported {
            field: "version",
            actual: version.to_string(),
        });
    }
    if version != "v2" {
        tracing::warn!(version, "reading LightGBM text model newer than v2");
    }

    let num_class = header.int("num_class")?;
    let num_tree_per_iteration = header.int("num_tree_per_iteration")?;
    if num_class != num_tree_per_iteration || num_class < 1 {
        return Err(LightGbmError::GroupMismatch {
            num_class,
            num_tree_per_iteration,
        });
    }
    let n_groups = num_class as usize;

    let max_feature_idx = header.int("max_feature_idx")?;
    let max_feature_idx = u32::try_from(max_feature_idx).map_err(|_| LightGbmError::InvalidValue {
        field: "max_feature_idx",
        message: format!("{max_feature_idx} is not a feature index"),
    })?;

    let average_output = header.contains("average_output");
    let name = if average_output { "lightgbm.rf" } else { "lightgbm.gbdt" };

    let n_trees = header.string("tree_sizes")?.split_whitespace().count();
    if n_trees == 0 {
        return Err(LightGbmError::NoTrees);
    }
    if n_trees % n_groups != 0 {
        return Err(LightGbmError::TreeCount { n_trees, n_groups });
    }

    let transform = if options.load_transform && !average_output {
        objective_transform(header.string("objective")?, n_groups)?
    } else {
        OutputTransform::Raw
    };

    let mut forest = Forest::new(n_groups)
        .with_max_feature_idx(max_feature_idx)
        .with_average_output(average_output);
    for index in 0..n_trees {
        let tree = Params::read_until_blank(&mut reader)
            .map_err(TreeError::from)
            .and_then(|params| read_tree(&params))
            .map_err(|source| LightGbmError::Tree { index, source })?;
        forest.push_tree(tree, (index % n_groups) as u32);
    }
    forest.validate()?;

    tracing::debug!(
        format = "lightgbm-text",
        name,
        n_trees,
        n_groups,
        n_features = forest.n_features(),
        transform = %transform,
        "model loaded"
    );
    Ok(Ensemble::from_forest(name, forest, transform)?)
}

// =============================================================================
// Tree
// =============================================================================

/// Convert one `Tree=` block.
fn read_tree(params: &Params) -> Result<Tree, TreeError> {
    let num_cat = params.int("num_cat")?;
    let num_leaves = params.int("num_leaves")?;
    if num_leaves < 1 {
        return Err(TreeError::NoLeaves(num_leaves));
    }
    let num_leaves = num_leaves as usize;

    let leaf_values = params.float64_vec("leaf_value")?;
    check_len("leaf_value", leaf_values.len(), num_leaves)?;
    if num_leaves == 1 {
        return Ok(Tree::constant(leaf_values[0]));
    }

    let n_splits = num_leaves - 1;
    let left_child = params.int32_vec("left_child")?;
    let right_child = params.int32_vec("right_child")?;
    let decision_type = params.uint32_vec("decision_type")?;
    let split_feature = params.uint32_vec("split_feature")?;
    let threshold = params.float64_vec("threshold")?;
    check_len("left_child", left_child.len(), n_splits)?;
    check_len("right_child", right_child.len(), n_splits)?;
    check_len("decision_type", decision_type.len(), n_splits)?;
    check_len("split_feature", split_feature.len(), n_splits)?;
    check_len("threshold", threshold.len(), n_splits)?;

    let (cat_boundaries, cat_threshold) = if num_cat > 0 {
        let boundaries = params.uint32_vec("cat_boundaries")?;
        check_len("cat_boundaries", boundaries.len(), num_cat as usize + 1)?;
        (boundaries, params.uint32_vec("cat_threshold")?)
    } else {
        (Vec::new(), Vec::new())
    };

    let mut pool = CategoryPool::default();
    let nodes = reindex(n_splits, 0, |idx| {
        let dt = DecisionType::from_bits(decision_type[idx])?;
        let mut node = if dt.categorical {
            let words = category_slice(idx, threshold[idx], &cat_boundaries, &cat_threshold)?;
            categorical_node(idx, split_feature[idx], words, dt.missing, &mut pool)?
        } else {
            Node::numerical(split_feature[idx], threshold[idx], dt.missing, dt.default_left)
        };
        let left = wire_child(left_child[idx], |leaf| node.set_left_leaf(leaf));
        let right = wire_child(right_child[idx], |leaf| node.set_right_leaf(leaf));
        Ok::<_, TreeError>(FlatSplit { node, left, right })
    })?;

    pool.finish(nodes, leaf_values)
}

/// Negative child ids encode leaf `!child`.
fn wire_child(child: i32, set_leaf: impl FnOnce(u32)) -> Option<usize> {
    if child < 0 {
        set_leaf(!child as u32);
        None
    } else {
        Some(child as usize)
    }
}

/// Bitset words of the categorical split at `node`.
///
/// The split's threshold is an index into `cat_boundaries`.
fn category_slice<'a>(
    node: usize,
    threshold: f64,
    cat_boundaries: &[u32],
    cat_threshold: &'a [u32],
) -> Result<&'a [u32], TreeError> {
    let n_cat = cat_boundaries.len().saturating_sub(1);
    let index = threshold as usize;
    if !(threshold >= 0.0) || index >= n_cat {
        return Err(TreeError::CategoryIndexOutOfRange { node, index, n_cat });
    }
    let start = cat_boundaries[index] as usize;
    let end = cat_boundaries[index + 1] as usize;
    cat_threshold.get(start..end).ok_or_else(|| TreeError::InvalidThreshold {
        node,
        message: format!("bitset range {start}..{end} outside cat_threshold of length {}", cat_threshold.len()),
    })
}
