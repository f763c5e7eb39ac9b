//! LightGBM JSON model reader.
//!
//! Reads the output of `Booster.dump_model()`. Each entry of `tree_info`
//! holds a nested `tree_structure`: split objects carry their children
//! inline, leaf objects carry `leaf_value`. Trees are kept as raw
//! [`Value`]s until conversion so errors can name the tree they came from.
//!
//! JSON dumps carry no usable transform, so loading with
//! `load_transform` set is rejected.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::model::{Ensemble, LoadOptions, OutputTransform};
use crate::repr::gbdt::bitset::construct_bitset;
use crate::repr::gbdt::{Forest, Node, Tree};

use super::LightGbmError;
use super::convert::{CategoryPool, TreeError, categorical_node, check_len, missing_from_name};
use super::text::SUPPORTED_VERSIONS;

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Deserialize)]
struct ModelJson {
    name: String,
    version: String,
    num_class: i64,
    num_tree_per_iteration: i64,
    max_feature_idx: i64,
    #[serde(default)]
    average_output: bool,
    tree_info: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    num_leaves: i64,
    tree_structure: Value,
}

#[derive(Debug, Deserialize)]
struct SplitJson {
    split_feature: u32,
    threshold: Threshold,
    decision_type: String,
    #[serde(default)]
    default_left: bool,
    missing_type: String,
    left_child: Value,
    right_child: Value,
}

/// Numerical splits carry a number, categorical ones a `"a||b||c"` list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Threshold {
    Number(f64),
    Categories(String),
}

/// A decoded `tree_structure` entry.
enum JsonNode {
    Leaf(f64),
    Split(Box<SplitJson>),
}

impl JsonNode {
    /// Split objects are recognised by a non-empty `missing_type`.
    fn parse(value: Value) -> Result<Self, TreeError> {
        let is_split = value
            .get("missing_type")
            .and_then(Value::as_str)
            .is_some_and(|missing| !missing.is_empty());
        if is_split {
            return Ok(JsonNode::Split(Box::new(serde_json::from_value(value)?)));
        }
        match value.get("leaf_value").and_then(Value::as_f64) {
            Some(leaf) => Ok(JsonNode::Leaf(leaf)),
            None => Err(TreeError::UnknownNode(abbreviate(&value))),
        }
    }
}

fn abbreviate(value: &Value) -> String {
    let mut text = value.to_string();
    if text.len() > 64 {
        let mut cut = 64;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}

// =============================================================================
// Loader
// =============================================================================

/// Load a JSON model from a file.
pub fn json_from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Ensemble, LightGbmError> {
    let file = File::open(path)?;
    load_json(BufReader::new(file), options)
}

/// Load a JSON model.
pub fn load_json<R: Read>(reader: R, options: &LoadOptions) -> Result<Ensemble, LightGbmError> {
    if options.load_transform {
        return Err(LightGbmError::TransformUnsupported);
    }

    let model: ModelJson = serde_json::from_reader(reader)?;

    if model.name != "tree" {
        return Err(LightGbmError::Unsupported {
            field: "name",
            actual: model.name,
        });
    }
    if !SUPPORTED_VERSIONS.contains(&model.version.as_str()) {
        return Err(LightGbmError::Unsupported {
            field: "version",
            actual: model.version,
        });
    }
    if model.version != "v2" {
        tracing::warn!(version = %model.version, "reading LightGBM JSON model newer than v2");
    }

    if model.num_class != model.num_tree_per_iteration || model.num_class < 1 {
        return Err(LightGbmError::GroupMismatch {
            num_class: model.num_class,
            num_tree_per_iteration: model.num_tree_per_iteration,
        });
    }
    let n_groups = model.num_class as usize;

    let max_feature_idx = u32::try_from(model.max_feature_idx).map_err(|_| LightGbmError::InvalidValue {
        field: "max_feature_idx",
        message: format!("{} is not a feature index", model.max_feature_idx),
    })?;

    let n_trees = model.tree_info.len();
    if n_trees == 0 {
        return Err(LightGbmError::NoTrees);
    }
    if n_trees % n_groups != 0 {
        return Err(LightGbmError::TreeCount { n_trees, n_groups });
    }

    let name = if model.average_output { "lightgbm.rf" } else { "lightgbm.gbdt" };
    let mut forest = Forest::new(n_groups)
        .with_max_feature_idx(max_feature_idx)
        .with_average_output(model.average_output);
    for (index, raw) in model.tree_info.into_iter().enumerate() {
        let tree = serde_json::from_value::<TreeJson>(raw)
            .map_err(TreeError::from)
            .and_then(read_tree)
            .map_err(|source| LightGbmError::Tree { index, source })?;
        forest.push_tree(tree, (index % n_groups) as u32);
    }
    forest.validate()?;

    tracing::debug!(
        format = "lightgbm-json",
        name,
        n_trees,
        n_groups,
        n_features = forest.n_features(),
        "model loaded"
    );
    Ok(Ensemble::from_forest(name, forest, OutputTransform::Raw)?)
}

// =============================================================================
// Tree
// =============================================================================

/// Parent slot waiting for the index of a split child.
#[derive(Clone, Copy)]
enum Slot {
    Left(usize),
    Right(usize),
}

fn read_tree(tree: TreeJson) -> Result<Tree, TreeError> {
    if tree.num_leaves < 1 {
        return Err(TreeError::NoLeaves(tree.num_leaves));
    }
    let num_leaves = tree.num_leaves as usize;

    let root = match JsonNode::parse(tree.tree_structure)? {
        JsonNode::Leaf(value) => {
            check_len("leaf_value", 1, num_leaves)?;
            return Ok(Tree::constant(value));
        }
        JsonNode::Split(split) => split,
    };

    let mut nodes: Vec<Node> = Vec::with_capacity(num_leaves - 1);
    let mut leaf_values = Vec::with_capacity(num_leaves);
    let mut pool = CategoryPool::default();
    let mut stack = vec![(root, None::<Slot>)];

    while let Some((split, slot)) = stack.pop() {
        let idx = nodes.len();
        let SplitJson {
            split_feature,
            threshold,
            decision_type,
            default_left,
            missing_type,
            left_child,
            right_child,
        } = *split;

        let missing = missing_from_name(&missing_type)?;
        let mut node = match (decision_type.as_str(), threshold) {
            ("<=", Threshold::Number(threshold)) => {
                Node::numerical(split_feature, threshold, missing, default_left)
            }
            ("==", Threshold::Categories(list)) => {
                let words = construct_bitset(&parse_categories(idx, &list)?);
                categorical_node(idx, split_feature, &words, missing, &mut pool)?
            }
            ("<=" | "==", threshold) => {
                return Err(TreeError::InvalidThreshold {
                    node: idx,
                    message: format!("{threshold:?} does not match decision type {decision_type}"),
                });
            }
            _ => return Err(TreeError::UnknownDecisionType(decision_type.clone())),
        };

        let left = JsonNode::parse(left_child)?;
        let right = JsonNode::parse(right_child)?;
        if let JsonNode::Leaf(value) = left {
            node.set_left_leaf(leaf_values.len() as u32);
            leaf_values.push(value);
        }
        if let JsonNode::Leaf(value) = right {
            node.set_right_leaf(leaf_values.len() as u32);
            leaf_values.push(value);
        }

        match slot {
            Some(Slot::Left(parent)) => nodes[parent].set_left_node(idx as u32),
            Some(Slot::Right(parent)) => nodes[parent].set_right_node(idx as u32),
            None => {}
        }
        nodes.push(node);

        if let JsonNode::Split(child) = left {
            stack.push((child, Some(Slot::Left(idx))));
        }
        if let JsonNode::Split(child) = right {
            stack.push((child, Some(Slot::Right(idx))));
        }
    }

    check_len("leaf_value", leaf_values.len(), num_leaves)?;
    pool.finish(nodes, leaf_values)
}

/// Category ids of a `"a||b||c"` threshold.
fn parse_categories(node: usize, list: &str) -> Result<Vec<u32>, TreeError> {
    list.split("||")
        .map(|token| {
            token.trim().parse::<u32>().map_err(|err| TreeError::InvalidThreshold {
                node,
                message: format!("category {token:?}: {err}"),
            })
        })
        .collect()
}
