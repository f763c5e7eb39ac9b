//! XGBoost JSON model reader.
//!
//! Parses the `save_model("model.json")` format of XGBoost >= 1.0. Scalars
//! inside parameter objects are serialized as strings (`"num_nodes": "5"`),
//! so they are read through `DisplayFromStr` with a plain-number fallback.
//! Trees are translated into the binary node layout and share its converter.

use std::io::Read;

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use serde_with::{DisplayFromStr, PickFirst, serde_as};

use crate::io::binary::{BinaryNode, TreeParam};
use crate::model::{Ensemble, LoadOptions};
use crate::repr::gbdt::Tree;

use super::XgboostError;
use super::convert::{
    LinearBooster, TreeBooster, TreeError, assemble_linear, assemble_trees, base_margin, convert_tree, n_features,
    n_groups,
};

// =============================================================================
// Custom deserializers
// =============================================================================

/// `base_score` is a number, a numeric string, or (XGBoost >= 3.0) a
/// bracketed vector such as `"[5E-1]"` of which the first entry is used.
fn deserialize_base_score<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let mut cur = Value::deserialize(deserializer)?;
    loop {
        cur = match cur {
            Value::Number(n) => {
                return n
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| SerdeError::custom("invalid number"));
            }
            Value::String(s) => {
                let t = s.trim();
                if let Ok(f) = t.parse::<f32>() {
                    return Ok(f);
                }
                match serde_json::from_str::<Value>(t) {
                    Ok(inner @ Value::Array(_)) => inner,
                    _ => return Err(SerdeError::custom(format!("cannot parse base_score from {s:?}"))),
                }
            }
            Value::Array(arr) => match arr.into_iter().next() {
                Some(first) => first,
                None => return Err(SerdeError::custom("empty base_score array")),
            },
            _ => return Err(SerdeError::custom("base_score must be a number, string or array")),
        };
    }
}

fn bool_from_value<E: serde::de::Error>(value: &Value) -> Result<bool, E> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(i != 0),
            None => n.as_f64().map(|f| f != 0.0).ok_or_else(|| E::custom("invalid number for bool")),
        },
        Value::String(s) => match s.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            t if t.eq_ignore_ascii_case("true") => Ok(true),
            t if t.eq_ignore_ascii_case("false") => Ok(false),
            _ => Err(E::custom(format!("cannot parse bool from {s:?}"))),
        },
        _ => Err(E::custom("unsupported type for bool")),
    }
}

/// `default_left` is written as 0/1 integers by XGBoost and as booleans by
/// some converters.
fn deserialize_flags<'de, D>(deserializer: D) -> Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    Vec::<Value>::deserialize(deserializer)?.iter().map(bool_from_value).collect()
}

// =============================================================================
// Schema
// =============================================================================

#[derive(Debug, Deserialize)]
struct XgbModel {
    learner: Learner,
}

#[derive(Debug, Deserialize)]
struct Learner {
    gradient_booster: GradientBooster,
    objective: Objective,
    learner_model_param: LearnerModelParam,
}

#[derive(Debug, Deserialize)]
struct Objective {
    name: String,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    #[serde(deserialize_with = "deserialize_base_score")]
    base_score: f32,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_class: i64,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_feature: i64,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
enum GradientBooster {
    Gbtree { model: ModelTrees },
    Gblinear { model: LinearWeights },
    Dart { gbtree: GbtreeDefinition, weight_drop: Vec<f32> },
}

#[derive(Debug, Deserialize)]
struct GbtreeDefinition {
    model: ModelTrees,
}

#[derive(Debug, Deserialize)]
struct LinearWeights {
    weights: Vec<f32>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct GBTreeModelParam {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_trees: i64,
}

#[derive(Debug, Deserialize)]
struct ModelTrees {
    gbtree_model_param: GBTreeModelParam,
    trees: Vec<TreeJson>,
    tree_info: Vec<i32>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct TreeParamJson {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_nodes: i32,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    num_feature: i32,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    num_deleted: i32,
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    #[serde(default)]
    size_leaf_vector: i32,
}

#[derive(Debug, Deserialize)]
struct TreeJson {
    tree_param: TreeParamJson,
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<u32>,
    split_conditions: Vec<f32>,
    #[serde(deserialize_with = "deserialize_flags")]
    default_left: Vec<bool>,
    #[serde(default)]
    split_type: Vec<i32>,
}

impl TreeJson {
    /// Translate the parallel arrays into binary nodes.
    fn to_binary(&self) -> Result<(TreeParam, Vec<BinaryNode>), TreeError> {
        let n = usize::try_from(self.tree_param.num_nodes).map_err(|_| TreeError::NoNodes)?;
        let arrays = [
            ("left_children", self.left_children.len()),
            ("right_children", self.right_children.len()),
            ("split_indices", self.split_indices.len()),
            ("split_conditions", self.split_conditions.len()),
            ("default_left", self.default_left.len()),
        ];
        for (field, actual) in arrays {
            if actual != n {
                return Err(TreeError::ArraySizeMismatch {
                    field,
                    expected: n,
                    actual,
                });
            }
        }
        if let Some(node) = self.split_type.iter().position(|&t| t != 0) {
            return Err(TreeError::CategoricalSplit { node });
        }

        let nodes = (0..n)
            .map(|i| BinaryNode {
                parent: -1,
                cleft: self.left_children[i],
                cright: self.right_children[i],
                sindex: (self.split_indices[i] & 0x7fff_ffff) | (u32::from(self.default_left[i]) << 31),
                info: self.split_conditions[i],
            })
            .collect();
        let param = TreeParam {
            num_roots: 1,
            num_nodes: self.tree_param.num_nodes,
            num_deleted: self.tree_param.num_deleted,
            max_depth: 0,
            num_feature: self.tree_param.num_feature,
            size_leaf_vector: self.tree_param.size_leaf_vector,
        };
        Ok((param, nodes))
    }
}

// =============================================================================
// Loader
// =============================================================================

/// Load a JSON model.
pub fn load_json<R: Read>(reader: R, options: &LoadOptions) -> Result<Ensemble, XgboostError> {
    let model: XgbModel = serde_json::from_reader(reader)?;
    let Learner {
        gradient_booster,
        objective,
        learner_model_param: param,
    } = model.learner;

    let groups = n_groups(param.num_class);
    let base_score = base_margin(&objective.name, param.base_score);
    let header_features = n_features(param.num_feature)?;

    let (booster, trees, weight_drop) = match gradient_booster {
        GradientBooster::Gbtree { model } => ("gbtree", model, None),
        GradientBooster::Dart { gbtree, weight_drop } => ("dart", gbtree.model, Some(weight_drop)),
        GradientBooster::Gblinear { model } => {
            return assemble_linear(
                LinearBooster {
                    objective: objective.name,
                    n_groups: groups,
                    n_features: header_features as usize,
                    base_score,
                    weights: model.weights,
                },
                options,
            );
        }
    };

    let declared = trees.gbtree_model_param.num_trees;
    if usize::try_from(declared).ok() != Some(trees.trees.len()) {
        return Err(XgboostError::InvalidValue {
            field: "num_trees",
            message: format!("declares {declared} trees, {} stored", trees.trees.len()),
        });
    }

    let converted = trees
        .trees
        .iter()
        .enumerate()
        .map(|(index, tree)| {
            convert_json_tree(tree, header_features).map_err(|source| XgboostError::Tree { index, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    assemble_trees(
        TreeBooster {
            booster: booster.to_string(),
            objective: objective.name,
            n_groups: groups,
            n_features: header_features,
            base_score,
            trees: converted,
            tree_info: trees.tree_info,
            weight_drop,
        },
        options,
    )
}

fn convert_json_tree(tree: &TreeJson, header_features: u32) -> Result<Tree, TreeError> {
    let (param, nodes) = tree.to_binary()?;
    convert_tree(&param, &nodes, header_features)
}
