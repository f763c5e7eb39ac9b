//! scikit-learn estimators: `GradientBoostingClassifier` and its parts.

use super::numpy::{NumpyArray, NumpyScalar};
use super::{
    ExtractError, Reconstruct, as_dict, as_float, as_int, as_str, expect_global, extract, field, parse_class,
    reduce_args,
};
use crate::compat::sklearn::pickle::{Build, Dict, Reduce};

const RECONSTRUCTOR_MODULE: &str = "copy_reg";
const RECONSTRUCTOR: &str = "_reconstructor";
const TREE_MODULE: &str = "sklearn.tree._tree";
const REGRESSOR_MODULE: &str = "sklearn.tree.tree";
const BOOSTING_MODULE: &str = "sklearn.ensemble.gradient_boosting";

/// Check a `copy_reg._reconstructor(cls, object, None)` call and return `cls`.
fn reconstructed_class<'a>(reduce: &'a Reduce, module: &str, name: &str) -> Result<&'a str, ExtractError> {
    expect_global(&reduce.callable, RECONSTRUCTOR_MODULE, RECONSTRUCTOR)?;
    let args = reduce_args(reduce, "_reconstructor", 3)?;
    Ok(expect_global(&args[0], module, name)?.name.as_str())
}

fn int_field(dict: &Dict, key: &str) -> Result<i64, ExtractError> {
    as_int(field(dict, key)?).map_err(|e| e.in_field(key))
}

fn usize_field(dict: &Dict, key: &'static str) -> Result<usize, ExtractError> {
    let value = int_field(dict, key)?;
    usize::try_from(value).map_err(|_| ExtractError::InvalidValue {
        field: key,
        message: format!("expected a non-negative count, got {value}"),
    })
}

fn class_field<T: Reconstruct + Default>(dict: &Dict, key: &str) -> Result<T, ExtractError> {
    extract(field(dict, key)?).map_err(|e| e.in_field(key))
}

// =============================================================================
// Tree
// =============================================================================

/// One record of `Tree.nodes` (numpy dtype `V56`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SklearnNode {
    pub left_child: i64,
    pub right_child: i64,
    pub feature: i64,
    pub threshold: f64,
    pub impurity: f64,
    pub n_node_samples: i64,
    pub weighted_n_node_samples: f64,
}

impl SklearnNode {
    /// Record size in bytes.
    pub const SIZE: usize = 56;

    pub fn from_bytes(b: [u8; Self::SIZE]) -> Self {
        let word = |i: usize| {
            let mut w = [0u8; 8];
            w.copy_from_slice(&b[i * 8..(i + 1) * 8]);
            w
        };
        Self {
            left_child: i64::from_le_bytes(word(0)),
            right_child: i64::from_le_bytes(word(1)),
            feature: i64::from_le_bytes(word(2)),
            threshold: f64::from_le_bytes(word(3)),
            impurity: f64::from_le_bytes(word(4)),
            n_node_samples: i64::from_le_bytes(word(5)),
            weighted_n_node_samples: f64::from_le_bytes(word(6)),
        }
    }

    /// Leaves have no children.
    pub fn is_leaf(&self) -> bool {
        self.left_child < 0
    }
}

/// `sklearn.tree._tree.Tree`: node table plus one value per node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SklearnTree {
    pub n_features: i64,
    pub n_outputs: usize,
    pub classes: Vec<i64>,
    pub nodes: Vec<SklearnNode>,
    pub values: Vec<f64>,
}

impl Reconstruct for SklearnTree {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        expect_global(&reduce.callable, TREE_MODULE, "Tree")?;
        // Tree(n_features, n_classes, n_outputs)
        let args = reduce_args(reduce, "Tree", 3)?;
        self.n_features = as_int(&args[0])?;
        let n_outputs = as_int(&args[2])?;
        self.n_outputs = usize::try_from(n_outputs).map_err(|_| ExtractError::InvalidValue {
            field: "n_outputs",
            message: n_outputs.to_string(),
        })?;

        let classes: NumpyArray = extract(&args[1]).map_err(|e| e.in_field("n_classes"))?;
        classes.expect_shape("n_classes", &[self.n_outputs])?;
        self.classes = classes.to_i64("n_classes")?;
        Ok(())
    }

    fn build(&mut self, build: &Build) -> Result<(), ExtractError> {
        let state = as_dict(&build.state)?;
        let node_count = usize_field(state, "node_count")?;

        let nodes: NumpyArray = class_field(state, "nodes")?;
        nodes.dtype.expect("nodes", "V56", false)?;
        self.nodes = nodes.bytes("nodes")?.map_chunks(SklearnNode::from_bytes)?;

        let values: NumpyArray = class_field(state, "values")?;
        self.values = values.to_f64("values")?;

        if self.nodes.len() != node_count {
            return Err(ExtractError::InvalidValue {
                field: "nodes",
                message: format!("{} records for node_count {node_count}", self.nodes.len()),
            });
        }
        if self.values.len() != node_count {
            return Err(ExtractError::InvalidValue {
                field: "values",
                message: format!("{} values for node_count {node_count}", self.values.len()),
            });
        }
        Ok(())
    }
}

// =============================================================================
// DecisionTreeRegressor
// =============================================================================

/// `sklearn.tree.tree.DecisionTreeRegressor`, one boosting stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionTreeRegressor {
    pub n_classes: i64,
    pub max_features: i64,
    pub n_outputs: i64,
    pub tree: SklearnTree,
}

impl Reconstruct for DecisionTreeRegressor {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        reconstructed_class(reduce, REGRESSOR_MODULE, "DecisionTreeRegressor")?;
        Ok(())
    }

    fn build(&mut self, build: &Build) -> Result<(), ExtractError> {
        let state = as_dict(&build.state)?;
        let n_classes: NumpyScalar = class_field(state, "n_classes_")?;
        self.n_classes = n_classes.to_i64("n_classes_")?;
        self.max_features = int_field(state, "max_features_")?;
        self.n_outputs = int_field(state, "n_outputs_")?;
        self.tree = class_field(state, "tree_")?;
        Ok(())
    }
}

// =============================================================================
// Init estimator
// =============================================================================

/// The estimator providing the initial raw prediction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitEstimator {
    /// Class name, `LogOddsEstimator` or `PriorProbabilityEstimator`.
    pub name: String,
    /// One prior for log-odds, one per class for prior probabilities.
    pub priors: Vec<f64>,
}

impl Reconstruct for InitEstimator {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        self.name = reconstructed_class(reduce, BOOSTING_MODULE, "")?.to_string();
        Ok(())
    }

    fn build(&mut self, build: &Build) -> Result<(), ExtractError> {
        let state = as_dict(&build.state)?;
        self.priors = match self.name.as_str() {
            "LogOddsEstimator" => {
                let prior: NumpyScalar = class_field(state, "prior")?;
                vec![prior.to_f64("prior")?]
            }
            "PriorProbabilityEstimator" => {
                let priors: NumpyArray = class_field(state, "priors")?;
                priors.to_f64("priors")?
            }
            other => return Err(ExtractError::UnknownInitEstimator(other.to_string())),
        };
        Ok(())
    }
}

// =============================================================================
// GradientBoostingClassifier
// =============================================================================

/// `sklearn.ensemble.gradient_boosting.GradientBoostingClassifier`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientBoostingClassifier {
    pub n_classes: usize,
    pub classes: Vec<i64>,
    pub n_estimators: usize,
    pub max_features: i64,
    pub learning_rate: f64,
    pub loss: String,
    pub init: InitEstimator,
    /// Stages in row-major `[n_estimators][n_groups]` order.
    pub estimators: Vec<DecisionTreeRegressor>,
}

impl GradientBoostingClassifier {
    /// Raw score columns: one for binary problems, one per class otherwise.
    pub fn n_groups(&self) -> usize {
        if self.n_classes == 2 { 1 } else { self.n_classes }
    }
}

impl Reconstruct for GradientBoostingClassifier {
    fn reduce(&mut self, reduce: &Reduce) -> Result<(), ExtractError> {
        reconstructed_class(reduce, BOOSTING_MODULE, "GradientBoostingClassifier")?;
        Ok(())
    }

    fn build(&mut self, build: &Build) -> Result<(), ExtractError> {
        let state = as_dict(&build.state)?;
        self.n_classes = usize_field(state, "n_classes_")?;
        self.learning_rate = as_float(field(state, "learning_rate")?).map_err(|e| e.in_field("learning_rate"))?;
        self.loss = as_str(field(state, "loss")?)
            .map_err(|e| e.in_field("loss"))?
            .to_string();
        self.init = class_field(state, "init_")?;

        let classes: NumpyArray = class_field(state, "classes_")?;
        classes.expect_shape("classes_", &[self.n_classes])?;
        self.classes = classes.to_i64("classes_")?;

        self.max_features = int_field(state, "max_features_")?;
        self.n_estimators = usize_field(state, "n_estimators")?;

        let estimators: NumpyArray = class_field(state, "estimators_")?;
        estimators.expect_shape("estimators_", &[self.n_estimators, self.n_groups()])?;
        let items = estimators.objects("estimators_")?;
        if items.len() != self.n_estimators * self.n_groups() {
            return Err(ExtractError::InvalidValue {
                field: "estimators_",
                message: format!("{} objects for shape {:?}", items.len(), estimators.shape),
            });
        }
        self.estimators = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let mut stage = DecisionTreeRegressor::default();
                parse_class(&mut stage, item).map_err(|e| e.in_field(format!("estimators_[{i}]")))?;
                Ok(stage)
            })
            .collect::<Result<_, ExtractError>>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compat::sklearn::extract::RawBytes;
    use crate::compat::sklearn::pickle::decode;
    use crate::testing::pickle::{GbcFixture, InitPrior, PickleWriter, TreeFixture};

    fn stump() -> TreeFixture {
        TreeFixture::new(
            vec![(1, 2, 0, 0.5), (-1, -1, -2, -2.0), (-1, -1, -2, -2.0)],
            vec![0.0, -1.0, 1.0],
        )
    }

    #[test]
    fn decision_tree_regressor() {
        let mut w = PickleWriter::new();
        w.decision_tree(4, &stump());
        let tree: DecisionTreeRegressor = extract(&decode(w.finish().as_slice()).unwrap()).unwrap();

        assert_eq!(tree.n_classes, 1);
        assert_eq!(tree.max_features, 4);
        assert_eq!(tree.n_outputs, 1);
        assert_eq!(tree.tree.n_features, 4);
        assert_eq!(tree.tree.classes, vec![1]);
        assert_eq!(tree.tree.nodes.len(), 3);
        assert_eq!(tree.tree.nodes[0].left_child, 1);
        assert_eq!(tree.tree.nodes[0].right_child, 2);
        assert_eq!(tree.tree.nodes[0].threshold, 0.5);
        assert!(tree.tree.nodes[1].is_leaf());
        assert_eq!(tree.tree.nodes[2].feature, -2);
        assert_eq!(tree.tree.values, vec![0.0, -1.0, 1.0]);
    }

    #[test]
    fn node_records() {
        let mut bytes = Vec::new();
        for v in [3i64, 4, 7] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        for v in [0.25f64, 0.5] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&100i64.to_le_bytes());
        bytes.extend_from_slice(&99.5f64.to_le_bytes());

        let nodes = RawBytes(bytes).map_chunks(SklearnNode::from_bytes).unwrap();
        assert_eq!(
            nodes,
            vec![SklearnNode {
                left_child: 3,
                right_child: 4,
                feature: 7,
                threshold: 0.25,
                impurity: 0.5,
                n_node_samples: 100,
                weighted_n_node_samples: 99.5,
            }]
        );
        assert!(RawBytes(vec![0; 55]).map_chunks(SklearnNode::from_bytes).is_err());
    }

    #[test]
    fn binary_classifier() {
        let fixture = GbcFixture {
            n_classes: 2,
            n_features: 4,
            max_features: None,
            learning_rate: 0.1,
            init: InitPrior::LogOdds(0.3),
            stages: vec![vec![stump()], vec![stump()]],
        };
        let mut w = PickleWriter::new();
        w.gradient_boosting(&fixture);
        let model: GradientBoostingClassifier = extract(&decode(w.finish().as_slice()).unwrap()).unwrap();

        assert_eq!(model.n_classes, 2);
        assert_eq!(model.n_groups(), 1);
        assert_eq!(model.classes, vec![0, 1]);
        assert_eq!(model.n_estimators, 2);
        assert_eq!(model.max_features, 4);
        assert_eq!(model.learning_rate, 0.1);
        assert_eq!(model.loss, "deviance");
        assert_eq!(model.init.name, "LogOddsEstimator");
        assert_eq!(model.init.priors, vec![0.3]);
        assert_eq!(model.estimators.len(), 2);
    }

    #[test]
    fn multiclass_priors() {
        let fixture = GbcFixture {
            n_classes: 3,
            n_features: 4,
            max_features: None,
            learning_rate: 0.5,
            init: InitPrior::Priors(vec![0.2, 0.3, 0.5]),
            stages: vec![vec![stump(), stump(), stump()]],
        };
        let mut w = PickleWriter::new();
        w.gradient_boosting(&fixture);
        let model: GradientBoostingClassifier = extract(&decode(w.finish().as_slice()).unwrap()).unwrap();
        assert_eq!(model.n_groups(), 3);
        assert_eq!(model.init.name, "PriorProbabilityEstimator");
        assert_eq!(model.init.priors, vec![0.2, 0.3, 0.5]);
        assert_eq!(model.estimators.len(), 3);
    }

    #[test]
    fn estimator_shape_mismatch() {
        // Three classes need three trees per stage.
        let fixture = GbcFixture {
            n_classes: 3,
            n_features: 4,
            max_features: None,
            learning_rate: 0.5,
            init: InitPrior::Priors(vec![0.2, 0.3, 0.5]),
            stages: vec![vec![stump()]],
        };
        let mut w = PickleWriter::new();
        w.gradient_boosting(&fixture);
        let err = extract::<GradientBoostingClassifier>(&decode(w.finish().as_slice()).unwrap()).unwrap_err();
        assert!(matches!(err, ExtractError::Shape { what: "estimators_", .. }));
    }

    #[test]
    fn unknown_init_estimator() {
        let mut w = PickleWriter::new();
        w.object(BOOSTING_MODULE, "QuantileEstimator", |w| {
            w.dict_entry("alpha", |w| {
                w.float(0.9);
            });
        });
        let err = extract::<InitEstimator>(&decode(w.finish().as_slice()).unwrap()).unwrap_err();
        assert!(matches!(err, ExtractError::UnknownInitEstimator(ref name) if name == "QuantileEstimator"));
    }

    #[test]
    fn wrong_class() {
        let mut w = PickleWriter::new();
        w.object("sklearn.ensemble.forest", "RandomForestClassifier", |_| {});
        let err = extract::<GradientBoostingClassifier>(&decode(w.finish().as_slice()).unwrap()).unwrap_err();
        assert!(matches!(err, ExtractError::Global { .. }));
    }
}
