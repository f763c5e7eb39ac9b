//! scikit-learn model support.
//!
//! Reads a `GradientBoostingClassifier` saved with
//! `pickle.dump(model, f, protocol=0)`. Loading runs in three steps:
//!
//! 1. [`pickle`] decodes the opcode stream into generic objects.
//! 2. [`extract`] maps them onto typed estimator structures.
//! 3. The regression trees are converted into a [`Forest`].
//!
//! The learning rate and the init estimator's prior are folded into the leaf
//! values, so the forest itself has a zero base score. Binary classifiers
//! have one raw output group, multiclass classifiers one per class.

pub mod extract;
pub mod pickle;

mod convert;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

pub use convert::TreeError;
pub use extract::ExtractError;
pub use pickle::PickleError;

use crate::model::{Ensemble, LoadOptions, OutputTransform, TransformMismatch};
use crate::repr::gbdt::{Forest, ForestValidationError};

use extract::GradientBoostingClassifier;

/// Provenance name of loaded models.
pub const MODEL_NAME: &str = "sklearn.ensemble.GradientBoostingClassifier";

/// Error while loading a scikit-learn model.
#[derive(Debug, thiserror::Error)]
pub enum SklearnError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error while decoding: {0}")]
    Pickle(#[from] PickleError),

    #[error("error while parsing gradient boosting class: {0}")]
    Extract(#[from] ExtractError),

    #[error("model has no trees")]
    NoTrees,

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: &'static str, message: String },

    #[error("expected {expected} estimators, got {actual}")]
    EstimatorCount { expected: usize, actual: usize },

    #[error("tree {index} has {actual} features, expected {expected}")]
    FeatureCount { index: usize, expected: i64, actual: i64 },

    #[error("init estimator has {actual} priors, expected {expected}")]
    PriorCount { expected: usize, actual: usize },

    #[error("no output transform for loss {0:?}")]
    UnsupportedLoss(String),

    #[error(transparent)]
    Transform(#[from] TransformMismatch),

    #[error(transparent)]
    Forest(#[from] ForestValidationError),

    #[error("error while reading tree {index}: {source}")]
    Tree {
        index: usize,
        #[source]
        source: TreeError,
    },
}

/// Load a pickle file.
pub fn from_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<Ensemble, SklearnError> {
    let file = File::open(path)?;
    load_pickle(BufReader::new(file), options)
}

/// Load a pickled `GradientBoostingClassifier`.
pub fn load_pickle<R: BufRead>(reader: R, options: &LoadOptions) -> Result<Ensemble, SklearnError> {
    let value = pickle::decode(reader)?;
    let model: GradientBoostingClassifier = extract::extract(&value)?;
    from_classifier(&model, options)
}

/// Build an ensemble from an extracted classifier.
pub fn from_classifier(model: &GradientBoostingClassifier, options: &LoadOptions) -> Result<Ensemble, SklearnError> {
    let n_groups = model.n_groups();
    if n_groups == 0 {
        return Err(SklearnError::InvalidValue {
            field: "n_classes_",
            message: "classifier has no classes".to_string(),
        });
    }
    if model.n_estimators == 0 {
        return Err(SklearnError::NoTrees);
    }
    let expected = model.n_estimators * n_groups;
    if model.estimators.len() != expected {
        return Err(SklearnError::EstimatorCount {
            expected,
            actual: model.estimators.len(),
        });
    }
    let max_feature_idx = max_feature_idx(model)?;

    let mut base = initial_scores(model, n_groups)?;
    let transform = select_transform(model, n_groups, options)?;

    let mut forest = Forest::new(n_groups).with_max_feature_idx(max_feature_idx);
    for (stage, regressors) in model.estimators.chunks(n_groups).enumerate() {
        for (group, regressor) in regressors.iter().enumerate() {
            let index = stage * n_groups + group;
            let tree = convert::convert_tree(&regressor.tree, model.learning_rate, base[group])
                .map_err(|source| SklearnError::Tree { index, source })?;
            forest.push_tree(tree, group as u32);
        }
        // The prior only enters through the first stage.
        base.fill(0.0);
    }
    forest.validate()?;

    tracing::debug!(
        format = "sklearn",
        name = MODEL_NAME,
        n_trees = expected,
        n_groups,
        n_features = max_feature_idx + 1,
        transform = %transform,
        "model loaded"
    );
    Ok(Ensemble::from_forest(MODEL_NAME, forest, transform)?)
}

/// Highest feature column of the fitted trees.
///
/// `max_features_` is the per-split sample size, so the column count comes
/// from the trees, which must all agree on it.
fn max_feature_idx(model: &GradientBoostingClassifier) -> Result<u32, SklearnError> {
    let n_features = model.estimators[0].tree.n_features;
    if let Some((index, regressor)) = model
        .estimators
        .iter()
        .enumerate()
        .find(|(_, regressor)| regressor.tree.n_features != n_features)
    {
        return Err(SklearnError::FeatureCount {
            index,
            expected: n_features,
            actual: regressor.tree.n_features,
        });
    }
    n_features
        .checked_sub(1)
        .and_then(|idx| u32::try_from(idx).ok())
        .ok_or_else(|| SklearnError::InvalidValue {
            field: "n_features",
            message: n_features.to_string(),
        })
}

/// Per-group initial raw scores from the init estimator.
fn initial_scores(model: &GradientBoostingClassifier, n_groups: usize) -> Result<Vec<f64>, SklearnError> {
    let priors = &model.init.priors;
    match model.init.name.as_str() {
        "LogOddsEstimator" => match priors.as_slice() {
            [prior] => Ok(vec![*prior; n_groups]),
            _ => Err(SklearnError::PriorCount {
                expected: 1,
                actual: priors.len(),
            }),
        },
        "PriorProbabilityEstimator" if priors.len() == n_groups => Ok(priors.clone()),
        "PriorProbabilityEstimator" => Err(SklearnError::PriorCount {
            expected: n_groups,
            actual: priors.len(),
        }),
        other => Err(ExtractError::UnknownInitEstimator(other.to_string()).into()),
    }
}

fn select_transform(
    model: &GradientBoostingClassifier,
    n_groups: usize,
    options: &LoadOptions,
) -> Result<OutputTransform, SklearnError> {
    if !options.load_transform {
        return Ok(OutputTransform::Raw);
    }
    match model.loss.as_str() {
        "deviance" | "log_loss" if n_groups == 1 => Ok(OutputTransform::Logistic),
        "deviance" | "log_loss" => Ok(OutputTransform::Softmax),
        other => Err(SklearnError::UnsupportedLoss(other.to_string())),
    }
}
