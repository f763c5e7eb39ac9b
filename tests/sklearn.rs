//! Integration tests for pickled scikit-learn classifiers.
//!
//! Models are written with [`PickleWriter`], which emits the same protocol 0
//! stream `pickle.dump(model, f, protocol=0)` produces.

use std::path::PathBuf;

use canopy::compat::sklearn::{self, ExtractError, SklearnError};
use canopy::testing::assert_slice_approx_eq;
use canopy::testing::pickle::{GbcFixture, InitPrior, PickleWriter, TreeFixture};
use canopy::{Ensemble, LoadOptions, ModelFormat, OutputTransform, PredictOptions};
use ndarray::array;

/// x0 <= 1 ? 20 : (x1 <= 0 ? 10 : 30), with children stored out of order.
fn shuffled_tree() -> TreeFixture {
    TreeFixture::new(
        vec![
            (3, 1, 0, 1.0),
            (2, 4, 1, 0.0),
            (-1, -1, -2, -2.0),
            (-1, -1, -2, -2.0),
            (-1, -1, -2, -2.0),
        ],
        vec![0.0, 0.0, 10.0, 20.0, 30.0],
    )
}

fn stump(feature: i64, threshold: f64, left: f64, right: f64) -> TreeFixture {
    TreeFixture::new(
        vec![(1, 2, feature, threshold), (-1, -1, -2, -2.0), (-1, -1, -2, -2.0)],
        vec![0.0, left, right],
    )
}

fn binary_model() -> GbcFixture {
    GbcFixture {
        n_classes: 2,
        n_features: 2,
        max_features: None,
        learning_rate: 0.5,
        init: InitPrior::LogOdds(-0.2),
        stages: vec![vec![shuffled_tree()], vec![stump(1, 5.0, -2.0, 2.0)]],
    }
}

fn write_pickle(name: &str, model: &GbcFixture) -> PathBuf {
    let mut writer = PickleWriter::new();
    writer.gradient_boosting(model);
    let path = std::env::temp_dir().join(format!("canopy-{}-{name}.pkl", std::process::id()));
    std::fs::write(&path, writer.finish()).expect("write pickle");
    path
}

#[test]
fn binary_classifier_from_file() {
    let path = write_pickle("binary", &binary_model());
    let model = Ensemble::from_file(&path, ModelFormat::SklearnPickle, &LoadOptions::default()).expect("load");
    std::fs::remove_file(&path).ok();

    assert_eq!(model.name(), "sklearn.ensemble.GradientBoostingClassifier");
    assert_eq!(model.n_raw_groups(), 1);
    assert_eq!(model.n_rounds(), 2);

    let input = array![[0.0, 0.0], [2.0, -1.0], [2.0, 7.0], [f64::NAN, f64::NAN]];
    let output = model
        .predict_dense_alloc(input.view(), &PredictOptions::default())
        .expect("predict");
    assert_slice_approx_eq(
        output.as_slice().expect("contiguous"),
        &[8.8, 3.8, 15.8, 8.8],
        1e-12,
        "raw scores",
    );
}

#[test]
fn binary_classifier_probabilities() {
    let path = write_pickle("binary-proba", &binary_model());
    let model = sklearn::from_file(&path, &LoadOptions::with_transform()).expect("load");
    std::fs::remove_file(&path).ok();

    assert_eq!(model.transform(), OutputTransform::Logistic);
    let p = model
        .predict_single(&[2.0, -1.0], &PredictOptions::default())
        .expect("predict");
    assert!((p - 1.0 / (1.0 + (-3.8f64).exp())).abs() < 1e-12);
}

#[test]
fn multiclass_softmax_sums_to_one() {
    let model = GbcFixture {
        n_classes: 3,
        n_features: 2,
        max_features: None,
        learning_rate: 0.1,
        init: InitPrior::Priors(vec![0.2, 0.3, 0.5]),
        stages: vec![
            vec![stump(0, 0.5, 1.0, -1.0), stump(1, 0.5, -1.0, 1.0), shuffled_tree()],
            vec![TreeFixture::leaf(0.5), stump(0, 1.5, 2.0, 0.0), TreeFixture::leaf(-0.5)],
        ],
    };
    let path = write_pickle("multiclass", &model);
    let raw = sklearn::from_file(&path, &LoadOptions::default()).expect("load raw");
    let proba = sklearn::from_file(&path, &LoadOptions::with_transform()).expect("load proba");
    std::fs::remove_file(&path).ok();

    let mut scores = [0.0; 3];
    raw.predict_row(&[0.0, 1.0], &PredictOptions::default(), &mut scores)
        .expect("raw");
    assert_slice_approx_eq(&scores, &[0.2 + 0.1 + 0.05, 0.3 + 0.1 + 0.2, 0.5 + 2.0 - 0.05], 1e-12, "raw");

    let mut probs = [0.0; 3];
    proba
        .predict_row(&[0.0, 1.0], &PredictOptions::default(), &mut probs)
        .expect("proba");
    assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    assert!(probs[2] > probs[1] && probs[1] > probs[0]);
}

#[test]
fn other_estimators_are_rejected() {
    let mut writer = PickleWriter::new();
    writer.object("sklearn.ensemble._forest", "RandomForestClassifier", |w| {
        w.dict_entry("n_estimators", |w| {
            w.int(10);
        });
    });
    let err = sklearn::load_pickle(writer.finish().as_slice(), &LoadOptions::default()).unwrap_err();
    assert!(matches!(err, SklearnError::Extract(ExtractError::Global { .. })), "{err}");
}
