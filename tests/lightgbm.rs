//! Integration tests for LightGBM model compatibility.
//!
//! Fixtures live in `tests/test-cases/lightgbm/<case>/`: a model file next to
//! `input.json` and `expected.json`.

use canopy::compat::lightgbm::{self, LightGbmError};
use canopy::testing::{DEFAULT_TOLERANCE, TestCase, assert_predictions_eq};
use canopy::{Ensemble, LoadOptions, ModelFormat, OutputTransform, PredictOptions};
use ndarray::Array2;

fn to_array(rows: Vec<Vec<f64>>) -> Array2<f64> {
    let n_cols = rows.first().map_or(0, Vec::len);
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((flat.len() / n_cols.max(1), n_cols), flat).expect("rectangular rows")
}

fn check_case(case: &TestCase, model: &Ensemble, transformed: bool) {
    let input = case.input().to_array();
    let expected = case.expected();
    let rows = if transformed {
        expected.transformed_rows().expect("transformed predictions")
    } else {
        expected.raw_rows()
    };
    let actual = model
        .predict_dense_alloc(input.view(), &PredictOptions::default())
        .expect("prediction");
    assert_predictions_eq(actual.view(), to_array(rows).view(), DEFAULT_TOLERANCE, "lightgbm");
}

mod text {
    use super::*;

    #[test]
    fn binary_raw() {
        let case = TestCase::new("lightgbm/binary");
        let model = lightgbm::from_file(case.path("model.txt"), &LoadOptions::default()).expect("load");
        assert_eq!(model.name(), "lightgbm.gbdt");
        assert_eq!(model.n_features(), 3);
        assert_eq!(model.n_trees(), 2);
        assert_eq!(model.transform(), OutputTransform::Raw);
        check_case(&case, &model, false);
    }

    #[test]
    fn binary_transformed() {
        let case = TestCase::new("lightgbm/binary");
        let model = lightgbm::from_file(case.path("model.txt"), &LoadOptions::with_transform()).expect("load");
        assert_eq!(model.transform(), OutputTransform::Logistic);
        check_case(&case, &model, true);
    }

    #[test]
    fn multiclass_with_categorical_split() {
        let case = TestCase::new("lightgbm/multiclass");
        let model = lightgbm::from_file(case.path("model.txt"), &LoadOptions::default()).expect("load");
        assert_eq!(model.n_raw_groups(), 3);
        assert_eq!(model.n_rounds(), 2);
        assert_eq!(model.n_trees(), 6);
        check_case(&case, &model, false);

        let model = lightgbm::from_file(case.path("model.txt"), &LoadOptions::with_transform()).expect("load");
        assert_eq!(model.transform(), OutputTransform::Softmax);
        check_case(&case, &model, true);
    }

    #[test]
    fn first_round_only() {
        let case = TestCase::new("lightgbm/binary");
        let model = lightgbm::from_file(case.path("model.txt"), &LoadOptions::default()).expect("load");
        let options = PredictOptions::builder().n_rounds(1).build();
        let score = model.predict_single(&[2.0, 2.0, 1.0], &options).expect("predict");
        assert!((score - 0.25).abs() < 1e-12);
    }

    #[test]
    fn truncated_model_names_the_tree() {
        let case = TestCase::new("lightgbm/binary");
        let text = std::fs::read_to_string(case.path("model.txt")).expect("read");
        let cut = text.find("Tree=1").expect("second tree");
        let err = lightgbm::load_text(text[..cut].as_bytes(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, LightGbmError::Tree { index: 1, .. }), "{err}");
    }
}

mod json {
    use super::*;

    #[test]
    fn dump_matches_text_model() {
        let case = TestCase::new("lightgbm/binary");
        let model = lightgbm::json_from_file(case.path("model.json"), &LoadOptions::default()).expect("load");
        assert_eq!(model.name(), "lightgbm.gbdt");
        assert_eq!(model.n_trees(), 2);
        check_case(&case, &model, false);
    }

    #[test]
    fn transform_is_rejected() {
        let case = TestCase::new("lightgbm/binary");
        let err = lightgbm::json_from_file(case.path("model.json"), &LoadOptions::with_transform()).unwrap_err();
        assert!(matches!(err, LightGbmError::TransformUnsupported));
    }
}

mod dispatch {
    use super::*;

    #[test]
    fn from_file_by_format() {
        let case = TestCase::new("lightgbm/binary");
        let text = Ensemble::from_file(case.path("model.txt"), ModelFormat::LightGbmText, &LoadOptions::default())
            .expect("text");
        let json = Ensemble::from_file(case.path("model.json"), ModelFormat::LightGbmJson, &LoadOptions::default())
            .expect("json");

        let input = case.input().to_array();
        let options = PredictOptions::default();
        let a = text.predict_dense_alloc(input.view(), &options).expect("text predict");
        let b = json.predict_dense_alloc(input.view(), &options).expect("json predict");
        assert_predictions_eq(a.view(), b.view(), 1e-12, "text vs json");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Ensemble::from_file(
            "does/not/exist.txt",
            ModelFormat::LightGbmText,
            &LoadOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, canopy::LoadError::LightGbm(LightGbmError::Io(_))));
    }
}
