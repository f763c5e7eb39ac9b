//! The loaded model: a booster, an output transform and a provenance name.
//!
//! Every loader returns an [`Ensemble`]. Prediction entry points resolve the
//! round limit, check buffer and matrix dimensions, and hand the rows to the
//! batch predictor in [`crate::inference::batch`].

use std::path::Path;

use ndarray::{Array2, ArrayView2};

use crate::data::CsrView;
use crate::error::{LoadError, PredictError};
use crate::inference::{LinearModelPredict, Predictor, RowScorer, batch};
use crate::repr::gbdt::Forest;
use crate::repr::gblinear::LinearModel;

use super::options::{LoadOptions, PredictOptions};
use super::transform::{OutputTransform, TransformMismatch};

// =============================================================================
// Booster
// =============================================================================

/// The scoring engine of a model.
#[derive(Debug, Clone)]
pub enum Booster {
    /// Additive tree ensemble.
    Trees(Forest),
    /// XGBoost `gblinear`.
    Linear(LinearModel),
}

impl Booster {
    fn n_features(&self) -> usize {
        match self {
            Booster::Trees(forest) => forest.n_features(),
            Booster::Linear(model) => model.n_features(),
        }
    }

    fn n_groups(&self) -> usize {
        match self {
            Booster::Trees(forest) => forest.n_groups(),
            Booster::Linear(model) => model.n_groups(),
        }
    }

    fn absent_value(&self) -> f64 {
        match self {
            Booster::Trees(forest) => forest.absent_value(),
            Booster::Linear(_) => 0.0,
        }
    }

    fn raw_scores_into(&self, features: &[f64], n_rounds: usize, raw: &mut [f64]) {
        match self {
            Booster::Trees(forest) => Predictor::new(forest).predict_row_into(features, n_rounds, raw),
            Booster::Linear(model) => model.predict_row_into(features, raw),
        }
    }
}

// =============================================================================
// Model format
// =============================================================================

/// Source format for [`Ensemble::from_file`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    /// LightGBM `save_model()` text.
    LightGbmText,
    /// LightGBM `dump_model()` JSON.
    LightGbmJson,
    /// XGBoost JSON, falling back to the legacy binary format.
    Xgboost,
    /// XGBoost legacy binary only.
    XgboostBinary,
    /// scikit-learn pickle (protocol 0).
    SklearnPickle,
}

// =============================================================================
// Ensemble
// =============================================================================

/// A loaded model ready for prediction.
///
/// Immutable after loading and safe to share between threads.
#[derive(Debug, Clone)]
pub struct Ensemble {
    name: String,
    booster: Booster,
    transform: OutputTransform,
}

impl Ensemble {
    /// Wrap a forest. Fails when `transform` does not fit its group count.
    pub fn from_forest(
        name: impl Into<String>,
        forest: Forest,
        transform: OutputTransform,
    ) -> Result<Self, TransformMismatch> {
        transform.check(forest.n_groups())?;
        Ok(Self {
            name: name.into(),
            booster: Booster::Trees(forest),
            transform,
        })
    }

    /// Wrap a linear model. Fails when `transform` does not fit its group count.
    pub fn from_linear(
        name: impl Into<String>,
        model: LinearModel,
        transform: OutputTransform,
    ) -> Result<Self, TransformMismatch> {
        transform.check(model.n_groups())?;
        Ok(Self {
            name: name.into(),
            booster: Booster::Linear(model),
            transform,
        })
    }

    /// Load a model file of a known format.
    pub fn from_file(
        path: impl AsRef<Path>,
        format: ModelFormat,
        options: &LoadOptions,
    ) -> Result<Self, LoadError> {
        use crate::compat::{lightgbm, sklearn, xgboost};

        let path = path.as_ref();
        let ensemble = match format {
            ModelFormat::LightGbmText => lightgbm::from_file(path, options)?,
            ModelFormat::LightGbmJson => lightgbm::json_from_file(path, options)?,
            ModelFormat::Xgboost => xgboost::from_file(path, options)?,
            ModelFormat::XgboostBinary => xgboost::binary_from_file(path, options)?,
            ModelFormat::SklearnPickle => sklearn::from_file(path, options)?,
        };
        Ok(ensemble)
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    /// Provenance name, e.g. `lightgbm.gbdt` or `xgboost.dart`.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn booster(&self) -> &Booster {
        &self.booster
    }

    /// The tree ensemble, or `None` for linear models.
    pub fn forest(&self) -> Option<&Forest> {
        match &self.booster {
            Booster::Trees(forest) => Some(forest),
            Booster::Linear(_) => None,
        }
    }

    /// Number of feature columns the model reads.
    pub fn n_features(&self) -> usize {
        self.booster.n_features()
    }

    /// Raw score groups per row.
    pub fn n_raw_groups(&self) -> usize {
        self.booster.n_groups()
    }

    /// Output values per row after the transform.
    pub fn n_outputs(&self) -> usize {
        self.transform.n_outputs(self.n_raw_groups())
    }

    /// Boosting rounds available. Linear models have one.
    pub fn n_rounds(&self) -> usize {
        match &self.booster {
            Booster::Trees(forest) => forest.n_rounds(),
            Booster::Linear(_) => 1,
        }
    }

    /// Total trees. Linear models have none.
    pub fn n_trees(&self) -> usize {
        match &self.booster {
            Booster::Trees(forest) => forest.n_trees(),
            Booster::Linear(_) => 0,
        }
    }

    pub fn transform(&self) -> OutputTransform {
        self.transform
    }

    fn adjust_rounds(&self, requested: usize) -> usize {
        match &self.booster {
            Booster::Trees(forest) => forest.adjust_rounds(requested),
            Booster::Linear(_) => 1,
        }
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Predict one row into `output` (at least [`n_outputs`](Self::n_outputs) long).
    ///
    /// Features past the end of `features` read as 0.0.
    pub fn predict_row(
        &self,
        features: &[f64],
        options: &PredictOptions,
        output: &mut [f64],
    ) -> Result<(), PredictError> {
        let width = self.n_outputs();
        if output.len() < width {
            return Err(PredictError::OutputTooShort {
                required: width,
                actual: output.len(),
            });
        }
        let kernel = ScoreKernel::new(self, options);
        let mut raw = vec![0.0; kernel.raw_len()];
        kernel.score_row(features, &mut raw, &mut output[..width]);
        Ok(())
    }

    /// Predict one row of a single-output model.
    pub fn predict_single(&self, features: &[f64], options: &PredictOptions) -> Result<f64, PredictError> {
        if self.n_outputs() != 1 {
            return Err(PredictError::Unsupported("single-value prediction of a multi-output model"));
        }
        let mut output = [0.0];
        self.predict_row(features, options, &mut output)?;
        Ok(output[0])
    }

    /// Predict every row of a dense matrix into a row-major `output` buffer.
    pub fn predict_dense(
        &self,
        features: ArrayView2<'_, f64>,
        options: &PredictOptions,
        output: &mut [f64],
    ) -> Result<(), PredictError> {
        let kernel = ScoreKernel::new(self, options);
        batch::predict_dense(&kernel, features, output, options.n_threads)
    }

    /// Predict every row of a dense matrix into a new `[n_rows, n_outputs]` array.
    pub fn predict_dense_alloc(
        &self,
        features: ArrayView2<'_, f64>,
        options: &PredictOptions,
    ) -> Result<Array2<f64>, PredictError> {
        let mut output = Array2::zeros((features.nrows(), self.n_outputs()));
        let buffer = output
            .as_slice_mut()
            .ok_or(PredictError::Unsupported("non-contiguous output array"))?;
        self.predict_dense(features, options, buffer)?;
        Ok(output)
    }

    /// Predict every row of a CSR matrix into a row-major `output` buffer.
    ///
    /// Features absent from a row take the model's absent value (0.0 for
    /// LightGBM and scikit-learn, NaN for XGBoost trees).
    pub fn predict_csr(
        &self,
        csr: CsrView<'_>,
        options: &PredictOptions,
        output: &mut [f64],
    ) -> Result<(), PredictError> {
        let kernel = ScoreKernel::new(self, options);
        batch::predict_csr(&kernel, csr, output, options.n_threads)
    }

    /// Leaf reached in each used tree for one row.
    ///
    /// `output` must hold at least `n_rounds * n_raw_groups` values.
    pub fn predict_leaf_indices_row(
        &self,
        features: &[f64],
        options: &PredictOptions,
        output: &mut [u32],
    ) -> Result<(), PredictError> {
        let kernel = LeafKernel::new(self, options)?;
        let width = kernel.width();
        if output.len() < width {
            return Err(PredictError::OutputTooShort {
                required: width,
                actual: output.len(),
            });
        }
        kernel.score_row(features, &mut [], &mut output[..width]);
        Ok(())
    }

    /// Leaf indices for every row of a dense matrix, row-major.
    pub fn predict_leaf_indices_dense(
        &self,
        features: ArrayView2<'_, f64>,
        options: &PredictOptions,
        output: &mut [u32],
    ) -> Result<(), PredictError> {
        let kernel = LeafKernel::new(self, options)?;
        batch::predict_dense(&kernel, features, output, options.n_threads)
    }
}

// =============================================================================
// Row kernels
// =============================================================================

/// Raw scores followed by the output transform.
struct ScoreKernel<'a> {
    booster: &'a Booster,
    transform: OutputTransform,
    n_rounds: usize,
}

impl<'a> ScoreKernel<'a> {
    fn new(ensemble: &'a Ensemble, options: &PredictOptions) -> Self {
        Self {
            booster: &ensemble.booster,
            transform: ensemble.transform,
            n_rounds: ensemble.adjust_rounds(options.n_rounds),
        }
    }
}

impl RowScorer for ScoreKernel<'_> {
    type Output = f64;

    fn n_features(&self) -> usize {
        self.booster.n_features()
    }

    fn width(&self) -> usize {
        self.transform.n_outputs(self.booster.n_groups())
    }

    fn raw_len(&self) -> usize {
        self.booster.n_groups()
    }

    fn absent_value(&self) -> f64 {
        self.booster.absent_value()
    }

    #[inline]
    fn score_row(&self, features: &[f64], raw: &mut [f64], output: &mut [f64]) {
        self.booster.raw_scores_into(features, self.n_rounds, raw);
        self.transform.apply(raw, output);
    }
}

/// Leaf index per used tree.
struct LeafKernel<'a> {
    predictor: Predictor<'a>,
    n_rounds: usize,
}

impl<'a> LeafKernel<'a> {
    fn new(ensemble: &'a Ensemble, options: &PredictOptions) -> Result<Self, PredictError> {
        match &ensemble.booster {
            Booster::Trees(forest) => Ok(Self {
                predictor: Predictor::new(forest),
                n_rounds: forest.adjust_rounds(options.n_rounds),
            }),
            Booster::Linear(_) => Err(PredictError::Unsupported("leaf index prediction")),
        }
    }
}

impl RowScorer for LeafKernel<'_> {
    type Output = u32;

    fn n_features(&self) -> usize {
        self.predictor.forest().n_features()
    }

    fn width(&self) -> usize {
        self.predictor.n_trees_used(self.n_rounds)
    }

    fn raw_len(&self) -> usize {
        0
    }

    fn absent_value(&self) -> f64 {
        self.predictor.forest().absent_value()
    }

    #[inline]
    fn score_row(&self, features: &[f64], _raw: &mut [f64], output: &mut [u32]) {
        self.predictor
            .predict_leaf_indices_into(features, self.n_rounds, output);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CsrMatrix;
    use crate::repr::gbdt::{MissingType, Node, Tree};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn stump(feature: u32, threshold: f64, left: f64, right: f64) -> Tree {
        let mut root = Node::numerical(feature, threshold, MissingType::None, false);
        root.set_left_leaf(0);
        root.set_right_leaf(1);
        Tree::new(vec![root], vec![left, right], Vec::new(), Vec::new())
    }

    fn two_class_forest() -> Forest {
        let mut forest = Forest::new(2).with_max_feature_idx(1);
        forest.push_tree(stump(0, 0.5, 1.0, -1.0), 0);
        forest.push_tree(stump(1, 0.5, -1.0, 1.0), 1);
        forest.push_tree(stump(0, 0.5, 0.5, 0.0), 0);
        forest.push_tree(stump(1, 0.5, 0.0, 0.5), 1);
        forest
    }

    #[test]
    fn metadata() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Softmax).unwrap();
        assert_eq!(ensemble.name(), "test");
        assert_eq!(ensemble.n_features(), 2);
        assert_eq!(ensemble.n_raw_groups(), 2);
        assert_eq!(ensemble.n_outputs(), 2);
        assert_eq!(ensemble.n_rounds(), 2);
        assert_eq!(ensemble.n_trees(), 4);
        assert!(ensemble.forest().is_some());
    }

    #[test]
    fn transform_must_fit_groups() {
        let err = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Logistic).unwrap_err();
        assert_eq!(err.n_groups, 2);
    }

    #[test]
    fn predict_row_respects_rounds() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Raw).unwrap();
        let mut out = [0.0; 2];

        ensemble.predict_row(&[0.0, 1.0], &PredictOptions::default(), &mut out).unwrap();
        assert_eq!(out, [1.5, 1.5]);

        let one_round = PredictOptions::builder().n_rounds(1).build();
        ensemble.predict_row(&[0.0, 1.0], &one_round, &mut out).unwrap();
        assert_eq!(out, [1.0, 1.0]);

        let clamped = PredictOptions::builder().n_rounds(99).build();
        ensemble.predict_row(&[0.0, 1.0], &clamped, &mut out).unwrap();
        assert_eq!(out, [1.5, 1.5]);
    }

    #[test]
    fn softmax_rows_sum_to_one() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Softmax).unwrap();
        let data = array![[0.0, 0.0], [1.0, 1.0], [0.0, 1.0]];
        let out = ensemble
            .predict_dense_alloc(data.view(), &PredictOptions::default())
            .unwrap();
        for row in out.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn predict_single_requires_one_output() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Raw).unwrap();
        assert!(matches!(
            ensemble.predict_single(&[0.0, 0.0], &PredictOptions::default()),
            Err(PredictError::Unsupported(_))
        ));

        let mut forest = Forest::for_regression().with_base_score(0.25);
        forest.push_tree(stump(0, 0.0, -1.0, 1.0), 0);
        let ensemble = Ensemble::from_forest("reg", forest, OutputTransform::Raw).unwrap();
        let value = ensemble.predict_single(&[1.0], &PredictOptions::default()).unwrap();
        assert_abs_diff_eq!(value, 1.25);
    }

    #[test]
    fn short_output_is_rejected() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Raw).unwrap();
        let mut out = [0.0; 1];
        assert!(matches!(
            ensemble.predict_row(&[0.0, 0.0], &PredictOptions::default(), &mut out),
            Err(PredictError::OutputTooShort { required: 2, actual: 1 })
        ));
    }

    #[test]
    fn csr_matches_dense() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Raw).unwrap();
        let data = array![[0.0, 0.0], [1.0, 0.0], [0.0, 2.0], [3.0, 4.0]];
        let csr = CsrMatrix::from_dense(data.view());

        let options = PredictOptions::default();
        let mut dense_out = vec![0.0; 8];
        let mut csr_out = vec![0.0; 8];
        ensemble.predict_dense(data.view(), &options, &mut dense_out).unwrap();
        ensemble.predict_csr(csr.view(), &options, &mut csr_out).unwrap();
        assert_eq!(dense_out, csr_out);
    }

    #[test]
    fn leaf_indices() {
        let ensemble = Ensemble::from_forest("test", two_class_forest(), OutputTransform::Raw).unwrap();
        let mut out = [0u32; 4];
        ensemble
            .predict_leaf_indices_row(&[1.0, 0.0], &PredictOptions::default(), &mut out)
            .unwrap();
        assert_eq!(out, [1, 0, 1, 0]);

        let data = array![[0.0, 1.0], [1.0, 0.0]];
        let options = PredictOptions::builder().n_rounds(1).build();
        let mut out = [0u32; 4];
        ensemble
            .predict_leaf_indices_dense(data.view(), &options, &mut out)
            .unwrap();
        assert_eq!(out, [0, 1, 1, 0]);
    }

    #[test]
    fn linear_model() {
        let model = LinearModel::from_flat(vec![2.0, 0.5], 1, 1, 0.5).unwrap();
        let ensemble = Ensemble::from_linear("xgboost.gblinear", model, OutputTransform::Raw).unwrap();
        assert_eq!(ensemble.n_rounds(), 1);
        assert_eq!(ensemble.n_trees(), 0);

        let value = ensemble.predict_single(&[3.0], &PredictOptions::default()).unwrap();
        assert_abs_diff_eq!(value, 0.5 + 0.5 + 6.0);

        let mut out = [0u32; 1];
        assert!(matches!(
            ensemble.predict_leaf_indices_row(&[3.0], &PredictOptions::default(), &mut out),
            Err(PredictError::Unsupported(_))
        ));
    }
}
