//! Linear model prediction extensions.
//!
//! Provides prediction methods for [`LinearModel`](crate::repr::gblinear::LinearModel).

use crate::repr::gblinear::LinearModel;

/// Extension trait for LinearModel prediction.
pub trait LinearModelPredict {
    /// Raw scores for a single row.
    ///
    /// `output[k] = base_score + bias[k] + Σ features[i] * weight[i][k]`.
    /// Features past the end of the row read as 0.0.
    fn predict_row_into(&self, features: &[f64], output: &mut [f64]);
}

impl LinearModelPredict for LinearModel {
    fn predict_row_into(&self, features: &[f64], output: &mut [f64]) {
        assert_eq!(output.len(), self.n_groups(), "output length must equal n_groups");

        for (out, &bias) in output.iter_mut().zip(self.biases()) {
            *out = self.base_score() + bias;
        }

        for (feature, &value) in features.iter().take(self.n_features()).enumerate() {
            for (out, &w) in output.iter_mut().zip(self.feature_weights(feature)) {
                *out += value * w;
            }
        }
    }
}
