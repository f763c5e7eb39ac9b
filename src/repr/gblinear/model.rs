//! Linear model data structure.

use ndarray::{Array2, ArrayView1, ShapeError, s};

/// Linear booster model (weights + bias).
///
/// The weights are stored as an `Array2<f64>` with shape `[n_features + 1, n_groups]`:
///
/// ```text
/// weights[[feature, group]] → coefficient
/// weights[[n_features, group]] → bias (last row)
/// ```
///
/// This is the layout XGBoost serializes for `gblinear`, so a flat weight
/// vector from a model file maps onto it without reordering.
///
/// # Example
///
/// ```
/// use canopy::repr::gblinear::LinearModel;
///
/// // 2 features, 1 group: w0, w1, bias
/// let model = LinearModel::from_flat(vec![0.5, -1.0, 0.25], 2, 1, 0.0).unwrap();
/// assert_eq!(model.weight(1, 0), -1.0);
/// assert_eq!(model.bias(0), 0.25);
/// ```
#[derive(Debug, Clone)]
pub struct LinearModel {
    /// Weight matrix: shape `[n_features + 1, n_groups]`
    /// Last row is the bias term.
    weights: Array2<f64>,
    base_score: f64,
}

impl LinearModel {
    /// Create a linear model from a flat weight slice.
    ///
    /// `weights` must have `(n_features + 1) * n_groups` entries in row-major
    /// order (feature-major, group-minor).
    pub fn from_flat(
        weights: Vec<f64>,
        n_features: usize,
        n_groups: usize,
        base_score: f64,
    ) -> Result<Self, ShapeError> {
        let weights = Array2::from_shape_vec((n_features + 1, n_groups), weights)?;
        Ok(Self { weights, base_score })
    }

    /// Number of input features.
    #[inline]
    pub fn n_features(&self) -> usize {
        self.weights.nrows() - 1
    }

    /// Number of output groups.
    #[inline]
    pub fn n_groups(&self) -> usize {
        self.weights.ncols()
    }

    /// Score added to every group before the bias.
    #[inline]
    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    /// Get weight for a feature and group.
    #[inline]
    pub fn weight(&self, feature: usize, group: usize) -> f64 {
        self.weights[[feature, group]]
    }

    /// Get bias for a group.
    #[inline]
    pub fn bias(&self, group: usize) -> f64 {
        self.weights[[self.n_features(), group]]
    }

    /// Get all biases as a view of length `n_groups`.
    #[inline]
    pub fn biases(&self) -> ArrayView1<'_, f64> {
        self.weights.row(self.n_features())
    }

    /// Coefficients of one feature across groups.
    #[inline]
    pub fn feature_weights(&self, feature: usize) -> ArrayView1<'_, f64> {
        self.weights.slice(s![feature, ..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_model_from_flat() {
        let model = LinearModel::from_flat(vec![0.5, 0.3, 0.1], 2, 1, 0.0).unwrap();
        assert_eq!(model.n_features(), 2);
        assert_eq!(model.n_groups(), 1);
        assert_eq!(model.weight(0, 0), 0.5);
        assert_eq!(model.weight(1, 0), 0.3);
        assert_eq!(model.bias(0), 0.1);
    }

    #[test]
    fn linear_model_multigroup() {
        let weights = vec![
            0.1, 0.2, // feature 0: group 0, group 1
            0.3, 0.4, // feature 1
            0.5, 0.6, // bias
        ];
        let model = LinearModel::from_flat(weights, 2, 2, 0.5).unwrap();
        assert_eq!(model.weight(1, 1), 0.4);
        assert_eq!(model.biases().to_vec(), vec![0.5, 0.6]);
        assert_eq!(model.feature_weights(0).to_vec(), vec![0.1, 0.2]);
        assert_eq!(model.base_score(), 0.5);
    }

    #[test]
    fn linear_model_shape_mismatch() {
        assert!(LinearModel::from_flat(vec![0.0; 5], 2, 2, 0.0).is_err());
    }
}
