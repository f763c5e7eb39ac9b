//! Output transformation for inference.
//!
//! The [`OutputTransform`] enum defines how one row's raw per-group scores
//! (margins) are converted to final predictions. It is chosen at load time
//! from the model's objective when transforms are requested.
//!
//! # Variants
//!
//! - [`Raw`](OutputTransform::Raw): No transformation (regression, raw margins)
//! - [`Logistic`](OutputTransform::Logistic): Logistic sigmoid for binary classification
//! - [`Softmax`](OutputTransform::Softmax): Softmax for multiclass classification
//! - [`Exponential`](OutputTransform::Exponential): `exp` for log-link objectives

use std::fmt;

/// The raw group count does not fit a transform.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{transform} transform cannot be applied to {n_groups} raw output groups")]
pub struct TransformMismatch {
    pub transform: OutputTransform,
    pub n_groups: usize,
}

/// Inference-time output transformation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OutputTransform {
    /// No transformation; output = margin.
    #[default]
    Raw,

    /// Logistic sigmoid: output = 1 / (1 + exp(-margin)).
    /// Requires exactly one raw group.
    Logistic,

    /// Softmax: output_i = exp(margin_i - max) / sum(exp(margin_j - max)).
    Softmax,

    /// Exponential: output = exp(margin).
    /// Used for poisson, gamma and tweedie objectives. Requires one raw group.
    Exponential,
}

impl OutputTransform {
    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            OutputTransform::Raw => "raw",
            OutputTransform::Logistic => "logistic",
            OutputTransform::Softmax => "softmax",
            OutputTransform::Exponential => "exponential",
        }
    }

    /// Check that the transform can be applied to `n_groups` raw scores.
    pub fn check(self, n_groups: usize) -> Result<(), TransformMismatch> {
        let ok = match self {
            OutputTransform::Raw | OutputTransform::Softmax => n_groups >= 1,
            OutputTransform::Logistic | OutputTransform::Exponential => n_groups == 1,
        };
        if ok {
            Ok(())
        } else {
            Err(TransformMismatch {
                transform: self,
                n_groups,
            })
        }
    }

    /// Number of output values per row for `n_groups` raw scores.
    #[inline]
    pub fn n_outputs(self, n_groups: usize) -> usize {
        match self {
            OutputTransform::Logistic | OutputTransform::Exponential => 1,
            OutputTransform::Raw | OutputTransform::Softmax => n_groups,
        }
    }

    /// Apply the transformation to one row.
    ///
    /// `output.len()` must equal [`n_outputs(raw.len())`](Self::n_outputs).
    ///
    /// # NaN/Inf Behavior
    ///
    /// NaN inputs propagate through without panics (garbage-in, garbage-out).
    #[inline]
    pub fn apply(self, raw: &[f64], output: &mut [f64]) {
        debug_assert_eq!(output.len(), self.n_outputs(raw.len()));

        match self {
            OutputTransform::Raw => output.copy_from_slice(raw),
            OutputTransform::Logistic => output[0] = sigmoid(raw[0]),
            OutputTransform::Exponential => output[0] = raw[0].exp(),
            OutputTransform::Softmax => {
                output.copy_from_slice(raw);
                softmax_inplace(output);
            }
        }
    }
}

impl fmt::Display for OutputTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Numerically stable sigmoid.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Numerically stable softmax in-place.
/// Subtracts max before exponentiating to avoid overflow.
#[inline]
pub fn softmax_inplace(row: &mut [f64]) {
    if row.is_empty() {
        return;
    }

    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    let mut sum = 0.0;
    for x in row.iter_mut() {
        *x = (*x - max).exp();
        sum += *x;
    }

    if sum > 0.0 {
        for x in row.iter_mut() {
            *x /= sum;
        }
    }
}
