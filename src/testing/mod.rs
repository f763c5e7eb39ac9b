//! Testing utilities for canopy.
//!
//! Assertion helpers, JSON test-case loading and the pickle fixture writer,
//! shared by unit tests, integration tests and benchmarks.
//!
//! ```ignore
//! use canopy::testing::{assert_slice_approx_eq, fixture_path, DEFAULT_TOLERANCE};
//! ```

pub mod cases;
pub mod pickle;

use std::path::PathBuf;

use approx::AbsDiffEq;
use ndarray::ArrayView2;

pub use cases::{TestCase, TestExpected, TestInput};

// =============================================================================
// Constants
// =============================================================================

/// Default tolerance for comparing against reference predictions.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Path of a fixture under `tests/test-cases`.
pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/test-cases").join(relative)
}

// =============================================================================
// Floating Point Assertions
// =============================================================================

/// Assert that two slices are approximately equal element-wise.
///
/// NaN matches NaN.
///
/// # Panics
///
/// Panics if lengths differ or any element differs by more than tolerance.
pub fn assert_slice_approx_eq(actual: &[f64], expected: &[f64], tolerance: f64, context: &str) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "{context}: length mismatch - got {}, expected {}",
        actual.len(),
        expected.len()
    );

    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        if a.is_nan() && e.is_nan() {
            continue;
        }
        let diff = (a - e).abs();
        assert!(diff <= tolerance, "{context}[{i}]: {a} ≠ {e} (diff={diff}, tolerance={tolerance})");
    }
}

// =============================================================================
// Prediction Assertions
// =============================================================================

/// Git-style diff of the rows that differ.
fn diff_predictions(actual: ArrayView2<'_, f64>, expected: ArrayView2<'_, f64>, epsilon: f64) -> String {
    let mut result = format!("Shape: {:?}\nEpsilon: {epsilon:.0e}\n\n", actual.shape());

    for (i, (act_row, exp_row)) in actual.rows().into_iter().zip(expected.rows()).enumerate() {
        let row_differs = act_row.iter().zip(exp_row.iter()).any(|(a, e)| !a.abs_diff_eq(e, epsilon));
        if !row_differs {
            continue;
        }

        result.push_str(&format!("[{i:3}] -"));
        for val in exp_row {
            result.push_str(&format!(" {val:>12.6}"));
        }
        result.push_str("  (expected)\n      +");
        for val in act_row {
            result.push_str(&format!(" {val:>12.6}"));
        }
        result.push_str("  (actual)\n      Δ");
        for (a, e) in act_row.iter().zip(exp_row.iter()) {
            if a.abs_diff_eq(e, epsilon) {
                result.push_str(&format!(" {:>12}", "-"));
            } else {
                result.push_str(&format!(" {:>+12.2e}", a - e));
            }
        }
        result.push('\n');
    }

    result
}

/// Assert that two prediction matrices are approximately equal.
///
/// On failure, shows a git-style diff of the differing rows.
///
/// # Panics
///
/// Panics if shapes differ or any value differs by more than epsilon.
pub fn assert_predictions_eq(actual: ArrayView2<'_, f64>, expected: ArrayView2<'_, f64>, epsilon: f64, context: &str) {
    if actual.shape() != expected.shape() {
        panic!(
            "\n{context}: shape mismatch\n- {:?}  (expected)\n+ {:?}  (actual)\n",
            expected.shape(),
            actual.shape()
        );
    }

    let diff_count = actual
        .iter()
        .zip(expected.iter())
        .filter(|(a, e)| !a.abs_diff_eq(e, epsilon))
        .count();
    if diff_count > 0 {
        let total = actual.len();
        let diff_output = diff_predictions(actual, expected, epsilon);
        panic!("\n{context}: {diff_count}/{total} values differ\n\n{diff_output}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn slice_approx_eq() {
        assert_slice_approx_eq(&[1.0, 2.0, f64::NAN], &[1.0000001, 2.0, f64::NAN], 1e-6, "test");
    }

    #[test]
    #[should_panic(expected = "test[1]")]
    fn slice_approx_eq_fails() {
        assert_slice_approx_eq(&[1.0, 2.0], &[1.0, 2.5], 1e-6, "test");
    }

    #[test]
    fn predictions_eq() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[1.0000001, 2.0], [3.0, 4.0000001]];
        assert_predictions_eq(a.view(), b.view(), 1e-6, "test");
    }

    #[test]
    #[should_panic(expected = "1/4 values differ")]
    fn predictions_eq_reports_diff() {
        let a = array![[1.0, 2.0], [3.0, 4.0]];
        let b = array![[1.0, 2.0], [3.0, 5.0]];
        assert_predictions_eq(a.view(), b.view(), 1e-6, "test");
    }

    #[test]
    fn fixture_path_is_under_tests() {
        let path = fixture_path("lightgbm/two_trees/model.txt");
        assert!(path.ends_with("tests/test-cases/lightgbm/two_trees/model.txt"));
    }
}
