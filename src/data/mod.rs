//! Feature matrix inputs.
//!
//! Dense input is an ndarray [`ArrayView2<f64>`](ndarray::ArrayView2) with one
//! sample per row. Sparse input is a [`CsrView`] over compressed sparse row
//! arrays. Missing values are represented as `f64::NAN`.

mod csr;

pub use csr::{CsrError, CsrMatrix, CsrView};

/// Semantic axis constants for ML domain.
pub mod axis {
    use ndarray::Axis;

    pub const ROWS: Axis = Axis(0);
    pub const COLS: Axis = Axis(1);
}

/// View a flat row-major buffer as a `[n_rows, n_cols]` matrix.
pub fn dense_view(
    values: &[f64],
    n_rows: usize,
    n_cols: usize,
) -> Result<ndarray::ArrayView2<'_, f64>, ndarray::ShapeError> {
    ndarray::ArrayView2::from_shape((n_rows, n_cols), values)
}
