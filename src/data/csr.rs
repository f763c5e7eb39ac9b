//! Compressed sparse row (CSR) feature matrices.
//!
//! Row `i` holds the entries `indptr[i]..indptr[i + 1]` of `indices` (column
//! ids) and `values`. Columns that are not stored are absent; how an absent
//! feature is evaluated depends on the model (0.0 or NaN).

use ndarray::ArrayView2;

/// Structural errors for CSR input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CsrError {
    #[error("indptr must have at least one entry")]
    EmptyIndptr,
    #[error("indptr must start at 0 (got {0})")]
    IndptrStart(usize),
    #[error("indptr decreases at row {row}")]
    IndptrNotMonotonic { row: usize },
    #[error("indptr ends at {end} but there are {n_indices} indices and {n_values} values")]
    LengthMismatch {
        end: usize,
        n_indices: usize,
        n_values: usize,
    },
}

/// Borrowed CSR matrix.
#[derive(Debug, Clone, Copy)]
pub struct CsrView<'a> {
    indptr: &'a [usize],
    indices: &'a [usize],
    values: &'a [f64],
}

impl<'a> CsrView<'a> {
    /// Wrap CSR arrays after checking that they are consistent.
    pub fn new(indptr: &'a [usize], indices: &'a [usize], values: &'a [f64]) -> Result<Self, CsrError> {
        let (&first, &end) = match (indptr.first(), indptr.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(CsrError::EmptyIndptr),
        };
        if first != 0 {
            return Err(CsrError::IndptrStart(first));
        }
        if let Some(row) = indptr.windows(2).position(|w| w[1] < w[0]) {
            return Err(CsrError::IndptrNotMonotonic { row });
        }
        if end != indices.len() || end != values.len() {
            return Err(CsrError::LengthMismatch {
                end,
                n_indices: indices.len(),
                n_values: values.len(),
            });
        }
        Ok(Self {
            indptr,
            indices,
            values,
        })
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.indptr.len() - 1
    }

    /// Number of stored entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Column ids and values of row `row`.
    #[inline]
    pub fn row(&self, row: usize) -> (&'a [usize], &'a [f64]) {
        let range = self.indptr[row]..self.indptr[row + 1];
        (&self.indices[range.clone()], &self.values[range])
    }
}

/// Owned CSR matrix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsrMatrix {
    indptr: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<f64>,
}

impl CsrMatrix {
    pub fn new(indptr: Vec<usize>, indices: Vec<usize>, values: Vec<f64>) -> Result<Self, CsrError> {
        CsrView::new(&indptr, &indices, &values)?;
        Ok(Self {
            indptr,
            indices,
            values,
        })
    }

    /// Convert a dense matrix, storing every non-zero entry (NaN included).
    pub fn from_dense(dense: ArrayView2<'_, f64>) -> Self {
        let mut indptr = Vec::with_capacity(dense.nrows() + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        indptr.push(0);
        for row in dense.rows() {
            for (col, &value) in row.iter().enumerate() {
                if value != 0.0 {
                    indices.push(col);
                    values.push(value);
                }
            }
            indptr.push(values.len());
        }
        Self {
            indptr,
            indices,
            values,
        }
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.indptr.len().saturating_sub(1)
    }

    #[inline]
    pub fn view(&self) -> CsrView<'_> {
        CsrView {
            indptr: &self.indptr,
            indices: &self.indices,
            values: &self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn from_dense_skips_zeros() {
        let dense = array![[0.0, 1.5, 0.0], [f64::NAN, 0.0, 2.0], [0.0, 0.0, 0.0]];
        let csr = CsrMatrix::from_dense(dense.view());
        let view = csr.view();
        assert_eq!(view.n_rows(), 3);
        assert_eq!(view.nnz(), 3);
        assert_eq!(view.row(0), (&[1usize][..], &[1.5][..]));
        let (cols, vals) = view.row(1);
        assert_eq!(cols, &[0, 2]);
        assert!(vals[0].is_nan());
        assert_eq!(view.row(2).0.len(), 0);
    }

    #[test]
    fn new_validates_structure() {
        assert_eq!(CsrView::new(&[], &[], &[]).unwrap_err(), CsrError::EmptyIndptr);
        assert_eq!(
            CsrView::new(&[1, 1], &[0], &[1.0]).unwrap_err(),
            CsrError::IndptrStart(1)
        );
        assert_eq!(
            CsrView::new(&[0, 2, 1], &[0, 1], &[1.0, 2.0]).unwrap_err(),
            CsrError::IndptrNotMonotonic { row: 1 }
        );
        assert!(matches!(
            CsrMatrix::new(vec![0, 2], vec![0], vec![1.0]),
            Err(CsrError::LengthMismatch { end: 2, .. })
        ));
        assert_eq!(CsrView::new(&[0], &[], &[]).unwrap().n_rows(), 0);
    }
}
