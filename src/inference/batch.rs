//! Batched, optionally parallel prediction over dense and CSR matrices.
//!
//! Rows are split into batches of [`BATCH_SIZE`]. Small inputs and
//! `n_threads <= 1` run on the calling thread; otherwise a dedicated pool of
//! `min(n_threads, n_batches)` workers drains the batches. Every worker owns
//! its scratch buffers and writes only the output rows of the batches it
//! claims, so results do not depend on scheduling.

use ndarray::ArrayView2;

use crate::data::{CsrView, axis};
use crate::error::PredictError;
use crate::utils::run_with_threads;

/// Rows per work item.
pub const BATCH_SIZE: usize = 16;

/// Per-row scoring kernel driven by the batch functions.
pub trait RowScorer: Sync {
    /// Output element type.
    type Output: Copy + Send;

    /// Length of the sparse feature scratch buffer.
    fn n_features(&self) -> usize;

    /// Output values written per row.
    fn width(&self) -> usize;

    /// Length of the per-worker raw score buffer.
    fn raw_len(&self) -> usize;

    /// Value of a feature absent from a sparse row.
    fn absent_value(&self) -> f64;

    /// Score one row into `output` (length [`width`](Self::width)).
    fn score_row(&self, features: &[f64], raw: &mut [f64], output: &mut [Self::Output]);
}

/// Worker-local buffers.
struct Scratch {
    features: Vec<f64>,
    raw: Vec<f64>,
}

impl Scratch {
    fn new<S: RowScorer>(scorer: &S) -> Self {
        Self {
            features: vec![scorer.absent_value(); scorer.n_features()],
            raw: vec![0.0; scorer.raw_len()],
        }
    }
}

/// Number of workers for `n_rows` rows.
#[inline]
pub fn n_workers(n_threads: usize, n_rows: usize) -> usize {
    if n_threads <= 1 || n_rows <= BATCH_SIZE {
        1
    } else {
        n_threads.min(n_rows.div_ceil(BATCH_SIZE))
    }
}

fn check_output(n_rows: usize, width: usize, len: usize) -> Result<(), PredictError> {
    let required = n_rows * width;
    if len < required {
        return Err(PredictError::OutputTooShort {
            required,
            actual: len,
        });
    }
    Ok(())
}

/// Score every row of a dense `[n_rows, n_cols]` matrix.
///
/// Fails before scoring when `output` is shorter than `n_rows * width` or the
/// matrix has fewer columns than the model reads. Only the first
/// `n_rows * width` output values are written.
pub fn predict_dense<S: RowScorer>(
    scorer: &S,
    features: ArrayView2<'_, f64>,
    output: &mut [S::Output],
    n_threads: usize,
) -> Result<(), PredictError> {
    let n_rows = features.nrows();
    let width = scorer.width();
    check_output(n_rows, width, output.len())?;
    if features.ncols() == 0 || scorer.n_features() > features.ncols() {
        return Err(PredictError::TooFewColumns {
            required: scorer.n_features(),
            actual: features.ncols(),
        });
    }
    if n_rows == 0 || width == 0 {
        return Ok(());
    }

    let workers = n_workers(n_threads, n_rows);
    tracing::debug!(n_rows, n_cols = features.ncols(), workers, "dense prediction");

    let output = &mut output[..n_rows * width];
    run_with_threads(workers, |parallelism| {
        let chunks = features
            .axis_chunks_iter(axis::ROWS, BATCH_SIZE)
            .zip(output.chunks_mut(BATCH_SIZE * width));

        parallelism.maybe_par_bridge_for_each_init(
            chunks,
            || Scratch::new(scorer),
            |scratch, (rows, out)| {
                for (row, out_row) in rows.rows().into_iter().zip(out.chunks_mut(width)) {
                    let row_features = match row.as_slice() {
                        Some(values) => values,
                        None => {
                            scratch.features.clear();
                            scratch.features.extend(row.iter().copied());
                            scratch.features.as_slice()
                        }
                    };
                    scorer.score_row(row_features, &mut scratch.raw, out_row);
                }
            },
        );
    })?;

    Ok(())
}

/// Score every row of a CSR matrix.
///
/// Each worker scatters a row into its scratch buffer, scores it, and resets
/// only the positions it wrote back to the absent value. Column ids at or past
/// the scratch length are ignored.
pub fn predict_csr<S: RowScorer>(
    scorer: &S,
    csr: CsrView<'_>,
    output: &mut [S::Output],
    n_threads: usize,
) -> Result<(), PredictError> {
    let n_rows = csr.n_rows();
    let width = scorer.width();
    check_output(n_rows, width, output.len())?;
    if n_rows == 0 || width == 0 {
        return Ok(());
    }

    let workers = n_workers(n_threads, n_rows);
    tracing::debug!(n_rows, nnz = csr.nnz(), workers, "csr prediction");

    let absent = scorer.absent_value();
    let output = &mut output[..n_rows * width];
    run_with_threads(workers, |parallelism| {
        let chunks = output.chunks_mut(BATCH_SIZE * width).enumerate();

        parallelism.maybe_par_bridge_for_each_init(
            chunks,
            || Scratch::new(scorer),
            |scratch, (batch, out)| {
                let first_row = batch * BATCH_SIZE;
                for (offset, out_row) in out.chunks_mut(width).enumerate() {
                    let (cols, values) = csr.row(first_row + offset);
                    for (&col, &value) in cols.iter().zip(values) {
                        if let Some(slot) = scratch.features.get_mut(col) {
                            *slot = value;
                        }
                    }
                    scorer.score_row(&scratch.features, &mut scratch.raw, out_row);
                    for &col in cols {
                        if let Some(slot) = scratch.features.get_mut(col) {
                            *slot = absent;
                        }
                    }
                }
            },
        );
    })?;

    Ok(())
}
