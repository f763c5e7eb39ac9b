//! Batch prediction benchmarks.
//!
//! Measures dense and CSR throughput on a synthetic forest and how dense
//! prediction scales with the thread count.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use rand::prelude::*;

use canopy::repr::gbdt::{MissingType, Node};
use canopy::{CsrMatrix, Ensemble, Forest, OutputTransform, PredictOptions, Tree};

const N_FEATURES: usize = 50;
const N_TREES: usize = 200;
const DEPTH: u32 = 6;
const N_ROWS: usize = 10_000;

// =============================================================================
// Data Generation
// =============================================================================

/// Complete tree of `depth` levels with random splits and leaves.
fn random_tree(rng: &mut StdRng, depth: u32) -> Tree {
    let mut nodes = Vec::new();
    let mut leaves = Vec::new();
    grow(rng, depth, &mut nodes, &mut leaves);
    Tree::new(nodes, leaves, Vec::new(), Vec::new())
}

/// Append the subtree in depth-first order and return its root index.
fn grow(rng: &mut StdRng, depth: u32, nodes: &mut Vec<Node>, leaves: &mut Vec<f64>) -> u32 {
    let idx = nodes.len() as u32;
    let feature = rng.gen_range(0..N_FEATURES as u32);
    nodes.push(Node::numerical(feature, rng.gen_range(-1.0..1.0), MissingType::NaN, rng.r#gen()));

    if depth == 1 {
        nodes[idx as usize].set_left_leaf(leaves.len() as u32);
        leaves.push(rng.gen_range(-0.1..0.1));
        nodes[idx as usize].set_right_leaf(leaves.len() as u32);
        leaves.push(rng.gen_range(-0.1..0.1));
    } else {
        let left = grow(rng, depth - 1, nodes, leaves);
        nodes[idx as usize].set_left_node(left);
        let right = grow(rng, depth - 1, nodes, leaves);
        nodes[idx as usize].set_right_node(right);
    }
    idx
}

fn synthetic_model(seed: u64) -> Ensemble {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut forest = Forest::new(1)
        .with_max_feature_idx(N_FEATURES as u32 - 1)
        .with_absent_value(f64::NAN);
    for _ in 0..N_TREES {
        forest.push_tree(random_tree(&mut rng, DEPTH), 0);
    }
    forest.validate().expect("valid forest");
    Ensemble::from_forest("bench.synthetic", forest, OutputTransform::Logistic).expect("valid transform")
}

/// Random features in [-2, 2) with roughly `sparsity` of the entries zeroed.
fn random_input(n_rows: usize, sparsity: f64, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::from_shape_simple_fn((n_rows, N_FEATURES), || {
        if rng.r#gen::<f64>() < sparsity { 0.0 } else { rng.gen_range(-2.0..2.0) }
    })
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_dense_thread_scaling(c: &mut Criterion) {
    let model = synthetic_model(7);
    let input = random_input(N_ROWS, 0.0, 42);
    let mut output = vec![0.0; N_ROWS * model.n_outputs()];

    let mut group = c.benchmark_group("dense/thread_scaling");
    group.throughput(Throughput::Elements(N_ROWS as u64));
    for n_threads in [1, 2, 4, 8] {
        let options = PredictOptions::builder().n_threads(n_threads).build();
        group.bench_with_input(BenchmarkId::from_parameter(n_threads), &input, |b, input| {
            b.iter(|| {
                model
                    .predict_dense(black_box(input.view()), &options, &mut output)
                    .expect("predict");
                black_box(&output);
            });
        });
    }
    group.finish();
}

fn bench_csr(c: &mut Criterion) {
    let model = synthetic_model(7);
    let mut output = vec![0.0; N_ROWS * model.n_outputs()];

    let mut group = c.benchmark_group("csr/sparsity");
    group.throughput(Throughput::Elements(N_ROWS as u64));
    for sparsity in [0.5, 0.9] {
        let csr = CsrMatrix::from_dense(random_input(N_ROWS, sparsity, 43).view());
        for n_threads in [1, 4] {
            let options = PredictOptions::builder().n_threads(n_threads).build();
            let id = BenchmarkId::new(format!("sparsity_{sparsity}"), n_threads);
            group.bench_with_input(id, &csr, |b, csr| {
                b.iter(|| {
                    model
                        .predict_csr(black_box(csr.view()), &options, &mut output)
                        .expect("predict");
                    black_box(&output);
                });
            });
        }
    }
    group.finish();
}

fn bench_single_row(c: &mut Criterion) {
    let model = synthetic_model(7);
    let input = random_input(1, 0.0, 44);
    let row = input.row(0).to_vec();
    let options = PredictOptions::default();

    c.bench_function("single_row", |b| {
        b.iter(|| black_box(model.predict_single(black_box(&row), &options).expect("predict")));
    });
}

criterion_group!(benches, bench_dense_thread_scaling, bench_csr, bench_single_row);
criterion_main!(benches);
