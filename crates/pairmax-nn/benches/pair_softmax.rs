use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pairmax_nn::{Module, PairSoftmax, PairSoftmaxConfig, Tensor};

#[track_caller]
fn unwrap_ok<T, E: core::fmt::Debug>(context: &str, result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => panic!("{context}: {error:?}"),
    }
}

fn bench_pair_softmax(c: &mut Criterion) {
    // PAIRMAX_TRACE_CHROME=<file> records the transform spans of a bench run.
    let _ = pairmax_config::init_tracing();
    let mut group = c.benchmark_group("pair_softmax");

    for &(rows, dim) in &[(64usize, 128usize), (256, 1024)] {
        let input = unwrap_ok(
            "uniform initialiser failed",
            Tensor::random_uniform(&[rows, dim], -3.0, 3.0, Some(7)),
        );
        let upstream = unwrap_ok(
            "uniform initialiser failed",
            Tensor::random_uniform(&[rows, dim], -1.0, 1.0, Some(8)),
        );
        for parallel in [false, true] {
            let label = format!("{rows}x{dim}/{}", if parallel { "rayon" } else { "serial" });
            let config = PairSoftmaxConfig::default().with_parallel(parallel, 0);

            let layer = PairSoftmax::with_config(config.clone());
            group.bench_with_input(BenchmarkId::new("forward", &label), &input, |b, input| {
                b.iter(|| black_box(unwrap_ok("forward failed", layer.forward(input))));
            });

            let mut layer = PairSoftmax::with_config(config);
            let output = unwrap_ok("forward failed", layer.forward(&input));
            group.bench_function(BenchmarkId::new("backward", &label), |b| {
                b.iter_batched(
                    || upstream.clone(),
                    |grad| black_box(unwrap_ok("backward failed", layer.backward(&output, &grad))),
                    BatchSize::SmallInput,
                );
            });
        }
    }

    group.finish();
    pairmax_config::flush_chrome_trace();
}

criterion_group!(benches, bench_pair_softmax);
criterion_main!(benches);
