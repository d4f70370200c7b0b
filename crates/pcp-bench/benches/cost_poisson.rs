// SPDX-License-Identifier: MIT OR Apache-2.0

#![forbid(unsafe_code)]

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use pcp_bench::{regime_counts, segment_queries};
use pcp_core::CountSeries;
use pcp_costs::{PoissonRate, SegmentModel, log_likelihood_constant};

const N: usize = 1_000_000;
const QUERY_WINDOW: usize = 4_096;
const QUERY_COUNT: usize = 10_000;

fn benchmark_poisson_model(c: &mut Criterion) {
    let counts = regime_counts(N, 8, &[2, 10, 0, 25]);
    let series = CountSeries::new(&counts).expect("benchmark series should be valid");
    let model = PoissonRate::new();

    let mut group = c.benchmark_group("cost_poisson");

    group.bench_function("precompute_n1e6", |b| {
        b.iter(|| {
            let _cache = model
                .precompute(black_box(&series))
                .expect("precompute should succeed");
        })
    });

    let cache = model
        .precompute(&series)
        .expect("precompute should succeed");
    let queries = segment_queries(QUERY_WINDOW, QUERY_COUNT);

    group.bench_function("segment_log_likelihood_1e4_queries_window4096", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &(start, end) in &queries {
                acc += model.segment_log_likelihood(black_box(&cache), start, end);
            }
            black_box(acc)
        })
    });

    group.bench_function("log_likelihood_constant_n1e6", |b| {
        b.iter(|| black_box(log_likelihood_constant(black_box(&counts))))
    });

    group.finish();
}

criterion_group!(benches, benchmark_poisson_model);
criterion_main!(benches);
