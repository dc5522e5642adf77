use criterion::{criterion_group, criterion_main, Criterion};
use gle_math::linalg::{lower_block_triangular_inverse, psd_factor};
use ndarray::Array2;
use std::hint::black_box;

fn causal_operator(steps: usize, block: usize) -> Array2<f64> {
    let n = steps * block;
    Array2::from_shape_fn((n, n), |(r, c)| {
        let (t, s) = (r / block, c / block);
        if s > t {
            0.0
        } else if r == c {
            1.0
        } else {
            0.01 * ((r * 7 + c * 3) % 11) as f64
        }
    })
}

fn bench_block_inverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("lower_block_triangular_inverse");
    group.sample_size(20);
    for &(steps, block) in &[(64usize, 1usize), (64, 2), (32, 4)] {
        let l = causal_operator(steps, block);
        group.bench_function(format!("T{steps}_d{block}"), |b| {
            b.iter(|| {
                let x = lower_block_triangular_inverse(black_box(l.view()), block)
                    .expect("invertible");
                black_box(x[[0, 0]]);
            })
        });
    }
    group.finish();
}

fn bench_psd_factor(c: &mut Criterion) {
    let n = 64;
    let cov = Array2::from_shape_fn((n, n), |(i, j)| (-(i as f64 - j as f64).abs() / 4.0).exp());

    c.bench_function("psd_factor_64", |b| {
        b.iter(|| {
            let (m, _) = psd_factor(black_box(cov.view())).expect("converges");
            black_box(m[[0, 0]]);
        })
    });
}

criterion_group!(benches, bench_block_inverse, bench_psd_factor);
criterion_main!(benches);
