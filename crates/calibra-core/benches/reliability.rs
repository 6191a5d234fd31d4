use criterion::{black_box, criterion_group, criterion_main, Criterion};

use calibra_core::ctt::compute_ctt;
use calibra_core::equating::{equate, EquatingMethod};
use calibra_core::model::ResponseMatrix;
use calibra_core::reliability::{alpha_if_item_deleted, compute_reliability, ReliabilityMethod};

fn synthetic_matrix(students: usize, items: usize) -> ResponseMatrix {
    let rows: Vec<Vec<u8>> = (0..students)
        .map(|i| {
            (0..items)
                .map(|j| u8::from((i * 7 + j * 13) % 10 < 1 + i * 8 / students))
                .collect()
        })
        .collect();
    ResponseMatrix::new(&rows).expect("synthetic matrix is rectangular")
}

fn bench_reliability(c: &mut Criterion) {
    let mut group = c.benchmark_group("reliability");

    let m = synthetic_matrix(500, 40);

    group.bench_function("all_coefficients_500x40", |b| {
        b.iter(|| compute_reliability(black_box(&m), ReliabilityMethod::CronbachAlpha))
    });

    group.bench_function("alpha_if_deleted_500x40", |b| {
        b.iter(|| alpha_if_item_deleted(black_box(&m)))
    });

    group.bench_function("ctt_500x40", |b| b.iter(|| compute_ctt(black_box(&m))));

    group.finish();
}

fn bench_equating(c: &mut Criterion) {
    let mut group = c.benchmark_group("equating");

    let form_a: Vec<f64> = (0..5000).map(|i| (i % 41) as f64).collect();
    let form_b: Vec<f64> = (0..5000).map(|i| ((i * 3) % 43) as f64).collect();

    group.bench_function("linear_5000", |b| {
        b.iter(|| equate(black_box(&form_a), black_box(&form_b), EquatingMethod::Linear))
    });

    group.bench_function("equipercentile_5000", |b| {
        b.iter(|| {
            equate(
                black_box(&form_a),
                black_box(&form_b),
                EquatingMethod::Equipercentile,
            )
        })
    });

    group.finish();
}

criterion_group!(benches, bench_reliability, bench_equating);
criterion_main!(benches);
