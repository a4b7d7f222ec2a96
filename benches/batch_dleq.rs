use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use voprf_token_service::dleq::BatchDleqProof;
use voprf_token_service::group::{Point, Scalar};

fn batch(size: usize) -> (Point, Point, Vec<Point>, Vec<Point>, Scalar) {
    let x = Scalar::random();
    let g = Point::generator();
    let h = g.scalar_mul(&x);
    let ms: Vec<Point> = (0..size).map(|_| g.scalar_mul(&Scalar::random())).collect();
    let zs: Vec<Point> = ms.iter().map(|m| m.scalar_mul(&x)).collect();
    (g, h, ms, zs, x)
}

fn prove_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_dleq_prove");
    for size in [1usize, 10, 100] {
        let (g, h, ms, zs, x) = batch(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| BatchDleqProof::prove(g, h, &ms, &zs, &x).unwrap());
        });
    }
    group.finish();
}

fn verify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_dleq_verify");
    for size in [1usize, 10, 100] {
        let (g, h, ms, zs, x) = batch(size);
        let proof = BatchDleqProof::prove(g, h, &ms, &zs, &x).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| assert!(proof.verify(&ms, &zs)));
        });
    }
    group.finish();
}

criterion_group!(benches, prove_benchmark, verify_benchmark);
criterion_main!(benches);
