use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use graphcore::matrix::DeltaMatrix;

fn bench_set_then_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_matrix_set_then_flush");
    for &n in &[1_000usize, 10_000, 100_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut matrix: DeltaMatrix<bool> = DeltaMatrix::new(n, n);
                for i in 0..n {
                    matrix.set(i, i, true);
                }
                matrix.flush();
            });
        });
    }
    group.finish();
}

fn bench_attach_range_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("delta_matrix_attach_range");
    for &n in &[1_000usize, 10_000, 100_000] {
        let mut matrix: DeltaMatrix<bool> = DeltaMatrix::new(n, n);
        for i in 0..n {
            matrix.set(i, i, true);
        }
        matrix.flush();
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let iter = matrix.attach_range(0, n - 1).unwrap();
                iter.count()
            });
        });
    }
    group.finish();
}

fn bench_interleaved_pending_reads(c: &mut Criterion) {
    c.bench_function("delta_matrix_interleaved_set_get_unflushed", |b| {
        b.iter(|| {
            let mut matrix: DeltaMatrix<bool> = DeltaMatrix::new(10_000, 10_000);
            for i in 0..10_000 {
                matrix.set(i, i, true);
                let _ = matrix.get(i, i);
            }
        });
    });
}

criterion_group!(benches, bench_set_then_flush, bench_attach_range_scan, bench_interleaved_pending_reads);
criterion_main!(benches);
