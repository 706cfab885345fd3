use criterion::{Criterion, black_box, criterion_group, criterion_main};
use gridmna_core::{MatrixEra, RhsAccumulator, SystemMatrix};

fn stamp_and_solve(size: usize) {
    let era = MatrixEra::new(0, 1e-4);
    let mut matrix = SystemMatrix::<f64>::new(size, era);
    for i in 0..size {
        let next = (i + 1) % size;
        matrix.stamp_conductance(Some(i), Some(next), 1.0);
    }
    // Ground node 0 so the ring's Laplacian isn't singular.
    matrix.stamp_conductance(Some(0), None, 1.0);
    matrix.factorize();

    let mut rhs = RhsAccumulator::<f64>::new(size);
    rhs.inject_current(Some(0), None, 1.0);
    black_box(matrix.solve(rhs.as_vector()).unwrap());
}

fn bench_assembly(c: &mut Criterion) {
    c.bench_function("stamp_and_solve_64", |b| b.iter(|| stamp_and_solve(64)));
    c.bench_function("stamp_and_solve_256", |b| b.iter(|| stamp_and_solve(256)));
}

criterion_group!(benches, bench_assembly);
criterion_main!(benches);
