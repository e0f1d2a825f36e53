use criterion::{criterion_group, criterion_main, Criterion};
use hwdls::prelude::*;
use nalgebra::{DMatrix, DVector};

fn single_priority_square(c: &mut Criterion) {
    let mut solver = HwdlsSolver::new();
    solver.configure(&[6], 6).unwrap();
    let a = DMatrix::<f64>::identity(6, 6);
    let y = DVector::from_element(6, 0.4);
    let mut x = DVector::zeros(6);

    c.bench_function("single_priority_square_6x6", |bench| {
        bench.iter(|| {
            solver.solve(&[a.clone()], &[y.clone()], &mut x).unwrap();
        });
    });
}

fn three_priority_cascade(c: &mut Criterion) {
    let mut solver = HwdlsSolver::new();
    solver.configure(&[3, 2, 1], 6).unwrap();

    let a0 = {
        let mut m = DMatrix::zeros(3, 6);
        m.view_mut((0, 0), (3, 3)).copy_from(&DMatrix::identity(3, 3));
        m
    };
    let a1 = {
        let mut m = DMatrix::zeros(2, 6);
        m.view_mut((0, 3), (2, 2)).copy_from(&DMatrix::identity(2, 2));
        m
    };
    let a2 = {
        let mut m = DMatrix::zeros(1, 6);
        m[(0, 5)] = 1.0;
        m
    };
    let y0 = DVector::from_vec(vec![0.1, -0.2, 0.3]);
    let y1 = DVector::from_vec(vec![0.5, -0.5]);
    let y2 = DVector::from_vec(vec![1.0]);
    let mut x = DVector::zeros(6);

    c.bench_function("three_priority_cascade_6dof", |bench| {
        bench.iter(|| {
            solver
                .solve(&[a0.clone(), a1.clone(), a2.clone()], &[y0.clone(), y1.clone(), y2.clone()], &mut x)
                .unwrap();
        });
    });
}

fn svd_backend_comparison(c: &mut Criterion) {
    let a = DMatrix::<f64>::identity(6, 6);
    let y = DVector::from_element(6, 0.4);

    let mut group = c.benchmark_group("svd_backend");
    for method in [SvdMethod::SvdEigen, SvdMethod::SvdKdl] {
        let mut solver = HwdlsSolver::new();
        solver.configure(&[6], 6).unwrap();
        solver.set_svd_method(method);
        let mut x = DVector::zeros(6);
        group.bench_with_input(format!("{method:?}"), &method, |bench, _| {
            bench.iter(|| {
                solver.solve(&[a.clone()], &[y.clone()], &mut x).unwrap();
            });
        });
    }
}

criterion_group!(benches, single_priority_square, three_priority_cascade, svd_backend_comparison);
criterion_main!(benches);
