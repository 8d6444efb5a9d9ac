//! Cloth stepping benchmarks.
//!
//! Run with: cargo bench --bench solver_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pbd_engine::{
    bodies::{BodyGeometry, PbdBody},
    constraints::GeneratorKind,
    core::{PbdConfig, PbdModel},
    math::{Real, Vector3},
};

fn cloth_model(n: usize, do_partitioning: bool) -> PbdModel {
    let mut vertices = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            vertices.push(Vector3::new(j as Real, 0.0, i as Real));
        }
    }
    let mut triangles = Vec::new();
    for i in 0..n - 1 {
        for j in 0..n - 1 {
            let v = i * n + j;
            triangles.push([v, v + 1, v + n]);
            triangles.push([v + 1, v + n + 1, v + n]);
        }
    }

    let mut config = PbdConfig::default();
    config.iterations = 10;
    config.do_partitioning = do_partitioning;
    config.partition_threshold = 16;
    let mut model = PbdModel::new(config);
    let mut body = PbdBody::new();
    body.set_geometry(BodyGeometry::triangles(vertices, triangles));
    body.set_fixed_node_ids(vec![0, n - 1]);
    let handle = model.insert_body(body);
    model.config_mut().enable_constraint(GeneratorKind::Distance, 1.0e4, handle);
    model.config_mut().enable_constraint(GeneratorKind::Dihedral, 1.0e2, handle);
    model
        .initialize()
        .expect("cloth model should initialize");
    model
}

fn bench_cloth_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("cloth_step");
    for n in [16, 32] {
        for partitioned in [false, true] {
            let label = if partitioned { "partitioned" } else { "sequential" };
            let mut model = cloth_model(n, partitioned);
            group.bench_with_input(BenchmarkId::new(label, n), &n, |b, _| {
                b.iter(|| {
                    model.step();
                    black_box(model.state());
                });
            });
        }
    }
    group.finish();
}

fn bench_partitioning(c: &mut Criterion) {
    let model = cloth_model(32, false);
    c.bench_function("partition_32x32_cloth", |b| {
        b.iter(|| {
            let mut container = model.constraints().clone();
            container.partition_constraints();
            black_box(container.partitions().len())
        });
    });
}

criterion_group!(benches, bench_cloth_step, bench_partitioning);
criterion_main!(benches);
