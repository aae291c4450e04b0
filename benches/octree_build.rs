//! Benchmarks for parallel octree construction and meshing
//!
//! Author: Moroya Sakamoto

use alice_mesh::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn sphere_gyroid() -> SdfNode {
    SdfNode::gyroid(2.0, 0.1).intersection(SdfNode::sphere(1.5))
}

fn bench_build_workers(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree_build");
    group.sample_size(10);

    let shape = sphere_gyroid();
    let region = Region3::from_bounds(Vec3::splat(-2.0), Vec3::splat(2.0));

    for workers in [1usize, 2, 4, 8] {
        let config = BuildConfig {
            min_feature: 0.05,
            workers,
            ..Default::default()
        };
        group.bench_with_input(
            BenchmarkId::new("sphere_gyroid", workers),
            &config,
            |b, config| b.iter(|| build(black_box(&shape), black_box(region), config)),
        );
    }
    group.finish();
}

fn bench_interval_narrowing(c: &mut Criterion) {
    let mut group = c.benchmark_group("tape");

    // Union chain of well-separated spheres: narrowing collapses most
    // of the program near any one of them.
    let mut shape = SdfNode::sphere(0.5);
    for i in 1..16 {
        shape = shape.union(SdfNode::sphere(0.5).translate(i as f32 * 3.0, 0.0, 0.0));
    }
    let tape = Tape::compile(&shape);
    let mut eval = FieldEvaluator::from_tape(tape.clone());
    let region = Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0));

    group.bench_function("interval_with_narrowing", |b| {
        b.iter(|| eval.interval(black_box(&tape), black_box(&region)))
    });

    group.bench_function("point_eval_full_tape", |b| {
        b.iter(|| alice_mesh::tape::eval_point(black_box(&tape), black_box(Vec3::ZERO)))
    });

    let (_, narrowed) = eval.interval(&tape, &region);
    group.bench_function("point_eval_narrowed_tape", |b| {
        b.iter(|| alice_mesh::tape::eval_point(black_box(&narrowed), black_box(Vec3::ZERO)))
    });

    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("adaptive_mesh");
    group.sample_size(10);

    let shape = sphere_gyroid();
    let region = Region3::from_bounds(Vec3::splat(-2.0), Vec3::splat(2.0));
    let config = BuildConfig {
        min_feature: 0.0625,
        workers: 8,
        ..Default::default()
    };

    group.bench_function("sphere_gyroid", |b| {
        b.iter(|| adaptive_mesh(black_box(&shape), black_box(region), &config))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_build_workers,
    bench_interval_narrowing,
    bench_full_pipeline
);
criterion_main!(benches);
