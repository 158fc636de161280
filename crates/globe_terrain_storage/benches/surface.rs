use globe_terrain_storage::prelude::*;
use utilities::data_sets::{random_int_lon_lats, seeded_rng};

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use globe_terrain_core::PointN;
use rand::Rng;
use std::sync::Arc;

fn hilly(lon: i32, lat: i32) -> Option<(i32, i32)> {
    Some(((lon >> 16) ^ (lat >> 16), 10))
}

/// A surface refined along `num_paths` random descents of `depth` levels.
fn refined_surface(num_paths: usize, depth: usize) -> SurfaceNodes {
    let source = Arc::new(StaticElevation::new(None, hilly));
    let mut nodes = SurfaceNodes::new(SurfaceConfig::new(1 << 16, 0.01), source);
    let mut rng = seeded_rng(2);
    for _ in 0..num_paths {
        let apex = nodes.base_mesh()[rng.gen_range(0..32)];
        let mut t = TriangleId::new(apex, rng.gen_range(0..4));
        for _ in 0..depth {
            let side = if rng.gen() { Direction::Left } else { Direction::Right };
            match nodes.get_child(t, side, true) {
                Some(child) => t = child,
                None => break,
            }
        }
    }
    nodes.update_data();

    nodes
}

fn surface_refine(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface_refine");
    for depth in [8, 16, 24].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            b.iter(|| refined_surface(100, depth));
        });
    }
    group.finish();
}

fn surface_update_data(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface_update_data");
    for num_paths in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(num_paths), num_paths, |b, &num_paths| {
            b.iter_with_setup(
                || {
                    let mut nodes = refined_surface(num_paths, 16);
                    nodes.set_elevation_scale(2.0);
                    nodes
                },
                |mut nodes| {
                    nodes.update_data();
                    black_box(nodes)
                },
            );
        });
    }
    group.finish();
}

fn surface_get_elevation(c: &mut Criterion) {
    let nodes = refined_surface(1000, 20);
    let points = random_int_lon_lats(&mut seeded_rng(3), 1000);

    c.bench_function("surface_get_elevation", |b| {
        b.iter(|| {
            for &(lon, lat) in points.iter() {
                black_box(nodes.get_elevation(lon, lat));
            }
        })
    });
}

fn surface_intersect_ray(c: &mut Criterion) {
    let nodes = refined_surface(1000, 20);
    let a = nodes.ellipsoid().a();

    c.bench_function("surface_intersect_ray", |b| {
        b.iter(|| nodes.intersect_ray(PointN([3.0 * a, 1234.0, 5678.0]), PointN([-1.0, 0.0, 0.0])))
    });
}

criterion_group!(
    benches,
    surface_refine,
    surface_update_data,
    surface_get_elevation,
    surface_intersect_ray
);
criterion_main!(benches);
