use globe_terrain_storage::prelude::*;
use globe_terrain_view::prelude::*;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use globe_terrain_core::PointN;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn hilly(lon: i32, lat: i32) -> Option<(i32, i32)> {
    Some(((lon >> 16) ^ (lat >> 16), 10))
}

fn orbit_frustum(a: f64, radii: f64) -> Arc<PerspectiveFrustum> {
    Arc::new(PerspectiveFrustum::look_at(
        PointN([radii * a, 0.0, 0.0]),
        PointN([0.0, 0.0, 0.0]),
        PointN([0.0, 0.0, 1.0]),
        Projection {
            far: 1.0e9,
            ..Default::default()
        },
    ))
}

/// A view whose origin handshake is done, so every forced update swaps in a frame.
fn ready_view(radii: f64) -> (SurfaceView, Arc<PerspectiveFrustum>) {
    let surface = Arc::new(BintreeSurface::new(
        SurfaceConfig::new(1 << 18, 0.01),
        Arc::new(StaticElevation::new(None, hilly)),
    ));
    let a = surface.read().ellipsoid().a();
    let frustum = orbit_frustum(a, radii);
    let view = SurfaceView::new(surface, ViewConfig::default()).unwrap();

    view.initiate_update(frustum.clone());
    while !view.request_update_origin(PointN([a, 0.0, 0.0])) {
        thread::sleep(Duration::from_millis(1));
    }
    view.update_origin();

    (view, frustum)
}

fn view_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("view_update");
    for radii in [4.0, 2.0, 1.2].iter() {
        let (view, frustum) = ready_view(*radii);
        group.bench_with_input(BenchmarkId::from_parameter(radii), radii, |b, _| {
            b.iter(|| {
                view.force_update();
                view.initiate_update(frustum.clone());
                view.swap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, view_update);
criterion_main!(benches);
