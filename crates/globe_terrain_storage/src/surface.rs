//! The bintree surface: a shared, lazily refined triangulation of the globe.
//!
//! Every vertex is a `Node` in one arena. The mesh starts from a fixed basemesh of 32 cells and is refined by splitting
//! triangles at the midpoint of their hypotenuse. A new vertex is shared by the two triangles on either side of the
//! hypotenuse, so refinement never leaves cracks.
//!
//! Views refine the mesh on demand while they traverse it, stamping every node they touch with the current timestamp. The
//! arena is bounded: when it fills up, nodes older than every view's watermark are reclaimed, leaves first.
//!
//! The arena sits behind a read-write lock. Refinement, gc and elevation integration take it exclusively; point queries,
//! intersections and the geometry phase of a view pass share it. A query therefore waits for at most one refinement phase.
//!
//! Elevations arrive asynchronously. A node without elevation interpolates one from the ends of its hypotenuse until its
//! reply is integrated by `update_data`.
//!
//! # Example
//!
//! ```
//! use globe_terrain_storage::prelude::*;
//! use std::sync::Arc;
//!
//! let source = Arc::new(StaticElevation::new(None, |_lon, _lat| Some((100_000, 0))));
//! let surface = BintreeSurface::new(SurfaceConfig::new(4096, 0.01), source);
//!
//! {
//!     let mut nodes = surface.write();
//!     nodes.new_ts();
//!     nodes.update_data();
//!     nodes.cleanup_data();
//! }
//!
//! // 1000 meters everywhere.
//! let h = surface.read().get_elevation(0, 1 << 20);
//! assert!((h - 1000.0).abs() < 1e-6);
//! ```

mod arena;
mod basemesh;
mod clock;
mod config;
mod geometry;
mod node;
mod query;
mod topology;
mod triangle;

pub use arena::SurfaceNodes;
pub use basemesh::BASE_MESH_CODES;
pub use clock::{SurfaceListener, ViewClock};
pub use config::SurfaceConfig;
pub use node::{Node, TS_HAS_NORMAL, TS_INC, TS_IS_INVISIBLE, TS_IS_VISIBLE, TS_PINNED};
pub use query::Intersection;
pub use triangle::{Direction, EdgeId, NodeId, TriangleId};

use crate::sync::{read_or_recover, write_or_recover};
use crate::{ElevationQueries, TextureCoverage};

use globe_terrain_core::Point3d;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// The shared surface. Views and the application reach the node arena through `read` and `write`.
pub struct BintreeSurface {
    nodes: RwLock<SurfaceNodes>,
}

impl BintreeSurface {
    pub fn new(config: SurfaceConfig, source: Arc<dyn ElevationQueries>) -> Self {
        Self {
            nodes: RwLock::new(SurfaceNodes::new(config, source)),
        }
    }

    /// Shared access to the node arena, for queries and for building geometry from already refined nodes.
    pub fn read(&self) -> RwLockReadGuard<'_, SurfaceNodes> {
        read_or_recover(&self.nodes)
    }

    /// Exclusive access to the node arena, for anything that allocates, frees or restamps nodes.
    pub fn write(&self) -> RwLockWriteGuard<'_, SurfaceNodes> {
        write_or_recover(&self.nodes)
    }

    pub fn new_ts(&self) -> i32 {
        self.write().new_ts()
    }

    pub fn register_view(&self, clock: &Arc<ViewClock>) {
        self.write().register_view(clock);
    }

    pub fn add_listener(&self, listener: &Arc<dyn SurfaceListener>) {
        self.write().add_listener(listener);
    }

    /// Returns `false` if the coverage's texture coordinate system doesn't match the surface's.
    pub fn add_texture(&self, coverage: Arc<dyn TextureCoverage>) -> bool {
        self.write().add_texture(coverage)
    }

    pub fn set_elevation_scale(&self, h_scale: f64) {
        self.write().set_elevation_scale(h_scale);
    }

    /// Elevation in meters at a geodetic position in radians.
    pub fn elevation_at(&self, lon: f64, lat: f64) -> f64 {
        let nodes = self.read();
        let (lon, lat) = (nodes.coords().lon_to_int(lon), nodes.coords().lat_to_int(lat));

        nodes.get_elevation(lon, lat)
    }

    pub fn intersect_segment(&self, p1: Point3d, p2: Point3d) -> Option<Intersection> {
        self.read().intersect_segment(p1, p2)
    }

    pub fn intersect_ray(&self, p: Point3d, dir: Point3d) -> Option<Intersection> {
        self.read().intersect_ray(p, dir)
    }

    /// Stops the elevation source's workers.
    pub fn close(&self) {
        let source = Arc::clone(self.read().source());
        source.close();
    }
}


// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::test_util::surface_with;
    use super::*;

    use globe_terrain_core::PointN;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn elevation_at_geodetic_position() {
        let surface = BintreeSurface {
            nodes: RwLock::new(surface_with(1024, |_, _| Some((25_000, 0)))),
        };
        surface.write().update_data();

        assert!((surface.elevation_at(0.3, -0.2) - 250.0).abs() < 1e-6);

        surface.set_elevation_scale(2.0);
        surface.write().update_data();
        assert!((surface.elevation_at(-2.0, 0.7) - 500.0).abs() < 1e-6);
    }

    #[test]
    fn queries_run_while_another_reader_holds_the_arena() {
        let surface = Arc::new(BintreeSurface {
            nodes: RwLock::new(surface_with(1024, |_, _| Some((25_000, 0)))),
        });
        surface.write().update_data();
        let a = surface.read().ellipsoid().a();

        // Stands in for a view building its frame.
        let held = surface.read();

        let (tx, rx) = mpsc::channel();
        let querying = Arc::clone(&surface);
        let worker = thread::spawn(move || {
            let h = querying.elevation_at(0.3, -0.2);
            let hit = querying.intersect_ray(PointN([3.0 * a, 1000.0, 2000.0]), PointN([-1.0, 0.0, 0.0]));
            let _ = tx.send((h, hit.is_some()));
        });
        let (h, hit) = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("queries blocked behind a reader");
        drop(held);
        worker.join().unwrap();

        assert!((h - 250.0).abs() < 1e-6);
        assert!(hit);
    }
}
