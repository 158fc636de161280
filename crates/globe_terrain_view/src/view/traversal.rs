//! The per-frame update pass of a view.
//!
//! A pass stamps a new timestamp, integrates elevation replies, then walks the bintree from the basemesh. Each triangle's
//! base node is classified against the frustum and the screen-space error test, and the result is stored in the view's own
//! status array, so several views can share one surface. Triangles that are not refined further accumulate a face normal
//! into their three vertices. Render tiles are then built over the refined mesh, stripified, and the vertex arrays of the
//! frame are written.
//!
//! Only the first half of a pass mutates the surface. The worker runs it under the surface's write lock and builds the frame
//! under a read lock, so queries and other views' frame building proceed in parallel.

use super::render_tile::{RenderTile, SupportGrid};
use super::strips::{StripList, StripStep};
use super::{RenderFrame, ViewConfig};
use crate::frustum::{CullFrustum, Intersection};

use globe_terrain_core::{Point2i, Point3d, Point3f, PointN, Sphere3d};
use globe_terrain_storage::{
    Direction, NodeId, SurfaceNodes, TextureCoverage, TriangleId, ViewClock, TS_HAS_NORMAL, TS_IS_INVISIBLE,
    TS_IS_VISIBLE,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Lower bound of the planar edge length fed to the error test.
const MIN_DEVIATION_2D: f64 = 2.0;

/// Per-node state owned by one view, indexed like the surface arena.
#[derive(Clone, Debug, Default)]
pub(crate) struct NodeStates {
    status: Vec<i32>,
    normals: Vec<Point3f>,
    index: Vec<u32>,
}

impl NodeStates {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut states = Self::default();
        states.reserve_nodes(capacity);

        states
    }

    /// Grows the arrays to cover at least `num_nodes` nodes.
    pub fn reserve_nodes(&mut self, num_nodes: usize) {
        if self.status.len() < num_nodes {
            self.status.resize(num_nodes, 0);
            self.normals.resize(num_nodes, PointN([0.0; 3]));
            self.index.resize(num_nodes, u32::MAX);
        }
    }

    #[inline]
    fn slot(&mut self, id: NodeId) -> usize {
        let i = id as usize;
        if i >= self.status.len() {
            self.reserve_nodes((i + 1).max(self.status.len() * 3 / 2));
        }

        i
    }

    #[inline]
    pub fn status(&self, id: NodeId) -> i32 {
        self.status.get(id as usize).copied().unwrap_or(0)
    }

    #[inline]
    pub fn set_status(&mut self, id: NodeId, status: i32) {
        let i = self.slot(id);
        self.status[i] = status;
    }

    #[inline]
    pub fn normal(&self, id: NodeId) -> Point3f {
        self.normals.get(id as usize).copied().unwrap_or(PointN([0.0; 3]))
    }

    #[inline]
    pub fn index(&self, id: NodeId) -> Option<u32> {
        self.index.get(id as usize).copied().filter(|&i| i != u32::MAX)
    }

    #[inline]
    pub fn set_index(&mut self, id: NodeId, index: u32) {
        let i = self.slot(id);
        self.index[i] = index;
    }
}

/// A triangle waiting to be visited, and whether its parent was entirely inside the frustum.
#[derive(Clone, Copy, Debug)]
struct PendingTriangle {
    t: TriangleId,
    totally_in: bool,
    depth: usize,
}

/// Everything a view's worker keeps between passes.
pub(crate) struct FrameBuilder {
    pub(crate) config: ViewConfig,
    pub(crate) clock: Arc<ViewClock>,
    pub(crate) ts: i32,
    pub(crate) scale: f64,
    pub(crate) texture_res_factor: f64,

    pub(crate) states: NodeStates,
    pub(crate) vertex_nodes: Vec<NodeId>,
    pub(crate) num_antipode_vertices: usize,
    pub(crate) strips: StripList,
    pub(crate) strip_stack: Vec<StripStep>,
    stack: Vec<PendingTriangle>,

    pub(crate) coverages: Vec<Arc<dyn TextureCoverage>>,
    pub(crate) support: SupportGrid,
    pub(crate) normal_tiles: Vec<RenderTile>,
    pub(crate) antipode_tiles: Vec<RenderTile>,
    pub(crate) free_tiles: Vec<RenderTile>,

    pub(crate) origin: Point3d,
    pub(crate) tex_origin: Point2i,
}

impl FrameBuilder {
    pub fn new(config: ViewConfig, clock: Arc<ViewClock>) -> Self {
        Self {
            config,
            clock,
            ts: 0,
            scale: 1.0,
            texture_res_factor: 1.0,
            states: NodeStates::with_capacity(config.base_size),
            vertex_nodes: Vec::with_capacity(config.base_size),
            num_antipode_vertices: 0,
            strips: StripList::with_capacity(config.base_size / 2),
            strip_stack: Vec::with_capacity(2 * config.max_depth + 2),
            stack: Vec::with_capacity(config.max_depth + 1),
            coverages: Vec::new(),
            support: SupportGrid::default(),
            normal_tiles: Vec::new(),
            antipode_tiles: Vec::new(),
            free_tiles: Vec::new(),
            origin: PointN([0.0; 3]),
            tex_origin: PointN([0, 0]),
        }
    }

    /// Moves the origin to `origin`. Texture coordinates of the following frames are relative to its texture position.
    pub fn set_origin(&mut self, nodes: &SurfaceNodes, origin: Point3d) {
        self.origin = origin;
        if origin.norm() < 1.0 {
            tracing::warn!("View origin at the center of the earth; texture origin set to (0, 0)");
            self.tex_origin = PointN([0, 0]);
            return;
        }
        let (lat, lon, _h) = nodes.ellipsoid().from_cartesian(origin);
        let coords = nodes.coords();
        let (lon, lat) = (coords.lon_to_int(lon), coords.lat_to_int(lat));
        self.tex_origin = nodes.config().texture_coosys.tex_coords(coords, lon, lat);
    }

    /// Whether `id` was classified as refined this frame.
    #[inline]
    pub(crate) fn is_refined(&self, id: NodeId) -> bool {
        self.states.status(id) >= self.ts + TS_IS_VISIBLE
    }

    /// Whether `id` accumulated a normal this frame.
    #[inline]
    pub(crate) fn has_normal(&self, id: NodeId) -> bool {
        let status = self.states.status(id);

        status > self.ts && status % 2 == TS_HAS_NORMAL
    }

    /// Runs one full pass and writes the result into `frame`. Returns `false` if `stop` was raised before the pass finished.
    pub fn update(
        &mut self,
        nodes: &mut SurfaceNodes,
        frustum: &dyn CullFrustum,
        stop: &AtomicBool,
        frame: &mut RenderFrame,
    ) -> bool {
        self.refine(nodes, frustum, stop) && self.build_frame(nodes, frustum, stop, frame)
    }

    /// The part of a pass that changes the surface: a new timestamp, elevation replies, gc, and refinement of the mesh
    /// down to what `frustum` needs.
    pub fn refine(&mut self, nodes: &mut SurfaceNodes, frustum: &dyn CullFrustum, stop: &AtomicBool) -> bool {
        self.ts = nodes.new_ts();
        self.clock.set_ts(self.ts);
        let _span = tracing::debug_span!("view_refine", ts = self.ts).entered();

        nodes.update_data();
        nodes.cleanup_data();
        self.scale = nodes.scale();
        self.texture_res_factor = nodes.texture_res_factor();
        self.coverages.clear();
        self.coverages.extend(nodes.textures().iter().cloned());
        self.states.reserve_nodes(nodes.capacity());

        let base_mesh = nodes.base_mesh().to_vec();
        for &id in base_mesh.iter() {
            self.states.set_status(id, self.ts + TS_IS_VISIBLE);
        }
        for &id in base_mesh.iter() {
            for quadrant in 0..4 {
                let parent = match nodes.node(id).parent(quadrant) {
                    Some(p) if nodes.node(p).child(quadrant) == Some(id) => p,
                    _ => continue,
                };
                if !self.traverse(nodes, frustum, stop, TriangleId::new(parent, quadrant)) {
                    return false;
                }
            }
        }
        nodes.notify_listeners();

        true
    }

    /// The read-only rest of a pass after `refine`: render tiles, strips and vertex arrays, written into `frame`.
    ///
    /// Other views may refine the surface between the two phases. Nodes this view stamped are kept until its watermark
    /// passes them, and nodes it never classified read as unrefined, so the frame follows this view's own classification.
    pub fn build_frame(
        &mut self,
        nodes: &SurfaceNodes,
        frustum: &dyn CullFrustum,
        stop: &AtomicBool,
        frame: &mut RenderFrame,
    ) -> bool {
        let _span = tracing::debug_span!("view_build", ts = self.ts).entered();
        self.free_tiles.append(&mut frame.normal_tiles);
        self.free_tiles.append(&mut frame.antipode_tiles);

        self.build_render_tiles(nodes, frustum, nodes.base_mesh());
        if stop.load(Ordering::Acquire) {
            return false;
        }
        self.stripify(nodes);
        self.write_frame(nodes, frame);

        tracing::debug!(
            "View pass: {} vertices, {} strip indices, {} + {} tiles",
            self.vertex_nodes.len(),
            self.strips.len(),
            frame.normal_tiles.len(),
            frame.antipode_tiles.len()
        );

        true
    }

    /// Visits the subtree of `root`, refining the surface where the error test asks for it.
    fn traverse(
        &mut self,
        nodes: &mut SurfaceNodes,
        frustum: &dyn CullFrustum,
        stop: &AtomicBool,
        root: TriangleId,
    ) -> bool {
        let ts = self.ts;
        let mut stack = std::mem::take(&mut self.stack);
        stack.clear();
        stack.push(PendingTriangle {
            t: root,
            totally_in: false,
            depth: 0,
        });

        while let Some(PendingTriangle {
            t,
            mut totally_in,
            depth,
        }) = stack.pop()
        {
            if stop.load(Ordering::Relaxed) {
                self.stack = stack;
                return false;
            }
            let base = match nodes.get_base_node(t, true) {
                Some(base) => base,
                None => continue,
            };

            let mut status = self.states.status(base);
            if status < ts + TS_IS_INVISIBLE {
                let norm = if status == ts + TS_HAS_NORMAL { TS_HAS_NORMAL } else { 0 };
                let node = nodes.node(base);
                let sphere = Sphere3d {
                    center: node.cartesian.scaled(self.scale),
                    radius: node.total_radius as f64,
                };
                let intersect = if totally_in {
                    Intersection::TotallyIn
                } else {
                    frustum.check_sphere(&sphere)
                };

                status = if intersect == Intersection::TotallyOut {
                    ts + TS_IS_INVISIBLE + norm
                } else {
                    totally_in = intersect == Intersection::TotallyIn;
                    let dev_2d = deviation_2d(nodes, t, base);
                    if depth < self.config.max_depth
                        && frustum.is_visible(&sphere, node.total_deviation as f64, dev_2d)
                    {
                        ts + TS_IS_VISIBLE + norm
                    } else {
                        ts + TS_IS_INVISIBLE + norm
                    }
                };
                self.states.set_status(base, status);
            }

            if status < ts + TS_IS_VISIBLE {
                self.add_face_normal(nodes, t);
            } else {
                // Right child first.
                for &side in [Direction::Left, Direction::Right].iter() {
                    stack.push(PendingTriangle {
                        t: TriangleId::new(base, (t.corner() + side as usize) % 4),
                        totally_in,
                        depth: depth + 1,
                    });
                }
            }
        }

        self.stack = stack;

        true
    }

    fn add_face_normal(&mut self, nodes: &SurfaceNodes, t: TriangleId) {
        let corners = (
            nodes.get_node(t, Direction::Top),
            nodes.get_node(t, Direction::Left),
            nodes.get_node(t, Direction::Right),
        );
        let (top, left, right) = match corners {
            (Some(top), Some(left), Some(right)) => (top, left, right),
            _ => return,
        };

        let p = |id: NodeId| nodes.node(id).cartesian.map_components(|c| c as f64);
        let apex = p(top);
        let normal = (p(right) - apex).cross(&(p(left) - apex));
        let normal = Point3f::from(normal);

        for &id in [top, left, right].iter() {
            self.add_normal(id, normal);
        }
    }

    /// Accumulates `normal` into `id`, starting over if it is the node's first normal this frame.
    fn add_normal(&mut self, id: NodeId, normal: Point3f) {
        if self.has_normal(id) {
            let i = id as usize;
            self.states.normals[i] += normal;
        } else {
            let status = self.states.status(id);
            let status = if status < self.ts {
                self.ts + TS_HAS_NORMAL
            } else {
                status + TS_HAS_NORMAL
            };
            self.states.set_status(id, status);
            self.states.normals[id as usize] = normal;
        }
    }

    /// Stripifies the tiles of this frame, antipode tiles first so their vertices get the lowest indices.
    fn stripify(&mut self, nodes: &SurfaceNodes) {
        self.vertex_nodes.clear();
        self.strips.clear();

        let mut antipode_tiles = std::mem::take(&mut self.antipode_tiles);
        for tile in antipode_tiles.iter_mut() {
            self.mesh_refine_tile(nodes, tile);
        }
        self.antipode_tiles = antipode_tiles;
        self.num_antipode_vertices = self.vertex_nodes.len();

        let mut normal_tiles = std::mem::take(&mut self.normal_tiles);
        for tile in normal_tiles.iter_mut() {
            self.mesh_refine_tile(nodes, tile);
        }
        self.normal_tiles = normal_tiles;
    }
}

/// The longest planar distance from the base node of `t` to one of its corners.
fn deviation_2d(nodes: &SurfaceNodes, t: TriangleId, base: NodeId) -> f64 {
    let b = nodes.node(base);

    [Direction::Top, Direction::Left, Direction::Right]
        .iter()
        .filter_map(|&corner| nodes.get_node(t, corner))
        .map(|id| {
            let n = nodes.node(id);
            nodes
                .coords()
                .dist_2d(nodes.ellipsoid(), b.lon, b.lat, n.lon, n.lat)
        })
        .fold(MIN_DEVIATION_2D, f64::max)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::super::test_util::{builder_for, flat_surface, orbit_frustum};
    use super::*;

    use pretty_assertions::assert_eq;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn node_states_grow_on_write() {
        let mut states = NodeStates::with_capacity(4);
        assert_eq!(states.status(100), 0);
        assert_eq!(states.index(100), None);

        states.set_status(100, 42);
        states.set_index(7, 3);
        assert_eq!(states.status(100), 42);
        assert_eq!(states.index(7), Some(3));
        assert_eq!(states.index(8), None);
    }

    #[test]
    fn closer_camera_refines_more() {
        let (far_vertices, far_fill) = {
            let surface = flat_surface();
            let mut nodes = surface.write();
            let mut builder = builder_for(&mut nodes);
            let mut frame = RenderFrame::default();
            let frustum = orbit_frustum(&nodes, 4.0);
            assert!(builder.update(&mut nodes, &frustum, &AtomicBool::new(false), &mut frame));
            (frame.geometry.positions.len(), nodes.fill())
        };
        let (near_vertices, near_fill) = {
            let surface = flat_surface();
            let mut nodes = surface.write();
            let mut builder = builder_for(&mut nodes);
            let mut frame = RenderFrame::default();
            let frustum = orbit_frustum(&nodes, 1.5);
            assert!(builder.update(&mut nodes, &frustum, &AtomicBool::new(false), &mut frame));
            (frame.geometry.positions.len(), nodes.fill())
        };

        assert!(far_vertices > 0);
        assert!(near_vertices > far_vertices, "{} <= {}", near_vertices, far_vertices);
        assert!(near_fill > far_fill);
    }

    #[test]
    fn basemesh_is_refined_and_leaves_get_normals() {
        let surface = flat_surface();
        let mut nodes = surface.write();
        let mut builder = builder_for(&mut nodes);
        let mut frame = RenderFrame::default();
        let frustum = orbit_frustum(&nodes, 2.0);
        builder.update(&mut nodes, &frustum, &AtomicBool::new(false), &mut frame);

        for &id in nodes.base_mesh() {
            assert!(builder.is_refined(id));
        }
        let with_normal = builder.vertex_nodes.iter().filter(|&&id| builder.has_normal(id)).count();
        assert!(with_normal * 2 > builder.vertex_nodes.len());
    }

    #[test]
    fn frame_is_built_while_queries_share_the_surface() {
        let surface = flat_surface();
        let mut builder = builder_for(&mut surface.write());
        let frustum = orbit_frustum(&surface.read(), 2.0);
        let stop = AtomicBool::new(false);
        let mut frame = RenderFrame::default();

        assert!(builder.refine(&mut surface.write(), &frustum, &stop));
        let fill = surface.read().fill();

        let nodes = surface.read();
        let (tx, rx) = mpsc::channel();
        let querying = Arc::clone(&surface);
        let worker = thread::spawn(move || {
            let _ = tx.send(querying.elevation_at(0.1, 0.2));
        });
        let h = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(builder.build_frame(&nodes, &frustum, &stop, &mut frame));
        drop(nodes);
        worker.join().unwrap();

        assert!(h.abs() < 1e-6);
        assert!(!frame.geometry.positions.is_empty());
        // Building the frame never allocates nodes.
        assert_eq!(surface.read().fill(), fill);
    }

    #[test]
    fn raised_stop_flag_aborts_the_pass() {
        let surface = flat_surface();
        let mut nodes = surface.write();
        let mut builder = builder_for(&mut nodes);
        let mut frame = RenderFrame::default();

        let frustum = orbit_frustum(&nodes, 2.0);
        assert!(!builder.update(&mut nodes, &frustum, &AtomicBool::new(true), &mut frame));
        assert!(frame.geometry.positions.is_empty());
    }
}
