use super::clock::{SurfaceListener, ViewClock};
use super::node::{Node, TS_INC};
use super::triangle::{NodeId, NIL};
use super::SurfaceConfig;
use crate::{ElevationQueries, TextureCoverage, PENDING};

use globe_terrain_core::{Ellipsoid, IntCoordinates};
use std::sync::{Arc, Weak};

/// Node ids must leave room for the two corner bits of a `TriangleId`.
const MAX_NODES: usize = 1 << 30;

/// The node arena of a `BintreeSurface`, with everything that mutates it.
///
/// Nodes live in one flat `Vec` and are addressed by dense `NodeId`s. Free slots are chained through child slot 0. When
/// the arena is full, allocation first reclaims nodes older than the views' watermark, raising the cut step by step, and
/// only grows the arena by half if that doesn't free enough.
pub struct SurfaceNodes {
    pub(crate) nodes: Vec<Node>,
    free: i32,
    top_free: usize,
    fill: usize,
    gc_cursor: usize,

    pub(crate) ts: i32,
    pub(crate) uppercut: i32,
    pub(crate) terrain_cut: i32,
    pub(crate) texture_cut: i32,

    pub(crate) config: SurfaceConfig,
    pub(crate) coords: IntCoordinates,
    pub(crate) ellipsoid: Ellipsoid,
    pub(crate) h_scale: f64,
    pub(crate) h_scale_new: f64,
    pub(crate) update_count: u32,
    pub(crate) texture_res_factor: f64,

    /// The 36 nodes of the coarse lon/lat grid the basemesh is cut from.
    pub(crate) grid: Vec<NodeId>,
    /// The 32 apex nodes that every traversal starts from.
    pub(crate) base_mesh: Vec<NodeId>,

    pub(crate) source: Arc<dyn ElevationQueries>,
    pub(crate) views: Vec<Weak<ViewClock>>,
    pub(crate) listeners: Vec<Weak<dyn SurfaceListener>>,
    pub(crate) coverages: Vec<Arc<dyn TextureCoverage>>,

    deferred: Vec<NodeId>,
    pub(crate) scratch_stack: Vec<NodeId>,
}

impl SurfaceNodes {
    /// Creates the arena and its basemesh. Every basemesh node gets an elevation query.
    pub fn new(config: SurfaceConfig, source: Arc<dyn ElevationQueries>) -> Self {
        let ellipsoid = match source.model_query() {
            Some(model) => model.ellipsoid(),
            None => {
                tracing::warn!("No elevation model available; using WGS84 with a flat surface");
                Ellipsoid::wgs84()
            }
        };

        let mut nodes = Self {
            nodes: vec![Node::default(); config.initial_capacity],
            free: NIL,
            top_free: 0,
            fill: 0,
            gc_cursor: 0,
            ts: TS_INC,
            uppercut: TS_INC,
            terrain_cut: 0,
            texture_cut: 0,
            config,
            coords: IntCoordinates::new(),
            ellipsoid,
            h_scale: 1.0,
            h_scale_new: 1.0,
            update_count: 0,
            texture_res_factor: 1.0,
            grid: Vec::new(),
            base_mesh: Vec::new(),
            source,
            views: Vec::new(),
            listeners: Vec::new(),
            coverages: Vec::new(),
            deferred: Vec::new(),
            scratch_stack: Vec::new(),
        };
        nodes.build_basemesh();

        nodes
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id as usize]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id as usize]
    }

    /// Number of node slots. Views size their per-node state by this.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes.
    #[inline]
    pub fn fill(&self) -> usize {
        self.fill
    }

    /// The current frame timestamp.
    #[inline]
    pub fn ts(&self) -> i32 {
        self.ts
    }

    /// Starts a new frame and returns its timestamp.
    pub fn new_ts(&mut self) -> i32 {
        self.ts += TS_INC;

        self.ts
    }

    #[inline]
    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    #[inline]
    pub fn scale(&self) -> f64 {
        self.config.scale
    }

    #[inline]
    pub fn coords(&self) -> &IntCoordinates {
        &self.coords
    }

    #[inline]
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    #[inline]
    pub fn base_mesh(&self) -> &[NodeId] {
        &self.base_mesh
    }

    /// The texture resolution factor that reclamation raises while the visible texture set is over budget.
    #[inline]
    pub fn texture_res_factor(&self) -> f64 {
        self.texture_res_factor
    }

    #[inline]
    pub fn source(&self) -> &Arc<dyn ElevationQueries> {
        &self.source
    }

    /// Takes a free slot, reclaiming or growing first if the arena is full. The new node is stamped with the current
    /// timestamp and has no links.
    pub fn alloc(&mut self) -> NodeId {
        if self.fill >= self.nodes.len() {
            self.reclaim_for_alloc();
        }

        let id = if self.free >= 0 {
            let id = self.free as usize;
            self.free = self.nodes[id].links[0];
            id
        } else {
            if self.top_free >= self.nodes.len() {
                self.grow();
            }
            let id = self.top_free;
            self.top_free += 1;
            id
        };

        self.nodes[id] = Node {
            status: self.ts,
            ..Default::default()
        };
        self.fill += 1;

        id as NodeId
    }

    /// Unlinks `id` from every parent that still points to it and returns the slot to the free list.
    pub fn free(&mut self, id: NodeId) {
        let i = id as usize;
        debug_assert!(!self.nodes[i].is_free());

        for quadrant in 0..4 {
            if let Some(p) = self.nodes[i].parent(quadrant) {
                let parent = &mut self.nodes[p as usize];
                if parent.links[quadrant] == id as i32 {
                    parent.links[quadrant] = NIL;
                }
            }
        }

        let node = &mut self.nodes[i];
        node.status = 0;
        node.links[0] = self.free;
        self.free = id as i32;
        self.fill -= 1;
    }

    fn grow(&mut self) {
        let old_size = self.nodes.len();
        let new_size = old_size * 3 / 2;
        assert!(new_size <= MAX_NODES, "surface node arena exhausted");

        tracing::debug!("Growing surface node arena from {} to {}", old_size, new_size);
        self.nodes.resize(new_size, Node::default());
    }

    /// Frees at least 5% of the arena if it can be done without cutting into what the views still use.
    fn reclaim_for_alloc(&mut self) {
        let size = self.nodes.len();
        let target = (size / 20).min(10_000);

        self.gc(size - 2 * target);
        while self.terrain_cut < self.uppercut && self.fill > size - target {
            self.terrain_cut += 10 + (self.uppercut - self.terrain_cut) / 2;
            self.terrain_cut = self.terrain_cut.min(self.uppercut);
            self.gc(size - target);
        }
    }

    /// Reclaims nodes older than the terrain cut until `fill` drops below `target` or the whole arena has been scanned.
    ///
    /// The scan resumes where the previous one stopped. Nodes with children are never freed. Nodes still waiting for
    /// elevation are only freed if their query could be cancelled.
    pub(crate) fn gc(&mut self, target: usize) {
        let _span = tracing::debug_span!("gc", target, cut = self.terrain_cut).entered();

        let size = self.nodes.len();
        let cut = self.terrain_cut - TS_INC;
        let fill_before = self.fill;

        let mut deferred = std::mem::take(&mut self.deferred);
        deferred.clear();
        for _ in 0..=size {
            self.gc_cursor += 1;
            if self.gc_cursor >= size {
                self.gc_cursor = 0;
            }
            if self.fill - deferred.len() < target {
                break;
            }

            let node = &self.nodes[self.gc_cursor];
            if node.is_free() || node.status >= cut || node.has_children() {
                continue;
            }
            let id = self.gc_cursor as NodeId;
            if node.h == PENDING {
                deferred.push(id);
            } else {
                self.free(id);
            }
        }

        if !deferred.is_empty() {
            let source = Arc::clone(&self.source);
            for id in source.remove_queries(&deferred) {
                let node = &self.nodes[id as usize];
                if !node.is_free() && !node.has_children() {
                    self.free(id);
                }
            }
        }
        tracing::trace!(
            "Reclaimed {} nodes ({} deferred), fill is {}",
            fill_before - self.fill,
            deferred.len(),
            self.fill
        );
        self.deferred = deferred;
    }

    /// Registers a view's watermarks. The view is forgotten once its clock is dropped.
    pub fn register_view(&mut self, clock: &Arc<ViewClock>) {
        self.views.push(Arc::downgrade(clock));
    }

    pub fn add_listener(&mut self, listener: &Arc<dyn SurfaceListener>) {
        self.listeners.push(Arc::downgrade(listener));
    }

    /// Notifies every live listener and forgets the dropped ones.
    pub fn notify_listeners(&mut self) {
        let ts = self.ts;
        self.listeners.retain(|listener| match listener.upgrade() {
            Some(listener) => {
                listener.surface_updated(ts);
                true
            }
            None => false,
        });
    }

    /// Adds a texture coverage. Node texture coordinates are in the surface's texture coordinate system, so a coverage
    /// laid out in another one is rejected.
    pub fn add_texture(&mut self, coverage: Arc<dyn TextureCoverage>) -> bool {
        if coverage.coosys() != self.config.texture_coosys {
            tracing::warn!(
                "Texture coverage uses {:?} coordinates, the surface uses {:?}",
                coverage.coosys(),
                self.config.texture_coosys
            );
            return false;
        }
        if !self.coverages.iter().any(|c| Arc::ptr_eq(c, &coverage)) {
            self.coverages.push(coverage);
        }

        true
    }

    pub fn remove_texture(&mut self, coverage: &Arc<dyn TextureCoverage>) {
        self.coverages.retain(|c| !Arc::ptr_eq(c, coverage));
    }

    #[inline]
    pub fn textures(&self) -> &[Arc<dyn TextureCoverage>] {
        &self.coverages
    }

    pub fn elevation_scale(&self) -> f64 {
        self.h_scale
    }

    /// Takes effect at the next `update_data`, which then recomputes every cartesian.
    pub fn set_elevation_scale(&mut self, h_scale: f64) {
        self.h_scale_new = h_scale;
    }

    /// Elevation in meters of an integer elevation.
    #[inline]
    pub fn int_to_h(&self, h: i32) -> f64 {
        h as f64 * self.config.scale * self.h_scale
    }

    /// Re-stamps queued elevation queries with their nodes' timestamps and cancels queries of nodes that no longer need
    /// them.
    pub(crate) fn refresh_query_priorities(&self) {
        let nodes = &self.nodes;
        self.source.refresh_priorities(&|id| {
            let node = nodes.get(id as usize)?;
            if node.is_free() || node.h != PENDING {
                None
            } else {
                Some(node.status)
            }
        });
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
