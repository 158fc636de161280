//! Cartesian positions, bounding radii and elevation integration.

use super::node::{INVALID_CARTESIAN, TS_PINNED};
use super::triangle::NodeId;
use super::SurfaceNodes;
use crate::{ElevationSink, PENDING};

use globe_terrain_core::{Point3i, PointN};
use std::sync::Arc;

/// A pending step of the bottom-up radius pass.
#[derive(Clone, Copy)]
struct RadiusFrame {
    id: NodeId,
    next_child: usize,
    /// The child whose subtree is being computed, and its distance.
    pending: Option<(NodeId, f32)>,
}

impl SurfaceNodes {
    /// Elevation of `id`, interpolated from the hypotenuse corners while it has none of its own.
    ///
    /// Grid nodes without elevation read as 0. They are allocated first, so their ids are below `grid.len()`.
    pub fn get_int_h(&self, id: NodeId) -> i32 {
        let node = self.node(id);
        if node.has_elevation() {
            return node.h;
        }
        if (id as usize) < self.grid.len() {
            return 0;
        }
        for i in 0..2 {
            let (p1, p2) = match (node.parent(i), node.parent((i + 2) % 4)) {
                (Some(p1), Some(p2)) => (p1, p2),
                _ => continue,
            };
            if self.node(p1).child(i) != Some(id) && self.node(p2).child((i + 2) % 4) != Some(id) {
                let sum = self.get_int_h(p1) as i64 + self.get_int_h(p2) as i64;
                return (sum / 2) as i32;
            }
        }

        0
    }

    /// Recomputes the cartesian of `id` from its position and elevation. Its radii are reset for the next radius pass.
    pub fn compute_cartesian(&mut self, id: NodeId) {
        let p = self.cartesian_of(id);

        let node = self.node_mut(id);
        node.cartesian = p;
        node.clear_radii();
    }

    /// The cartesian `compute_cartesian` would store for `id`, in surface units.
    pub fn cartesian_of(&self, id: NodeId) -> Point3i {
        let scale = self.config.scale;
        let h = self.int_to_h(self.get_int_h(id));
        let node = self.node(id);
        let p = self.ellipsoid.to_cartesian(
            self.coords.int_to_lat(node.lat),
            self.coords.int_to_lon(node.lon),
            h,
        );

        p.map_components(|c| (c / scale) as i32)
    }

    pub(crate) fn compute_tex_coords(&mut self, id: NodeId) {
        let node = self.node(id);
        let tex = self.config.texture_coosys.tex_coords(&self.coords, node.lon, node.lat);
        self.node_mut(id).tex_coords = tex;
    }

    /// Squared distance in meters between two nodes.
    #[inline]
    pub fn distance_sqr(&self, a: NodeId, b: NodeId) -> f64 {
        let d = self.node(a).cartesian.map_components(f64::from) - self.node(b).cartesian.map_components(f64::from);
        let s = self.config.scale;

        (d.x() * d.x() + d.y() * d.y() + d.z() * d.z()) * s * s
    }

    fn deviation(&self, own_radius: f32, dh: i32) -> f32 {
        let dist = own_radius * 2.0;
        let r = self.ellipsoid.a() as f32;

        dist * dist / (8.0 * r) + self.int_to_h(dh) as f32
    }

    /// Radii and deviation of a new node from its corners and any children that already exist.
    pub(crate) fn compute_object_radius(&mut self, id: NodeId) {
        let mut own = self.node(id).own_radius;
        for i in 0..4 {
            if let Some(n) = self.node(id).parent(i) {
                own = own.max(self.distance_sqr(id, n).sqrt() as f32);
            }
        }
        let mut total = self.node(id).total_radius.max(own);
        let mut dh = self.node(id).dh;
        for (_, child) in self.children(id) {
            let c = self.node(child);
            dh = dh.max(c.dh);
            let dist = self.distance_sqr(id, child).sqrt() as f32;
            total = total.max(dist + c.total_radius);
        }

        let deviation = self.deviation(own, dh);
        let node = self.node_mut(id);
        node.own_radius = own;
        node.total_radius = total;
        node.dh = dh;
        node.total_deviation = deviation;
    }

    /// Fills in the radii of every node under `root` whose radii were cleared, bottom-up.
    ///
    /// Subtrees with a nonzero total radius are assumed up to date and skipped.
    pub(crate) fn compute_all_object_radius(&mut self, root: NodeId) {
        let mut stack: Vec<RadiusFrame> = Vec::new();
        if self.enter_radius_frame(root, None, 0.0) {
            stack.push(RadiusFrame {
                id: root,
                next_child: 0,
                pending: None,
            });
        }

        while let Some(frame) = stack.last().copied() {
            let top = stack.len() - 1;
            let id = frame.id;

            if let Some((child, dist)) = frame.pending {
                stack[top].pending = None;
                let total = dist + self.node(child).total_radius;
                let node = self.node_mut(id);
                node.total_radius = node.total_radius.max(total);
            }

            if frame.next_child < 4 {
                let quadrant = frame.next_child;
                stack[top].next_child += 1;
                let child = match self.node(id).child(quadrant) {
                    Some(child) => child,
                    None => continue,
                };
                let child_dh = self.node(child).dh;
                let node = self.node_mut(id);
                node.dh = node.dh.max(child_dh);

                let dist = self.distance_sqr(id, child).sqrt() as f32;
                if self.enter_radius_frame(child, Some(id), dist) {
                    stack[top].pending = Some((child, dist));
                    stack.push(RadiusFrame {
                        id: child,
                        next_child: 0,
                        pending: None,
                    });
                } else {
                    let total = dist + self.node(child).total_radius;
                    let node = self.node_mut(id);
                    node.total_radius = node.total_radius.max(total);
                }
            } else {
                let node = self.node(id);
                let deviation = self.deviation(node.own_radius, node.dh);
                self.node_mut(id).total_deviation = deviation;
                stack.pop();
            }
        }
    }

    /// Computes the own radius of `id` if its radii were cleared. Returns whether its subtree needs a pass.
    fn enter_radius_frame(&mut self, id: NodeId, from: Option<NodeId>, from_dist: f32) -> bool {
        if self.node(id).total_radius > 0.0 {
            return false;
        }
        let mut own = self.node(id).own_radius.max(from_dist);
        for i in 0..4 {
            match self.node(id).parent(i) {
                Some(n) if Some(n) != from => own = own.max(self.distance_sqr(id, n).sqrt() as f32),
                _ => (),
            }
        }
        let node = self.node_mut(id);
        node.own_radius = own;
        node.total_radius = own;

        true
    }

    /// Clears the radii of every ancestor of `id` that has them, so the next radius pass recomputes those subtrees.
    pub(crate) fn clear_parent_radii(&mut self, id: NodeId) {
        let mut stack = std::mem::take(&mut self.scratch_stack);
        stack.clear();
        stack.push(id);
        while let Some(id) = stack.pop() {
            for i in 0..4 {
                let p = match self.node(id).parent(i) {
                    Some(p) if self.node(p).child(i) == Some(id) => p,
                    _ => continue,
                };
                let parent = self.node_mut(p);
                if parent.own_radius == 0.0 && parent.total_radius == 0.0 {
                    continue;
                }
                parent.clear_radii();
                stack.push(p);
            }
        }
        self.scratch_stack = stack;
    }

    /// Invalidates the cartesians of the descendants that interpolate their elevation from `id`.
    ///
    /// Only grandchildren without elevation of their own, that have `id` as a hypotenuse corner, depend on it. The walk
    /// continues from each of them. Nodes already invalidated have been walked from before.
    pub(crate) fn clear_grandchild_cartesian(&mut self, id: NodeId) {
        let mut stack = std::mem::take(&mut self.scratch_stack);
        stack.clear();
        stack.push(id);
        while let Some(id) = stack.pop() {
            for (_, child) in self.children(id) {
                for (j, g) in self.children(child) {
                    let node = self.node(g);
                    if node.has_elevation() || !node.has_valid_cartesian() {
                        continue;
                    }
                    if node.links[4 + (j + 1) % 4] == id as i32 || node.links[4 + (j + 3) % 4] == id as i32 {
                        self.node_mut(g).invalidate_cartesian();
                        stack.push(g);
                    }
                }
            }
        }
        self.scratch_stack = stack;
    }

    /// The per-frame integration step.
    ///
    /// Drains elevation replies, recomputes invalidated cartesians (all of them after an elevation scale change and on
    /// every `recompute_interval`th call), clears the radii that depend on them, then recomputes radii bottom-up from the
    /// basemesh.
    pub fn update_data(&mut self) {
        let _span = tracing::debug_span!("update_data", ts = self.ts).entered();

        let source = Arc::clone(&self.source);
        source.process_replies(self);

        let scale_changed = self.h_scale_new != self.h_scale;
        self.h_scale = self.h_scale_new;
        self.update_count = self.update_count.wrapping_add(1);
        let recompute_all = scale_changed || self.update_count % self.config.recompute_interval.max(1) == 0;

        let mut num_recomputed = 0;
        for i in (0..self.nodes.len()).rev() {
            let node = &self.nodes[i];
            if node.status <= 0 {
                continue;
            }
            let id = i as NodeId;
            if recompute_all {
                self.compute_cartesian(id);
                num_recomputed += 1;
            } else if !node.has_valid_cartesian() {
                self.compute_cartesian(id);
                self.clear_parent_radii(id);
                for (_, child) in self.children(id).collect::<Vec<_>>() {
                    self.node_mut(child).clear_radii();
                    self.clear_parent_radii(child);
                }
                num_recomputed += 1;
            }
        }
        tracing::trace!("Recomputed {} cartesians", num_recomputed);

        for i in 0..self.grid.len() {
            let root = self.grid[i];
            self.compute_all_object_radius(root);
        }

        self.refresh_query_priorities();
    }

    /// Whether any pinned node is still waiting for its first elevation.
    pub fn basemesh_pending(&self) -> bool {
        self.nodes
            .iter()
            .any(|n| n.status == TS_PINNED && n.h == PENDING)
    }
}

impl ElevationSink for SurfaceNodes {
    fn set_node_values(&mut self, node: NodeId, lon: i32, lat: i32, h: i32, dh: i32) {
        let n = match self.nodes.get_mut(node as usize) {
            Some(n) => n,
            None => return,
        };
        if n.is_free() || n.lon != lon || n.lat != lat {
            tracing::trace!("Dropping elevation reply for reclaimed node {}", node);
            return;
        }
        if n.h == h && n.dh == dh {
            return;
        }
        n.h = h;
        n.dh = dh;
        n.cartesian = PointN([INVALID_CARTESIAN, 0, 0]);

        self.clear_grandchild_cartesian(node);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
