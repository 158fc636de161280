use super::triangle::{link, NodeId, NIL};
use crate::PENDING;

use globe_terrain_core::{Point2i, Point3i, PointN};

/// The timestamp advances by this much per frame. The low bits carry per-frame flags.
pub const TS_INC: i32 = 6;
/// Flag: a normal has been accumulated for the node this frame.
pub const TS_HAS_NORMAL: i32 = 1;
/// Flag: the node's triangle pair was classified invisible this frame.
pub const TS_IS_INVISIBLE: i32 = 2;
/// Flag: the node's triangle pair was classified visible this frame.
pub const TS_IS_VISIBLE: i32 = 4;
/// Status of nodes that are never reclaimed.
pub const TS_PINNED: i32 = i32::MAX;

/// Marks an invalid cartesian coordinate.
pub(crate) const INVALID_CARTESIAN: i32 = i32::MAX;

/// One vertex of the bintree.
///
/// Slots `0..4` of `links` are the children, one per quadrant. Slots `4..8` are the corner nodes of the diamond that this
/// node is the base vertex of; for a child in slot `i` of a parent `p`, `links[4 + i] == p`.
#[derive(Clone, Copy, Debug)]
pub struct Node {
    pub(crate) links: [i32; 8],
    /// Last-used timestamp (plus flags), or 0 for a free slot.
    pub status: i32,
    pub lon: i32,
    pub lat: i32,
    /// Elevation in elevation units, `PENDING` until a reply arrives.
    pub h: i32,
    /// Elevation uncertainty, raised to the maximum over the subtree.
    pub dh: i32,
    /// Fixed-point earth-centered position, in units of the surface scale.
    pub cartesian: Point3i,
    /// Distance to the farthest diamond corner.
    pub own_radius: f32,
    /// Radius of a sphere around the node enclosing its whole subtree.
    pub total_radius: f32,
    /// Geometric plus elevation error bound of the subtree.
    pub total_deviation: f32,
    pub tex_coords: Point2i,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            links: [NIL; 8],
            status: 0,
            lon: 0,
            lat: 0,
            h: PENDING,
            dh: 0,
            cartesian: PointN([INVALID_CARTESIAN, 0, 0]),
            own_radius: 0.0,
            total_radius: 0.0,
            total_deviation: 0.0,
            tex_coords: PointN([0, 0]),
        }
    }
}

impl Node {
    #[inline]
    pub fn is_free(&self) -> bool {
        self.status == 0
    }

    #[inline]
    pub fn child(&self, quadrant: usize) -> Option<NodeId> {
        link(self.links[quadrant])
    }

    #[inline]
    pub fn parent(&self, quadrant: usize) -> Option<NodeId> {
        link(self.links[4 + quadrant])
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.links[..4].iter().any(|&c| c >= 0)
    }

    #[inline]
    pub fn has_valid_cartesian(&self) -> bool {
        self.cartesian.x() != INVALID_CARTESIAN
    }

    #[inline]
    pub(crate) fn invalidate_cartesian(&mut self) {
        self.cartesian.0[0] = INVALID_CARTESIAN;
    }

    /// Whether the node has a real elevation (not pending, not unknown).
    #[inline]
    pub fn has_elevation(&self) -> bool {
        self.h > PENDING + 1
    }

    #[inline]
    pub(crate) fn clear_radii(&mut self) {
        self.own_radius = 0.0;
        self.total_radius = 0.0;
    }
}
