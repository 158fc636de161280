//! Navigation over the bintree links.
//!
//! A triangle `(n, i)` has apex `n`, right corner `links[4 + i]` and left corner `links[4 + (i + 3) % 4]` of `n`. Its base
//! node is child `i` of `n`, and its two children are `(base, i)` (right) and `(base, (i + 1) % 4)` (left).

use super::triangle::{link, Direction, EdgeId, NodeId, TriangleId};
use super::SurfaceNodes;
use crate::NodeQuery;

impl SurfaceNodes {
    /// The right or left child of `t`. With `create`, the base node is created if needed.
    pub fn get_child(&mut self, t: TriangleId, child: Direction, create: bool) -> Option<TriangleId> {
        debug_assert!(matches!(child, Direction::Left | Direction::Right));

        let base = self.get_base_node(t, create)?;

        Some(TriangleId::new(base, (t.corner() + child as usize) % 4))
    }

    /// The triangle that `t` was split from, if its apex is still linked as a child.
    pub fn get_parent(&self, t: TriangleId) -> Option<TriangleId> {
        self.parent_link(t).map(|(parent, _)| parent)
    }

    /// The parent of `t` and which of its children `t` is.
    fn parent_link(&self, t: TriangleId) -> Option<(TriangleId, Direction)> {
        let id = t.node();
        let ix = t.corner();
        let node = self.node(id);

        if let Some(p) = node.parent(ix) {
            if self.node(p).links[ix] == id as i32 {
                return Some((TriangleId::new(p, ix), Direction::Right));
            }
        }
        let p_ix = (ix + 3) % 4;
        if let Some(p) = node.parent(p_ix) {
            if self.node(p).links[p_ix] == id as i32 {
                return Some((TriangleId::new(p, p_ix), Direction::Left));
            }
        }

        None
    }

    /// The triangle across the base edge of `t` at the same level, found through the parent. `None` when `t` has no
    /// parent or the parent has no neighbour on that side.
    fn base_neighbour_parent(&self, t: TriangleId) -> Option<(TriangleId, Direction)> {
        let (parent, side) = self.parent_link(t)?;
        let p_ix = parent.corner();
        let ch = side as usize;
        self.node(parent.node()).parent((ch + 1 + p_ix) % 4)?;

        Some((
            TriangleId::new(parent.node(), (p_ix + 2 * ch + 1) % 4),
            side.other_child(),
        ))
    }

    /// The neighbour of `t` across its right, left or base edge. Returns the same-level neighbour if it has been split,
    /// otherwise the coarser triangle on the other side. Never creates nodes.
    pub fn get_neighbour(&mut self, t: TriangleId, direction: Direction) -> Option<TriangleId> {
        match direction {
            Direction::Left | Direction::Right => {
                let n = direction as usize;
                let ix = t.corner();
                self.node(t.node()).parent((n + 1 + ix) % 4)?;
                let side = TriangleId::new(t.node(), (ix + 2 * n + 1) % 4);

                Some(self.get_child(side, direction.other_child(), false).unwrap_or(side))
            }
            Direction::Base => {
                let (across, child) = self.base_neighbour_parent(t)?;

                Some(self.get_child(across, child, false).unwrap_or(across))
            }
            Direction::Top => None,
        }
    }

    /// The edge on the other side of `edge`: the base edge of the finer neighbour if it exists, otherwise the matching
    /// lateral edge of the coarser one.
    pub fn get_neighbour_edge(&mut self, edge: EdgeId) -> Option<EdgeId> {
        let t = edge.triangle;
        let (across, child) = match edge.direction {
            Direction::Left | Direction::Right => {
                let n = edge.direction as usize;
                let ix = t.corner();
                self.node(t.node()).parent((n + 1 + ix) % 4)?;

                (
                    TriangleId::new(t.node(), (ix + 2 * n + 1) % 4),
                    edge.direction.other_child(),
                )
            }
            Direction::Base => self.base_neighbour_parent(t)?,
            Direction::Top => return None,
        };

        Some(match self.get_child(across, child, false) {
            Some(finer) => EdgeId {
                triangle: finer,
                direction: Direction::Base,
            },
            None => EdgeId {
                triangle: across,
                direction: child,
            },
        })
    }

    /// The same-level triangle across the base edge of `t`, splitting coarser neighbours as needed.
    pub fn get_base_neighbour(&mut self, t: TriangleId) -> Option<TriangleId> {
        let (across, child) = self.base_neighbour_parent(t)?;

        self.get_child(across, child, true)
    }

    /// A vertex of `t`: the apex for `Top`, or one of the hypotenuse corners.
    pub fn get_node(&self, t: TriangleId, corner: Direction) -> Option<NodeId> {
        let id = t.node();
        let ix = t.corner();
        match corner {
            Direction::Top => Some(id),
            Direction::Right => self.node(id).parent(ix),
            Direction::Left => self.node(id).parent((ix + 3) % 4),
            Direction::Base => None,
        }
    }

    /// The base node of `t`, the midpoint of its hypotenuse.
    ///
    /// An existing base node has its timestamp refreshed. Otherwise, with `create`, a new node is allocated and linked
    /// into both triangles that share the hypotenuse, so the vertex is never duplicated. The new node gets its position,
    /// cartesian, radius and texture coordinates, and an elevation query is posted for it.
    pub fn get_base_node(&mut self, t: TriangleId, create: bool) -> Option<NodeId> {
        let id = t.node();
        let ix = t.corner();

        if let Some(base) = self.node(id).child(ix) {
            let ts = self.ts;
            let node = self.node_mut(base);
            if node.status < ts {
                node.status = ts;
            }
            return Some(base);
        }
        if !create {
            return None;
        }

        let shared_with = self.get_base_neighbour(t);
        let right = self.get_node(t, Direction::Right)?;
        let left = self.get_node(t, Direction::Left)?;

        let base = self.alloc();
        if let Some(bt) = shared_with {
            self.node_mut(bt.node()).links[bt.corner()] = base as i32;
            self.node_mut(base).links[4 + bt.corner()] = bt.node() as i32;
        }
        self.node_mut(id).links[ix] = base as i32;

        let (right_lon, right_lat) = (self.node(right).lon, self.node(right).lat);
        let (left_lon, left_lat) = (self.node(left).lon, self.node(left).lat);
        let node = self.node_mut(base);
        node.links[4 + ix] = id as i32;
        node.links[4 + (ix + 1) % 4] = left as i32;
        node.links[4 + (ix + 3) % 4] = right as i32;
        node.lon = midpoint(left_lon, right_lon);
        node.lat = midpoint(left_lat, right_lat);

        self.compute_cartesian(base);
        self.compute_object_radius(base);
        self.compute_tex_coords(base);
        self.post_query(base);

        Some(base)
    }

    pub(crate) fn post_query(&self, id: NodeId) {
        let node = self.node(id);
        self.source.add_query(NodeQuery {
            node: id,
            lon: node.lon,
            lat: node.lat,
            priority: node.status,
        });
    }

    /// All four children of `id` that exist.
    pub(crate) fn children(&self, id: NodeId) -> impl Iterator<Item = (usize, NodeId)> {
        let links = self.node(id).links;

        (0..4).filter_map(move |q| link(links[q]).map(|c| (q, c)))
    }
}

/// Midpoint of two integer coordinates, wrapping across the date line.
#[inline]
pub(crate) fn midpoint(a: i32, b: i32) -> i32 {
    (a.wrapping_sub(b) / 2).wrapping_add(b)
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::super::test_util::{flat_surface, random_descent};
    use super::*;

    use pretty_assertions::assert_eq;
    use rand::SeedableRng;

    #[test]
    fn midpoint_wraps_across_the_date_line() {
        assert_eq!(midpoint(10, 20), 15);
        assert_eq!(midpoint(i32::MIN + 10, i32::MAX - 9), i32::MIN);
        assert_eq!(midpoint(-(1 << 30), 1 << 30), 0);
    }

    #[test]
    fn new_nodes_lie_at_the_midpoint_of_their_diamond() {
        let mut nodes = flat_surface(4096);
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        let grid_size = nodes.grid.len();

        for _ in 0..60 {
            random_descent(&mut nodes, &mut rng, 12);
        }

        let mut num_checked = 0;
        for id in 0..nodes.capacity() as NodeId {
            let node = *nodes.node(id);
            if node.is_free() || (id as usize) < grid_size {
                continue;
            }
            for i in 0..4 {
                let p = match node.parent(i) {
                    Some(p) => p,
                    None => continue,
                };
                if nodes.node(p).child(i) != Some(id) {
                    continue;
                }
                let t = TriangleId::new(p, i);
                let left = nodes.node(nodes.get_node(t, Direction::Left).unwrap());
                let right = nodes.node(nodes.get_node(t, Direction::Right).unwrap());
                assert_eq!(node.lon, midpoint(left.lon, right.lon), "node {}", id);
                assert_eq!(node.lat, midpoint(left.lat, right.lat), "node {}", id);
                num_checked += 1;
            }
        }
        assert!(num_checked > 100, "only {} parent links checked", num_checked);
    }

    #[test]
    fn neighbours_share_their_base_node() {
        let mut nodes = flat_surface(1024);
        let mut checked = 0;

        for &apex in nodes.base_mesh().to_vec().iter() {
            for corner in 0..4 {
                let t = TriangleId::new(apex, corner);
                if nodes.get_node(t, Direction::Left).is_none() || nodes.get_node(t, Direction::Right).is_none() {
                    continue;
                }
                let base = nodes.get_base_node(t, true).unwrap();
                let across = match nodes.get_neighbour(t, Direction::Base) {
                    Some(across) => across,
                    None => continue,
                };
                let fill = nodes.fill();
                assert_eq!(nodes.get_base_node(across, true), Some(base));
                assert_eq!(nodes.fill(), fill);
                checked += 1;
            }
        }
        assert!(checked > 0);
    }

    #[test]
    fn child_and_parent_are_inverse() {
        let mut nodes = flat_surface(1024);
        let t = TriangleId::new(nodes.base_mesh()[9], 1);

        let right = nodes.get_child(t, Direction::Right, true).unwrap();
        let left = nodes.get_child(t, Direction::Left, true).unwrap();

        assert_eq!(right.node(), left.node());
        assert_eq!(nodes.get_parent(right), Some(t));
        assert_eq!(nodes.get_parent(left), Some(t));
        // The two children share the edge from the base node to the apex.
        assert_eq!(nodes.get_neighbour(right, Direction::Right), Some(left));
        assert_eq!(nodes.get_neighbour(left, Direction::Left), Some(right));
    }

    #[test]
    fn neighbour_edge_points_back() {
        let mut nodes = flat_surface(1024);
        let t = TriangleId::new(nodes.base_mesh()[12], 0);
        let right = nodes.get_child(t, Direction::Right, true).unwrap();

        let left = nodes.get_child(t, Direction::Left, true).unwrap();

        let edge = EdgeId {
            triangle: right,
            direction: Direction::Right,
        };
        assert_eq!(
            nodes.get_neighbour_edge(edge),
            Some(EdgeId {
                triangle: left,
                direction: Direction::Left,
            })
        );
    }
}
