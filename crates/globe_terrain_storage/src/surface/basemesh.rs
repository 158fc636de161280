//! The fixed coarse mesh every refinement starts from.
//!
//! A 4 x 9 grid of nodes spans the globe: 4 columns a quarter turn apart in longitude, 9 rows from pole to pole. Cutting
//! its cells along their diagonals gives 32 apex nodes, one per 90 x 22.5 degree cell. All of them are pinned.

use super::node::TS_PINNED;
use super::triangle::{NodeId, TriangleId, NIL};
use super::SurfaceNodes;
use crate::TileExtent;

const GRID_COLUMNS: usize = 4;
const GRID_ROWS: usize = 9;

/// Links between grid nodes, as `((column, row), slot, target)`. Slots `0..4` are children, `4..8` diamond corners.
#[rustfmt::skip]
const GRID_LINKS: [((usize, usize), usize, Option<(usize, usize)>); 184] = [
    ((2, 2), 0, Some((2, 4))),
    ((2, 2), 1, Some((0, 2))),
    ((2, 2), 2, Some((2, 0))),
    ((2, 2), 3, Some((0, 2))),
    ((2, 6), 0, Some((2, 8))),
    ((2, 6), 1, Some((0, 6))),
    ((2, 6), 2, Some((2, 4))),
    ((2, 6), 3, Some((0, 6))),
    ((2, 0), 4, None),
    ((2, 0), 5, Some((0, 0))),
    ((2, 0), 6, Some((2, 2))),
    ((2, 0), 7, Some((0, 0))),
    ((2, 0), 0, None),
    ((2, 0), 1, None),
    ((2, 0), 2, Some((1, 1))),
    ((2, 0), 3, Some((3, 1))),
    ((0, 2), 4, Some((0, 0))),
    ((0, 2), 5, Some((2, 2))),
    ((0, 2), 6, Some((0, 4))),
    ((0, 2), 7, Some((2, 2))),
    ((0, 2), 0, Some((1, 1))),
    ((0, 2), 1, Some((3, 1))),
    ((0, 2), 2, Some((3, 3))),
    ((0, 2), 3, Some((1, 3))),
    ((2, 4), 4, Some((2, 2))),
    ((2, 4), 5, Some((0, 4))),
    ((2, 4), 6, Some((2, 6))),
    ((2, 4), 7, Some((0, 4))),
    ((2, 4), 0, Some((3, 3))),
    ((2, 4), 1, Some((1, 3))),
    ((2, 4), 2, Some((1, 5))),
    ((2, 4), 3, Some((3, 5))),
    ((0, 6), 4, Some((0, 4))),
    ((0, 6), 5, Some((2, 6))),
    ((0, 6), 6, Some((0, 8))),
    ((0, 6), 7, Some((2, 6))),
    ((0, 6), 0, Some((1, 5))),
    ((0, 6), 1, Some((3, 5))),
    ((0, 6), 2, Some((3, 7))),
    ((0, 6), 3, Some((1, 7))),
    ((2, 8), 4, Some((2, 6))),
    ((2, 8), 5, Some((0, 8))),
    ((2, 8), 6, None),
    ((2, 8), 7, Some((0, 8))),
    ((2, 8), 0, Some((3, 7))),
    ((2, 8), 1, Some((1, 7))),
    ((2, 8), 2, None),
    ((2, 8), 3, None),
    ((1, 1), 4, Some((0, 2))),
    ((1, 1), 5, Some((2, 2))),
    ((1, 1), 6, Some((2, 0))),
    ((1, 1), 7, Some((0, 0))),
    ((1, 1), 0, Some((0, 1))),
    ((1, 1), 1, Some((1, 2))),
    ((1, 1), 2, Some((2, 1))),
    ((1, 1), 3, Some((1, 0))),
    ((3, 1), 4, Some((2, 2))),
    ((3, 1), 5, Some((0, 2))),
    ((3, 1), 6, Some((0, 0))),
    ((3, 1), 7, Some((2, 0))),
    ((3, 1), 0, Some((2, 1))),
    ((3, 1), 1, Some((3, 2))),
    ((3, 1), 2, Some((0, 1))),
    ((3, 1), 3, Some((3, 0))),
    ((1, 3), 4, Some((0, 4))),
    ((1, 3), 5, Some((2, 4))),
    ((1, 3), 6, Some((2, 2))),
    ((1, 3), 7, Some((0, 2))),
    ((1, 3), 0, Some((0, 3))),
    ((1, 3), 1, Some((1, 4))),
    ((1, 3), 2, Some((2, 3))),
    ((1, 3), 3, Some((1, 2))),
    ((3, 3), 4, Some((2, 4))),
    ((3, 3), 5, Some((0, 4))),
    ((3, 3), 6, Some((0, 2))),
    ((3, 3), 7, Some((2, 2))),
    ((3, 3), 0, Some((2, 3))),
    ((3, 3), 1, Some((3, 4))),
    ((3, 3), 2, Some((0, 3))),
    ((3, 3), 3, Some((3, 2))),
    ((1, 5), 4, Some((0, 6))),
    ((1, 5), 5, Some((2, 6))),
    ((1, 5), 6, Some((2, 4))),
    ((1, 5), 7, Some((0, 4))),
    ((1, 5), 0, Some((0, 5))),
    ((1, 5), 1, Some((1, 6))),
    ((1, 5), 2, Some((2, 5))),
    ((1, 5), 3, Some((1, 4))),
    ((3, 5), 4, Some((2, 6))),
    ((3, 5), 5, Some((0, 6))),
    ((3, 5), 6, Some((0, 4))),
    ((3, 5), 7, Some((2, 4))),
    ((3, 5), 0, Some((2, 5))),
    ((3, 5), 1, Some((3, 6))),
    ((3, 5), 2, Some((0, 5))),
    ((3, 5), 3, Some((3, 4))),
    ((1, 7), 4, Some((0, 8))),
    ((1, 7), 5, Some((2, 8))),
    ((1, 7), 6, Some((2, 6))),
    ((1, 7), 7, Some((0, 6))),
    ((1, 7), 0, Some((0, 7))),
    ((1, 7), 1, Some((1, 8))),
    ((1, 7), 2, Some((2, 7))),
    ((1, 7), 3, Some((1, 6))),
    ((3, 7), 4, Some((2, 8))),
    ((3, 7), 5, Some((0, 8))),
    ((3, 7), 6, Some((0, 6))),
    ((3, 7), 7, Some((2, 6))),
    ((3, 7), 0, Some((2, 7))),
    ((3, 7), 1, Some((3, 8))),
    ((3, 7), 2, Some((0, 7))),
    ((3, 7), 3, Some((3, 6))),
    ((1, 0), 4, Some((2, 0))),
    ((1, 0), 5, None),
    ((1, 0), 6, Some((0, 0))),
    ((1, 0), 7, Some((1, 1))),
    ((3, 0), 4, Some((0, 0))),
    ((3, 0), 5, None),
    ((3, 0), 6, Some((2, 0))),
    ((3, 0), 7, Some((3, 1))),
    ((0, 1), 4, Some((1, 1))),
    ((0, 1), 5, Some((0, 0))),
    ((0, 1), 6, Some((3, 1))),
    ((0, 1), 7, Some((0, 2))),
    ((2, 1), 4, Some((3, 1))),
    ((2, 1), 5, Some((2, 0))),
    ((2, 1), 6, Some((1, 1))),
    ((2, 1), 7, Some((2, 2))),
    ((1, 2), 4, Some((2, 2))),
    ((1, 2), 5, Some((1, 1))),
    ((1, 2), 6, Some((0, 2))),
    ((1, 2), 7, Some((1, 3))),
    ((3, 2), 4, Some((0, 2))),
    ((3, 2), 5, Some((3, 1))),
    ((3, 2), 6, Some((2, 2))),
    ((3, 2), 7, Some((3, 3))),
    ((0, 3), 4, Some((1, 3))),
    ((0, 3), 5, Some((0, 2))),
    ((0, 3), 6, Some((3, 3))),
    ((0, 3), 7, Some((0, 4))),
    ((2, 3), 4, Some((3, 3))),
    ((2, 3), 5, Some((2, 2))),
    ((2, 3), 6, Some((1, 3))),
    ((2, 3), 7, Some((2, 4))),
    ((1, 4), 4, Some((2, 4))),
    ((1, 4), 5, Some((1, 3))),
    ((1, 4), 6, Some((0, 4))),
    ((1, 4), 7, Some((1, 5))),
    ((3, 4), 4, Some((0, 4))),
    ((3, 4), 5, Some((3, 3))),
    ((3, 4), 6, Some((2, 4))),
    ((3, 4), 7, Some((3, 5))),
    ((0, 5), 4, Some((1, 5))),
    ((0, 5), 5, Some((0, 4))),
    ((0, 5), 6, Some((3, 5))),
    ((0, 5), 7, Some((0, 6))),
    ((2, 5), 4, Some((3, 5))),
    ((2, 5), 5, Some((2, 4))),
    ((2, 5), 6, Some((1, 5))),
    ((2, 5), 7, Some((2, 6))),
    ((1, 6), 4, Some((2, 6))),
    ((1, 6), 5, Some((1, 5))),
    ((1, 6), 6, Some((0, 6))),
    ((1, 6), 7, Some((1, 7))),
    ((3, 6), 4, Some((0, 6))),
    ((3, 6), 5, Some((3, 5))),
    ((3, 6), 6, Some((2, 6))),
    ((3, 6), 7, Some((3, 7))),
    ((0, 7), 4, Some((1, 7))),
    ((0, 7), 5, Some((0, 6))),
    ((0, 7), 6, Some((3, 7))),
    ((0, 7), 7, Some((0, 8))),
    ((2, 7), 4, Some((3, 7))),
    ((2, 7), 5, Some((2, 6))),
    ((2, 7), 6, Some((1, 7))),
    ((2, 7), 7, Some((2, 8))),
    ((1, 8), 4, Some((2, 8))),
    ((1, 8), 5, Some((1, 7))),
    ((1, 8), 6, Some((0, 8))),
    ((1, 8), 7, None),
    ((3, 8), 4, Some((0, 8))),
    ((3, 8), 5, Some((3, 7))),
    ((3, 8), 6, Some((2, 8))),
    ((3, 8), 7, None),
];

/// The grid triangles whose base nodes form the basemesh, in basemesh order.
#[rustfmt::skip]
const BASE_MESH_TRIANGLES: [((usize, usize), usize); 32] = [
    ((1, 0), 0), ((1, 0), 3), ((3, 0), 0), ((3, 0), 3),
    ((1, 2), 0), ((1, 2), 1), ((1, 2), 2), ((1, 2), 3),
    ((3, 2), 0), ((3, 2), 1), ((3, 2), 2), ((3, 2), 3),
    ((1, 4), 0), ((1, 4), 1), ((1, 4), 2), ((1, 4), 3),
    ((3, 4), 0), ((3, 4), 1), ((3, 4), 2), ((3, 4), 3),
    ((1, 6), 0), ((1, 6), 1), ((1, 6), 2), ((1, 6), 3),
    ((3, 6), 0), ((3, 6), 1), ((3, 6), 2), ((3, 6), 3),
    ((1, 8), 2), ((1, 8), 1), ((3, 8), 2), ((3, 8), 1),
];

/// Quadtree address of each basemesh cell, in basemesh order. Tile naming schemes derive child addresses by appending
/// quadrant digits.
#[rustfmt::skip]
pub const BASE_MESH_CODES: [&str; 32] = [
    "1211", "1210", "1201", "1200",
    "1231", "1213", "1212", "1230",
    "1221", "1203", "1202", "1220",
    "3011", "1233", "1232", "3010",
    "3001", "1223", "1222", "3000",
    "3031", "3013", "3012", "3030",
    "3021", "3003", "3002", "3020",
    "3032", "3033", "3022", "3023",
];

impl SurfaceNodes {
    pub(crate) fn build_basemesh(&mut self) {
        let _span = tracing::debug_span!("build_basemesh").entered();

        let mut grid = [[0; GRID_ROWS]; GRID_COLUMNS];
        for (i, column) in grid.iter_mut().enumerate() {
            let lon = i32::MIN.wrapping_add((i as i32) << 30);
            for (j, id) in column.iter_mut().enumerate() {
                let lat = -(1 << 30) + ((j as i32) << 28);
                let new_id = self.alloc();
                let node = self.node_mut(new_id);
                node.lon = lon;
                node.lat = lat;
                node.status = TS_PINNED;
                *id = new_id;

                self.compute_cartesian(new_id);
                self.compute_tex_coords(new_id);
                self.post_query(new_id);
            }
        }
        self.grid = grid.iter().flatten().copied().collect();

        for &((i, j), slot, target) in GRID_LINKS.iter() {
            let link = target.map_or(NIL, |(ti, tj)| grid[ti][tj] as i32);
            self.node_mut(grid[i][j]).links[slot] = link;
        }

        let mut base_mesh = Vec::with_capacity(BASE_MESH_TRIANGLES.len());
        for &((i, j), corner) in BASE_MESH_TRIANGLES.iter() {
            let t = TriangleId::new(grid[i][j], corner);
            match self.get_base_node(t, true) {
                Some(id) => base_mesh.push(id),
                None => tracing::error!("Basemesh triangle {:?} has a missing corner", t),
            }
        }
        for &id in base_mesh.iter() {
            self.node_mut(id).status = TS_PINNED;
        }
        self.base_mesh = base_mesh;
    }

    /// The quadtree address of basemesh cell `i`.
    pub fn base_mesh_code(&self, i: usize) -> Option<&'static str> {
        BASE_MESH_CODES.get(i).copied()
    }

    /// The texture extent of each basemesh cell, in basemesh order. Base tiles of a `TileSet` are laid out from these.
    pub fn base_tile_extents(&self) -> Vec<TileExtent> {
        self.base_mesh
            .iter()
            .map(|&apex| {
                let center = self.node(apex).tex_coords;
                let (mut min, mut max) = ([0i64; 2], [0i64; 2]);
                for corner in (0..4).filter_map(|i| self.node(apex).parent(i)) {
                    let tex = self.node(corner).tex_coords;
                    for k in 0..2 {
                        let d = tex.0[k].wrapping_sub(center.0[k]) as i64;
                        min[k] = min[k].min(d);
                        max[k] = max[k].max(d);
                    }
                }

                TileExtent {
                    s: center.x().wrapping_add(min[0] as i32),
                    t: center.y().wrapping_add(min[1] as i32),
                    ds: (max[0] - min[0]) as u32,
                    dt: (max[1] - min[1]) as u32,
                }
            })
            .collect()
    }

    /// Whether `id` is one of the 36 grid nodes.
    #[inline]
    pub fn is_grid_node(&self, id: NodeId) -> bool {
        (id as usize) < self.grid.len()
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
    use super::super::test_util::flat_surface;
    use super::super::Direction;
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn basemesh_is_pinned_and_complete() {
        let nodes = flat_surface(1024);

        assert_eq!(nodes.grid.len(), GRID_COLUMNS * GRID_ROWS);
        assert_eq!(nodes.base_mesh().len(), 32);
        for &id in nodes.grid.iter().chain(nodes.base_mesh().iter()) {
            assert_eq!(nodes.node(id).status, TS_PINNED);
        }
        // Grid nodes and basemesh nodes only.
        assert_eq!(nodes.fill(), 36 + 32);
    }

    #[test]
    fn every_basemesh_triangle_has_both_corners() {
        let nodes = flat_surface(1024);

        for &apex in nodes.base_mesh() {
            for corner in 0..4 {
                let t = TriangleId::new(apex, corner);
                assert!(nodes.get_node(t, Direction::Left).is_some(), "{:?}", t);
                assert!(nodes.get_node(t, Direction::Right).is_some(), "{:?}", t);
            }
        }
    }

    #[test]
    fn basemesh_cells_tile_the_lon_lat_plane() {
        let nodes = flat_surface(1024);

        let mut cells: Vec<(i32, i32)> = nodes
            .base_mesh()
            .iter()
            .map(|&id| (nodes.node(id).lon, nodes.node(id).lat))
            .collect();
        cells.sort_unstable();
        cells.dedup();
        assert_eq!(cells.len(), 32);

        for &(lon, lat) in cells.iter() {
            // Cell centers sit half a cell in from the grid lines.
            assert_eq!(lon.wrapping_sub(i32::MIN) % (1 << 30), 1 << 29);
            assert_eq!((lat + (1 << 30)) % (1 << 28), 1 << 27);
        }
    }

    #[test]
    fn base_tiles_cover_their_cells() {
        let nodes = flat_surface(1024);
        let extents = nodes.base_tile_extents();

        assert_eq!(extents.len(), 32);
        for extent in extents.iter() {
            assert_eq!(extent.ds, 1 << 30);
            assert_eq!(extent.dt, 1 << 28);
        }
        for (i, a) in extents.iter().enumerate() {
            for b in extents[i + 1..].iter() {
                assert!(!a.intersects(b), "{:?} {:?}", a, b);
            }
        }
    }

    #[test]
    fn codes_are_unique() {
        let nodes = flat_surface(1024);
        let mut codes: Vec<_> = (0..32).filter_map(|i| nodes.base_mesh_code(i)).collect();
        codes.sort_unstable();
        codes.dedup();

        assert_eq!(codes.len(), 32);
        assert_eq!(nodes.base_mesh_code(32), None);
    }
}
