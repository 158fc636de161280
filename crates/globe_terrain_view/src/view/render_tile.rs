//! Render tiles: the units a frame is drawn in.
//!
//! A tile is the quadrangle of four triangles around a refined node, drawn with one texture tile per coverage. Tiles start at
//! the basemesh cells and are split into the tiles around their grandchildren while the texture is too coarse for the
//! camera distance. Where a grandchild is not refined, the parts of the quadrangle it would have covered are kept as loose
//! triangles of the parent tile.

use super::traversal::FrameBuilder;
use crate::frustum::{CullFrustum, Intersection};

use globe_terrain_core::{Point3d, Sphere3d};
use globe_terrain_storage::{Direction, NodeId, SurfaceNodes, TileExtent, TileId, TileImage, TriangleId};
use std::ops::Range;

const SUPPORT_GRID_MAX: usize = 1 << 3;
const SUPPORT_GRID_DIM: usize = SUPPORT_GRID_MAX + 1;
const SUPPORT_GRID_MID: usize = SUPPORT_GRID_MAX / 2;

/// Tiles whose texture is not resident are split anyway if this much of it is covered by resident children.
const MIN_CHILD_COVERAGE: f32 = 0.15;

/// Sample points of a tile on a 9 x 9 grid, each with the largest deviation of the triangles touching it.
#[derive(Clone, Debug)]
pub(crate) struct SupportGrid {
    points: [[Option<(Point3d, f64)>; SUPPORT_GRID_DIM]; SUPPORT_GRID_DIM],
}

impl Default for SupportGrid {
    fn default() -> Self {
        Self {
            points: [[None; SUPPORT_GRID_DIM]; SUPPORT_GRID_DIM],
        }
    }
}

impl SupportGrid {
    fn clear(&mut self) {
        for row in self.points.iter_mut() {
            for p in row.iter_mut() {
                *p = None;
            }
        }
    }

    fn add(&mut self, (i, j): (usize, usize), p: impl FnOnce() -> Point3d, deviation: f64) {
        match &mut self.points[i][j] {
            Some((_, d)) => *d = d.max(deviation),
            entry => *entry = Some((p(), deviation)),
        }
    }

    /// Radius around `center` enclosing every sample, displaced up and down by its deviation.
    fn radius(&self, center: Point3d) -> f64 {
        let mut radius = 0.0f64;
        for &(p, dh) in self.points.iter().flatten().flatten() {
            if dh > 0.0 {
                let d = dh / p.norm();
                radius = radius.max((p * (1.0 - d)).distance(&center));
                radius = radius.max((p * (1.0 + d)).distance(&center));
            } else {
                radius = radius.max(p.distance(&center));
            }
        }

        radius
    }
}

/// A texture tile bound to a render tile, with the transform from frame texture coordinates to the image.
#[derive(Clone, Debug)]
pub struct TileTexture {
    pub tile: TileId,
    pub extent: TileExtent,
    pub image: TileImage,
    /// Subtracted from a vertex's texture coordinates.
    pub offset: [f32; 2],
    /// Then multiplied in, mapping the tile onto `[0, 1]`.
    pub scale: [f32; 2],
}

impl TileTexture {
    #[inline]
    pub fn apply(&self, tex: [f32; 2]) -> [f32; 2] {
        [
            (tex[0] - self.offset[0]) * self.scale[0],
            (tex[1] - self.offset[1]) * self.scale[1],
        ]
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderTile {
    center: NodeId,
    center_point: Point3d,
    radius: f64,
    /// Loose triangles. When empty, the whole quadrangle is drawn.
    tris: Vec<TriangleId>,
    tiles: Vec<Option<TileId>>,
    textures: Vec<Option<TileTexture>>,
    is_antipode: bool,
    indices: Range<usize>,
    min_element: u32,
    max_element: u32,
}

impl RenderTile {
    pub fn center_node(&self) -> NodeId {
        self.center
    }

    pub fn bounding_sphere(&self) -> Sphere3d {
        Sphere3d {
            center: self.center_point,
            radius: self.radius,
        }
    }

    /// Whether the tile's texture straddles the seam opposite the origin, so it is drawn with the antipode texture
    /// coordinates.
    pub fn is_antipode(&self) -> bool {
        self.is_antipode
    }

    /// The tile's strip within the frame's index buffer.
    pub fn indices(&self) -> Range<usize> {
        self.indices.clone()
    }

    /// The smallest and largest vertex index the strip uses.
    pub fn element_range(&self) -> (u32, u32) {
        (self.min_element, self.max_element)
    }

    /// The bound texture of each coverage, in the surface's coverage order.
    pub fn textures(&self) -> &[Option<TileTexture>] {
        &self.textures
    }

    fn reset(&mut self, center: NodeId, center_point: Point3d) {
        self.center = center;
        self.center_point = center_point;
        self.radius = 0.0;
        self.tris.clear();
        self.tiles.clear();
        self.textures.clear();
        self.is_antipode = false;
        self.indices = 0..0;
        self.min_element = 0;
        self.max_element = 0;
    }
}

impl FrameBuilder {
    fn new_tile(&mut self, nodes: &SurfaceNodes, center: NodeId) -> RenderTile {
        let mut tile = self.free_tiles.pop().unwrap_or_default();
        tile.reset(center, nodes.node(center).cartesian.scaled(self.scale));

        tile
    }

    fn free_tile(&mut self, tile: RenderTile) {
        self.free_tiles.push(tile);
    }

    /// Builds the tiles of this frame, one tree per basemesh cell.
    pub(crate) fn build_render_tiles(&mut self, nodes: &SurfaceNodes, frustum: &dyn CullFrustum, base_mesh: &[NodeId]) {
        for (cell, &center) in base_mesh.iter().enumerate() {
            let mut tile = self.new_tile(nodes, center);
            let mut min_pixel_size = f64::MAX;
            for coverage in self.coverages.iter() {
                let base = coverage
                    .base_tile(cell)
                    .filter(|&t| !coverage.is_outside_area(t));
                if let Some(t) = base {
                    min_pixel_size = min_pixel_size.min(coverage.pixel_size(t));
                }
                tile.tiles.push(base);
            }
            self.place_tile(nodes, frustum, tile, Intersection::Partial, min_pixel_size);
        }
    }

    /// Builds the tile around grandchild `center` of the tile around `parent_center`.
    fn update_child(
        &mut self,
        nodes: &SurfaceNodes,
        frustum: &dyn CullFrustum,
        parent_center: NodeId,
        parent_tiles: &[Option<TileId>],
        center: NodeId,
        intersect: Intersection,
    ) {
        let (p, c) = (nodes.node(parent_center), nodes.node(center));
        let quadrant = (p.lon < c.lon) as usize + 2 * (p.lat < c.lat) as usize;

        let mut tile = self.new_tile(nodes, center);
        let mut min_pixel_size = f64::MAX;
        for (coverage, &parent) in self.coverages.iter().zip(parent_tiles.iter()) {
            let t = match parent {
                Some(parent) if !coverage.is_outside_area(parent) => {
                    if coverage.is_outside_resolution(parent) {
                        Some(parent)
                    } else {
                        let child = coverage.child(parent, quadrant, self.ts);
                        if let Some(child) = child {
                            min_pixel_size = min_pixel_size.min(coverage.pixel_size(child));
                        }
                        child
                    }
                }
                _ => None,
            };
            tile.tiles.push(t);
        }

        self.place_tile(nodes, frustum, tile, intersect, min_pixel_size);
    }

    /// Decides whether `tile` is drawn at its own level, split into its children, or both.
    fn place_tile(
        &mut self,
        nodes: &SurfaceNodes,
        frustum: &dyn CullFrustum,
        mut tile: RenderTile,
        intersect: Intersection,
        min_pixel_size: f64,
    ) {
        self.compute_support(nodes, &mut tile, min_pixel_size);
        let sphere = tile.bounding_sphere();
        let intersect = if intersect == Intersection::TotallyIn {
            intersect
        } else {
            frustum.check_sphere(&sphere)
        };

        let mut show = true;
        if intersect != Intersection::TotallyOut
            && min_pixel_size > frustum.camera_distance(&sphere) * frustum.resolution() * self.texture_res_factor
        {
            show = false;
        }

        let priority = sphere.radius.max(frustum.view_axis_distance(&sphere)) as f32;
        if show {
            let ts = self.ts;
            show = !self.coverages.iter().zip(tile.tiles.iter()).any(|(coverage, &t)| match t {
                Some(t) => {
                    !coverage.is_outside_resolution(t)
                        && coverage.use_texture(t, ts, priority, true).is_none()
                        && coverage.loaded_coverage(t) > MIN_CHILD_COVERAGE
                }
                None => false,
            });
        }

        if show || self.update_show_me(nodes, frustum, &mut tile, intersect) {
            self.use_render_tile(tile, priority);
        } else {
            self.free_tile(tile);
        }
    }

    /// Recurses into the tiles around the refined grandchildren of `tile`. Whatever they don't cover is added to `tile` as
    /// loose triangles. Returns whether `tile` has anything left to draw.
    fn update_show_me(
        &mut self,
        nodes: &SurfaceNodes,
        frustum: &dyn CullFrustum,
        tile: &mut RenderTile,
        intersect: Intersection,
    ) -> bool {
        let center = tile.center;
        let mut show = false;

        let mut children = [None; 4];
        let mut grandchildren = [None; 4];
        for q in 0..4 {
            children[q] = nodes.node(center).child(q).filter(|&ch| self.is_refined(ch));
            match children[q] {
                Some(ch) => {
                    grandchildren[(q + 3) % 4] = nodes.node(ch).child((q + 1) % 4);
                    grandchildren[q] = nodes.node(ch).child(q);
                }
                None => {
                    tile.tris.push(TriangleId::new(center, q));
                    show = true;
                }
            }
        }

        for q in 0..4 {
            match grandchildren[q].filter(|&cn| self.is_refined(cn)) {
                Some(cn) => self.update_child(nodes, frustum, center, &tile.tiles, cn, intersect),
                None => {
                    show = true;
                    if let Some(ch) = children[q] {
                        tile.tris.push(TriangleId::new(ch, q));
                    }
                    if let Some(ch) = children[(q + 1) % 4] {
                        tile.tris.push(TriangleId::new(ch, (q + 2) % 4));
                    }
                }
            }
        }

        show
    }

    /// Queues `tile` for drawing, binding the finest resident texture tile of each coverage. A missing image is requested
    /// and an ancestor is used meanwhile.
    fn use_render_tile(&mut self, mut tile: RenderTile, priority: f32) {
        let ts = self.ts;
        let mut bound = Vec::with_capacity(self.coverages.len());
        for (coverage, t) in self.coverages.iter().zip(tile.tiles.iter_mut()) {
            let mut current = t.filter(|&t| !coverage.is_outside_area(t));
            while let Some(c) = current.filter(|&c| coverage.is_outside_resolution(c)) {
                current = coverage.parent(c);
            }

            let mut found = None;
            let mut load = true;
            while let Some(c) = current {
                if let Some(image) = coverage.use_texture(c, ts, priority, load) {
                    found = Some((c, coverage.extent(c), image));
                    break;
                }
                load = false;
                current = coverage.parent(c);
            }
            *t = found.as_ref().map(|(c, _, _)| *c);
            bound.push(found);
        }

        let orig_s = self.tex_origin.x();
        tile.is_antipode = match bound.first() {
            Some(Some((_, e, _))) => {
                e.s.wrapping_add(e.ds as i32).wrapping_sub(orig_s) <= e.s.wrapping_sub(orig_s)
            }
            _ => false,
        };

        let seam = if tile.is_antipode { i32::MIN } else { 0 };
        let orig_t = self.tex_origin.y();
        tile.textures.extend(bound.into_iter().map(|found| {
            found.map(|(id, extent, image)| TileTexture {
                tile: id,
                extent,
                image,
                offset: [
                    extent.s.wrapping_sub(orig_s).wrapping_sub(seam) as f32,
                    extent.t.wrapping_sub(orig_t) as f32,
                ],
                scale: [1.0 / extent.ds as f32, 1.0 / extent.dt as f32],
            })
        }));

        if tile.is_antipode {
            self.antipode_tiles.push(tile);
        } else {
            self.normal_tiles.push(tile);
        }
    }

    /// Computes the bounding radius of `tile` from its support grid. Triangles deviating more than `deviation_tolerance` are
    /// sampled at their children.
    fn compute_support(&mut self, nodes: &SurfaceNodes, tile: &mut RenderTile, deviation_tolerance: f64) {
        const MAX: usize = SUPPORT_GRID_MAX;
        const MID: (usize, usize) = (SUPPORT_GRID_MID, SUPPORT_GRID_MID);

        self.support.clear();
        let center = tile.center;
        let quadrants = [
            ((0, 0), (0, MAX)),
            ((0, MAX), (MAX, MAX)),
            ((MAX, MAX), (MAX, 0)),
            ((MAX, 0), (0, 0)),
        ];
        for (q, &(left, right)) in quadrants.iter().enumerate() {
            self.add_support_points(nodes, TriangleId::new(center, q), left, right, MID, deviation_tolerance);
        }
        tile.radius = self.support.radius(tile.center_point);
    }

    fn add_support_points(
        &mut self,
        nodes: &SurfaceNodes,
        t: TriangleId,
        left: (usize, usize),
        right: (usize, usize),
        top: (usize, usize),
        deviation_tolerance: f64,
    ) {
        let base_node = nodes.node(t.node()).child(t.corner());
        let dh = base_node.map_or(0.0, |b| nodes.node(b).total_deviation as f64);
        let base = (left.0 + right.0, left.1 + right.1);

        if let Some(b) = base_node {
            if dh > deviation_tolerance && base.0 % 2 == 0 && base.1 % 2 == 0 {
                let base = (base.0 / 2, base.1 / 2);
                let left_child = TriangleId::new(b, (t.corner() + Direction::Left as usize) % 4);
                let right_child = TriangleId::new(b, (t.corner() + Direction::Right as usize) % 4);
                self.add_support_points(nodes, left_child, top, left, base, deviation_tolerance);
                self.add_support_points(nodes, right_child, right, top, base, deviation_tolerance);
                return;
            }
        }

        let scale = self.scale;
        for &(corner, at) in [(Direction::Top, top), (Direction::Left, left), (Direction::Right, right)].iter() {
            if let Some(id) = nodes.get_node(t, corner) {
                self.support
                    .add(at, || nodes.node(id).cartesian.scaled(scale), dh);
            }
        }
    }

    /// Stripifies `tile`, recording where its strip lies in the index buffer.
    pub(crate) fn mesh_refine_tile(&mut self, nodes: &SurfaceNodes, tile: &mut RenderTile) {
        self.strips.new_strip();
        let start = self.strips.len();
        if tile.tris.is_empty() {
            self.mesh_refine_quad(nodes, tile.center);
        } else {
            for &t in tile.tris.iter() {
                self.mesh_refine_triangle(nodes, t);
            }
        }
        tile.indices = start..self.strips.len();
        let (min_element, max_element) = self.strips.element_range();
        tile.min_element = min_element;
        tile.max_element = max_element;
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
