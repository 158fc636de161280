//! The published result of a pass: vertex arrays relative to the view origin, one index buffer holding every tile's strip,
//! and the tiles themselves.

use super::render_tile::RenderTile;
use super::traversal::FrameBuilder;

use globe_terrain_core::{Point2i, Point3d, Point3f, PointN};
use globe_terrain_storage::SurfaceNodes;

/// Normals accumulated from nearly cancelling faces are replaced by the radial direction.
const MIN_NORMAL_NORM_SQUARED: f32 = 0.01;

/// Per-vertex arrays. Positions are relative to the frame's origin. Texture coordinates are relative to the origin's texture
/// position and still in integer texture units, so they only need a tile's `TileTexture::apply` to become image coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geometry {
    pub positions: Vec<Point3f>,
    pub normals: Vec<Point3f>,
    pub tex_coords: Vec<[f32; 2]>,
    /// Texture coordinates shifted by half a turn in `s`, for the vertices of antipode tiles. Those vertices come first, so
    /// this is a prefix of the vertex arrays.
    pub antipode_tex_coords: Vec<[f32; 2]>,
}

impl Geometry {
    fn clear(&mut self) {
        self.positions.clear();
        self.normals.clear();
        self.tex_coords.clear();
        self.antipode_tex_coords.clear();
    }

    pub fn num_vertices(&self) -> usize {
        self.positions.len()
    }
}

/// Strip indices, 16 bits wide whenever the vertex count allows.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum IndexBuffer {
    U16(Vec<u16>),
    U32(Vec<u32>),
}

impl Default for IndexBuffer {
    fn default() -> Self {
        IndexBuffer::U16(Vec::new())
    }
}

impl IndexBuffer {
    fn fill(&mut self, indices: &[u32], num_vertices: usize) {
        if num_vertices <= 1 << 16 {
            let mut buffer = match std::mem::take(self) {
                IndexBuffer::U16(buffer) => buffer,
                IndexBuffer::U32(_) => Vec::with_capacity(indices.len()),
            };
            buffer.clear();
            buffer.extend(indices.iter().map(|&i| i as u16));
            *self = IndexBuffer::U16(buffer);
        } else {
            let mut buffer = match std::mem::take(self) {
                IndexBuffer::U32(buffer) => buffer,
                IndexBuffer::U16(_) => Vec::with_capacity(indices.len()),
            };
            buffer.clear();
            buffer.extend_from_slice(indices);
            *self = IndexBuffer::U32(buffer);
        }
    }

    pub fn len(&self) -> usize {
        match self {
            IndexBuffer::U16(b) => b.len(),
            IndexBuffer::U32(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            IndexBuffer::U16(b) => b.iter().map(|&i| i as u32).collect(),
            IndexBuffer::U32(b) => b.clone(),
        }
    }
}

/// Receives a frame for drawing. Implemented by the application's renderer.
pub trait RenderTarget {
    /// Called once per frame, before any tile.
    fn load_geometry(&mut self, geometry: &Geometry, indices: &IndexBuffer);

    /// Draws the strip `tile.indices()` of the index buffer with the tile's textures.
    fn draw_tile(&mut self, tile: &RenderTile, indices: &IndexBuffer);
}

#[derive(Clone, Debug, Default)]
pub struct RenderFrame {
    pub(crate) ts: i32,
    pub(crate) origin: Point3d,
    pub(crate) tex_origin: Point2i,
    pub(crate) geometry: Geometry,
    pub(crate) indices: IndexBuffer,
    pub(crate) normal_tiles: Vec<RenderTile>,
    pub(crate) antipode_tiles: Vec<RenderTile>,
}

impl RenderFrame {
    /// Timestamp of the pass that built this frame.
    pub fn ts(&self) -> i32 {
        self.ts
    }

    /// Earth-centered position, in meters, that vertex positions are relative to.
    pub fn origin(&self) -> Point3d {
        self.origin
    }

    pub fn tex_origin(&self) -> Point2i {
        self.tex_origin
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn indices(&self) -> &IndexBuffer {
        &self.indices
    }

    /// Antipode tiles first.
    pub fn tiles(&self) -> impl Iterator<Item = &RenderTile> {
        self.antipode_tiles.iter().chain(self.normal_tiles.iter())
    }

    pub fn num_tiles(&self) -> usize {
        self.antipode_tiles.len() + self.normal_tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometry.positions.is_empty()
    }

    pub fn draw(&self, target: &mut dyn RenderTarget) {
        target.load_geometry(&self.geometry, &self.indices);
        for tile in self.tiles() {
            target.draw_tile(tile, &self.indices);
        }
    }
}

impl FrameBuilder {
    /// Writes the vertices and strips of this pass into `frame`, and hands it the tiles.
    pub(crate) fn write_frame(&mut self, nodes: &SurfaceNodes, frame: &mut RenderFrame) {
        frame.ts = self.ts;
        frame.origin = self.origin;
        frame.tex_origin = self.tex_origin;

        let num_vertices = self.vertex_nodes.len();
        let geometry = &mut frame.geometry;
        geometry.clear();
        geometry.positions.reserve(num_vertices);
        geometry.normals.reserve(num_vertices);
        geometry.tex_coords.reserve(num_vertices);
        geometry.antipode_tex_coords.reserve(self.num_antipode_vertices);

        let [orig_s, orig_t] = self.tex_origin.0;
        let mut num_invalid = 0;
        for (k, &id) in self.vertex_nodes.iter().enumerate() {
            let node = nodes.node(id);
            let cartesian = if node.has_valid_cartesian() {
                node.cartesian
            } else {
                // Invalidated since this view refined, e.g. by a new elevation scale.
                num_invalid += 1;
                nodes.cartesian_of(id)
            };

            let p = cartesian.scaled(self.scale);
            geometry.positions.push(Point3f::from(p - self.origin));

            let n = if self.has_normal(id) {
                self.states.normal(id)
            } else {
                PointN([0.0; 3])
            };
            let n = if n.norm_squared() >= MIN_NORMAL_NORM_SQUARED {
                n.normalized()
            } else {
                Point3f::from(p.normalized())
            };
            geometry.normals.push(n);

            let s = node.tex_coords.x().wrapping_sub(orig_s);
            let t = node.tex_coords.y().wrapping_sub(orig_t);
            geometry.tex_coords.push([s as f32, t as f32]);
            if k < self.num_antipode_vertices {
                geometry.antipode_tex_coords.push([s.wrapping_sub(i32::MIN) as f32, t as f32]);
            }
        }
        if num_invalid > 0 {
            tracing::debug!("{} vertices had stale cartesian positions", num_invalid);
        }

        frame.indices.fill(&self.strips.indices, num_vertices);
        frame.normal_tiles.append(&mut self.normal_tiles);
        frame.antipode_tiles.append(&mut self.antipode_tiles);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
