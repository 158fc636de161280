//! Texture coverages draped over the surface.
//!
//! A `TextureCoverage` is a quadtree of image tiles over texture space, one root tile per basemesh cell. Views walk it in
//! lockstep with the terrain, asking for the finest resident tile that is fine enough. Tiles that are not resident are
//! requested with a priority, and the view falls back to a coarser ancestor in the meantime.
//!
//! Coverages share the surface's timestamps: every use stamps the tile, and `cleanup_data` evicts images older than the
//! texture cut, which it raises until the coverages fit the memory budget.
//!
//! `TileSet` is the provided coverage. It keeps images in a `TileCache` and loads them through a `TileLoader`.

pub mod coosys;
pub mod tile_set;

pub use coosys::*;
pub use tile_set::*;

use std::sync::Arc;
use thiserror::Error;

/// Handle of a tile within one coverage.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TileId(pub u32);

/// The area of a tile in integer texture coordinates. `s + ds` may wrap around the texture seam.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TileExtent {
    pub s: i32,
    pub t: i32,
    pub ds: u32,
    pub dt: u32,
}

impl TileExtent {
    /// The extent of quadrant `q` of this tile. Bit 0 selects the upper half in `s`, bit 1 the upper half in `t`.
    pub fn quadrant(&self, q: usize) -> Self {
        let (ds, dt) = (self.ds / 2, self.dt / 2);

        Self {
            s: self.s.wrapping_add(if q & 1 != 0 { ds as i32 } else { 0 }),
            t: self.t.wrapping_add(if q & 2 != 0 { dt as i32 } else { 0 }),
            ds,
            dt,
        }
    }

    /// Whether the extents overlap, taking the wrap in `s` into account.
    pub fn intersects(&self, other: &Self) -> bool {
        let overlaps = |a: i32, da: u32, b: i32, db: u32| {
            (b.wrapping_sub(a) as u32) < da || (a.wrapping_sub(b) as u32) < db
        };

        overlaps(self.s, self.ds, other.s, other.ds) && overlaps(self.t, self.dt, other.t, other.dt)
    }
}

/// A decoded tile image.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TileImage {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8.
    pub pixels: Arc<[u8]>,
}

impl TileImage {
    #[inline]
    pub fn size_bytes(&self) -> usize {
        self.pixels.len()
    }
}

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("failed to load tile {level}/{s}/{t}: {reason}")]
    Load { level: u8, s: i32, t: i32, reason: String },
}

/// A quadtree of texture tiles.
///
/// All methods take `&self`; implementations synchronize internally, since views and the surface's cleanup use a coverage
/// from different threads.
pub trait TextureCoverage: Send + Sync {
    /// The texture coordinate system tiles are laid out in. Must match the surface's.
    fn coosys(&self) -> TextureCoosys;

    /// The root tile over basemesh cell `cell`.
    fn base_tile(&self, cell: usize) -> Option<TileId>;

    fn parent(&self, tile: TileId) -> Option<TileId>;

    /// Child `quadrant` of `tile`, created if needed and stamped with `ts`.
    fn child(&self, tile: TileId, quadrant: usize, ts: i32) -> Option<TileId>;

    fn extent(&self, tile: TileId) -> TileExtent;

    /// The coverage has no imagery for this tile.
    fn is_outside_area(&self, tile: TileId) -> bool;

    /// The tile is finer than the coverage's finest level.
    fn is_outside_resolution(&self, tile: TileId) -> bool;

    /// Size of one texel in meters.
    fn pixel_size(&self, tile: TileId) -> f64;

    /// Stamps `tile` with `ts` and returns its image if resident. With `load`, a missing image is requested. Lower
    /// `priority` values load first.
    fn use_texture(&self, tile: TileId, ts: i32, priority: f32, load: bool) -> Option<TileImage>;

    /// Fraction of the tile's area covered by resident imagery at its own or the next finer level.
    fn loaded_coverage(&self, tile: TileId) -> f32;

    /// Evicts images last used before `cut_ts`. Returns the bytes still resident.
    fn gc(&self, cut_ts: i32) -> usize;

    /// Bytes of resident images.
    fn memory_usage(&self) -> usize;

    /// Whether the coverage wants all its images reloaded, for example after its source changed.
    fn renew_requested(&self) -> bool;

    /// Evicts every image so it is loaded again on next use, and clears the renew request.
    fn reload(&self);
}
