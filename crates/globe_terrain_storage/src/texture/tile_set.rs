use super::{TextureCoosys, TextureCoverage, TextureError, TileExtent, TileId, TileImage};
use crate::sync::lock_or_recover;
use crate::{SmallKeyHashMap, TileCache};

use auto_impl::auto_impl;
use float_ord::FloatOrd;
use itertools::Itertools;
use slab::Slab;
use std::f64::consts::PI;
use std::sync::Mutex;

/// Fetches the image of one tile.
#[auto_impl(&, Box, Arc)]
pub trait TileLoader: Send + Sync {
    /// `Ok(None)` means the source has no imagery for the tile. The tile is then treated as outside the coverage area.
    fn load(&self, level: u8, extent: TileExtent) -> Result<Option<TileImage>, TextureError>;
}

/// Any `Fn(level, extent)` loads tiles.
pub struct FnLoader<F>(pub F);

impl<F> TileLoader for FnLoader<F>
where
    F: Fn(u8, TileExtent) -> Result<Option<TileImage>, TextureError> + Send + Sync,
{
    fn load(&self, level: u8, extent: TileExtent) -> Result<Option<TileImage>, TextureError> {
        (self.0)(level, extent)
    }
}

#[derive(Clone, Debug)]
pub struct TileSetConfig {
    pub coosys: TextureCoosys,
    /// Texels along one side of a tile.
    pub tile_pixels: u32,
    /// Level of the finest tiles. Base tiles are level 0.
    pub max_level: u8,
    /// Where the coverage has imagery, if not everywhere.
    pub area: Option<TileExtent>,
    /// Equatorial radius used to convert texture units to meters.
    pub radius: f64,
}

impl Default for TileSetConfig {
    fn default() -> Self {
        Self {
            coosys: TextureCoosys::Geographic,
            tile_pixels: 256,
            max_level: 18,
            area: None,
            radius: 6_378_137.0,
        }
    }
}

#[derive(Clone, Debug)]
struct Tile {
    extent: TileExtent,
    level: u8,
    parent: Option<TileId>,
    children: [Option<TileId>; 4],
    last_used: i32,
    no_data: bool,
}

#[derive(Default)]
struct TileSetState {
    tiles: Slab<Tile>,
    base_tiles: Vec<Option<TileId>>,
    images: TileCache<TileId, TileImage>,
    memory: usize,
    /// Requested loads and their best priority.
    requests: SmallKeyHashMap<TileId, f32>,
    renew: bool,
}

impl TileSetState {
    fn tile(&self, id: TileId) -> &Tile {
        &self.tiles[id.0 as usize]
    }

    fn is_resident(&self, id: TileId) -> bool {
        self.images.get(&id).and_then(|r| r.resident()).is_some()
    }
}

/// A `TextureCoverage` over a fixed set of base tiles, loading images through a `TileLoader`.
///
/// Loads are not done by `use_texture`. Whoever owns the tile set calls `load_requested` to fetch the most urgent requests,
/// usually from a loader thread.
pub struct TileSet<L> {
    config: TileSetConfig,
    loader: L,
    state: Mutex<TileSetState>,
}

impl<L> TileSet<L>
where
    L: TileLoader,
{
    /// `base_extents[i]` is the extent of the base tile over basemesh cell `i`. See `SurfaceNodes::base_tile_extents`.
    pub fn new(config: TileSetConfig, base_extents: &[TileExtent], loader: L) -> Self {
        assert!(config.tile_pixels > 0);

        let mut state = TileSetState::default();
        for extent in base_extents.iter() {
            let id = state.tiles.insert(Tile {
                extent: *extent,
                level: 0,
                parent: None,
                children: [None; 4],
                last_used: 0,
                no_data: false,
            });
            state.base_tiles.push(Some(TileId(id as u32)));
        }

        Self {
            config,
            loader,
            state: Mutex::new(state),
        }
    }

    pub fn config(&self) -> &TileSetConfig {
        &self.config
    }

    /// Asks for every image to be reloaded at the next cleanup.
    pub fn request_renew(&self) {
        lock_or_recover(&self.state).renew = true;
    }

    pub fn num_requests(&self) -> usize {
        lock_or_recover(&self.state).requests.len()
    }

    /// Loads up to `max` requested tiles, most urgent first. Returns the number of tiles that got an image.
    ///
    /// The loader runs without the lock held.
    pub fn load_requested(&self, max: usize) -> usize {
        let batch: Vec<(TileId, u8, TileExtent)> = {
            let mut state = lock_or_recover(&self.state);
            let ids: Vec<TileId> = state
                .requests
                .iter()
                .sorted_by_key(|(id, priority)| (FloatOrd(**priority), **id))
                .take(max)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .map(|id| {
                    state.requests.remove(&id);
                    let tile = state.tile(id);
                    (id, tile.level, tile.extent)
                })
                .collect()
        };

        let mut num_loaded = 0;
        for (id, level, extent) in batch {
            let result = self.loader.load(level, extent);
            let mut state = lock_or_recover(&self.state);
            match result {
                Ok(Some(image)) => {
                    state.memory += image.size_bytes();
                    if let Some(crate::Residency::Resident(old)) = state.images.insert(id, image) {
                        state.memory -= old.size_bytes();
                    }
                    num_loaded += 1;
                }
                Ok(None) => state.tiles[id.0 as usize].no_data = true,
                Err(e) => tracing::warn!("{}", e),
            }
        }

        num_loaded
    }
}

impl<L> TextureCoverage for TileSet<L>
where
    L: TileLoader,
{
    fn coosys(&self) -> TextureCoosys {
        self.config.coosys
    }

    fn base_tile(&self, cell: usize) -> Option<TileId> {
        lock_or_recover(&self.state).base_tiles.get(cell).copied().flatten()
    }

    fn parent(&self, tile: TileId) -> Option<TileId> {
        lock_or_recover(&self.state).tile(tile).parent
    }

    fn child(&self, tile: TileId, quadrant: usize, ts: i32) -> Option<TileId> {
        let mut state = lock_or_recover(&self.state);
        let parent = state.tile(tile).clone();
        let child = match parent.children[quadrant] {
            Some(child) => child,
            None => {
                let id = TileId(state.tiles.insert(Tile {
                    extent: parent.extent.quadrant(quadrant),
                    level: parent.level + 1,
                    parent: Some(tile),
                    children: [None; 4],
                    last_used: ts,
                    no_data: parent.no_data,
                }) as u32);
                state.tiles[tile.0 as usize].children[quadrant] = Some(id);
                id
            }
        };
        let c = &mut state.tiles[child.0 as usize];
        c.last_used = c.last_used.max(ts);

        Some(child)
    }

    fn extent(&self, tile: TileId) -> TileExtent {
        lock_or_recover(&self.state).tile(tile).extent
    }

    fn is_outside_area(&self, tile: TileId) -> bool {
        let state = lock_or_recover(&self.state);
        let tile = state.tile(tile);

        tile.no_data || self.config.area.map_or(false, |area| !area.intersects(&tile.extent))
    }

    fn is_outside_resolution(&self, tile: TileId) -> bool {
        lock_or_recover(&self.state).tile(tile).level > self.config.max_level
    }

    fn pixel_size(&self, tile: TileId) -> f64 {
        let ds = lock_or_recover(&self.state).tile(tile).extent.ds;

        ds as f64 * PI / (1u64 << 31) as f64 * self.config.radius / self.config.tile_pixels as f64
    }

    fn use_texture(&self, tile: TileId, ts: i32, priority: f32, load: bool) -> Option<TileImage> {
        let mut state = lock_or_recover(&self.state);
        let t = &mut state.tiles[tile.0 as usize];
        t.last_used = t.last_used.max(ts);
        if t.no_data {
            return None;
        }

        if state.images.touch(&tile) {
            return state.images.get(&tile).and_then(|r| r.resident()).cloned();
        }
        if load {
            let best = state.requests.entry(tile).or_insert(priority);
            *best = best.min(priority);
        }

        None
    }

    fn loaded_coverage(&self, tile: TileId) -> f32 {
        let state = lock_or_recover(&self.state);
        if state.is_resident(tile) {
            return 1.0;
        }
        let num_resident = state
            .tile(tile)
            .children
            .iter()
            .flatten()
            .filter(|&&c| state.is_resident(c))
            .count();

        num_resident as f32 / 4.0
    }

    fn gc(&self, cut_ts: i32) -> usize {
        let mut state = lock_or_recover(&self.state);
        let expired: Vec<TileId> = state
            .images
            .keys_lru_first()
            .copied()
            .filter(|id| state.tile(*id).last_used < cut_ts)
            .collect();
        for id in expired {
            if let Some(image) = state.images.evict(&id) {
                state.memory -= image.size_bytes();
            }
        }

        state.memory
    }

    fn memory_usage(&self) -> usize {
        lock_or_recover(&self.state).memory
    }

    fn renew_requested(&self) -> bool {
        lock_or_recover(&self.state).renew
    }

    fn reload(&self) {
        let mut state = lock_or_recover(&self.state);
        while state.images.evict_lru().is_some() {}
        state.memory = 0;
        state.renew = false;
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    pub fn solid_image(size: u32) -> TileImage {
        TileImage {
            width: size,
            height: size,
            pixels: vec![255; (size * size * 4) as usize].into(),
        }
    }

    fn quarter_globe() -> Vec<TileExtent> {
        vec![
            TileExtent {
                s: i32::MIN,
                t: -(1 << 30),
                ds: 1 << 30,
                dt: 1 << 30,
            },
            TileExtent {
                s: 1 << 30,
                t: -(1 << 30),
                ds: 1 << 30,
                dt: 1 << 30,
            },
        ]
    }

    fn tile_set(max_level: u8) -> TileSet<FnLoader<impl Fn(u8, TileExtent) -> Result<Option<TileImage>, TextureError>>> {
        let config = TileSetConfig {
            tile_pixels: 4,
            max_level,
            ..Default::default()
        };

        TileSet::new(
            config,
            &quarter_globe(),
            FnLoader(|_: u8, _: TileExtent| Ok(Some(solid_image(4)))),
        )
    }

    #[test]
    fn requested_tiles_load_by_priority() {
        let set = tile_set(4);
        let root = set.base_tile(0).unwrap();
        let near = set.child(root, 0, 6).unwrap();
        let far = set.child(root, 3, 6).unwrap();

        assert_eq!(set.use_texture(far, 6, 100.0, true), None);
        assert_eq!(set.use_texture(near, 6, 1.0, true), None);
        assert_eq!(set.num_requests(), 2);

        assert_eq!(set.load_requested(1), 1);
        assert!(set.use_texture(near, 6, 1.0, true).is_some());
        assert_eq!(set.use_texture(far, 6, 100.0, false), None);
        assert_eq!(set.memory_usage(), 64);
        assert_eq!(set.loaded_coverage(root), 0.25);
    }

    #[test]
    fn gc_evicts_old_images_but_keeps_tiles_linked() {
        let set = tile_set(4);
        let root = set.base_tile(1).unwrap();
        let old = set.child(root, 1, 6).unwrap();
        let new = set.child(root, 2, 6).unwrap();
        set.use_texture(old, 6, 0.0, true);
        set.use_texture(new, 6, 0.0, true);
        set.load_requested(10);

        set.use_texture(new, 18, 0.0, true);
        assert_eq!(set.gc(12), 64);
        assert_eq!(set.memory_usage(), 64);

        assert_eq!(set.use_texture(old, 24, 0.0, false), None);
        assert_eq!(set.child(root, 1, 24), Some(old));
        assert_eq!(set.parent(old), Some(root));
    }

    #[test]
    fn children_split_the_extent() {
        let set = tile_set(1);
        let root = set.base_tile(1).unwrap();
        let extent = set.extent(root);
        let child = set.child(root, 3, 6).unwrap();
        let grandchild = set.child(child, 0, 6).unwrap();

        assert_eq!(
            set.extent(child),
            TileExtent {
                s: extent.s + (1 << 29),
                t: extent.t + (1 << 29),
                ds: 1 << 29,
                dt: 1 << 29,
            }
        );
        assert!(!set.is_outside_resolution(child));
        assert!(set.is_outside_resolution(grandchild));
        assert!(set.pixel_size(child) < set.pixel_size(root));
        // The second base tile ends at the date line.
        assert_eq!(extent.s.wrapping_add(extent.ds as i32), i32::MIN);
    }

    #[test]
    fn tiles_without_data_are_outside_the_area() {
        let config = TileSetConfig {
            area: Some(TileExtent {
                s: i32::MIN,
                t: -(1 << 30),
                ds: 1 << 29,
                dt: 1 << 29,
            }),
            ..Default::default()
        };
        let loader = FnLoader(|level: u8, _: TileExtent| -> Result<Option<TileImage>, TextureError> {
            Ok(if level < 1 { Some(solid_image(2)) } else { None })
        });
        let set = TileSet::new(config, &quarter_globe(), loader);
        let inside = set.base_tile(0).unwrap();
        let outside = set.base_tile(1).unwrap();
        assert!(!set.is_outside_area(inside));
        assert!(set.is_outside_area(outside));

        let child = set.child(inside, 0, 6).unwrap();
        set.use_texture(child, 6, 0.0, true);
        assert_eq!(set.load_requested(5), 0);
        assert!(set.is_outside_area(child));
    }

    #[test]
    fn reload_evicts_everything() {
        let set = Arc::new(tile_set(2));
        let root = set.base_tile(0).unwrap();
        set.use_texture(root, 6, 0.0, true);
        set.load_requested(1);
        set.request_renew();
        assert!(set.renew_requested());

        set.reload();
        assert!(!set.renew_requested());
        assert_eq!(set.memory_usage(), 0);
        assert_eq!(set.use_texture(root, 12, 0.0, false), None);
    }
}
