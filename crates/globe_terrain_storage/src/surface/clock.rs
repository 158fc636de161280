//! View watermarks and reclamation.

use super::node::TS_INC;
use super::SurfaceNodes;

use std::sync::atomic::{AtomicI32, Ordering};

/// Arena fill above which `cleanup_data` sweeps old nodes.
const SWEEP_FILL: f64 = 0.95;
/// Fill the sweep aims for.
const SWEEP_TARGET: f64 = 0.94;

/// The timestamps one view is still using.
///
/// `ts` is the frame the view's traversal last ran at, so nodes stamped since must survive. `render_ts` is the frame whose
/// geometry is currently on screen, which holds on to texture tiles.
#[derive(Debug, Default)]
pub struct ViewClock {
    ts: AtomicI32,
    render_ts: AtomicI32,
}

impl ViewClock {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn ts(&self) -> i32 {
        self.ts.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_ts(&self, ts: i32) {
        self.ts.store(ts, Ordering::Release);
    }

    #[inline]
    pub fn render_ts(&self) -> i32 {
        self.render_ts.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_render_ts(&self, ts: i32) {
        self.render_ts.store(ts, Ordering::Release);
    }
}

/// Notified after every traversal pass that may have changed the surface.
pub trait SurfaceListener: Send + Sync {
    fn surface_updated(&self, ts: i32);
}

impl SurfaceNodes {
    /// Lowers the watermarks to what the views still use and reclaims nodes and texture images below them.
    ///
    /// Nodes are only swept once the arena is nearly full. The terrain cut is raised in steps until enough nodes are free.
    /// Texture images are evicted while the coverages exceed the memory budget, raising the texture cut a tenth of the
    /// remaining distance at a time. If the set still in use is over budget, the texture resolution factor is raised so
    /// views pick coarser tiles.
    pub fn cleanup_data(&mut self) {
        let _span = tracing::debug_span!("cleanup_data", ts = self.ts).entered();

        let ts = self.ts;
        self.views.retain(|clock| clock.strong_count() > 0);
        let clocks: Vec<_> = self.views.iter().filter_map(|clock| clock.upgrade()).collect();

        self.uppercut = clocks.iter().map(|c| c.ts()).fold(ts, i32::min);
        let size = self.nodes.len() as f64;
        if self.fill() as f64 > SWEEP_FILL * size {
            let target = (SWEEP_TARGET * size) as usize;
            self.gc(target);
            while self.terrain_cut < self.uppercut && self.fill() > target {
                self.terrain_cut += 10 + (self.uppercut - self.terrain_cut) / 2;
                self.terrain_cut = self.terrain_cut.min(self.uppercut);
                self.gc(target);
            }
            tracing::debug!(
                "Node sweep: fill {} of {}, terrain cut {}",
                self.fill(),
                self.nodes.len(),
                self.terrain_cut
            );
        }

        if self.coverages.is_empty() {
            return;
        }
        let uppercut = clocks.iter().map(|c| c.render_ts()).fold(ts, i32::min);
        let budget = self.config.texture_memory_budget;
        let renew = self.coverages.iter().any(|c| c.renew_requested());
        let memory_usage = |nodes: &Self| nodes.coverages.iter().map(|c| c.memory_usage()).sum::<usize>();

        let mut visible = None;
        while self.texture_cut < uppercut && (renew || memory_usage(self) > budget) {
            self.texture_cut += TS_INC + (uppercut - self.texture_cut) / 10;
            self.texture_cut = self.texture_cut.min(uppercut);
            let cut = self.texture_cut;
            visible = Some(
                self.coverages
                    .iter()
                    .map(|c| c.gc(if c.renew_requested() { uppercut } else { cut } - TS_INC))
                    .sum::<usize>(),
            );
        }
        if renew {
            for coverage in self.coverages.iter().filter(|c| c.renew_requested()) {
                coverage.reload();
            }
        }

        match visible {
            Some(visible) if visible > budget => {
                self.texture_res_factor *= 1.01;
                tracing::debug!("Visible textures over budget, resolution factor {}", self.texture_res_factor);
            }
            _ if self.texture_res_factor > 1.0 => {
                self.texture_res_factor /= 1.01;
                if self.texture_res_factor <= 1.01 {
                    self.texture_res_factor = 1.0;
                }
            }
            _ => (),
        }
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
    use super::*;
    use crate::texture::tile_set::test::solid_image;
    use crate::{FnLoader, TextureCoverage, TextureError, TileExtent, TileImage, TileSet, TileSetConfig};

    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct CountingListener {
        calls: Mutex<Vec<i32>>,
    }

    impl SurfaceListener for CountingListener {
        fn surface_updated(&self, ts: i32) {
            self.calls.lock().unwrap().push(ts);
        }
    }

    #[test]
    fn dropped_listeners_are_forgotten() {
        let mut nodes = flat_surface(1024);
        let kept = Arc::new(CountingListener::default());
        let dropped = Arc::new(CountingListener::default());
        let kept_dyn: Arc<dyn SurfaceListener> = kept.clone();
        let dropped_dyn: Arc<dyn SurfaceListener> = dropped.clone();
        nodes.add_listener(&kept_dyn);
        nodes.add_listener(&dropped_dyn);

        nodes.notify_listeners();
        drop(dropped_dyn);
        drop(dropped);
        let ts = nodes.new_ts();
        nodes.notify_listeners();

        assert_eq!(*kept.calls.lock().unwrap(), vec![TS_INC, ts]);
        assert_eq!(nodes.listeners.len(), 1);
    }

    #[test]
    fn watermark_follows_the_slowest_view() {
        let mut nodes = flat_surface(1024);
        for _ in 0..10 {
            nodes.new_ts();
        }
        nodes.cleanup_data();
        assert_eq!(nodes.uppercut, nodes.ts());

        let clock = Arc::new(ViewClock::new());
        clock.set_ts(3 * TS_INC);
        nodes.register_view(&clock);
        nodes.cleanup_data();
        assert_eq!(nodes.uppercut, 3 * TS_INC);

        drop(clock);
        nodes.cleanup_data();
        assert_eq!(nodes.uppercut, nodes.ts());
        assert!(nodes.views.is_empty());
    }

    fn coverage(nodes: &crate::SurfaceNodes, loads: Arc<AtomicUsize>) -> Arc<TileSet<FnLoader<impl Fn(u8, TileExtent) -> Result<Option<TileImage>, TextureError>>>> {
        let extents = nodes.base_tile_extents();
        let loader = FnLoader(move |_: u8, _: TileExtent| {
            loads.fetch_add(1, Ordering::Relaxed);
            Ok(Some(solid_image(64)))
        });

        Arc::new(TileSet::new(TileSetConfig::default(), &extents, loader))
    }

    #[test]
    fn textures_over_budget_are_evicted_and_raise_the_resolution_factor() {
        let mut nodes = flat_surface(1024);
        nodes.config.texture_memory_budget = 64 * 64 * 4 * 3;
        let loads = Arc::new(AtomicUsize::new(0));
        let tiles = coverage(&nodes, loads);
        let tiles_dyn: Arc<dyn TextureCoverage> = tiles.clone();
        nodes.add_texture(tiles_dyn);

        // Old tiles, then newer tiles that alone exceed the budget.
        let old_ts = nodes.new_ts();
        for cell in 0..4 {
            tiles.use_texture(tiles.base_tile(cell).unwrap(), old_ts, 0.0, true);
        }
        tiles.load_requested(4);
        for _ in 0..5 {
            nodes.new_ts();
        }
        let new_ts = nodes.ts();
        for cell in 4..8 {
            tiles.use_texture(tiles.base_tile(cell).unwrap(), new_ts, 0.0, true);
        }
        tiles.load_requested(4);
        assert_eq!(tiles.memory_usage(), 8 * 64 * 64 * 4);

        nodes.new_ts();
        nodes.cleanup_data();

        assert_eq!(tiles.memory_usage(), 4 * 64 * 64 * 4);
        assert!(nodes.texture_res_factor() > 1.0);
        for cell in 4..8 {
            assert!(tiles.use_texture(tiles.base_tile(cell).unwrap(), nodes.ts(), 0.0, false).is_some());
        }
    }

    #[test]
    fn renew_reloads_every_image() {
        let mut nodes = flat_surface(1024);
        let loads = Arc::new(AtomicUsize::new(0));
        let tiles = coverage(&nodes, Arc::clone(&loads));
        let tiles_dyn: Arc<dyn TextureCoverage> = tiles.clone();
        nodes.add_texture(tiles_dyn);

        let ts = nodes.new_ts();
        let root = tiles.base_tile(0).unwrap();
        tiles.use_texture(root, ts, 0.0, true);
        tiles.load_requested(1);
        assert_eq!(loads.load(Ordering::Relaxed), 1);

        tiles.request_renew();
        nodes.new_ts();
        nodes.cleanup_data();
        assert!(!tiles.renew_requested());
        assert_eq!(tiles.memory_usage(), 0);

        tiles.use_texture(root, nodes.ts(), 0.0, true);
        tiles.load_requested(1);
        assert_eq!(loads.load(Ordering::Relaxed), 2);
        assert_eq!(nodes.texture_res_factor(), 1.0);
    }
}
