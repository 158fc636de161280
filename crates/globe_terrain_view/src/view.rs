//! A camera's view of a shared surface.
//!
//! Each `SurfaceView` owns a worker thread that runs update passes over the surface and publishes the result as a
//! `RenderFrame`. The render thread hands the view new frustums, swaps in published frames, and draws them.
//!
//! # Origin handshake
//!
//! Vertex positions are relative to an origin near the camera, so they stay precise as `f32`. Moving the origin takes both
//! threads:
//!
//! 1. The render thread calls `request_update_origin` with the new origin. The status becomes `Initiated`.
//! 2. The worker picks it up on its next pass (`Processing`), and once the pass is published the status is `Ready`.
//!    `request_update_origin` now returns `true`.
//! 3. The render thread moves its own world to the new origin and calls `update_origin`. The status is `Complete` and `swap`
//!    delivers frames again.
//!
//! While the origin is changing, `swap` keeps the frame that is on screen, so the render thread never draws a frame built
//! for an origin it hasn't switched to yet.

mod geometry;
mod render_tile;
mod strips;
mod traversal;

pub use geometry::{Geometry, IndexBuffer, RenderFrame, RenderTarget};
pub use render_tile::{RenderTile, TileTexture};

use crate::frustum::CullFrustum;
use traversal::FrameBuilder;

use globe_terrain_core::{Point3d, PointN};
use globe_terrain_storage::{sync::lock_or_recover, BintreeSurface, ViewClock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct ViewConfig {
    /// Expected number of vertices per frame. Per-node state and vertex arrays start at this size.
    pub base_size: usize,
    /// Triangles this many levels below the basemesh are never refined.
    pub max_depth: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            base_size: 1 << 16,
            max_depth: 64,
        }
    }
}

impl ViewConfig {
    pub fn new(base_size: usize, max_depth: usize) -> Self {
        assert!(base_size > 0);
        assert!(max_depth > 0);

        Self { base_size, max_depth }
    }
}

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("failed to spawn the view worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Progress of an origin change. See the module docs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OriginStatus {
    Complete,
    Initiated,
    Processing,
    Ready,
}

struct ViewState {
    frustum: Option<Arc<dyn CullFrustum>>,
    has_new_frustum: bool,
    has_new_render_data: bool,
    force_update: bool,
    origin: OriginStatus,
    new_origin: Point3d,
    /// Published by the worker, not yet swapped in.
    back: Option<RenderFrame>,
    /// A retired frame for the worker to write into.
    spare: Option<RenderFrame>,
}

impl ViewState {
    fn worker_should_wait(&self) -> bool {
        let frustum = match &self.frustum {
            Some(frustum) => frustum,
            None => return true,
        };
        if frustum.resolution() <= 0.0 {
            return true;
        }

        matches!(self.origin, OriginStatus::Complete | OriginStatus::Ready)
            && (self.has_new_render_data || !(self.has_new_frustum || self.force_update))
    }
}

struct Shared {
    surface: Arc<BintreeSurface>,
    state: Mutex<ViewState>,
    wakeup: Condvar,
    stop: AtomicBool,
}

impl Shared {
    fn wait<'a>(&self, state: MutexGuard<'a, ViewState>) -> MutexGuard<'a, ViewState> {
        self.wakeup.wait(state).unwrap_or_else(PoisonError::into_inner)
    }

    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// A camera's view of a `BintreeSurface`, updated by a worker thread.
///
/// Dropping the view stops and joins the worker.
pub struct SurfaceView {
    shared: Arc<Shared>,
    clock: Arc<ViewClock>,
    front: Mutex<Arc<RenderFrame>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl SurfaceView {
    /// Registers a new view with `surface` and starts its worker. Nothing is traversed until the first `initiate_update`.
    pub fn new(surface: Arc<BintreeSurface>, config: ViewConfig) -> Result<Self, ViewError> {
        let clock = Arc::new(ViewClock::new());
        surface.register_view(&clock);
        let builder = FrameBuilder::new(config, Arc::clone(&clock));

        let shared = Arc::new(Shared {
            surface,
            state: Mutex::new(ViewState {
                frustum: None,
                has_new_frustum: false,
                has_new_render_data: false,
                force_update: false,
                origin: OriginStatus::Initiated,
                new_origin: PointN([0.0; 3]),
                back: None,
                spare: None,
            }),
            wakeup: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("surface-view".into())
                .spawn(move || run_worker(&shared, builder))?
        };

        Ok(Self {
            shared,
            clock,
            front: Mutex::new(Arc::new(RenderFrame::default())),
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn surface(&self) -> &Arc<BintreeSurface> {
        &self.shared.surface
    }

    /// The timestamps this view holds on to.
    pub fn clock(&self) -> &Arc<ViewClock> {
        &self.clock
    }

    /// Hands the worker the camera for its next pass.
    pub fn initiate_update(&self, frustum: Arc<dyn CullFrustum>) {
        let mut state = lock_or_recover(&self.shared.state);
        state.frustum = Some(frustum);
        state.has_new_frustum = true;
        self.shared.wakeup.notify_all();
    }

    /// Makes the next `swap` wait for a pass that starts after this call.
    pub fn force_update(&self) {
        let mut state = lock_or_recover(&self.shared.state);
        state.force_update = true;
        self.shared.wakeup.notify_all();
    }

    /// Asks the worker to move the origin to `origin`. Returns `true` once frames for it are ready, or if the view is
    /// closed. The render thread should then switch to the new origin and call `update_origin`.
    pub fn request_update_origin(&self, origin: Point3d) -> bool {
        let mut state = lock_or_recover(&self.shared.state);
        if origin != state.new_origin {
            state.new_origin = origin;
            state.origin = OriginStatus::Initiated;
            self.shared.wakeup.notify_all();
        }

        self.shared.is_stopped() || state.origin == OriginStatus::Ready
    }

    /// Confirms the render thread has switched to the requested origin.
    pub fn update_origin(&self) {
        let mut state = lock_or_recover(&self.shared.state);
        if state.origin != OriginStatus::Ready {
            tracing::warn!("Origin update confirmed in state {:?}", state.origin);
        }
        state.origin = OriginStatus::Complete;
        self.shared.wakeup.notify_all();
    }

    pub fn origin_status(&self) -> OriginStatus {
        lock_or_recover(&self.shared.state).origin
    }

    /// Swaps in the latest published frame. Returns whether the frame on screen changed.
    ///
    /// After `force_update`, blocks until the worker has published a frame.
    pub fn swap(&self) -> bool {
        let mut state = lock_or_recover(&self.shared.state);
        while state.force_update && !state.has_new_render_data && !self.shared.is_stopped() {
            state = self.shared.wait(state);
        }
        if !state.has_new_render_data || state.origin != OriginStatus::Complete {
            return false;
        }
        let frame = match state.back.take() {
            Some(frame) => frame,
            None => return false,
        };

        state.has_new_render_data = false;
        self.clock.set_render_ts(frame.ts());
        let retired = std::mem::replace(&mut *lock_or_recover(&self.front), Arc::new(frame));
        // Still drawn elsewhere if shared.
        if let Ok(retired) = Arc::try_unwrap(retired) {
            state.spare = Some(retired);
        }
        self.shared.wakeup.notify_all();

        true
    }

    /// The frame on screen.
    pub fn render_frame(&self) -> Arc<RenderFrame> {
        Arc::clone(&lock_or_recover(&self.front))
    }

    /// Draws the frame on screen into `target`.
    pub fn render(&self, target: &mut dyn RenderTarget) {
        self.render_frame().draw(target);
    }

    /// Stops the worker, aborting a pass in progress, and waits for it to exit.
    pub fn close(&self) {
        {
            let _state = lock_or_recover(&self.shared.state);
            self.shared.stop.store(true, Ordering::Release);
            self.shared.wakeup.notify_all();
        }
        if let Some(worker) = lock_or_recover(&self.worker).take() {
            if worker.join().is_err() {
                tracing::error!("Surface view worker panicked");
            }
        }
    }
}

impl Drop for SurfaceView {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(shared: &Shared, mut builder: FrameBuilder) {
    loop {
        let (frustum, new_origin, mut frame) = {
            let mut state = lock_or_recover(&shared.state);
            while !shared.is_stopped() && state.worker_should_wait() {
                state = shared.wait(state);
            }
            if shared.is_stopped() {
                return;
            }

            let new_origin = if state.origin == OriginStatus::Initiated {
                state.origin = OriginStatus::Processing;
                Some(state.new_origin)
            } else {
                None
            };
            state.has_new_frustum = false;
            let frustum = match &state.frustum {
                Some(frustum) => Arc::clone(frustum),
                None => continue,
            };

            (frustum, new_origin, state.spare.take().unwrap_or_default())
        };

        let refined = {
            let mut nodes = shared.surface.write();
            if let Some(origin) = new_origin {
                builder.set_origin(&nodes, origin);
            }
            builder.refine(&mut nodes, &*frustum, &shared.stop)
        };
        let completed = refined && builder.build_frame(&shared.surface.read(), &*frustum, &shared.stop, &mut frame);
        if !completed {
            return;
        }

        let mut state = lock_or_recover(&shared.state);
        if state.origin == OriginStatus::Processing {
            state.origin = OriginStatus::Ready;
        }
        if let Some(unused) = state.back.replace(frame) {
            state.spare = Some(unused);
        }
        state.has_new_render_data = true;
        state.force_update = false;
        shared.wakeup.notify_all();
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;
    use crate::frustum::{PerspectiveFrustum, Projection};

    use globe_terrain_storage::{
        FnLoader, StaticElevation, SurfaceConfig, SurfaceNodes, TextureError, TileExtent, TileImage, TileSet,
        TileSetConfig,
    };

    /// A surface at elevation 0 everywhere.
    pub fn flat_surface() -> Arc<BintreeSurface> {
        Arc::new(BintreeSurface::new(
            SurfaceConfig::new(1 << 14, 0.01),
            Arc::new(StaticElevation::new(None, |_, _| Some((0, 0)))),
        ))
    }

    /// A frame builder registered with `nodes`, with its origin on the equator at longitude 0.
    pub fn builder_for(nodes: &mut SurfaceNodes) -> FrameBuilder {
        let clock = Arc::new(ViewClock::new());
        nodes.register_view(&clock);
        let mut builder = FrameBuilder::new(ViewConfig::default(), clock);
        let a = nodes.ellipsoid().a();
        builder.set_origin(nodes, PointN([a, 0.0, 0.0]));

        builder
    }

    /// A coarse camera on the x axis at `radii` equatorial radii from the center, looking at the center.
    pub fn orbit_frustum(nodes: &SurfaceNodes, radii: f64) -> PerspectiveFrustum {
        let a = nodes.ellipsoid().a();

        PerspectiveFrustum::look_at(
            PointN([radii * a, 0.0, 0.0]),
            PointN([0.0, 0.0, 0.0]),
            PointN([0.0, 0.0, 1.0]),
            Projection {
                aspect: 1.0,
                far: 1.0e9,
                viewport_height: 64,
                ..Default::default()
            },
        )
    }

    pub type SolidLoader = FnLoader<fn(u8, TileExtent) -> Result<Option<TileImage>, TextureError>>;

    fn solid_tile(_level: u8, _extent: TileExtent) -> Result<Option<TileImage>, TextureError> {
        Ok(Some(TileImage {
            width: 4,
            height: 4,
            pixels: vec![255; 64].into(),
        }))
    }

    /// A coverage over the whole globe whose tiles all load.
    pub fn solid_tile_set(nodes: &SurfaceNodes) -> Arc<TileSet<SolidLoader>> {
        let loader: SolidLoader = FnLoader(solid_tile);

        Arc::new(TileSet::new(TileSetConfig::default(), &nodes.base_tile_extents(), loader))
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
    use super::test_util::{flat_surface, orbit_frustum};
    use super::*;

    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn wait_for_origin(view: &SurfaceView, origin: Point3d) {
        for _ in 0..10_000 {
            if view.request_update_origin(origin) {
                return;
            }
            thread::sleep(Duration::from_millis(1));
        }
        panic!("origin never became ready");
    }

    #[test]
    fn frames_follow_the_origin_handshake() {
        let surface = flat_surface();
        let frustum = Arc::new(orbit_frustum(&surface.read(), 2.0));
        let a = surface.read().ellipsoid().a();
        let view = SurfaceView::new(Arc::clone(&surface), ViewConfig::default()).unwrap();
        assert_eq!(view.origin_status(), OriginStatus::Initiated);
        assert!(view.render_frame().is_empty());

        view.force_update();
        view.initiate_update(frustum.clone());
        // The first pass is published, but it was built during the initial origin change.
        assert!(!view.swap());

        let origin = PointN([a, 0.0, 0.0]);
        wait_for_origin(&view, origin);
        assert_eq!(view.origin_status(), OriginStatus::Ready);
        view.update_origin();
        assert_eq!(view.origin_status(), OriginStatus::Complete);

        assert!(view.swap());
        let frame = view.render_frame();
        assert_eq!(frame.origin(), origin);
        assert!(!frame.is_empty());
        assert!(frame.ts() > 0);
        assert_eq!(view.clock().render_ts(), frame.ts());

        // Nothing new to show until the camera moves.
        assert!(!view.swap());
        view.force_update();
        view.initiate_update(frustum);
        assert!(view.swap());
        assert!(view.render_frame().ts() > frame.ts());

        view.close();
        assert!(view.request_update_origin(PointN([0.0, a, 0.0])));
    }

    #[test]
    fn worker_idles_without_a_usable_frustum() {
        let surface = flat_surface();
        let view = SurfaceView::new(Arc::clone(&surface), ViewConfig::default()).unwrap();
        let frustum = crate::frustum::PerspectiveFrustum::look_at(
            PointN([1.0e7, 0.0, 0.0]),
            PointN([0.0, 0.0, 0.0]),
            PointN([0.0, 0.0, 1.0]),
            crate::frustum::Projection {
                viewport_height: 0,
                ..Default::default()
            },
        );
        view.initiate_update(Arc::new(frustum));
        thread::sleep(Duration::from_millis(20));

        assert_eq!(view.origin_status(), OriginStatus::Initiated);
        assert_eq!(view.clock().ts(), 0);
        drop(view);
    }
}
