#![allow(clippy::too_many_arguments)]

//! Per-camera views of a globe terrain surface.
//!
//! A `SurfaceView` refines a shared `BintreeSurface` for one camera on a worker thread. Every pass classifies the bintree
//! against a `CullFrustum`, groups the refined mesh into `RenderTile`s with their texture tiles, and stripifies them into a
//! `RenderFrame`. The render thread swaps in the latest frame and draws it through a `RenderTarget`.

pub mod frustum;
pub mod view;

pub use frustum::{CullFrustum, Intersection, PerspectiveFrustum, Projection};
pub use view::{
    Geometry, IndexBuffer, OriginStatus, RenderFrame, RenderTarget, RenderTile, SurfaceView, TileTexture, ViewConfig,
    ViewError,
};

pub mod prelude {
    pub use super::{
        CullFrustum, Geometry, IndexBuffer, OriginStatus, PerspectiveFrustum, Projection, RenderFrame, RenderTarget,
        RenderTile, SurfaceView, ViewConfig,
    };
}
