//! Out-of-core, view-dependent terrain meshes over a planetary ellipsoid.
//!
//! This library is organized into several crates:
//! - **core**: Morton codes, points, the integer geographic coordinate system and the ellipsoid
//! - **storage**: the bintree surface store, the elevation source pipeline, and texture tile residency
//! - **view**: per-camera traversal producing triangle strips for a render thread
//!
//! A typical setup opens an `ElevationSource`, builds a `BintreeSurface` on top of it, then creates one `SurfaceView` per
//! camera. Each frame the application hands the view a `CullFrustum` and draws whatever `RenderFrame` the view publishes.

pub use globe_terrain_core as core;
pub use globe_terrain_storage as storage;

#[cfg(feature = "view")]
pub use globe_terrain_view as view;

pub mod prelude {
    pub use super::core::prelude::*;
    pub use super::storage::prelude::*;

    #[cfg(feature = "view")]
    pub use super::view::prelude::*;
}
