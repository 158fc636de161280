#![allow(
    clippy::type_complexity,
    clippy::needless_collect,
    clippy::too_many_arguments
)]

//! Out-of-core storage for a view-dependent globe terrain.
//!
//! The core types are:
//!   - `BintreeSurface`: the shared arena of bintree nodes, a bounded pool of triangle vertices that grows on demand and is
//!     reclaimed by timestamp
//!   - `ElevationSource`: background workers that fetch node elevations from a local cache and a remote server
//!   - `RecordArray`: the flat, sortable queue type used by the elevation pipeline
//!
//! Texture coverages plug in through the `TextureCoverage` trait. `TileSet` is a quadtree implementation that keeps tile images
//! resident in a `TileCache`.
//!
//! With the `sled-cache` feature, `ElevationDb` persists elevations in a `sled` tree keyed by Morton code.

pub mod caching;
pub mod elevation;
pub mod record_array;
pub mod surface;
pub mod sync;
pub mod texture;

#[cfg(feature = "sled-cache")]
pub mod database;

pub use caching::*;
pub use elevation::*;
pub use record_array::*;
pub use surface::*;
pub use texture::*;

#[cfg(feature = "sled-cache")]
pub use database::*;

// Hash types to use for small keys like node ids and tile ids.
pub type SmallKeyHashMap<K, V> = ahash::AHashMap<K, V>;
pub type SmallKeyHashSet<K> = ahash::AHashSet<K>;

pub mod prelude {
    pub use super::{
        BintreeSurface, Direction, ElevationCache, ElevationQueries, ElevationSink, ElevationSource,
        ElevationSourceConfig, MemoryElevationCache, ModelQuery, NodeId, NodeQuery, RecordArray, StaticElevation,
        SurfaceConfig, SurfaceNodes, TextureCoosys, TextureCoverage, TileCache, TileSet, TriangleId, ViewClock,
    };

    #[cfg(feature = "sled-cache")]
    pub use super::ElevationDb;
}
