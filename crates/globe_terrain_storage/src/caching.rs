//! Residency caches with an explicit evicted state.

pub mod tile_cache;

pub use tile_cache::*;
