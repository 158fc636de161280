use crate::TextureCoosys;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tuning knobs for a `BintreeSurface`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct SurfaceConfig {
    /// Node slots allocated up front. The arena grows by half whenever reclamation can't keep up.
    pub initial_capacity: usize,
    /// Meters per unit of the fixed-point cartesian coordinates.
    pub scale: f64,
    /// Every this many `update_data` calls, all live cartesians are recomputed instead of only the invalidated ones.
    pub recompute_interval: u32,
    /// Bytes of texture memory that texture reclamation aims for.
    pub texture_memory_budget: usize,
    /// The coordinate system of the per-node texture coordinates.
    pub texture_coosys: TextureCoosys,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1 << 18,
            scale: 0.01,
            recompute_interval: 30,
            texture_memory_budget: 64 << 20,
            texture_coosys: TextureCoosys::Geographic,
        }
    }
}

impl SurfaceConfig {
    pub fn new(initial_capacity: usize, scale: f64) -> Self {
        // Room for the basemesh and its first refinements.
        assert!(initial_capacity >= 64);
        assert!(scale > 0.0);

        Self {
            initial_capacity,
            scale,
            ..Default::default()
        }
    }
}
