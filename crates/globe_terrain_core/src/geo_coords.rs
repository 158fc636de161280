//! The integer geographic coordinate system.
//!
//! Longitude maps `[-π, π)` linearly onto the full `i32` range, so wrapping integer arithmetic wraps around the date line.
//! Latitude goes through an isometric (Mercator-like) transform so that `[-π/2, π/2]` lands on a centered subset of the
//! `i32` range with the same resolution as longitude near the equator.

use crate::Ellipsoid;

use std::f64::consts::PI;

/// Converts between radians and the integer longitude/latitude used for every surface node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntCoordinates {
    lat_scale: f64,
    int_lat_scale: f64,
}

impl Default for IntCoordinates {
    fn default() -> Self {
        Self::new()
    }
}

impl IntCoordinates {
    pub fn new() -> Self {
        // Fixed point of d = 4 / (1 + e^(4(2 - d))).
        let mut d = 0.0f64;
        loop {
            let old_d = d;
            d = 4.0 / (1.0 + (4.0 * (2.0 - d)).exp());
            if (old_d - d).abs() < 1e-12 {
                break;
            }
        }

        Self {
            lat_scale: (2.0 - d) / PI,
            int_lat_scale: (2.0 - d) / (1 << 28) as f64,
        }
    }

    pub fn lat_scale(&self) -> f64 {
        self.lat_scale
    }

    pub fn int_lat_scale(&self) -> f64 {
        self.int_lat_scale
    }

    /// Longitude in radians from the integer easting.
    #[inline]
    pub fn int_to_lon(&self, int_lon: i32) -> f64 {
        int_lon as f64 * -PI / i32::MIN as f64
    }

    /// Integer easting from a longitude in radians.
    #[inline]
    pub fn lon_to_int(&self, lon: f64) -> i32 {
        (lon * i32::MIN as f64 / -PI) as i32
    }

    /// Latitude in radians from the integer northing.
    #[inline]
    pub fn int_to_lat(&self, int_lat: i32) -> f64 {
        let e = (int_lat as f64 * self.int_lat_scale).exp();

        (e - 1.0) / (e + 1.0) / self.lat_scale
    }

    /// Integer northing from a latitude in radians.
    #[inline]
    pub fn lat_to_int(&self, lat: f64) -> i32 {
        let lat = lat * self.lat_scale;

        (((1.0 + lat) / (1.0 - lat)).ln() / self.int_lat_scale) as i32
    }

    /// A cheap planar distance bound between two integer positions, measured in the stretched plane and corrected by the
    /// latitude stretch at the midpoint. Only used to bound the screen-space size of a triangle edge.
    pub fn dist_2d(
        &self,
        ellipsoid: &Ellipsoid,
        int_lon1: i32,
        int_lat1: i32,
        int_lon2: i32,
        int_lat2: i32,
    ) -> f64 {
        let dy = int_lat2.wrapping_sub(int_lat1) as f64;
        let dx = (int_lon2.wrapping_sub(int_lon1) / 8) as f64;
        let dist = ellipsoid.a() * (dx * dx + dy * dy).sqrt() * self.int_lat_scale
            / (8.0 * self.lat_scale);
        let c = (self.int_lat_scale * (int_lat1 as f64 + dy / 2.0) / 4.0).exp();
        let cosh = (c + 1.0 / c) / 2.0;

        dist / (cosh * cosh)
    }

    /// The factor that brings an east-west coordinate difference into the same scale as a north-south one.
    pub fn aspect(&self, ellipsoid: &Ellipsoid, lat: f64) -> f64 {
        let s = lat.sin();

        1.0 / ((1.0 - s * s * ellipsoid.e2()) * lat.cos())
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
