use globe_terrain_core::{IntCoordinates, Point2i, PointN};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use std::f64::consts::{FRAC_PI_4, PI};

/// How node positions map to integer texture coordinates `(s, t)`.
///
/// `s` is always the integer longitude, so the texture seam is the date line.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum TextureCoosys {
    /// `t` is the surface's own integer latitude.
    Geographic,
    /// `t` is the spherical Mercator northing, in the same units as `s`. Clamped near the poles.
    Mercator,
}

impl TextureCoosys {
    pub fn tex_coords(&self, coords: &IntCoordinates, lon: i32, lat: i32) -> Point2i {
        match self {
            Self::Geographic => PointN([lon, lat]),
            Self::Mercator => {
                let phi = coords.int_to_lat(lat);
                let y = (FRAC_PI_4 + phi / 2.0).tan().ln();
                let t = (y * i32::MIN as f64 / -PI).max(i32::MIN as f64).min(i32::MAX as f64);

                PointN([lon, t as i32])
            }
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
    use super::*;

    #[test]
    fn mercator_is_monotonic_in_latitude() {
        let coords = IntCoordinates::new();
        let mut last = i32::MIN;
        for j in -64..=64 {
            let lat = j * (1 << 24);
            let t = TextureCoosys::Mercator.tex_coords(&coords, 12345, lat);
            assert_eq!(t.x(), 12345);
            assert!(t.y() >= last);
            last = t.y();
        }
        assert_eq!(TextureCoosys::Mercator.tex_coords(&coords, 0, 0), PointN([0, 0]));
    }

    #[test]
    fn geographic_passes_through() {
        let coords = IntCoordinates::new();
        assert_eq!(
            TextureCoosys::Geographic.tex_coords(&coords, -7, 1 << 29),
            PointN([-7, 1 << 29])
        );
    }
}
