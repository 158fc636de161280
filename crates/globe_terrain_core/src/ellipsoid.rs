use crate::{Point3d, PointN};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A reference ellipsoid of revolution, given by semi-major axis `a` (meters) and flattening `f`.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Ellipsoid {
    a: f64,
    f: f64,
}

impl Default for Ellipsoid {
    fn default() -> Self {
        Self::wgs84()
    }
}

impl Ellipsoid {
    pub fn new(a: f64, f: f64) -> Self {
        assert!(a > 0.0);
        assert!((0.0..1.0).contains(&f));

        Self { a, f }
    }

    /// Builds the ellipsoid from its semi-major and semi-minor axes.
    pub fn from_axes(a: f64, b: f64) -> Self {
        Self::new(a, (a - b) / a)
    }

    pub fn wgs84() -> Self {
        Self::new(6_378_137.0, 1.0 / 298.257_223_563)
    }

    #[inline]
    pub fn a(&self) -> f64 {
        self.a
    }

    #[inline]
    pub fn f(&self) -> f64 {
        self.f
    }

    #[inline]
    pub fn b(&self) -> f64 {
        self.a * (1.0 - self.f)
    }

    /// First eccentricity squared.
    #[inline]
    pub fn e2(&self) -> f64 {
        self.f * (2.0 - self.f)
    }

    /// Earth-centered, earth-fixed position of geodetic `(lat, lon, h)`, angles in radians.
    pub fn to_cartesian(&self, lat: f64, lon: f64, h: f64) -> Point3d {
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_lon, cos_lon) = lon.sin_cos();
        let n = self.a / (1.0 - self.e2() * sin_lat * sin_lat).sqrt();

        PointN([
            (n + h) * cos_lat * cos_lon,
            (n + h) * cos_lat * sin_lon,
            (n * (1.0 - self.e2()) + h) * sin_lat,
        ])
    }

    /// Geodetic `(lat, lon, h)` of an earth-centered position. Iterates on the latitude until it settles.
    pub fn from_cartesian(&self, p: Point3d) -> (f64, f64, f64) {
        let e2 = self.e2();
        let rho = (p.x() * p.x() + p.y() * p.y()).sqrt();
        let lon = p.y().atan2(p.x());

        if rho < 1e-9 {
            // On the polar axis.
            let lat = if p.z() >= 0.0 {
                std::f64::consts::FRAC_PI_2
            } else {
                -std::f64::consts::FRAC_PI_2
            };

            return (lat, lon, p.z().abs() - self.b());
        }

        let mut lat = p.z().atan2(rho * (1.0 - e2));
        let mut h = 0.0;
        for _ in 0..10 {
            let sin_lat = lat.sin();
            let n = self.a / (1.0 - e2 * sin_lat * sin_lat).sqrt();
            h = rho / lat.cos() - n;
            let next = p.z().atan2(rho * (1.0 - e2 * n / (n + h)));
            let done = (next - lat).abs() < 1e-12;
            lat = next;
            if done {
                break;
            }
        }

        (lat, lon, h)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
