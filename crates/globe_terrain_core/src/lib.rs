//! The core data types shared by the terrain surface and its views:
//! - `Morton2`: the Z-order code keying elevation queries and cache records
//! - `PointN`: small fixed-size points, most importantly `Point2i` for integer lon/lat and `Point3d` for cartesians
//! - `IntCoordinates`: the mapping between radians and the integer lon/lat space
//! - `Ellipsoid`: geodetic to cartesian conversion

pub mod ellipsoid;
pub mod geo_coords;
pub mod morton;
pub mod point;
pub mod sphere;

pub use ellipsoid::Ellipsoid;
pub use geo_coords::IntCoordinates;
pub use morton::{compare_code, Morton2, MAX_WIRE_KEY_LEN};
pub use point::{DotProduct, Point2, Point2i, Point3, Point3d, Point3f, Point3i, PointN};
pub use sphere::{Sphere, Sphere3d};

pub use num;

pub mod prelude {
    pub use super::{
        compare_code, DotProduct, Ellipsoid, IntCoordinates, Morton2, Point2, Point2i, Point3, Point3d, Point3f,
        Point3i, PointN, Sphere3d,
    };
}
