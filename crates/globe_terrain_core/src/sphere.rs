use crate::{Point3, Point3d};

/// A bounding sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Sphere<T> {
    pub center: Point3<T>,
    pub radius: T,
}

pub type Sphere3d = Sphere<f64>;

impl Sphere3d {
    /// The smallest sphere centered at `center` that contains every point in `points`.
    pub fn around(center: Point3d, points: impl IntoIterator<Item = Point3d>) -> Self {
        let radius = points
            .into_iter()
            .map(|p| p.distance(&center))
            .fold(0.0, f64::max);

        Self { center, radius }
    }

    #[inline]
    pub fn contains(&self, p: &Point3d) -> bool {
        p.distance(&self.center) <= self.radius
    }

    /// Distance from `p` to the sphere's surface, negative inside.
    #[inline]
    pub fn signed_distance(&self, p: &Point3d) -> f64 {
        p.distance(&self.center) - self.radius
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
