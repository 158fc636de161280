//! View frustum culling and the screen-space error test that drives refinement.

use globe_terrain_core::{DotProduct, Point3d, Sphere3d};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Where a bounding sphere lies relative to the frustum.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Intersection {
    TotallyIn,
    TotallyOut,
    Partial,
}

/// The camera as seen by a traversal pass.
pub trait CullFrustum: Send + Sync {
    fn check_sphere(&self, sphere: &Sphere3d) -> Intersection;

    /// Whether a triangle bounded by `sphere`, with an error bound of `deviation` meters and edges up to `deviation_2d`
    /// meters long, would show visible error if it were not refined.
    fn is_visible(&self, sphere: &Sphere3d, deviation: f64, deviation_2d: f64) -> bool;

    fn camera_center(&self) -> Point3d;

    /// Unit vector along the view axis.
    fn view_direction(&self) -> Point3d;

    /// Radians per pixel. Nothing is traversed for a frustum with a resolution of 0.
    fn resolution(&self) -> f64;

    fn is_perspective(&self) -> bool {
        true
    }

    /// Distance from the camera to the sphere, or 1 for a parallel projection, where the resolution is in meters.
    fn camera_distance(&self, sphere: &Sphere3d) -> f64 {
        if self.is_perspective() {
            sphere.signed_distance(&self.camera_center()).max(0.0)
        } else {
            1.0
        }
    }

    /// Distance from the view axis, a ray from the camera, to the sphere.
    fn view_axis_distance(&self, sphere: &Sphere3d) -> f64 {
        let dir = self.view_direction();
        let v = sphere.center - self.camera_center();
        let along = v.dot(&dir);
        let d = if along > 0.0 { (v - dir * along).norm() } else { v.norm() };

        (d - sphere.radius).max(0.0)
    }
}

/// Perspective projection parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f64,
    /// Width over height.
    pub aspect: f64,
    pub near: f64,
    pub far: f64,
    /// Height of the viewport in pixels.
    pub viewport_height: u32,
    /// A triangle edge subtending more than this angle is always refined, however flat it is.
    pub max_edge_angle: f64,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: std::f64::consts::FRAC_PI_4,
            aspect: 4.0 / 3.0,
            near: 1.0,
            far: 1.0e8,
            viewport_height: 768,
            max_edge_angle: 0.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Plane {
    /// Points into the frustum.
    normal: Point3d,
    d: f64,
}

impl Plane {
    fn through(point: Point3d, normal: Point3d) -> Self {
        let normal = normal.normalized();

        Self {
            normal,
            d: -normal.dot(&point),
        }
    }

    #[inline]
    fn signed_distance(&self, p: &Point3d) -> f64 {
        self.normal.dot(p) + self.d
    }
}

/// A symmetric perspective frustum in earth-centered coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct PerspectiveFrustum {
    eye: Point3d,
    forward: Point3d,
    planes: [Plane; 6],
    projection: Projection,
}

impl PerspectiveFrustum {
    /// A camera at `eye` looking at `target`. `up` only needs to be roughly perpendicular to the view direction.
    pub fn look_at(eye: Point3d, target: Point3d, up: Point3d, projection: Projection) -> Self {
        assert!(projection.near > 0.0 && projection.far > projection.near);

        let forward = (target - eye).normalized();
        let right = forward.cross(&up).normalized();
        let up = right.cross(&forward);
        let tan_y = (projection.fov_y / 2.0).tan();
        let tan_x = tan_y * projection.aspect;

        let planes = [
            Plane::through(eye + forward * projection.near, forward),
            Plane::through(eye + forward * projection.far, -forward),
            Plane::through(eye, forward * tan_x + right),
            Plane::through(eye, forward * tan_x - right),
            Plane::through(eye, forward * tan_y + up),
            Plane::through(eye, forward * tan_y - up),
        ];

        Self {
            eye,
            forward,
            planes,
            projection,
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }
}

impl CullFrustum for PerspectiveFrustum {
    fn check_sphere(&self, sphere: &Sphere3d) -> Intersection {
        let mut result = Intersection::TotallyIn;
        for plane in self.planes.iter() {
            let d = plane.signed_distance(&sphere.center);
            if d < -sphere.radius {
                return Intersection::TotallyOut;
            }
            if d < sphere.radius {
                result = Intersection::Partial;
            }
        }

        result
    }

    fn is_visible(&self, sphere: &Sphere3d, deviation: f64, deviation_2d: f64) -> bool {
        let dist = self.camera_distance(sphere).max(self.projection.near);

        deviation > dist * self.resolution() || deviation_2d > dist * self.projection.max_edge_angle
    }

    fn camera_center(&self) -> Point3d {
        self.eye
    }

    fn view_direction(&self) -> Point3d {
        self.forward
    }

    fn resolution(&self) -> f64 {
        if self.projection.viewport_height == 0 {
            return 0.0;
        }

        self.projection.fov_y / self.projection.viewport_height as f64
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
    use globe_terrain_core::PointN;

    use pretty_assertions::assert_eq;
    use utilities::test::assert_close;

    fn frustum() -> PerspectiveFrustum {
        PerspectiveFrustum::look_at(
            PointN([0.0, 0.0, 0.0]),
            PointN([0.0, 0.0, -1.0]),
            PointN([0.0, 1.0, 0.0]),
            Projection {
                fov_y: std::f64::consts::FRAC_PI_2,
                aspect: 1.0,
                near: 1.0,
                far: 1000.0,
                viewport_height: 100,
                max_edge_angle: 0.5,
            },
        )
    }

    fn sphere(center: [f64; 3], radius: f64) -> Sphere3d {
        Sphere3d {
            center: PointN(center),
            radius,
        }
    }

    #[test]
    fn spheres_are_classified_against_all_planes() {
        let f = frustum();

        assert_eq!(f.check_sphere(&sphere([0.0, 0.0, -10.0], 1.0)), Intersection::TotallyIn);
        assert_eq!(f.check_sphere(&sphere([0.0, 0.0, 10.0], 1.0)), Intersection::TotallyOut);
        // Straddles the near plane.
        assert_eq!(f.check_sphere(&sphere([0.0, 0.0, -1.0], 0.5)), Intersection::Partial);
        // Beyond the far plane.
        assert_eq!(f.check_sphere(&sphere([0.0, 0.0, -2000.0], 10.0)), Intersection::TotallyOut);
        // The 90 degree frustum reaches x = 10 at z = -10.
        assert_eq!(f.check_sphere(&sphere([14.0, 0.0, -10.0], 1.0)), Intersection::TotallyOut);
        assert_eq!(f.check_sphere(&sphere([10.0, 0.0, -10.0], 1.0)), Intersection::Partial);
        assert_eq!(f.check_sphere(&sphere([0.0, -10.0, -10.0], 1.0)), Intersection::Partial);
    }

    #[test]
    fn error_is_visible_when_close() {
        let f = frustum();
        assert_close(f.resolution(), std::f64::consts::FRAC_PI_2 / 100.0, 1e-12);

        let near = sphere([0.0, 0.0, -20.0], 1.0);
        let far = sphere([0.0, 0.0, -500.0], 1.0);
        assert!(f.is_visible(&near, 1.0, 0.0));
        assert!(!f.is_visible(&far, 1.0, 0.0));
        // Large triangles are refined even without any deviation.
        assert!(f.is_visible(&far, 0.0, 300.0));
    }

    #[test]
    fn distances_to_camera_and_view_axis() {
        let f = frustum();
        let s = sphere([3.0, 0.0, -10.0], 1.0);

        assert_close(f.camera_distance(&s), (109.0f64).sqrt() - 1.0, 1e-12);
        assert_close(f.view_axis_distance(&s), 2.0, 1e-12);
        // Behind the camera the distance is to the camera itself.
        assert_close(f.view_axis_distance(&sphere([0.0, 4.0, 3.0], 1.0)), 4.0, 1e-12);
        assert_eq!(f.view_axis_distance(&sphere([0.5, 0.0, -10.0], 1.0)), 0.0);
    }

    #[test]
    fn zero_height_viewport_has_no_resolution() {
        let f = PerspectiveFrustum::look_at(
            PointN([0.0, 0.0, 0.0]),
            PointN([1.0, 0.0, 0.0]),
            PointN([0.0, 0.0, 1.0]),
            Projection {
                viewport_height: 0,
                ..Default::default()
            },
        );

        assert_eq!(f.resolution(), 0.0);
    }
}
