//! Point location and ray intersection over the current refinement.
//!
//! Queries only read the arena. They neither create nodes nor refresh timestamps, so they can run under the lock between
//! frames without keeping anything alive.

use super::node::Node;
use super::triangle::{Direction, NodeId, TriangleId};
use super::SurfaceNodes;
use crate::SmallKeyHashSet;

use globe_terrain_core::{DotProduct, Point3d};

/// The nearest hit of a segment or ray with the surface.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Intersection {
    /// Distance in meters from the start point.
    pub t: f64,
    pub point: Point3d,
    pub triangle: TriangleId,
}

/// Barycentric coordinates of a point in a triangle, as exact numerators over a common denominator.
#[derive(Clone, Copy, Debug)]
struct Barycentric {
    u: i128,
    v: i128,
    d: i128,
}

impl Barycentric {
    /// Positions are at most 2^31 apart, so the products are exact.
    fn new(nodes: &SurfaceNodes, t: TriangleId, lon: i32, lat: i32) -> Option<Self> {
        let apex: &Node = nodes.node(t.node());
        let delta = |n: &Node| {
            (
                n.lon.wrapping_sub(apex.lon) as i128,
                n.lat.wrapping_sub(apex.lat) as i128,
            )
        };
        let (lon_l, lat_l) = delta(nodes.node(nodes.get_node(t, Direction::Left)?));
        let (lon_r, lat_r) = delta(nodes.node(nodes.get_node(t, Direction::Right)?));
        let d = lat_l * lon_r - lat_r * lon_l;
        if d == 0 {
            return None;
        }

        let dlon = lon.wrapping_sub(apex.lon) as i128;
        let dlat = lat.wrapping_sub(apex.lat) as i128;
        let (u, v) = (lon_r * dlat - lat_r * dlon, lat_l * dlon - lon_l * dlat);

        // Normalize to a positive denominator.
        Some(if d < 0 {
            Self { u: -u, v: -v, d: -d }
        } else {
            Self { u, v, d }
        })
    }

    fn contains(&self) -> bool {
        self.u >= 0 && self.v >= 0 && self.u + self.v <= self.d
    }

    /// Weights of the left and right corners.
    fn weights(&self) -> (f64, f64) {
        (self.u as f64 / self.d as f64, self.v as f64 / self.d as f64)
    }
}

impl SurfaceNodes {
    /// Descends from the basemesh cell containing `(lon, lat)` to the finest existing triangle that contains it.
    ///
    /// Returns the triangle and its barycentric weights for the left and right corners.
    fn locate(&self, lon: i32, lat: i32) -> Option<(TriangleId, f64, f64)> {
        let mut start = None;
        'cells: for &apex in self.base_mesh.iter() {
            for corner in 0..4 {
                let t = TriangleId::new(apex, corner);
                if Barycentric::new(self, t, lon, lat).map_or(false, |b| b.contains()) {
                    start = Some(t);
                    break 'cells;
                }
            }
        }

        let mut t = start?;
        loop {
            let b = Barycentric::new(self, t, lon, lat)?;
            let base = match self.node(t.node()).child(t.corner()) {
                Some(base) => base,
                None => {
                    let (u, v) = b.weights();
                    return Some((t, u, v));
                }
            };
            let side = if b.u > b.v { Direction::Left } else { Direction::Right };
            t = TriangleId::new(base, (t.corner() + side as usize) % 4);
        }
    }

    /// The finest existing triangle containing `(lon, lat)`.
    pub fn get_triangle(&self, lon: i32, lat: i32) -> Option<TriangleId> {
        self.locate(lon, lat).map(|(t, _, _)| t)
    }

    /// Elevation in meters at `(lon, lat)`, interpolated over the finest existing triangle. 0 where nothing is known.
    pub fn get_elevation(&self, lon: i32, lat: i32) -> f64 {
        let (t, u, v) = match self.locate(lon, lat) {
            Some(found) => found,
            None => return 0.0,
        };
        let (left, right) = match (self.get_node(t, Direction::Left), self.get_node(t, Direction::Right)) {
            (Some(left), Some(right)) => (left, right),
            _ => return 0.0,
        };

        let h = (1.0 - u - v) * self.get_int_h(t.node()) as f64
            + u * self.get_int_h(left) as f64
            + v * self.get_int_h(right) as f64;

        h * self.config.scale * self.h_scale
    }

    /// The nearest intersection of the segment from `p1` to `p2` with the surface. Points are earth-centered, in meters.
    pub fn intersect_segment(&self, p1: Point3d, p2: Point3d) -> Option<Intersection> {
        let d = p2 - p1;
        let length = d.norm();
        if length == 0.0 {
            return None;
        }

        self.intersect(p1, d / length, 0.0, length)
    }

    /// The nearest intersection of the ray from `p` along `dir` with the surface.
    pub fn intersect_ray(&self, p: Point3d, dir: Point3d) -> Option<Intersection> {
        let dir = dir.normalized();
        if dir.norm_squared() == 0.0 {
            return None;
        }

        self.intersect(p, dir, 0.0, f64::MAX)
    }

    /// Walks the bounding spheres from the basemesh down, testing leaf triangles of nodes the line passes close to.
    ///
    /// `v` must be a unit vector. Every accepted hit shrinks `t2`, so later candidates must be nearer.
    fn intersect(&self, p: Point3d, v: Point3d, t1: f64, mut t2: f64) -> Option<Intersection> {
        let scale = self.config.scale;
        let position = |id: NodeId| self.node(id).cartesian.scaled(scale);

        let mut hit = None;
        let mut visited = SmallKeyHashSet::default();
        let mut stack: Vec<NodeId> = self.base_mesh.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let node = self.node(id);
            if !node.has_valid_cartesian() {
                continue;
            }

            let c = position(id);
            let t = v.dot(&(c - p)).max(t1).min(t2);
            let dist = (c - p - v * t).norm();
            if dist > node.total_radius as f64 {
                continue;
            }

            for ix in 0..4 {
                if let Some(child) = node.child(ix) {
                    stack.push(child);
                    continue;
                }
                if dist > node.own_radius as f64 {
                    continue;
                }
                let (left, right) = match (node.parent((ix + 3) % 4), node.parent(ix)) {
                    (Some(left), Some(right)) => (left, right),
                    _ => continue,
                };

                // Solve p + v * z = n + a * x + b * y.
                let a = position(left) - c;
                let b = position(right) - c;
                let w = p - c;
                let normal = a.cross(&b);
                let det = -v.dot(&normal);
                if det == 0.0 {
                    continue;
                }
                let z = w.dot(&normal) / det;
                let q = w.cross(&v);
                let x = b.dot(&q) / det;
                let y = -a.dot(&q) / det;

                if x >= 0.0 && y >= 0.0 && x + y <= 1.0 && z >= t1 && z <= t2 {
                    t2 = z;
                    hit = Some(Intersection {
                        t: z,
                        point: p + v * z,
                        triangle: TriangleId::new(id, ix),
                    });
                }
            }
        }

        hit
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
    use super::super::test_util::{flat_surface, random_descent, surface_with};
    use super::*;

    use globe_terrain_core::PointN;
    use rand::{Rng, SeedableRng};
    use utilities::data_sets::random_int_lon_lats;
    use utilities::test::assert_close;

    #[test]
    fn every_point_is_located() {
        let mut nodes = flat_surface(4096);
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        for _ in 0..30 {
            random_descent(&mut nodes, &mut rng, 10);
        }

        // Grid lines, cell boundaries and the date line.
        let mut points = Vec::new();
        for i in 0..16 {
            for j in 1..16 {
                let lon = i32::MIN.wrapping_add(i << 28);
                let lat = -(1 << 30) + (j << 27);
                points.push((lon, lat));
            }
        }
        points.extend(random_int_lon_lats(&mut rng, 500));

        for &(lon, lat) in points.iter() {
            assert!(nodes.get_triangle(lon, lat).is_some(), "({}, {})", lon, lat);
        }
    }

    #[test]
    fn located_triangles_are_leaves() {
        let mut nodes = flat_surface(4096);
        let mut rng = rand::rngs::StdRng::seed_from_u64(9);
        for _ in 0..30 {
            random_descent(&mut nodes, &mut rng, 10);
        }

        for _ in 0..200 {
            let (lon, lat) = (rng.gen(), rng.gen_range(-(1 << 29)..(1 << 29)));
            let t = nodes.get_triangle(lon, lat).unwrap();
            assert_eq!(nodes.node(t.node()).child(t.corner()), None);
        }
    }

    #[test]
    fn elevation_interpolates_node_values() {
        let mut nodes = surface_with(1024, |_, _| Some((5000, 0)));
        nodes.update_data();

        let lon = nodes.node(nodes.base_mesh()[13]).lon;
        let lat = nodes.node(nodes.base_mesh()[13]).lat + 12345;
        assert_close(nodes.get_elevation(lon, lat), 50.0, 1e-6);
    }

    #[test]
    fn ray_hits_the_globe_from_outside() {
        let mut nodes = flat_surface(1024);
        nodes.update_data();
        let a = nodes.ellipsoid().a();

        let start = PointN([3.0 * a, 1000.0, 2000.0]);
        let hit = nodes.intersect_ray(start, PointN([-1.0, 0.0, 0.0])).unwrap();
        // The basemesh is coarse, so the hit lies inside the ellipsoid.
        assert!(hit.t > 2.0 * a && hit.t < 3.0 * a);
        assert!((hit.point.x() - (3.0 * a - hit.t)).abs() < 1e-6);

        let miss = nodes.intersect_ray(start, PointN([1.0, 0.0, 0.0]));
        assert_eq!(miss, None);
    }

    #[test]
    fn segment_stops_at_its_end() {
        let mut nodes = flat_surface(1024);
        nodes.update_data();
        let a = nodes.ellipsoid().a();

        let start = PointN([3.0 * a, 3000.0, 1500.0]);
        let short = nodes.intersect_segment(start, PointN([2.5 * a, 3000.0, 1500.0]));
        assert_eq!(short, None);

        let long = nodes.intersect_segment(start, PointN([0.0, 3000.0, 1500.0])).unwrap();
        assert!(long.t > 2.0 * a);
    }
}
