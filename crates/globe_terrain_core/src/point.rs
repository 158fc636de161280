use core::ops::{Add, AddAssign, Div, Mul, Neg, Sub, SubAssign};
use num::{Float, Zero};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A small fixed-size point, which is just a primitive array of type `N`.
///
/// ```
/// use globe_terrain_core::PointN;
///
/// let p1 = PointN([1.0, 2.0, 3.0]);
/// let p2 = PointN([3.0, 4.0, 5.0]);
///
/// assert_eq!(p1 + p2, PointN([4.0, 6.0, 8.0]));
/// assert_eq!(p2 - p1, PointN([2.0, 2.0, 2.0]));
/// assert_eq!(p1 * 2.0, PointN([2.0, 4.0, 6.0]));
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct PointN<N>(pub N);

/// A 2-dimensional point with scalar type `T`.
pub type Point2<T> = PointN<[T; 2]>;
/// A 2-dimensional point with scalar type `i32`. Used for integer longitude/latitude pairs.
pub type Point2i = PointN<[i32; 2]>;

/// A 3-dimensional point with scalar type `T`.
pub type Point3<T> = PointN<[T; 3]>;
/// A 3-dimensional point with scalar type `i32`. Used for fixed-point cartesian coordinates.
pub type Point3i = PointN<[i32; 3]>;
/// A 3-dimensional point with scalar type `f32`.
pub type Point3f = PointN<[f32; 3]>;
/// A 3-dimensional point with scalar type `f64`.
pub type Point3d = PointN<[f64; 3]>;

impl<T> Point2<T>
where
    T: Copy,
{
    pub fn x(&self) -> T {
        self.0[0]
    }

    pub fn y(&self) -> T {
        self.0[1]
    }
}

impl<T> Point3<T>
where
    T: Copy,
{
    pub fn x(&self) -> T {
        self.0[0]
    }

    pub fn y(&self) -> T {
        self.0[1]
    }

    pub fn z(&self) -> T {
        self.0[2]
    }

    /// Returns the point after applying `f` component-wise.
    pub fn map_components<S>(&self, f: impl Fn(T) -> S) -> Point3<S> {
        PointN([f(self.x()), f(self.y()), f(self.z())])
    }
}

impl<T> Add for Point3<T>
where
    T: Copy + Add<Output = T>,
{
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        PointN([self.x() + rhs.x(), self.y() + rhs.y(), self.z() + rhs.z()])
    }
}

impl<T> Sub for Point3<T>
where
    T: Copy + Sub<Output = T>,
{
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        PointN([self.x() - rhs.x(), self.y() - rhs.y(), self.z() - rhs.z()])
    }
}

impl<T> Mul<T> for Point3<T>
where
    T: Copy + Mul<Output = T>,
{
    type Output = Self;

    #[inline]
    fn mul(self, rhs: T) -> Self {
        self.map_components(|c| c * rhs)
    }
}

impl<T> Div<T> for Point3<T>
where
    T: Copy + Div<Output = T>,
{
    type Output = Self;

    #[inline]
    fn div(self, rhs: T) -> Self {
        self.map_components(|c| c / rhs)
    }
}

impl<T> Neg for Point3<T>
where
    T: Copy + Neg<Output = T>,
{
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        self.map_components(|c| -c)
    }
}

impl<T> AddAssign for Point3<T>
where
    T: Copy + Add<Output = T>,
{
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl<T> SubAssign for Point3<T>
where
    T: Copy + Sub<Output = T>,
{
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl<T> Zero for Point3<T>
where
    T: Copy + Zero + PartialEq,
{
    fn zero() -> Self {
        PointN([T::zero(); 3])
    }

    fn is_zero(&self) -> bool {
        self.0.iter().all(|c| c.is_zero())
    }
}

pub trait DotProduct {
    type Scalar: Copy;

    /// The vector dot product.
    fn dot(&self, other: &Self) -> Self::Scalar;
}

impl<T> DotProduct for Point3<T>
where
    T: Copy + Add<Output = T> + Mul<Output = T>,
{
    type Scalar = T;

    #[inline]
    fn dot(&self, other: &Self) -> T {
        self.x() * other.x() + self.y() * other.y() + self.z() * other.z()
    }
}

impl<T> Point3<T>
where
    T: Copy + Mul<Output = T> + Sub<Output = T>,
{
    /// The vector cross product.
    #[inline]
    pub fn cross(&self, other: &Self) -> Self {
        PointN([
            self.y() * other.z() - self.z() * other.y(),
            self.z() * other.x() - self.x() * other.z(),
            self.x() * other.y() - self.y() * other.x(),
        ])
    }
}

impl<T> Point3<T>
where
    T: Float,
{
    pub fn norm_squared(&self) -> T {
        self.dot(self)
    }

    pub fn norm(&self) -> T {
        self.norm_squared().sqrt()
    }

    /// The Euclidean distance between points.
    pub fn distance(&self, other: &Self) -> T {
        (*self - *other).norm()
    }

    /// Returns the unit vector in the same direction, or `self` if it has zero length.
    pub fn normalized(&self) -> Self {
        let n = self.norm();
        if n > T::zero() {
            *self / n
        } else {
            *self
        }
    }
}

impl Point3i {
    /// Converts fixed-point coordinates to `f64` after multiplying by `scale`.
    #[inline]
    pub fn scaled(&self, scale: f64) -> Point3d {
        self.map_components(|c| c as f64 * scale)
    }
}

impl From<Point3d> for Point3f {
    #[inline]
    fn from(p: Point3d) -> Self {
        p.map_components(|c| c as f32)
    }
}

impl From<Point3f> for Point3d {
    #[inline]
    fn from(p: Point3f) -> Self {
        p.map_components(f64::from)
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
