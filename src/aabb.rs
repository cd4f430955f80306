//! Axis Aligned Bounding Boxes.

use crate::axis::Axis;
use crate::utils::{fast_max, fast_min};
use crate::{Point3, Real, Vector3, EPSILON};
use std::fmt;
use std::ops::Index;

/// Aabb struct.
///
/// The canonical empty box has `min = +MAX` and `max = -MAX`, so that it is
/// the identity of [`Aabb::join`] and is contained by every other box.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Aabb {
    /// Minimum coordinates
    pub min: Point3,

    /// Maximum coordinates
    pub max: Point3,
}

/// A trait implemented by things which can be bounded by an [`Aabb`].
///
/// [`Aabb`]: struct.Aabb.html
///
pub trait Bounded {
    /// Returns the geometric bounds of this object in the form of an [`Aabb`].
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::{Aabb, Bounded};
    /// use split_bvh::Point3;
    ///
    /// struct Something;
    ///
    /// impl Bounded for Something {
    ///     fn aabb(&self) -> Aabb {
    ///         let point1 = Point3::new(0.0,0.0,0.0);
    ///         let point2 = Point3::new(1.0,1.0,1.0);
    ///         Aabb::with_bounds(point1, point2)
    ///     }
    /// }
    ///
    /// let something = Something;
    /// let aabb = something.aabb();
    ///
    /// assert!(aabb.contains(&Point3::new(0.0,0.0,0.0)));
    /// assert!(aabb.contains(&Point3::new(1.0,1.0,1.0)));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    fn aabb(&self) -> Aabb;
}

impl Bounded for Aabb {
    fn aabb(&self) -> Aabb {
        *self
    }
}

impl Bounded for Point3 {
    fn aabb(&self) -> Aabb {
        Aabb::with_bounds(*self, *self)
    }
}

impl<T: Bounded> Bounded for &T {
    fn aabb(&self) -> Aabb {
        T::aabb(self)
    }
}

impl fmt::Display for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Min bound: ({}, {}, {}); Max bound: ({}, {}, {})",
            self.min.x, self.min.y, self.min.z, self.max.x, self.max.y, self.max.z
        )
    }
}

impl Default for Aabb {
    fn default() -> Aabb {
        Aabb::empty()
    }
}

impl Aabb {
    /// Creates a new [`Aabb`] with the given bounds.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(-1.0,-1.0,-1.0), Point3::new(1.0,1.0,1.0));
    /// assert_eq!(aabb.min.x, -1.0);
    /// assert_eq!(aabb.max.z, 1.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn with_bounds(min: Point3, max: Point3) -> Aabb {
        Aabb { min, max }
    }

    /// Creates a new empty [`Aabb`].
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    ///
    /// let aabb = Aabb::empty();
    /// let min = &aabb.min;
    /// let max = &aabb.max;
    ///
    /// // For any point
    /// let x = rand::random();
    /// let y = rand::random();
    /// let z = rand::random();
    ///
    /// // An empty Aabb should not contain it
    /// assert!(x < min.x && y < min.y && z < min.z);
    /// assert!(max.x < x && max.y < y && max.z < z);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn empty() -> Aabb {
        Aabb {
            min: Point3::new(Real::MAX, Real::MAX, Real::MAX),
            max: Point3::new(-Real::MAX, -Real::MAX, -Real::MAX),
        }
    }

    /// Returns true if any component of `min` exceeds the matching component of `max`.
    /// This is the case for [`Aabb::empty`] and for disjoint [`Aabb::intersection`]s.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Returns true if the [`Point3`] is inside the [`Aabb`].
    ///
    /// The test compares the distance to the center against the half extent,
    /// with a tolerance of [`EPSILON`] plus a few ulps of the box's magnitude.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0));
    /// let point_inside = Point3::new(0.125, -0.25, 0.5);
    /// let point_outside = Point3::new(1.0, -2.0, 4.0);
    ///
    /// assert!(aabb.contains(&point_inside));
    /// assert!(!aabb.contains(&point_outside));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn contains(&self, p: &Point3) -> bool {
        if self.is_empty() {
            return false;
        }
        let center = self.center();
        let half = self.size() * 0.5;
        Axis::ALL.iter().all(|&axis| {
            let tolerance = EPSILON + 4.0 * Real::EPSILON * (center[axis].abs() + half[axis]);
            (p[axis] - center[axis]).abs() <= half[axis] + tolerance
        })
    }

    /// Returns true if `other` lies inside this [`Aabb`], allowing an absolute error of `epsilon`.
    /// An empty `other` is contained by every box.
    pub fn approx_contains_aabb_eps(&self, other: &Aabb, epsilon: Real) -> bool {
        if other.is_empty() {
            return true;
        }
        Axis::ALL.iter().all(|&axis| {
            self.min[axis] - epsilon <= other.min[axis] && other.max[axis] <= self.max[axis] + epsilon
        })
    }

    /// Returns a new minimal [`Aabb`] which contains both this [`Aabb`] and `other`.
    /// The result is the convex hull of both [`Aabb`]s.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let aabb1 = Aabb::with_bounds(Point3::new(-101.0, 0.0, 0.0), Point3::new(-100.0, 1.0, 1.0));
    /// let aabb2 = Aabb::with_bounds(Point3::new(100.0, 0.0, 0.0), Point3::new(101.0, 1.0, 1.0));
    /// let joint = aabb1.join(&aabb2);
    ///
    /// assert_eq!(joint.min, Point3::new(-101.0, 0.0, 0.0));
    /// assert_eq!(joint.max, Point3::new(101.0, 1.0, 1.0));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn join(&self, other: &Aabb) -> Aabb {
        Aabb::with_bounds(
            Point3::new(
                fast_min(self.min.x, other.min.x),
                fast_min(self.min.y, other.min.y),
                fast_min(self.min.z, other.min.z),
            ),
            Point3::new(
                fast_max(self.max.x, other.max.x),
                fast_max(self.max.y, other.max.y),
                fast_max(self.max.z, other.max.z),
            ),
        )
    }

    /// Mutable version of [`Aabb::join`].
    pub fn join_mut(&mut self, other: &Aabb) {
        *self = self.join(other);
    }

    /// Returns a new minimal [`Aabb`] which contains both this [`Aabb`] and the [`Point3`] `other`.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let point1 = Point3::new(0.0, 0.0, 0.0);
    /// let point2 = Point3::new(1.0, 1.0, 1.0);
    /// let point3 = Point3::new(2.0, 2.0, 2.0);
    ///
    /// let aabb = Aabb::empty();
    /// assert!(!aabb.contains(&point1));
    ///
    /// let aabb1 = aabb.grow(&point1);
    /// assert!(aabb1.contains(&point1));
    ///
    /// let aabb2 = aabb.grow(&point2);
    /// assert!(aabb2.contains(&point2));
    /// assert!(!aabb2.contains(&point3));
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn grow(&self, other: &Point3) -> Aabb {
        Aabb::with_bounds(
            Point3::new(
                fast_min(self.min.x, other.x),
                fast_min(self.min.y, other.y),
                fast_min(self.min.z, other.z),
            ),
            Point3::new(
                fast_max(self.max.x, other.x),
                fast_max(self.max.y, other.y),
                fast_max(self.max.z, other.z),
            ),
        )
    }

    /// Mutable version of [`Aabb::grow`].
    pub fn grow_mut(&mut self, other: &Point3) {
        *self = self.grow(other);
    }

    /// Returns the overlap of both boxes. The result is inverted (and therefore
    /// [`Aabb::is_empty`]) when the boxes are disjoint, callers must check.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let a = Aabb::with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0));
    /// let b = Aabb::with_bounds(Point3::new(1.0, 1.0, 1.0), Point3::new(3.0, 3.0, 3.0));
    /// let c = Aabb::with_bounds(Point3::new(5.0, 5.0, 5.0), Point3::new(6.0, 6.0, 6.0));
    ///
    /// assert_eq!(a.intersection(&b).size().x, 1.0);
    /// assert!(a.intersection(&c).is_empty());
    /// ```
    pub fn intersection(&self, other: &Aabb) -> Aabb {
        Aabb::with_bounds(
            Point3::new(
                fast_max(self.min.x, other.min.x),
                fast_max(self.min.y, other.min.y),
                fast_max(self.min.z, other.min.z),
            ),
            Point3::new(
                fast_min(self.max.x, other.max.x),
                fast_min(self.max.y, other.max.y),
                fast_min(self.max.z, other.max.z),
            ),
        )
    }

    /// Returns true if both boxes share at least one point.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Returns the size of this [`Aabb`] in all three dimensions.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(-1.0,-1.0,-1.0), Point3::new(1.0,1.0,1.0));
    /// let size = aabb.size();
    /// assert!(size.x == 2.0 && size.y == 2.0 && size.z == 2.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn size(&self) -> Vector3 {
        self.max - self.min
    }

    /// Returns the center [`Point3`] of the [`Aabb`].
    ///
    /// [`Aabb`]: struct.Aabb.html
    /// [`Point3`]: ../type.Point3.html
    ///
    pub fn center(&self) -> Point3 {
        self.min + (self.size() * 0.5)
    }

    /// Returns the total surface area of this [`Aabb`], `2 * (xy + xz + yz)`.
    /// Empty boxes have an area of `0`.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::Point3;
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(-1.0,-1.0,-1.0), Point3::new(1.0,1.0,1.0));
    /// let surface_area = aabb.surface_area();
    /// assert!(surface_area == 24.0);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn surface_area(&self) -> Real {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        2.0 * (size.x * size.y + size.x * size.z + size.y * size.z)
    }

    /// Returns the axis along which the [`Aabb`] is stretched the most.
    /// Ties go to the lower axis, so a cube reports [`Axis::X`].
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::axis::Axis;
    /// use split_bvh::Point3;
    ///
    /// let min = Point3::new(-100.0,0.0,0.0);
    /// let max = Point3::new(100.0,0.0,0.0);
    ///
    /// let aabb = Aabb::with_bounds(min, max);
    /// let axis = aabb.largest_axis();
    /// assert!(axis == Axis::X);
    ///
    /// let cube = Aabb::with_bounds(Point3::new(0.0,0.0,0.0), Point3::new(1.0,1.0,1.0));
    /// assert_eq!(cube.largest_axis(), Axis::X);
    /// ```
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn largest_axis(&self) -> Axis {
        let size = self.size();
        let mut largest = Axis::X;
        for axis in [Axis::Y, Axis::Z] {
            if size[axis] > size[largest] {
                largest = axis;
            }
        }
        largest
    }
}

/// Make [`Aabb`]s indexable. `aabb[0]` gets a reference to the minimum bound,
/// all other indices return a reference to the maximum bound. The ray slab
/// test selects the near bound per axis through this index.
///
/// # Examples
/// ```
/// use split_bvh::aabb::Aabb;
/// use split_bvh::Point3;
///
/// let min = Point3::new(3.0,4.0,5.0);
/// let max = Point3::new(123.0,123.0,123.0);
///
/// let aabb = Aabb::with_bounds(min, max);
/// assert_eq!(aabb[0], min);
/// assert_eq!(aabb[1], max);
/// ```
///
/// [`Aabb`]: struct.Aabb.html
///
impl Index<usize> for Aabb {
    type Output = Point3;

    fn index(&self, index: usize) -> &Point3 {
        if index == 0 {
            &self.min
        } else {
            &self.max
        }
    }
}
