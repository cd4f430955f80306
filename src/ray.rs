//! This module defines a Ray structure and the slab intersection test
//! for axis aligned bounding boxes.

use crate::aabb::Aabb;
use crate::axis::Axis;
use crate::utils::{fast_max, fast_min};
use crate::{Point3, Real, Vector3};

/// A struct which defines a ray and some of its cached values.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    /// The ray origin.
    pub origin: Point3,

    /// The ray direction.
    pub direction: Vector3,

    /// Inverse (1/x) ray direction. Cached for use in [`Aabb`] intersections.
    ///
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub inv_direction: Vector3,

    /// Per axis, `1` if the direction is negative and `0` otherwise. Selects which
    /// bound of an [`Aabb`] is entered first, so the slab test needs no branch on the sign.
    pub sign: [usize; 3],
}

impl Ray {
    /// Creates a new [`Ray`] from an `origin` and a `direction`.
    /// `direction` will be normalized.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::ray::Ray;
    /// use split_bvh::{Point3, Vector3};
    ///
    /// let origin = Point3::new(0.0,0.0,0.0);
    /// let direction = Vector3::new(-2.0,0.0,0.0);
    /// let ray = Ray::new(origin, direction);
    ///
    /// assert_eq!(ray.origin, origin);
    /// assert_eq!(ray.direction, Vector3::new(-1.0,0.0,0.0));
    /// assert_eq!(ray.sign, [1, 0, 0]);
    /// ```
    ///
    /// [`Ray`]: struct.Ray.html
    ///
    pub fn new(origin: Point3, direction: Vector3) -> Ray {
        let direction = direction.normalize();
        let inv_direction = direction.map(|x| 1.0 / x);
        let sign = [
            (inv_direction.x < 0.0) as usize,
            (inv_direction.y < 0.0) as usize,
            (inv_direction.z < 0.0) as usize,
        ];
        Ray {
            origin,
            direction,
            inv_direction,
            sign,
        }
    }

    /// Returns the entry and exit distances of the ray through the slabs of `aabb`.
    /// If the ray misses, the entry is larger than the exit. NaNs produced by
    /// degenerate inputs propagate and fail every later comparison.
    fn slab_range(&self, aabb: &Aabb) -> (Real, Real) {
        let mut tmin = (aabb[self.sign[0]].x - self.origin.x) * self.inv_direction.x;
        let mut tmax = (aabb[1 - self.sign[0]].x - self.origin.x) * self.inv_direction.x;

        for axis in [Axis::Y, Axis::Z] {
            let i = axis.index();
            let near = (aabb[self.sign[i]][axis] - self.origin[axis]) * self.inv_direction[axis];
            let far = (aabb[1 - self.sign[i]][axis] - self.origin[axis]) * self.inv_direction[axis];
            tmin = fast_max(near, tmin);
            tmax = fast_min(far, tmax);
        }
        (tmin, tmax)
    }

    /// Tests the intersection of a [`Ray`] with an [`Aabb`] using the slab test.
    /// The box is hit when the slab ranges overlap, the entry lies no further than
    /// `max_t` and the exit lies in front of the origin.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::ray::Ray;
    /// use split_bvh::{Point3, Vector3};
    ///
    /// let origin = Point3::new(0.0,0.0,0.0);
    /// let direction = Vector3::new(1.0,0.0,0.0);
    /// let ray = Ray::new(origin, direction);
    ///
    /// let point1 = Point3::new(99.9,-1.0,-1.0);
    /// let point2 = Point3::new(100.1,1.0,1.0);
    /// let aabb = Aabb::with_bounds(point1, point2);
    ///
    /// assert!(ray.intersects_aabb(&aabb, f32::INFINITY));
    /// assert!(!ray.intersects_aabb(&aabb, 50.0));
    /// ```
    ///
    /// [`Ray`]: struct.Ray.html
    /// [`Aabb`]: struct.Aabb.html
    ///
    pub fn intersects_aabb(&self, aabb: &Aabb, max_t: Real) -> bool {
        let (tmin, tmax) = self.slab_range(aabb);
        tmin <= tmax && tmin <= max_t && tmax > 0.0
    }

    /// Like [`Ray::intersects_aabb`], but returns the distance at which the ray
    /// meets the box: the entry distance, or the exit distance when the origin
    /// lies inside the box.
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::ray::Ray;
    /// use split_bvh::{Point3, Vector3};
    ///
    /// let aabb = Aabb::with_bounds(Point3::new(2.0,-1.0,-1.0), Point3::new(4.0,1.0,1.0));
    ///
    /// let outside = Ray::new(Point3::new(0.0,0.0,0.0), Vector3::new(1.0,0.0,0.0));
    /// assert_eq!(outside.intersection_distance(&aabb, f32::INFINITY), Some(2.0));
    ///
    /// let inside = Ray::new(Point3::new(3.0,0.0,0.0), Vector3::new(1.0,0.0,0.0));
    /// assert_eq!(inside.intersection_distance(&aabb, f32::INFINITY), Some(1.0));
    /// ```
    pub fn intersection_distance(&self, aabb: &Aabb, max_t: Real) -> Option<Real> {
        let (tmin, tmax) = self.slab_range(aabb);
        if tmin <= tmax && tmin <= max_t && tmax > 0.0 {
            Some(if tmin >= 0.0 { tmin } else { tmax })
        } else {
            None
        }
    }
}
