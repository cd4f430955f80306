//! Utilities module.

use crate::aabb::Aabb;

/// `if x < y { x } else { y }`, usable on floats. Returns `y` if either is NaN.
#[inline(always)]
pub fn fast_min<T: Copy + PartialOrd>(x: T, y: T) -> T {
    if x < y {
        x
    } else {
        y
    }
}

/// `if x > y { x } else { y }`, usable on floats. Returns `y` if either is NaN.
#[inline(always)]
pub fn fast_max<T: Copy + PartialOrd>(x: T, y: T) -> T {
    if x > y {
        x
    } else {
        y
    }
}

/// Count and joint box of the primitives falling into one bin of the object SAH.
#[derive(Clone, Copy, Debug)]
pub struct Bucket {
    /// The number of primitives in this `Bucket`.
    pub size: usize,

    /// The joint [`Aabb`] of the primitives in this [`Bucket`].
    pub aabb: Aabb,
}

impl Bucket {
    /// Returns an empty bucket.
    pub fn empty() -> Bucket {
        Bucket {
            size: 0,
            aabb: Aabb::empty(),
        }
    }

    /// Extend this [`Bucket`] by a primitive with the given [`Aabb`].
    pub fn add_aabb(&mut self, aabb: &Aabb) {
        self.size += 1;
        self.aabb.join_mut(aabb);
    }

    /// Join the contents of two [`Bucket`]s.
    pub fn join_bucket(a: Bucket, b: &Bucket) -> Bucket {
        Bucket {
            size: a.size + b.size,
            aabb: a.aabb.join(&b.aabb),
        }
    }
}

/// Returns the joint bounds and the joint centroid bounds of the given boxes.
pub fn joint_aabb_of_boxes<'a>(boxes: impl IntoIterator<Item = &'a Aabb>) -> (Aabb, Aabb) {
    let mut aabb = Aabb::empty();
    let mut centroid = Aabb::empty();
    for b in boxes {
        aabb.join_mut(b);
        centroid.grow_mut(&b.center());
    }
    (aabb, centroid)
}
