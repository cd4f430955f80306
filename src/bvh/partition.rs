//! In-place two-pointer partition shared by both builders.

use crate::aabb::Aabb;
use crate::axis::Axis;
use crate::{Point3, Real};

/// Bounds of one side of a partition.
#[derive(Debug, Copy, Clone)]
pub(crate) struct SideBounds {
    pub aabb: Aabb,
    pub centroid: Aabb,
}

impl SideBounds {
    fn empty() -> SideBounds {
        SideBounds {
            aabb: Aabb::empty(),
            centroid: Aabb::empty(),
        }
    }

    fn add(&mut self, (aabb, center): (Aabb, Point3)) {
        self.aabb.join_mut(&aabb);
        self.centroid.grow_mut(&center);
    }
}

/// Result of [`partition`]: `items[..split]` form the left child, `items[split..]` the right one.
#[derive(Debug, Copy, Clone)]
pub(crate) struct Partition {
    pub split: usize,
    pub left: SideBounds,
    pub right: SideBounds,
}

/// Returns the scan direction of a node covering `start..start + count`.
///
/// With alternation on, the parity of `start + count` decides whether the
/// near side (`<`) or the far side (`>=`) of the border is gathered on the left.
pub(crate) fn near_to_far(start: usize, count: usize, alternate: bool) -> bool {
    !alternate || (start + count) & 1 == 1
}

/// Partitions `items` in place around `border` along `axis`, comparing the
/// centers returned by `parts`. When `plane` is `None`, or the scan leaves one
/// side empty, the slice is split at its midpoint instead and the bounds are
/// summed directly over the two halves.
///
/// `items` must hold at least two elements, which guarantees both sides are non-empty.
pub(crate) fn partition<T, F>(
    items: &mut [T],
    plane: Option<(Axis, Real)>,
    near_to_far: bool,
    parts: F,
) -> Partition
where
    F: Fn(&T) -> (Aabb, Point3),
{
    debug_assert!(items.len() >= 2);

    if let Some((axis, border)) = plane {
        let goes_left = |item: &T| {
            let c = parts(item).1[axis];
            if near_to_far {
                c < border
            } else {
                c >= border
            }
        };

        let mut left = SideBounds::empty();
        let mut right = SideBounds::empty();
        let mut first = 0;
        let mut last = items.len();

        loop {
            while first != last && goes_left(&items[first]) {
                left.add(parts(&items[first]));
                first += 1;
            }
            if first == last {
                break;
            }
            last -= 1;

            right.add(parts(&items[first]));

            while first != last && !goes_left(&items[last]) {
                right.add(parts(&items[last]));
                last -= 1;
            }
            if first == last {
                break;
            }

            left.add(parts(&items[last]));
            items.swap(first, last);
            first += 1;
        }

        if first != 0 && first != items.len() {
            return Partition {
                split: first,
                left,
                right,
            };
        }
    }

    halve(items, parts)
}

/// Splits `items` at the midpoint index.
fn halve<T, F>(items: &[T], parts: F) -> Partition
where
    F: Fn(&T) -> (Aabb, Point3),
{
    let split = items.len() / 2;
    let mut left = SideBounds::empty();
    let mut right = SideBounds::empty();
    for item in &items[..split] {
        left.add(parts(item));
    }
    for item in &items[split..] {
        right.add(parts(item));
    }
    Partition { split, left, right }
}
