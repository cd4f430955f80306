//! Binned surface area heuristic split searches.
//!
//! Both searches return `None` when no usable split exists, which makes the
//! caller fall back to a median or midpoint split.

use crate::aabb::Aabb;
use crate::axis::Axis;
use crate::utils::{fast_max, fast_min, Bucket};
use crate::{Point3, Real};

/// A candidate split plane and its estimated cost.
#[derive(Debug, Copy, Clone)]
pub(crate) struct SahSplit {
    pub axis: Axis,
    pub position: Real,
    pub cost: Real,
    /// Bounds of the primitives (or fragments) left of the plane.
    pub left: Aabb,
    /// Bounds of the primitives (or fragments) right of the plane.
    pub right: Aabb,
}

/// `1 / area`, or `1` for flat parents, so that costs stay finite and comparable.
fn inverse_area(bounds: &Aabb) -> Real {
    let area = bounds.surface_area();
    if area > 0.0 {
        1.0 / area
    } else {
        1.0
    }
}

/// True if `extent` split into `num_bins` bins gives bins wide enough to
/// invert. Zero, subnormal and non-finite widths make the axis degenerate.
fn binnable(extent: Real, num_bins: usize) -> bool {
    let width = extent / num_bins as Real;
    width.is_normal() && width > 0.0
}

/// Bins the centroids of a node's primitives along every non-degenerate axis
/// and returns the cheapest bin border.
///
/// Returns `None` if the centroid bounds have zero extent, or no border leaves
/// primitives on both sides.
pub(crate) fn find_object_split<T, F>(
    items: &[T],
    parts: F,
    bounds: &Aabb,
    centroid_bounds: &Aabb,
    num_bins: usize,
    traversal_cost: Real,
) -> Option<SahSplit>
where
    F: Fn(&T) -> (Aabb, Point3),
{
    let extents = centroid_bounds.size();
    if extents.norm_squared() == 0.0 {
        return None;
    }

    let inv_area = inverse_area(bounds);
    let mut best: Option<SahSplit> = None;
    let mut bins = vec![Bucket::empty(); num_bins];
    let mut right_bounds = vec![Aabb::empty(); num_bins - 1];

    for axis in Axis::ALL {
        let range = extents[axis];
        if !binnable(range, num_bins) {
            continue;
        }
        let origin = centroid_bounds.min[axis];
        let scale = num_bins as Real / range;

        bins.iter_mut().for_each(|b| *b = Bucket::empty());
        for item in items {
            let (aabb, center) = parts(item);
            let bin = fast_min((center[axis] - origin) * scale, (num_bins - 1) as Real);
            bins[fast_max(bin, 0.0) as usize].add_aabb(&aabb);
        }

        let mut right = Aabb::empty();
        for i in (1..num_bins).rev() {
            right.join_mut(&bins[i].aabb);
            right_bounds[i - 1] = right;
        }

        let mut left = Bucket::empty();
        for i in 0..num_bins - 1 {
            left = Bucket::join_bucket(left, &bins[i]);
            let right_count = items.len() - left.size;
            if left.size == 0 || right_count == 0 {
                continue;
            }

            let cost = traversal_cost
                + (left.size as Real * left.aabb.surface_area()
                    + right_count as Real * right_bounds[i].surface_area())
                    * inv_area;

            if best.map_or(true, |b| cost < b.cost) {
                best = Some(SahSplit {
                    axis,
                    position: origin + (i + 1) as Real * (range / num_bins as Real),
                    cost,
                    left: left.aabb,
                    right: right_bounds[i],
                });
            }
        }
    }

    best
}

/// One bin of the spatial split search.
#[derive(Debug, Copy, Clone)]
struct SpatialBin {
    aabb: Aabb,
    enter: usize,
    exit: usize,
}

impl SpatialBin {
    fn empty() -> SpatialBin {
        SpatialBin {
            aabb: Aabb::empty(),
            enter: 0,
            exit: 0,
        }
    }
}

/// Splits `aabb` at `position` along `axis` if the plane lies strictly inside it.
pub(crate) fn split_aabb(aabb: &Aabb, axis: Axis, position: Real) -> Option<(Aabb, Aabb)> {
    if position > aabb.min[axis] && position < aabb.max[axis] {
        let mut left = *aabb;
        let mut right = *aabb;
        left.max[axis] = position;
        right.min[axis] = position;
        Some((left, right))
    } else {
        None
    }
}

/// Bins the boxes of a node's references over its spatial bounds, clipping
/// each box into per-bin fragments, and returns the cheapest bin border.
///
/// A reference counts towards every side it overlaps, so the left and right
/// counts may add up to more than the number of references.
pub(crate) fn find_spatial_split<'a>(
    boxes: impl Iterator<Item = &'a Aabb>,
    bounds: &Aabb,
    num_bins: usize,
    traversal_cost: Real,
) -> Option<SahSplit> {
    let extents = bounds.size();
    if extents.norm_squared() == 0.0 {
        return None;
    }

    let inv_area = inverse_area(bounds);
    let origin = bounds.min;
    let bin_size = extents / num_bins as Real;
    let usable = Axis::ALL.map(|axis| binnable(extents[axis], num_bins));
    if !usable.iter().any(|&u| u) {
        return None;
    }
    let last_bin = (num_bins - 1) as Real;
    let mut bins = [
        vec![SpatialBin::empty(); num_bins],
        vec![SpatialBin::empty(); num_bins],
        vec![SpatialBin::empty(); num_bins],
    ];
    let mut count = 0;

    for aabb in boxes {
        count += 1;
        for axis in Axis::ALL {
            if !usable[axis.index()] {
                continue;
            }
            let inv_size = 1.0 / bin_size[axis];
            let first = fast_max(fast_min((aabb.min[axis] - origin[axis]) * inv_size, last_bin), 0.0);
            let last = fast_max(fast_min((aabb.max[axis] - origin[axis]) * inv_size, last_bin), first);
            let (first, last) = (first as usize, last as usize);
            let axis_bins = &mut bins[axis.index()];

            let mut rest = *aabb;
            for j in first..last {
                let plane = origin[axis] + bin_size[axis] * (j + 1) as Real;
                if let Some((left, right)) = split_aabb(&rest, axis, plane) {
                    axis_bins[j].aabb.join_mut(&left);
                    rest = right;
                }
            }
            axis_bins[last].aabb.join_mut(&rest);
            axis_bins[first].enter += 1;
            axis_bins[last].exit += 1;
        }
    }

    let mut best: Option<SahSplit> = None;
    let mut right_bounds = vec![Aabb::empty(); num_bins - 1];

    for axis in Axis::ALL {
        if !usable[axis.index()] {
            continue;
        }
        let axis_bins = &bins[axis.index()];

        let mut right = Aabb::empty();
        for i in (1..num_bins).rev() {
            right.join_mut(&axis_bins[i].aabb);
            right_bounds[i - 1] = right;
        }

        let mut left = Aabb::empty();
        let mut left_count = 0;
        let mut right_count = count;
        for i in 1..num_bins {
            left.join_mut(&axis_bins[i - 1].aabb);
            left_count += axis_bins[i - 1].enter;
            right_count -= axis_bins[i - 1].exit;
            if left_count == 0 || right_count == 0 {
                continue;
            }

            let cost = traversal_cost
                + (left_count as Real * left.surface_area()
                    + right_count as Real * right_bounds[i - 1].surface_area())
                    * inv_area;

            if best.map_or(true, |b| cost < b.cost) {
                best = Some(SahSplit {
                    axis,
                    position: origin[axis] + bin_size[axis] * i as Real,
                    cost,
                    left,
                    right: right_bounds[i - 1],
                });
            }
        }
    }

    best
}
