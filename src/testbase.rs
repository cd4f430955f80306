//! Common utilities shared by unit tests.
#![cfg(test)]

use std::collections::HashSet;

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::aabb::Aabb;
use crate::bounding_hierarchy::BoundingHierarchy;
use crate::bvh::{Bvh, BvhNode};
use crate::ray::Ray;
use crate::{Point3, Vector3};

/// A vector represented as a tuple
pub type TupleVec = (f32, f32, f32);

/// Generate a `TupleVec` for [`proptest::strategy::Strategy`] from -1e3 to 1e3.
/// Small enough that box arithmetic stays well inside the fp32 precision.
pub fn tuplevec_small_strategy() -> impl Strategy<Value = TupleVec> {
    (-1e3_f32..1e3_f32, -1e3_f32..1e3_f32, -1e3_f32..1e3_f32)
}

/// Convert a `TupleVec` to a [`Point3`].
pub fn tuple_to_point(tpl: &TupleVec) -> Point3 {
    Point3::new(tpl.0, tpl.1, tpl.2)
}

/// Convert a `TupleVec` to a [`Vector3`].
pub fn tuple_to_vector(tpl: &TupleVec) -> Vector3 {
    Vector3::new(tpl.0, tpl.1, tpl.2)
}

/// Generate a valid, possibly flat [`Aabb`].
pub fn aabb_strategy() -> impl Strategy<Value = Aabb> {
    (
        tuplevec_small_strategy(),
        (0.0_f32..100.0, 0.0_f32..100.0, 0.0_f32..100.0),
    )
        .prop_map(|(min, size)| {
            let min = tuple_to_point(&min);
            Aabb::with_bounds(min, min + tuple_to_vector(&size))
        })
}

/// Generate 21 unit boxes along the X axis, the i-th one spanning `[i - 10.5, i - 9.5]`.
pub fn generate_aligned_boxes() -> Vec<Aabb> {
    (-10..11)
        .map(|x| {
            let center = Point3::new(x as f32, 0.0, 0.0);
            let half = Vector3::new(0.5, 0.5, 0.5);
            Aabb::with_bounds(center - half, center + half)
        })
        .collect()
}

/// Generate `k^3` unit boxes on a grid with a spacing of 2.
pub fn generate_grid_boxes(k: usize) -> Vec<Aabb> {
    let mut boxes = Vec::with_capacity(k * k * k);
    for i in 0..k {
        for j in 0..k {
            for l in 0..k {
                let min = Point3::new(2.0 * i as f32, 2.0 * j as f32, 2.0 * l as f32);
                boxes.push(Aabb::with_bounds(min, min + Vector3::new(1.0, 1.0, 1.0)));
            }
        }
    }
    boxes
}

/// Generate `n` boxes with corners in `[0, 100)` and edges in `[0.1, 5)`.
pub fn random_boxes(n: usize, seed: u64) -> Vec<Aabb> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let min = Point3::new(
                rng.random_range(0.0..100.0),
                rng.random_range(0.0..100.0),
                rng.random_range(0.0..100.0),
            );
            let size = Vector3::new(
                rng.random_range(0.1..5.0),
                rng.random_range(0.1..5.0),
                rng.random_range(0.1..5.0),
            );
            Aabb::with_bounds(min, min + size)
        })
        .collect()
}

/// Creates a `BoundingHierarchy` for a fixed scene structure.
pub fn build_some_bh<BH: BoundingHierarchy>() -> (Vec<Aabb>, BH) {
    let boxes = generate_aligned_boxes();
    let bh = BH::build(&boxes).unwrap();
    (boxes, bh)
}

/// Collects the leaves reachable from the root.
fn leaves(bvh: &Bvh) -> Vec<BvhNode> {
    let mut leaves = Vec::new();
    let mut stack = vec![bvh.root()];
    while let Some(index) = stack.pop() {
        let node = bvh.nodes()[index];
        match node.children() {
            Some((l, r)) => {
                stack.push(r);
                stack.push(l);
            }
            None => leaves.push(node),
        }
    }
    leaves
}

/// Asserts that the leaves split the index array into disjoint runs and reference
/// every primitive. With `exact`, every primitive is referenced exactly once.
pub fn assert_covers_all_primitives(bvh: &Bvh, n: usize, exact: bool) {
    let mut slots = HashSet::new();
    let mut seen = vec![0usize; n];
    for leaf in leaves(bvh) {
        let range = leaf.primitive_range().unwrap();
        assert!(range.end <= bvh.indices().len());
        for slot in range {
            assert!(slots.insert(slot), "index slot {} shared by two leaves", slot);
            seen[bvh.indices()[slot]] += 1;
        }
    }
    assert_eq!(slots.len(), bvh.indices().len());
    for (index, &count) in seen.iter().enumerate() {
        assert!(count > 0, "primitive {} is not referenced", index);
        if exact {
            assert_eq!(count, 1, "primitive {} is referenced {} times", index, count);
        }
    }
}

/// Asserts that the leaf boxes join up to exactly the root box.
pub fn assert_leaf_union_is_bounds(bvh: &Bvh) {
    let union = leaves(bvh)
        .iter()
        .fold(Aabb::empty(), |acc, leaf| acc.join(&leaf.aabb()));
    assert_eq!(union, bvh.bounds());
}

/// The indices of all `boxes` hit by `ray`.
pub fn brute_force_hits(boxes: &[Aabb], ray: &Ray) -> HashSet<usize> {
    boxes
        .iter()
        .enumerate()
        .filter(|(_, aabb)| ray.intersects_aabb(aabb, f32::INFINITY))
        .map(|(index, _)| index)
        .collect()
}

/// A fixed set of rays through the region of [`random_boxes`].
pub fn some_rays(n: usize, seed: u64) -> Vec<Ray> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let origin = Point3::new(
                rng.random_range(-20.0..120.0),
                rng.random_range(-20.0..120.0),
                rng.random_range(-20.0..120.0),
            );
            let target = Point3::new(
                rng.random_range(0.0..100.0),
                rng.random_range(0.0..100.0),
                rng.random_range(0.0..100.0),
            );
            Ray::new(origin, target - origin + Vector3::new(1e-3, 1e-3, 1e-3))
        })
        .collect()
}
