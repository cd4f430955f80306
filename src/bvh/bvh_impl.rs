//! This module defines [`Bvh`] and the top-down median / object SAH builder.
//!
//! [`Bvh`]: struct.Bvh.html
//!

use crate::aabb::{Aabb, Bounded};
use crate::axis::Axis;
use crate::bounding_hierarchy::BoundingHierarchy;
use crate::bvh::bvh_node::{BvhNode, NodeArena};
use crate::bvh::partition::{near_to_far, partition, Partition, SideBounds};
use crate::bvh::sah::find_object_split;
use crate::config::{BuildOptions, BuilderKind};
use crate::error::BuildError;
use crate::utils::joint_aabb_of_boxes;
use crate::{Point3, Real, EPSILON};
use log::debug;
use std::iter::repeat;
use std::sync::atomic::{AtomicU32, Ordering};

/// Nodes with more primitives than this build their two subtrees in parallel.
#[cfg(feature = "rayon")]
const PARALLEL_THRESHOLD: usize = 128;

/// The [`Bvh`] data structure. Contains the list of [`BvhNode`]s and the
/// permuted primitive indices their leaves refer to.
///
/// [`Bvh`]: struct.Bvh.html
/// [`BvhNode`]: enum.BvhNode.html
///
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    indices: Vec<usize>,
    height: u32,
    primitive_count: usize,
    traversal_cost: Real,
}

/// Summary of the shape of a built [`Bvh`].
///
/// [`Bvh`]: struct.Bvh.html
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BvhStatistics {
    /// Total number of nodes.
    pub node_count: usize,
    /// Number of leaves.
    pub leaf_count: usize,
    /// Number of inner nodes.
    pub internal_count: usize,
    /// Number of input primitives.
    pub primitive_count: usize,
    /// Number of primitive slots referenced by leaves.
    pub reference_count: usize,
    /// Largest number of primitives in one leaf.
    pub max_leaf_size: usize,
    /// Maximum depth of a node, the root has depth `0`.
    pub height: u32,
    /// Surface area heuristic cost of the whole tree, relative to the root area.
    pub sah_cost: Real,
}

/// Shared state of one build. Sibling subtrees only share the node arena and the height counter.
struct BuildContext<'a> {
    boxes: &'a [Aabb],
    centers: &'a [Point3],
    arena: &'a NodeArena,
    height: AtomicU32,
    options: &'a BuildOptions,
}

impl BuildContext<'_> {
    /// Builds the subtree over `indices`, which start at `start` in the full index array.
    /// Returns the arena slot of the subtree's root.
    fn build_node(
        &self,
        indices: &mut [usize],
        start: usize,
        bounds: SideBounds,
        depth: u32,
    ) -> Result<usize, BuildError> {
        let node_index = self.arena.allocate()?;
        self.height.fetch_max(depth, Ordering::Relaxed);

        let count = indices.len();
        if count < 2 || depth >= self.options.max_depth {
            self.arena.write(
                node_index,
                BvhNode::Leaf {
                    aabb: bounds.aabb,
                    start,
                    count,
                },
            );
            return Ok(node_index);
        }

        let plane = self.choose_plane(indices, &bounds);
        let direction = near_to_far(
            start,
            count,
            self.options.alternate_partition_direction,
        );
        let Partition { split, left, right } =
            partition(indices, plane, direction, |&i| (self.boxes[i], self.centers[i]));

        let (indices_l, indices_r) = indices.split_at_mut(split);
        let (child_l, child_r) = join(
            count,
            || self.build_node(indices_l, start, left, depth + 1),
            || self.build_node(indices_r, start + split, right, depth + 1),
        );

        self.arena.write(
            node_index,
            BvhNode::Node {
                aabb: bounds.aabb,
                child_l: child_l?,
                child_r: child_r?,
            },
        );
        Ok(node_index)
    }

    /// Picks the split axis and border for a node, or `None` if the
    /// primitives can only be halved.
    fn choose_plane(&self, indices: &[usize], bounds: &SideBounds) -> Option<(Axis, Real)> {
        let axis = bounds.centroid.largest_axis();
        let median = if bounds.centroid.size()[axis] > 0.0 {
            Some((axis, bounds.centroid.center()[axis]))
        } else {
            None
        };

        match self.options.builder {
            BuilderKind::Median => median,
            BuilderKind::Sah => find_object_split(
                indices,
                |&i| (self.boxes[i], self.centers[i]),
                &bounds.aabb,
                &bounds.centroid,
                self.options.num_bins,
                self.options.traversal_cost,
            )
            .map(|split| (split.axis, split.position))
            .or(median),
        }
    }
}

/// Runs both subtree builds, in parallel for large nodes.
#[cfg(feature = "rayon")]
fn join<A, B, RA, RB>(count: usize, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA + Send,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    if count > PARALLEL_THRESHOLD {
        rayon::join(a, b)
    } else {
        (a(), b())
    }
}

/// Runs both subtree builds, left first.
#[cfg(not(feature = "rayon"))]
fn join<A, B, RA, RB>(_count: usize, a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB,
{
    let ra = a();
    (ra, b())
}

impl Bvh {
    /// Creates a new [`Bvh`] from the `shapes` slice with the default options
    /// (median splits, no spatial splits).
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::bvh::Bvh;
    /// use split_bvh::Point3;
    ///
    /// let boxes: Vec<Aabb> = (0..4)
    ///     .map(|i| {
    ///         let min = Point3::new(i as f32 * 2.0, 0.0, 0.0);
    ///         Aabb::with_bounds(min, min + split_bvh::Vector3::new(1.0, 1.0, 1.0))
    ///     })
    ///     .collect();
    /// let bvh = Bvh::build(&boxes).unwrap();
    ///
    /// assert_eq!(bvh.height(), 2);
    /// assert_eq!(bvh.bounds().max.x, 7.0);
    /// ```
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn build<T: Bounded>(shapes: &[T]) -> Result<Bvh, BuildError> {
        Bvh::build_with_options(shapes, &BuildOptions::default())
    }

    /// Creates a new [`Bvh`] from the `shapes` slice. `options.use_splits` is
    /// ignored here, use [`SplitBvh`] for spatial splits.
    ///
    /// Fails with [`BuildError::EmptyInput`] if `shapes` is empty.
    ///
    /// [`Bvh`]: struct.Bvh.html
    /// [`SplitBvh`]: struct.SplitBvh.html
    ///
    pub fn build_with_options<T: Bounded>(
        shapes: &[T],
        options: &BuildOptions,
    ) -> Result<Bvh, BuildError> {
        options.validate()?;
        if shapes.is_empty() {
            return Err(BuildError::EmptyInput);
        }

        let boxes: Vec<Aabb> = shapes.iter().map(|shape| shape.aabb()).collect();
        let centers: Vec<Point3> = boxes.iter().map(Aabb::center).collect();
        let (aabb, centroid) = joint_aabb_of_boxes(&boxes);
        let mut indices: Vec<usize> = (0..boxes.len()).collect();

        let arena = NodeArena::with_capacity(2 * boxes.len() - 1);
        let context = BuildContext {
            boxes: &boxes,
            centers: &centers,
            arena: &arena,
            height: AtomicU32::new(0),
            options,
        };
        context.build_node(&mut indices, 0, SideBounds { aabb, centroid }, 0)?;
        let height = context.height.into_inner();
        let nodes = arena.into_nodes()?;

        debug!(
            "built {:?} bvh over {} primitives: {} nodes, height {}",
            options.builder,
            boxes.len(),
            nodes.len(),
            height
        );

        Ok(Bvh::from_parts(
            nodes,
            indices,
            height,
            boxes.len(),
            options.traversal_cost,
        ))
    }

    pub(crate) fn from_parts(
        nodes: Vec<BvhNode>,
        indices: Vec<usize>,
        height: u32,
        primitive_count: usize,
        traversal_cost: Real,
    ) -> Bvh {
        Bvh {
            nodes,
            indices,
            height,
            primitive_count,
            traversal_cost,
        }
    }

    /// Returns all nodes. The root is at index [`Bvh::root`].
    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Returns the index of the root node.
    pub fn root(&self) -> usize {
        0
    }

    /// Returns the root node.
    pub fn root_node(&self) -> &BvhNode {
        &self.nodes[self.root()]
    }

    /// Returns the primitive indices referenced by the leaves. A leaf's
    /// primitives occupy `indices()[start..start + count]`.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Returns the bounds of the whole hierarchy.
    pub fn bounds(&self) -> Aabb {
        self.root_node().aabb()
    }

    /// Returns the maximum depth of a node. A single leaf has height `0`.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the number of primitives the hierarchy was built over.
    pub fn primitive_count(&self) -> usize {
        self.primitive_count
    }

    /// Returns the primitive indices stored in a leaf, or `None` for inner nodes.
    pub fn leaf_primitives(&self, node_index: usize) -> Option<&[usize]> {
        self.nodes[node_index]
            .primitive_range()
            .map(|range| &self.indices[range])
    }

    /// Gathers node counts and the SAH cost of the tree.
    pub fn statistics(&self) -> BvhStatistics {
        let root_area = self.bounds().surface_area();
        let relative_area = |aabb: &Aabb| {
            if root_area > 0.0 {
                aabb.surface_area() / root_area
            } else {
                1.0
            }
        };

        let mut stats = BvhStatistics {
            node_count: self.nodes.len(),
            leaf_count: 0,
            internal_count: 0,
            primitive_count: self.primitive_count,
            reference_count: 0,
            max_leaf_size: 0,
            height: self.height,
            sah_cost: 0.0,
        };
        for node in &self.nodes {
            match *node {
                BvhNode::Leaf { aabb, count, .. } => {
                    stats.leaf_count += 1;
                    stats.reference_count += count;
                    stats.max_leaf_size = stats.max_leaf_size.max(count);
                    stats.sah_cost += count as Real * relative_area(&aabb);
                }
                BvhNode::Node { aabb, .. } => {
                    stats.internal_count += 1;
                    stats.sah_cost += self.traversal_cost * relative_area(&aabb);
                }
            }
        }
        stats
    }

    /// Prints the [`Bvh`] in a tree-like visualization.
    ///
    /// [`Bvh`]: struct.Bvh.html
    ///
    pub fn pretty_print(&self) {
        self.print_node(self.root(), 0);
    }

    fn print_node(&self, node_index: usize, depth: usize) {
        let padding: String = repeat(" ").take(depth).collect();
        match self.nodes[node_index] {
            BvhNode::Node {
                aabb,
                child_l,
                child_r,
            } => {
                println!("{}node={} {}", padding, node_index, aabb);
                self.print_node(child_l, depth + 1);
                self.print_node(child_r, depth + 1);
            }
            BvhNode::Leaf { aabb, start, count } => {
                println!(
                    "{}leaf={} primitives={:?} {}",
                    padding,
                    node_index,
                    &self.indices[start..start + count],
                    aabb
                );
            }
        }
    }

    /// Checks that every child is bounded by its parent, every leaf range lies
    /// inside the index array and every node is reachable from the root exactly once.
    pub fn is_consistent(&self) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![(self.root(), None::<Aabb>)];
        while let Some((index, parent)) = stack.pop() {
            if index >= self.nodes.len() || visited[index] {
                return false;
            }
            visited[index] = true;
            let node = &self.nodes[index];
            if let Some(parent) = parent {
                if !parent.approx_contains_aabb_eps(&node.aabb(), EPSILON) {
                    return false;
                }
            }
            match *node {
                BvhNode::Leaf { start, count, .. } => {
                    if start + count > self.indices.len() {
                        return false;
                    }
                }
                BvhNode::Node {
                    aabb,
                    child_l,
                    child_r,
                } => {
                    stack.push((child_r, Some(aabb)));
                    stack.push((child_l, Some(aabb)));
                }
            }
        }
        visited.iter().all(|&v| v)
    }

    /// Assert version of [`Bvh::is_consistent`].
    pub fn assert_consistent(&self) {
        assert!(self.is_consistent(), "Bvh is not consistent.");
    }
}

impl BoundingHierarchy for Bvh {
    fn build_with_options<T: Bounded>(
        shapes: &[T],
        options: &BuildOptions,
    ) -> Result<Self, BuildError> {
        Bvh::build_with_options(shapes, options)
    }

    fn default_options() -> BuildOptions {
        BuildOptions::default()
    }

    fn bvh(&self) -> &Bvh {
        self
    }
}

#[cfg(test)]
mod tests {
    use crate::aabb::Aabb;
    use crate::bounding_hierarchy::BoundingHierarchy;
    use crate::bvh::{Bvh, BvhNode};
    use crate::config::{BuildOptions, BuilderKind};
    use crate::error::BuildError;
    use crate::testbase::{
        aabb_strategy, assert_covers_all_primitives, assert_leaf_union_is_bounds,
        build_some_bh, generate_aligned_boxes, generate_grid_boxes, random_boxes,
    };
    use crate::Point3;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    /// Tests whether the building procedure succeeds in not failing.
    fn test_build_bvh() {
        let (_, bvh) = build_some_bh::<Bvh>();
        bvh.assert_consistent();
    }

    #[test]
    /// Building over nothing is rejected.
    fn test_build_empty_fails() {
        let boxes: Vec<Aabb> = Vec::new();
        assert_eq!(Bvh::build(&boxes).err(), Some(BuildError::EmptyInput));
    }

    #[test]
    /// A single primitive becomes a single leaf of height 0.
    fn test_build_single() {
        let boxes = vec![Aabb::with_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 2.0, 3.0),
        )];
        let bvh = Bvh::build(&boxes).unwrap();
        assert_eq!(bvh.nodes().len(), 1);
        assert_eq!(bvh.height(), 0);
        assert_eq!(bvh.indices(), &[0]);
        assert_eq!(bvh.bounds(), boxes[0]);
        assert!(bvh.root_node().is_leaf());
    }

    #[test]
    /// Eight unit boxes on a 2x2x2 grid end up in eight single-primitive leaves.
    fn test_grid_of_eight() {
        let boxes = generate_grid_boxes(2);
        for builder in [BuilderKind::Median, BuilderKind::Sah] {
            let options = BuildOptions {
                builder,
                ..Default::default()
            };
            let bvh = Bvh::build_with_options(&boxes, &options).unwrap();
            bvh.assert_consistent();
            assert!(bvh.height() <= 3);
            assert_eq!(
                bvh.bounds(),
                Aabb::with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(3.0, 3.0, 3.0))
            );

            let leaves: Vec<&BvhNode> = bvh.nodes().iter().filter(|n| n.is_leaf()).collect();
            assert_eq!(leaves.len(), 8);
            let mut seen = HashSet::new();
            for (index, node) in bvh.nodes().iter().enumerate() {
                if let Some(primitives) = bvh.leaf_primitives(index) {
                    assert_eq!(primitives.len(), 1);
                    assert!(seen.insert(primitives[0]));
                    assert_eq!(node.aabb(), boxes[primitives[0]]);
                }
            }
            assert_eq!(seen.len(), 8);
        }
    }

    #[test]
    /// Identical boxes are halved until every leaf holds one primitive.
    fn test_identical_boxes_bounded_height() {
        let boxes = vec![
            Aabb::with_bounds(Point3::new(1.0, 1.0, 1.0), Point3::new(2.0, 2.0, 2.0));
            1000
        ];
        let bvh = Bvh::build(&boxes).unwrap();
        bvh.assert_consistent();
        assert_eq!(bvh.height(), 10);
        assert_covers_all_primitives(&bvh, boxes.len(), true);
    }

    #[test]
    /// Collinear boxes build a balanced enough tree.
    fn test_collinear_boxes() {
        let boxes: Vec<Aabb> = generate_aligned_boxes();
        for options in [BuildOptions::default(), BuildOptions::sah()] {
            let bvh = Bvh::build_with_options(&boxes, &options).unwrap();
            bvh.assert_consistent();
            assert!(bvh.height() <= 8);
            assert_covers_all_primitives(&bvh, boxes.len(), true);
            assert_leaf_union_is_bounds(&bvh);
        }
    }

    #[test]
    /// Capping the depth produces larger leaves instead of deeper trees.
    fn test_max_depth_forces_leaves() {
        let boxes = random_boxes(200, 7);
        let options = BuildOptions {
            max_depth: 3,
            ..Default::default()
        };
        let bvh = Bvh::build_with_options(&boxes, &options).unwrap();
        assert_eq!(bvh.height(), 3);
        assert_eq!(bvh.statistics().leaf_count, 8);
        assert_covers_all_primitives(&bvh, boxes.len(), true);
    }

    #[test]
    /// Statistics agree with the node list.
    fn test_statistics() {
        let boxes = random_boxes(500, 3);
        let bvh = Bvh::build_with_options(&boxes, &BuildOptions::sah()).unwrap();
        let stats = bvh.statistics();
        assert_eq!(stats.node_count, bvh.nodes().len());
        assert_eq!(stats.leaf_count, 500);
        assert_eq!(stats.internal_count, 499);
        assert_eq!(stats.reference_count, 500);
        assert_eq!(stats.max_leaf_size, 1);
        assert!(stats.sah_cost > 0.0);
    }

    #[test]
    /// Two distant clusters are separated at the root.
    fn test_sah_separates_clusters() {
        let mut boxes = random_boxes(300, 11);
        boxes.extend(random_boxes(300, 12).into_iter().map(|b| {
            let offset = crate::Vector3::new(500.0, 0.0, 0.0);
            Aabb::with_bounds(b.min + offset, b.max + offset)
        }));
        let bvh = Bvh::build_with_options(&boxes, &BuildOptions::sah()).unwrap();
        let (l, r) = bvh.root_node().children().unwrap();
        let (l, r) = (bvh.nodes()[l].aabb(), bvh.nodes()[r].aabb());
        assert!(!l.overlaps(&r));
        assert_eq!(bvh.leaf_primitives(bvh.root()), None);
        assert!(l.size().x < 200.0 && r.size().x < 200.0);
    }

    #[test]
    /// Invalid options are rejected before building.
    fn test_invalid_options() {
        let boxes = random_boxes(10, 1);
        let options = BuildOptions {
            num_bins: 1,
            ..Default::default()
        };
        assert!(matches!(
            Bvh::build_with_options(&boxes, &options),
            Err(BuildError::InvalidOption { .. })
        ));
    }

    #[test]
    /// Large inputs take the parallel path and stay consistent.
    fn test_large_build() {
        let boxes = random_boxes(5000, 99);
        let bvh = Bvh::build_with_options(&boxes, &BuildOptions::sah()).unwrap();
        bvh.assert_consistent();
        assert_covers_all_primitives(&bvh, boxes.len(), true);
        assert_leaf_union_is_bounds(&bvh);
    }

    proptest! {
        // The leaves of any tree cover all inputs exactly once and their union is the root box.
        #[test]
        fn test_random_builds(boxes in proptest::collection::vec(aabb_strategy(), 1..200),
                              sah: bool,
                              alternate: bool) {
            let options = BuildOptions {
                builder: if sah { BuilderKind::Sah } else { BuilderKind::Median },
                alternate_partition_direction: alternate,
                ..Default::default()
            };
            let bvh = Bvh::build_with_options(&boxes, &options).unwrap();
            prop_assert!(bvh.is_consistent());
            assert_covers_all_primitives(&bvh, boxes.len(), true);
            assert_leaf_union_is_bounds(&bvh);

            let all = boxes.iter().fold(Aabb::empty(), |a, b| a.join(b));
            prop_assert_eq!(bvh.bounds(), all);
            prop_assert!(bvh.height() < boxes.len() as u32 + 1);
        }
    }
}
