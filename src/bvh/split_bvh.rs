//! Spatial split BVH: binned object SAH combined with binned spatial SAH.
//!
//! A spatial split cuts the primitives straddling the chosen plane into a left
//! and a right fragment. Both fragments keep the index of the primitive they
//! came from, so a primitive may appear in several leaves.

use crate::aabb::{Aabb, Bounded};
use crate::axis::Axis;
use crate::bounding_hierarchy::BoundingHierarchy;
use crate::bvh::bvh_impl::Bvh;
use crate::bvh::bvh_node::{BvhNode, NodeArena};
use crate::bvh::partition::{near_to_far, partition, Partition, SideBounds};
use crate::bvh::sah::{find_object_split, find_spatial_split, split_aabb, SahSplit};
use crate::config::BuildOptions;
use crate::error::BuildError;
use crate::utils::joint_aabb_of_boxes;
use crate::{Point3, Real};
use log::{debug, trace};
use std::ops::Deref;

/// A [`Bvh`] built with spatial splits, together with the clipped bounds of
/// every reference stored in its leaves.
///
/// Dereferences to the underlying [`Bvh`].
///
/// # Examples
/// ```
/// use split_bvh::aabb::Aabb;
/// use split_bvh::bvh::SplitBvh;
/// use split_bvh::Point3;
///
/// let boxes = vec![
///     Aabb::with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
///     Aabb::with_bounds(Point3::new(5.0, 0.0, 0.0), Point3::new(6.0, 1.0, 1.0)),
///     Aabb::with_bounds(Point3::new(0.0, 3.0, 0.0), Point3::new(6.0, 3.5, 0.5)),
/// ];
/// let bvh = SplitBvh::build(&boxes).unwrap();
///
/// assert_eq!(bvh.indices().len(), bvh.fragment_bounds().len());
/// assert!(bvh.indices().len() >= boxes.len());
/// ```
///
/// [`Bvh`]: struct.Bvh.html
///
#[derive(Debug, Clone)]
pub struct SplitBvh {
    bvh: Bvh,
    fragment_bounds: Vec<Aabb>,
    spatial_splits: usize,
}

/// A primitive or a fragment of one.
#[derive(Debug, Copy, Clone)]
struct PrimRef {
    aabb: Aabb,
    center: Point3,
    index: usize,
}

impl PrimRef {
    fn new(aabb: Aabb, index: usize) -> PrimRef {
        PrimRef {
            aabb,
            center: aabb.center(),
            index,
        }
    }

    fn parts(&self) -> (Aabb, Point3) {
        (self.aabb, self.center)
    }
}

/// A pending subtree over `refs[start..start + count]`.
#[derive(Debug, Copy, Clone)]
struct SplitRequest {
    start: usize,
    count: usize,
    bounds: SideBounds,
    level: u32,
}

struct SplitBuilder<'a> {
    options: &'a BuildOptions,
    refs: Vec<PrimRef>,
    arena: NodeArena,
    indices: Vec<usize>,
    fragment_bounds: Vec<Aabb>,
    height: u32,
    root_area: Real,
    num_refs: usize,
    max_refs: usize,
    spatial_splits: usize,
}

impl SplitBuilder<'_> {
    fn build_node(&mut self, request: SplitRequest) -> Result<usize, BuildError> {
        let node_index = self.arena.allocate()?;
        self.height = self.height.max(request.level);

        if request.count < 2 || request.level >= self.options.max_depth {
            let start = self.indices.len();
            for r in &self.refs[request.start..request.start + request.count] {
                self.indices.push(r.index);
                self.fragment_bounds.push(r.aabb);
            }
            self.arena.write(
                node_index,
                BvhNode::Leaf {
                    aabb: request.bounds.aabb,
                    start,
                    count: request.count,
                },
            );
            return Ok(node_index);
        }

        let (plane, count) = self.split_node(&request);

        let direction = near_to_far(
            request.start,
            count,
            self.options.alternate_partition_direction,
        );
        let Partition { split, left, right } = partition(
            &mut self.refs[request.start..request.start + count],
            plane,
            direction,
            PrimRef::parts,
        );

        let left_request = SplitRequest {
            start: request.start,
            count: split,
            bounds: left,
            level: request.level + 1,
        };
        let right_request = SplitRequest {
            start: request.start + split,
            count: count - split,
            bounds: right,
            level: request.level + 1,
        };

        // The right subtree goes first: a spatial split in the left subtree
        // appends its fragments over the space the right subtree occupies.
        let child_r = self.build_node(right_request)?;
        let child_l = self.build_node(left_request)?;

        self.arena.write(
            node_index,
            BvhNode::Node {
                aabb: request.bounds.aabb,
                child_l,
                child_r,
            },
        );
        Ok(node_index)
    }

    /// Chooses the split plane of a node and applies a spatial split if it wins.
    /// Returns the plane and the node's reference count after splitting.
    fn split_node(&mut self, request: &SplitRequest) -> (Option<(Axis, Real)>, usize) {
        let range = request.start..request.start + request.count;
        let object = find_object_split(
            &self.refs[range.clone()],
            PrimRef::parts,
            &request.bounds.aabb,
            &request.bounds.centroid,
            self.options.num_bins,
            self.options.traversal_cost,
        );

        if self.spatial_allowed(request, object.as_ref()) {
            let spatial = find_spatial_split(
                self.refs[range.clone()].iter().map(|r| &r.aabb),
                &request.bounds.aabb,
                self.options.spatial_bins,
                self.options.traversal_cost,
            );
            if let Some(spatial) = spatial {
                let cheaper = object.map_or(true, |o| spatial.cost < o.cost);
                let straddling = self.refs[range.clone()]
                    .iter()
                    .filter(|r| split_aabb(&r.aabb, spatial.axis, spatial.position).is_some())
                    .count();
                if cheaper && self.num_refs + straddling <= self.max_refs {
                    trace!(
                        "spatial split at level {} along {} at {}: cost {} (object {:?}), {} new references",
                        request.level,
                        spatial.axis,
                        spatial.position,
                        spatial.cost,
                        object.map(|o| o.cost),
                        straddling
                    );
                    let extra = self.split_references(request.start, request.count, &spatial);
                    return (
                        Some((spatial.axis, spatial.position)),
                        request.count + extra,
                    );
                }
            }
        }

        let plane = match object {
            Some(object) => Some((object.axis, object.position)),
            None => {
                let axis = request.bounds.centroid.largest_axis();
                if request.bounds.centroid.size()[axis] > 0.0 {
                    Some((axis, request.bounds.centroid.center()[axis]))
                } else {
                    None
                }
            }
        };
        (plane, request.count)
    }

    fn spatial_allowed(&self, request: &SplitRequest, object: Option<&SahSplit>) -> bool {
        if !self.options.use_splits || request.level >= self.options.max_split_depth {
            return false;
        }
        object.map_or(true, |o| {
            let overlap = o.left.intersection(&o.right).surface_area();
            let ratio = if self.root_area > 0.0 {
                overlap / self.root_area
            } else {
                0.0
            };
            ratio >= self.options.min_overlap
        })
    }

    /// Cuts every reference of `refs[start..start + count]` that straddles the
    /// split plane. The left fragment replaces the reference, the right fragment
    /// is appended behind the node's range. Returns the number of appended fragments.
    fn split_references(&mut self, start: usize, count: usize, split: &SahSplit) -> usize {
        // Everything behind this node's range belongs to subtrees that are already built.
        self.refs.truncate(start + count);
        self.refs.reserve(count);

        for i in start..start + count {
            let r = self.refs[i];
            if let Some((left, right)) = split_aabb(&r.aabb, split.axis, split.position) {
                self.refs[i] = PrimRef::new(left, r.index);
                self.refs.push(PrimRef::new(right, r.index));
            }
        }

        let extra = self.refs.len() - (start + count);
        self.num_refs += extra;
        self.spatial_splits += 1;
        extra
    }
}

impl SplitBvh {
    /// Creates a new [`SplitBvh`] from the `shapes` slice with spatial splits enabled.
    ///
    /// [`SplitBvh`]: struct.SplitBvh.html
    ///
    pub fn build<T: Bounded>(shapes: &[T]) -> Result<SplitBvh, BuildError> {
        SplitBvh::build_with_options(shapes, &BuildOptions::split())
    }

    /// Creates a new [`SplitBvh`] from the `shapes` slice.
    ///
    /// Object splits always use the binned SAH. Spatial splits are evaluated
    /// when `options.use_splits` is set, for nodes above `options.max_split_depth`,
    /// as long as the total number of references stays within
    /// `n * (1 + options.extra_ref_budget)`.
    ///
    /// Fails with [`BuildError::EmptyInput`] if `shapes` is empty.
    ///
    /// [`SplitBvh`]: struct.SplitBvh.html
    ///
    pub fn build_with_options<T: Bounded>(
        shapes: &[T],
        options: &BuildOptions,
    ) -> Result<SplitBvh, BuildError> {
        options.validate()?;
        if shapes.is_empty() {
            return Err(BuildError::EmptyInput);
        }

        let refs: Vec<PrimRef> = shapes
            .iter()
            .enumerate()
            .map(|(index, shape)| PrimRef::new(shape.aabb(), index))
            .collect();
        let (aabb, centroid) = joint_aabb_of_boxes(refs.iter().map(|r| &r.aabb));

        let n = refs.len();
        let max_refs = n + (n as Real * options.extra_ref_budget).ceil() as usize;
        let mut builder = SplitBuilder {
            options,
            refs,
            arena: NodeArena::with_capacity(2 * max_refs - 1),
            indices: Vec::with_capacity(n),
            fragment_bounds: Vec::with_capacity(n),
            height: 0,
            root_area: aabb.surface_area(),
            num_refs: n,
            max_refs,
            spatial_splits: 0,
        };

        builder.build_node(SplitRequest {
            start: 0,
            count: n,
            bounds: SideBounds { aabb, centroid },
            level: 0,
        })?;

        let SplitBuilder {
            arena,
            indices,
            fragment_bounds,
            height,
            spatial_splits,
            ..
        } = builder;
        let nodes = arena.into_nodes()?;

        debug!(
            "built split bvh over {} primitives: {} references, {} nodes, height {}, {} spatial splits",
            n,
            indices.len(),
            nodes.len(),
            height,
            spatial_splits
        );

        Ok(SplitBvh {
            bvh: Bvh::from_parts(nodes, indices, height, n, options.traversal_cost),
            fragment_bounds,
            spatial_splits,
        })
    }

    /// Returns the clipped bounds of every reference, parallel to [`Bvh::indices`].
    ///
    /// [`Bvh::indices`]: struct.Bvh.html#method.indices
    pub fn fragment_bounds(&self) -> &[Aabb] {
        &self.fragment_bounds
    }

    /// Returns how many nodes were split spatially.
    pub fn spatial_split_count(&self) -> usize {
        self.spatial_splits
    }

    /// Returns the underlying [`Bvh`], dropping the fragment bounds.
    ///
    /// [`Bvh`]: struct.Bvh.html
    pub fn into_bvh(self) -> Bvh {
        self.bvh
    }
}

impl Deref for SplitBvh {
    type Target = Bvh;

    fn deref(&self) -> &Bvh {
        &self.bvh
    }
}

impl BoundingHierarchy for SplitBvh {
    fn build_with_options<T: Bounded>(
        shapes: &[T],
        options: &BuildOptions,
    ) -> Result<Self, BuildError> {
        SplitBvh::build_with_options(shapes, options)
    }

    fn default_options() -> BuildOptions {
        BuildOptions::split()
    }

    fn bvh(&self) -> &Bvh {
        &self.bvh
    }
}
