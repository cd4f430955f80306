//! This module defines the `BoundingHierarchy` trait.

use crate::aabb::Bounded;
use crate::bvh::Bvh;
use crate::config::BuildOptions;
use crate::error::BuildError;

/// This trait defines a builder of binary bounding volume hierarchies.
/// Both the plain and the spatial split builder produce a [`Bvh`] that the
/// translators flatten into GPU layouts.
///
/// [`Bvh`]: ../bvh/struct.Bvh.html
pub trait BoundingHierarchy: Sized {
    /// Creates a new [`BoundingHierarchy`] from the `shapes` slice with this
    /// builder's [`default_options`].
    ///
    /// [`BoundingHierarchy`]: trait.BoundingHierarchy.html
    /// [`default_options`]: trait.BoundingHierarchy.html#tymethod.default_options
    ///
    /// # Examples
    /// ```
    /// use split_bvh::aabb::Aabb;
    /// use split_bvh::bounding_hierarchy::BoundingHierarchy;
    /// use split_bvh::bvh::SplitBvh;
    /// use split_bvh::Point3;
    ///
    /// let boxes = vec![
    ///     Aabb::with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
    ///     Aabb::with_bounds(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)),
    /// ];
    /// let bh = <SplitBvh as BoundingHierarchy>::build(&boxes).unwrap();
    /// assert_eq!(bh.bvh().nodes().len(), 3);
    /// ```
    ///
    fn build<T: Bounded>(shapes: &[T]) -> Result<Self, BuildError> {
        Self::build_with_options(shapes, &Self::default_options())
    }

    /// Creates a new [`BoundingHierarchy`] from the `shapes` slice.
    ///
    /// [`BoundingHierarchy`]: trait.BoundingHierarchy.html
    ///
    fn build_with_options<T: Bounded>(
        shapes: &[T],
        options: &BuildOptions,
    ) -> Result<Self, BuildError>;

    /// The options [`BoundingHierarchy::build`] uses.
    fn default_options() -> BuildOptions;

    /// Returns the tree.
    fn bvh(&self) -> &Bvh;

    /// Prints the [`BoundingHierarchy`] in a tree-like visualization.
    ///
    /// [`BoundingHierarchy`]: trait.BoundingHierarchy.html
    ///
    fn pretty_print(&self) {
        self.bvh().pretty_print();
    }
}
