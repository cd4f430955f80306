//! A crate which builds binary bounding volume hierarchies over axis-aligned
//! boxes, with optional spatial splits, and flattens them into GPU-ready arrays.
//!
//! ## About
//!
//! A BVH reduces the cost of ray/scene intersection queries from O(n) to
//! O(log2(n)) at the cost of building the tree once in advance. This crate
//! offers three builders:
//!
//! - [`Bvh`] with median splits, the default;
//! - [`Bvh`] with binned surface area heuristic (SAH) object splits;
//! - [`SplitBvh`], which adds spatial splits: primitives straddling a split
//!   plane are cut into fragments that end up in both subtrees.
//!
//! The resulting tree is flattened for traversal on the GPU by one of two
//! translators: [`PlainBvhTranslator`] writes one node per record with skip
//! links for stackless traversal, [`FatNodeBvhTranslator`] writes both children
//! of a node into one record.
//!
//! ## Example
//!
//! ```
//! use split_bvh::aabb::Aabb;
//! use split_bvh::config::BuildOptions;
//! use split_bvh::translator::PlainBvhTranslator;
//! use split_bvh::{build_bvh, Point3, Vector3};
//!
//! let boxes: Vec<Aabb> = (0..100)
//!     .map(|i| {
//!         let min = Point3::new(i as f32, (i % 7) as f32, 0.0);
//!         Aabb::with_bounds(min, min + Vector3::new(0.5, 0.5, 0.5))
//!     })
//!     .collect();
//!
//! let mut options = BuildOptions::default();
//! options.set_option("bvh.builder", "sah").unwrap();
//! options.set_option("bvh.sah.use_splits", true).unwrap();
//!
//! let bvh = build_bvh(&boxes, &options).unwrap();
//! assert!(bvh.indices().len() >= boxes.len());
//!
//! let mut translator = PlainBvhTranslator::new();
//! translator.process(&bvh).unwrap();
//! assert_eq!(translator.nodes()[0].aabb(), bvh.bounds());
//! ```
//!
//! ## Features
//!
//! - `rayon` (default **enabled**) - builds large subtrees and independent bottom-level trees in parallel
//! - `serde` (default **disabled**) - adds `Serialize` and `Deserialize` implementations for some types
//!
//! [`Bvh`]: bvh/struct.Bvh.html
//! [`SplitBvh`]: bvh/struct.SplitBvh.html
//! [`PlainBvhTranslator`]: translator/struct.PlainBvhTranslator.html
//! [`FatNodeBvhTranslator`]: translator/struct.FatNodeBvhTranslator.html
//!

/// Float type used by this crate. The GPU layouts are 32-bit.
pub type Real = f32;

/// Point math type used by this crate. Type alias for [`nalgebra::Point3`].
pub type Point3 = nalgebra::Point3<Real>;

/// Vector math type used by this crate. Type alias for [`nalgebra::Vector3`].
pub type Vector3 = nalgebra::Vector3<Real>;

/// A minimal floating value used as a lower bound.
pub const EPSILON: Real = 0.00001;

pub mod aabb;
pub mod axis;
pub mod bounding_hierarchy;
pub mod bvh;
pub mod config;
pub mod error;
pub mod perfect_hash;
pub mod ray;
pub mod translator;
mod utils;

#[cfg(test)]
mod testbase;

use aabb::Bounded;
use bvh::{Bvh, SplitBvh};
use config::BuildOptions;
use error::BuildError;

/// Builds a tree over `shapes` with the builder `options` select:
/// [`SplitBvh`] if `options.use_splits` is set, a [`Bvh`] with
/// `options.builder` otherwise.
///
/// [`Bvh`]: bvh/struct.Bvh.html
/// [`SplitBvh`]: bvh/struct.SplitBvh.html
pub fn build_bvh<T: Bounded>(shapes: &[T], options: &BuildOptions) -> Result<Bvh, BuildError> {
    if options.use_splits {
        SplitBvh::build_with_options(shapes, options).map(SplitBvh::into_bvh)
    } else {
        Bvh::build_with_options(shapes, options)
    }
}
