//! This module defines a binary [`Bvh`], its nodes, and the spatial split
//! builder [`SplitBvh`].
//!
//! [`Bvh`]: struct.Bvh.html
//! [`SplitBvh`]: struct.SplitBvh.html
//!

mod bvh_impl;
mod bvh_node;
mod partition;
mod sah;
mod split_bvh;

pub use self::bvh_impl::*;
pub use self::bvh_node::BvhNode;
pub use self::split_bvh::*;
