//! Flattening of a built [`Bvh`] into contiguous arrays a GPU kernel can walk
//! without pointers.
//!
//! Both layouts reuse the `w` lanes of the node boxes for integers, stored as
//! `f32` values that the kernel converts back with a numeric cast:
//!
//! - a leaf's primitive run is packed as `(start << 4) | count`, so a leaf holds
//!   at most 15 primitives;
//! - every integer must stay below `2^24` to survive the round trip through `f32`;
//! - `-1.0` marks "no value" (internal node, or end of traversal).
//!
//! [`Bvh`]: ../bvh/struct.Bvh.html

use bytemuck::{Pod, Zeroable};

use crate::aabb::Aabb;
use crate::error::TranslateError;
use crate::{Point3, Real};

mod fat_node;
mod plain;

pub use self::fat_node::*;
pub use self::plain::*;

/// Largest primitive count a packed leaf can hold.
pub const MAX_LEAF_PRIMITIVES: usize = 0xF;

/// Integers at or above this value are not exactly representable as `f32`.
pub const MAX_ENCODED_INDEX: usize = 1 << 24;

/// Value of an unused integer lane.
pub const NO_INDEX: f32 = -1.0;

/// An axis aligned box in GPU layout. The `w` lanes carry layout specific integers.
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct GpuAabb {
    pub pmin: [f32; 4],
    pub pmax: [f32; 4],
}

impl GpuAabb {
    /// Converts `aabb`, setting both `w` lanes to `min_w` and `max_w`.
    pub fn new(aabb: &Aabb, min_w: f32, max_w: f32) -> GpuAabb {
        GpuAabb {
            pmin: [aabb.min.x, aabb.min.y, aabb.min.z, min_w],
            pmax: [aabb.max.x, aabb.max.y, aabb.max.z, max_w],
        }
    }

    /// The box without its `w` lanes.
    pub fn aabb(&self) -> Aabb {
        Aabb::with_bounds(
            Point3::new(self.pmin[0], self.pmin[1], self.pmin[2]),
            Point3::new(self.pmax[0], self.pmax[1], self.pmax[2]),
        )
    }
}

/// Encodes a node or primitive index for an `f32` lane.
pub fn encode_index(value: usize) -> Result<f32, TranslateError> {
    if value < MAX_ENCODED_INDEX {
        Ok(value as Real)
    } else {
        Err(TranslateError::IndexOverflow { value })
    }
}

/// Decodes a lane written by [`encode_index`], or `None` for [`NO_INDEX`].
pub fn decode_index(lane: f32) -> Option<usize> {
    if lane < 0.0 {
        None
    } else {
        Some(lane as usize)
    }
}

/// Packs the primitive run of a leaf as `(start << 4) | count`.
///
/// # Examples
/// ```
/// use split_bvh::translator::{pack_leaf, unpack_leaf};
///
/// let lane = pack_leaf(3, 2).unwrap();
/// assert_eq!(lane, 50.0);
/// assert_eq!(unpack_leaf(lane), Some((3, 2)));
/// assert!(pack_leaf(0, 16).is_err());
/// ```
pub fn pack_leaf(start: usize, count: usize) -> Result<f32, TranslateError> {
    if count > MAX_LEAF_PRIMITIVES {
        return Err(TranslateError::LeafTooLarge { count });
    }
    let value = start
        .checked_mul(1 << 4)
        .ok_or(TranslateError::IndexOverflow { value: start })?;
    encode_index(value | count)
}

/// Inverse of [`pack_leaf`]. Returns `None` for [`NO_INDEX`].
pub fn unpack_leaf(lane: f32) -> Option<(usize, usize)> {
    decode_index(lane).map(|packed| (packed >> 4, packed & MAX_LEAF_PRIMITIVES))
}
