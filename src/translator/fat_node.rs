//! Breadth-first flattening into records holding both children of a node.

use std::collections::VecDeque;

use bytemuck::{Pod, Zeroable};
use log::debug;

use crate::aabb::Aabb;
use crate::bvh::{Bvh, BvhNode};
use crate::error::TranslateError;
use crate::perfect_hash::PerfectHashMap;
use crate::translator::{decode_index, encode_index, pack_leaf, unpack_leaf, GpuAabb, NO_INDEX};

/// Address the hash map returns for handles that have no record.
pub const NO_ADDRESS: i32 = -1;

/// One record per internal node, holding the boxes of its two children.
///
/// For an internal child `bounds[c].pmin[3]` is [`NO_INDEX`] and
/// `bounds[c].pmax[3]` the address of the child's record. For a leaf child
/// `bounds[c].pmin[3]` is its packed primitive run and `bounds[c].pmax[3]` is
/// [`NO_INDEX`].
///
/// [`NO_INDEX`]: constant.NO_INDEX.html
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct FatNode {
    pub bounds: [GpuAabb; 2],
}

/// A decoded child slot of a [`FatNode`].
///
/// [`FatNode`]: struct.FatNode.html
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FatChild {
    /// An internal child, stored at this address.
    Node(usize),
    /// A leaf child.
    Leaf { start: usize, count: usize },
}

impl FatNode {
    /// Box of child `c` (0 or 1).
    pub fn child_aabb(&self, c: usize) -> Aabb {
        self.bounds[c].aabb()
    }

    /// Decodes child `c` (0 or 1). Returns `None` for a malformed slot.
    pub fn child(&self, c: usize) -> Option<FatChild> {
        let bounds = &self.bounds[c];
        match unpack_leaf(bounds.pmin[3]) {
            Some((start, count)) => Some(FatChild::Leaf { start, count }),
            None => decode_index(bounds.pmax[3]).map(FatChild::Node),
        }
    }
}

fn handle_of(node_index: usize) -> Result<u32, TranslateError> {
    u32::try_from(node_index).map_err(|_| TranslateError::IndexOverflow { value: node_index })
}

/// Flattens a [`Bvh`] into [`FatNode`]s in breadth-first order.
///
/// Every record gets a handle, the arena index of its node in the source
/// [`Bvh`]. A [`PerfectHashMap`] maps each handle to the record's address.
///
/// # Examples
/// ```
/// use split_bvh::aabb::Aabb;
/// use split_bvh::bvh::Bvh;
/// use split_bvh::translator::{FatChild, FatNodeBvhTranslator};
/// use split_bvh::Point3;
///
/// let boxes: Vec<Aabb> = (0..4)
///     .map(|i| {
///         let min = Point3::new(i as f32 * 2.0, 0.0, 0.0);
///         Aabb::with_bounds(min, Point3::new(min.x + 1.0, 1.0, 1.0))
///     })
///     .collect();
/// let bvh = Bvh::build(&boxes).unwrap();
///
/// let mut translator = FatNodeBvhTranslator::new();
/// translator.process(&bvh).unwrap();
///
/// assert_eq!(translator.nodes().len(), 3);
/// assert_eq!(translator.address_of(bvh.root() as u32), Some(0));
/// assert!(matches!(translator.nodes()[0].child(0), Some(FatChild::Node(_))));
/// ```
///
/// [`Bvh`]: ../bvh/struct.Bvh.html
/// [`FatNode`]: struct.FatNode.html
/// [`PerfectHashMap`]: ../perfect_hash/struct.PerfectHashMap.html
#[derive(Debug, Clone, Default)]
pub struct FatNodeBvhTranslator {
    nodes: Vec<FatNode>,
    handles: Vec<u32>,
    hash_map: Option<PerfectHashMap<u32, i32>>,
}

impl FatNodeBvhTranslator {
    pub fn new() -> FatNodeBvhTranslator {
        FatNodeBvhTranslator::default()
    }

    /// Replaces the contents with the flattening of `bvh`.
    ///
    /// A tree that is a single leaf becomes one record whose second child is an
    /// empty box with an empty primitive run.
    pub fn process(&mut self, bvh: &Bvh) -> Result<(), TranslateError> {
        let mut nodes: Vec<FatNode> = Vec::new();
        let mut handles: Vec<u32> = Vec::new();

        if let BvhNode::Leaf { aabb, start, count } = *bvh.root_node() {
            nodes.push(FatNode {
                bounds: [
                    GpuAabb::new(&aabb, pack_leaf(start, count)?, NO_INDEX),
                    GpuAabb::new(&Aabb::empty(), pack_leaf(0, 0)?, NO_INDEX),
                ],
            });
            handles.push(handle_of(bvh.root())?);
        } else {
            // (node, slot of the parent record pointing here)
            let mut queue: VecDeque<(usize, Option<(usize, usize)>)> = VecDeque::new();
            queue.push_back((bvh.root(), None));

            while let Some((node_index, parent)) = queue.pop_front() {
                let address = nodes.len();
                if let Some((record, c)) = parent {
                    nodes[record].bounds[c].pmax[3] = encode_index(address)?;
                }

                let mut record = FatNode::zeroed();
                if let Some((child_l, child_r)) = bvh.nodes()[node_index].children() {
                    for (c, child) in [child_l, child_r].into_iter().enumerate() {
                        record.bounds[c] = match bvh.nodes()[child] {
                            BvhNode::Leaf { aabb, start, count } => {
                                GpuAabb::new(&aabb, pack_leaf(start, count)?, NO_INDEX)
                            }
                            BvhNode::Node { aabb, .. } => {
                                queue.push_back((child, Some((address, c))));
                                GpuAabb::new(&aabb, NO_INDEX, NO_INDEX)
                            }
                        };
                    }
                }
                nodes.push(record);
                handles.push(handle_of(node_index)?);
            }
        }

        let addresses = (0..nodes.len())
            .map(|address| encode_index(address).map(|_| address as i32))
            .collect::<Result<Vec<i32>, TranslateError>>()?;
        let max_handle = handle_of(bvh.nodes().len().saturating_sub(1))?;
        let hash_map = PerfectHashMap::new(max_handle, &handles, &addresses, NO_ADDRESS)?;

        debug!(
            "flattened {} fat nodes, handle table {}x{}",
            nodes.len(),
            hash_map.table_dim(),
            hash_map.table_dim()
        );

        self.nodes = nodes;
        self.handles = handles;
        self.hash_map = Some(hash_map);
        Ok(())
    }

    /// The flattened records.
    pub fn nodes(&self) -> &[FatNode] {
        &self.nodes
    }

    /// Handle of every record, parallel to [`nodes`].
    ///
    /// [`nodes`]: struct.FatNodeBvhTranslator.html#method.nodes
    pub fn handles(&self) -> &[u32] {
        &self.handles
    }

    /// The handle to address map, `None` before the first [`process`].
    ///
    /// [`process`]: struct.FatNodeBvhTranslator.html#method.process
    pub fn hash_map(&self) -> Option<&PerfectHashMap<u32, i32>> {
        self.hash_map.as_ref()
    }

    /// Address of the record with `handle`.
    pub fn address_of(&self, handle: u32) -> Option<usize> {
        let address = self.hash_map.as_ref()?.get(handle);
        usize::try_from(address).ok()
    }

    /// The records as raw bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.handles.clear();
        self.hash_map = None;
    }
}
