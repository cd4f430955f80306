use crate::aabb::Aabb;
use crate::error::BuildError;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

/// The [`BvhNode`] enum that describes a node in a [`Bvh`].
/// It's either a leaf node and references a run of primitives in [`Bvh::indices`]
/// or a regular node that has two child nodes.
/// Both variants store the bounds of their whole subtree.
///
/// [`Bvh`]: struct.Bvh.html
/// [`Bvh::indices`]: struct.Bvh.html#method.indices
///
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BvhNode {
    /// Leaf node.
    Leaf {
        /// The convex hull of the primitives in this leaf.
        aabb: Aabb,

        /// Position of the first primitive of this leaf in the index array.
        start: usize,

        /// Number of primitives stored in this leaf.
        count: usize,
    },
    /// Inner node.
    Node {
        /// The convex hull of both subtrees.
        aabb: Aabb,

        /// Index of the left subtree's root node.
        child_l: usize,

        /// Index of the right subtree's root node.
        child_r: usize,
    },
}

impl BvhNode {
    /// Returns the bounds of the subtree rooted at this node.
    pub fn aabb(&self) -> Aabb {
        match *self {
            BvhNode::Leaf { aabb, .. } | BvhNode::Node { aabb, .. } => aabb,
        }
    }

    /// Returns true if this node is a leaf.
    pub fn is_leaf(&self) -> bool {
        matches!(self, BvhNode::Leaf { .. })
    }

    /// Returns the index of the left child node.
    pub fn child_l(&self) -> usize {
        match *self {
            BvhNode::Node { child_l, .. } => child_l,
            _ => panic!("Tried to get the left child of a leaf node."),
        }
    }

    /// Returns the index of the right child node.
    pub fn child_r(&self) -> usize {
        match *self {
            BvhNode::Node { child_r, .. } => child_r,
            _ => panic!("Tried to get the right child of a leaf node."),
        }
    }

    /// Returns both children of an inner node, or `None` for a leaf.
    pub fn children(&self) -> Option<(usize, usize)> {
        match *self {
            BvhNode::Node {
                child_l, child_r, ..
            } => Some((child_l, child_r)),
            BvhNode::Leaf { .. } => None,
        }
    }

    /// Returns the range of the index array covered by a leaf, or `None` for an inner node.
    pub fn primitive_range(&self) -> Option<Range<usize>> {
        match *self {
            BvhNode::Leaf { start, count, .. } => Some(start..start + count),
            BvhNode::Node { .. } => None,
        }
    }
}

/// Pre-sized storage for the nodes of a build.
///
/// Slots are handed out by an atomic counter, so subtrees that build
/// concurrently never receive the same slot. Every slot is written exactly once.
pub(crate) struct NodeArena {
    slots: Vec<OnceLock<BvhNode>>,
    next: AtomicUsize,
}

impl NodeArena {
    pub fn with_capacity(capacity: usize) -> NodeArena {
        NodeArena {
            slots: (0..capacity).map(|_| OnceLock::new()).collect(),
            next: AtomicUsize::new(0),
        }
    }

    /// Reserves the next free slot and returns its index.
    pub fn allocate(&self) -> Result<usize, BuildError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        if index < self.slots.len() {
            Ok(index)
        } else {
            Err(BuildError::ArenaExhausted {
                capacity: self.slots.len(),
            })
        }
    }

    /// Stores `node` in a slot previously returned by [`NodeArena::allocate`].
    pub fn write(&self, index: usize, node: BvhNode) {
        let written = self.slots[index].set(node);
        debug_assert!(written.is_ok(), "node slot {index} written twice");
    }

    /// Number of slots handed out so far.
    pub fn allocated(&self) -> usize {
        self.next.load(Ordering::Relaxed).min(self.slots.len())
    }

    /// Consumes the arena and returns the allocated nodes in slot order.
    pub fn into_nodes(self) -> Result<Vec<BvhNode>, BuildError> {
        let allocated = self.allocated();
        self.slots
            .into_iter()
            .take(allocated)
            .enumerate()
            .map(|(index, slot)| slot.into_inner().ok_or(BuildError::UnfilledNode(index)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{BvhNode, NodeArena};
    use crate::aabb::Aabb;
    use crate::error::BuildError;
    use std::collections::HashSet;

    #[test]
    /// Allocation beyond the capacity fails instead of overwriting.
    fn test_arena_exhaustion() {
        let arena = NodeArena::with_capacity(2);
        assert_eq!(arena.allocate(), Ok(0));
        assert_eq!(arena.allocate(), Ok(1));
        assert_eq!(
            arena.allocate(),
            Err(BuildError::ArenaExhausted { capacity: 2 })
        );
        assert_eq!(arena.allocated(), 2);
    }

    #[test]
    /// A slot that was allocated but never written is reported.
    fn test_arena_unfilled_slot() {
        let arena = NodeArena::with_capacity(4);
        let a = arena.allocate().unwrap();
        let _b = arena.allocate().unwrap();
        arena.write(
            a,
            BvhNode::Leaf {
                aabb: Aabb::empty(),
                start: 0,
                count: 1,
            },
        );
        assert_eq!(arena.into_nodes(), Err(BuildError::UnfilledNode(1)));
    }

    #[test]
    /// Concurrent allocation never hands out the same slot twice.
    fn test_arena_concurrent_allocation() {
        let arena = NodeArena::with_capacity(4000);
        let slots: Vec<Vec<usize>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        (0..1000)
                            .map(|_| arena.allocate().unwrap())
                            .collect::<Vec<usize>>()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let unique: HashSet<usize> = slots.iter().flatten().copied().collect();
        assert_eq!(unique.len(), 4000);
        assert!(arena.allocate().is_err());
    }

    #[test]
    /// Leaf accessors expose the primitive range.
    fn test_node_accessors() {
        let leaf = BvhNode::Leaf {
            aabb: Aabb::empty(),
            start: 3,
            count: 2,
        };
        assert!(leaf.is_leaf());
        assert_eq!(leaf.primitive_range(), Some(3..5));
        assert_eq!(leaf.children(), None);

        let node = BvhNode::Node {
            aabb: Aabb::empty(),
            child_l: 1,
            child_r: 2,
        };
        assert_eq!(node.children(), Some((1, 2)));
        assert_eq!(node.child_r(), 2);
    }

    #[test]
    #[should_panic(expected = "left child of a leaf")]
    /// Asking a leaf for a child panics.
    fn test_leaf_has_no_children() {
        let leaf = BvhNode::Leaf {
            aabb: Aabb::empty(),
            start: 0,
            count: 1,
        };
        leaf.child_l();
    }
}
