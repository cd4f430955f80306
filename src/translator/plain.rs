//! Pre-order flattening with skip links for stackless traversal.

use bytemuck::{Pod, Zeroable};
use log::debug;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::aabb::Aabb;
use crate::bvh::{Bvh, BvhNode};
use crate::error::TranslateError;
use crate::translator::{decode_index, encode_index, pack_leaf, unpack_leaf, GpuAabb, NO_INDEX};

/// One flattened node.
///
/// `bounds.pmin[3]` is [`NO_INDEX`] for internal nodes and the packed primitive
/// run for leaves. `bounds.pmax[3]` is the skip link: the node to continue with
/// when the ray misses this node or leaves it, [`NO_INDEX`] when traversal ends.
/// An internal node that is hit continues with the next node in the array.
///
/// [`NO_INDEX`]: constant.NO_INDEX.html
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct PlainNode {
    pub bounds: GpuAabb,
}

impl PlainNode {
    /// The node's box.
    pub fn aabb(&self) -> Aabb {
        self.bounds.aabb()
    }

    /// Returns true if this node references primitives.
    pub fn is_leaf(&self) -> bool {
        self.bounds.pmin[3] >= 0.0
    }

    /// Returns `(start, count)` of a leaf, or `None` for an internal node.
    pub fn primitives(&self) -> Option<(usize, usize)> {
        unpack_leaf(self.bounds.pmin[3])
    }

    /// Returns the skip link, or `None` at the end of traversal.
    pub fn next(&self) -> Option<usize> {
        decode_index(self.bounds.pmax[3])
    }
}

/// Flattens one tree into the node range starting at `base`.
/// Leaf starts are shifted by `offset`.
struct TreeFlattener<'a> {
    bvh: &'a Bvh,
    base: usize,
    offset: usize,
    nodes: Vec<PlainNode>,
    /// Absolute position of the right child of every internal node.
    right: Vec<Option<usize>>,
}

impl TreeFlattener<'_> {
    fn flatten(bvh: &Bvh, base: usize, offset: usize) -> Result<Vec<PlainNode>, TranslateError> {
        let mut flattener = TreeFlattener {
            bvh,
            base,
            offset,
            nodes: Vec::with_capacity(bvh.nodes().len()),
            right: Vec::with_capacity(bvh.nodes().len()),
        };
        flattener.emit(bvh.root())?;
        flattener.link()
    }

    /// Appends the subtree at `node_index` in pre-order and returns the position of its root.
    fn emit(&mut self, node_index: usize) -> Result<usize, TranslateError> {
        let position = self.base + self.nodes.len();
        match self.bvh.nodes()[node_index] {
            BvhNode::Leaf { aabb, start, count } => {
                let lane = pack_leaf(start + self.offset, count)?;
                self.nodes.push(PlainNode {
                    bounds: GpuAabb::new(&aabb, lane, NO_INDEX),
                });
                self.right.push(None);
            }
            BvhNode::Node {
                aabb,
                child_l,
                child_r,
            } => {
                let local = self.nodes.len();
                self.nodes.push(PlainNode {
                    bounds: GpuAabb::new(&aabb, NO_INDEX, NO_INDEX),
                });
                self.right.push(None);
                self.emit(child_l)?;
                let right = self.emit(child_r)?;
                self.right[local] = Some(right);
            }
        }
        Ok(position)
    }

    /// Turns the right child positions into skip links.
    fn link(mut self) -> Result<Vec<PlainNode>, TranslateError> {
        // Pre-order puts every parent before its children, so `next[i]` is final when read.
        let mut next: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for i in 0..self.nodes.len() {
            if let Some(right) = self.right[i] {
                next[i + 1] = Some(right);
                next[right - self.base] = next[i];
            }
        }
        for (node, next) in self.nodes.iter_mut().zip(next) {
            node.bounds.pmax[3] = match next {
                Some(next) => encode_index(next)?,
                None => NO_INDEX,
            };
        }
        Ok(self.nodes)
    }
}

/// A bottom-level tree of a forest and where it goes.
struct BottomJob<'a> {
    bvh: &'a Bvh,
    base: usize,
    offset: usize,
}

#[cfg(feature = "rayon")]
fn flatten_bottoms(jobs: &[BottomJob]) -> Result<Vec<Vec<PlainNode>>, TranslateError> {
    jobs.par_iter()
        .map(|job| TreeFlattener::flatten(job.bvh, job.base, job.offset))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn flatten_bottoms(jobs: &[BottomJob]) -> Result<Vec<Vec<PlainNode>>, TranslateError> {
    jobs.iter()
        .map(|job| TreeFlattener::flatten(job.bvh, job.base, job.offset))
        .collect()
}

/// Flattens a [`Bvh`], or a two-level forest of them, into [`PlainNode`]s.
///
/// # Examples
/// ```
/// use split_bvh::aabb::Aabb;
/// use split_bvh::bvh::Bvh;
/// use split_bvh::translator::PlainBvhTranslator;
/// use split_bvh::Point3;
///
/// let boxes = vec![
///     Aabb::with_bounds(Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 1.0, 1.0)),
///     Aabb::with_bounds(Point3::new(2.0, 0.0, 0.0), Point3::new(3.0, 1.0, 1.0)),
/// ];
/// let bvh = Bvh::build(&boxes).unwrap();
///
/// let mut translator = PlainBvhTranslator::new();
/// translator.process(&bvh).unwrap();
///
/// let nodes = translator.nodes();
/// assert_eq!(nodes.len(), 3);
/// assert_eq!(nodes[0].aabb(), bvh.bounds());
/// assert_eq!(nodes[0].next(), None);
/// assert_eq!(nodes[1].next(), Some(2));
/// ```
///
/// [`Bvh`]: ../bvh/struct.Bvh.html
/// [`PlainNode`]: struct.PlainNode.html
#[derive(Debug, Clone, Default)]
pub struct PlainBvhTranslator {
    nodes: Vec<PlainNode>,
    roots: Vec<Option<usize>>,
    root: usize,
}

impl PlainBvhTranslator {
    pub fn new() -> PlainBvhTranslator {
        PlainBvhTranslator::default()
    }

    /// Replaces the contents with the flattening of `bvh`, rooted at position 0.
    pub fn process(&mut self, bvh: &Bvh) -> Result<(), TranslateError> {
        let nodes = TreeFlattener::flatten(bvh, 0, 0)?;
        debug!("flattened {} nodes with skip links", nodes.len());
        self.nodes = nodes;
        self.roots.clear();
        self.root = 0;
        Ok(())
    }

    /// Replaces the contents with a two-level forest.
    ///
    /// The bottom trees are stored first, in order, skipping absent ones. The
    /// leaves of `bottoms[i]` have their primitive starts shifted by `offsets[i]`
    /// and its skip links end inside its own range. `top` follows them; its
    /// leaves keep their primitive starts unshifted.
    pub fn process_forest(
        &mut self,
        bottoms: &[Option<&Bvh>],
        offsets: &[usize],
        top: &Bvh,
    ) -> Result<(), TranslateError> {
        if bottoms.len() != offsets.len() {
            return Err(TranslateError::OffsetCountMismatch {
                trees: bottoms.len(),
                offsets: offsets.len(),
            });
        }

        let mut roots = Vec::with_capacity(bottoms.len());
        let mut jobs = Vec::new();
        let mut base = 0;
        for (bottom, &offset) in bottoms.iter().zip(offsets) {
            match bottom {
                Some(bvh) => {
                    roots.push(Some(base));
                    jobs.push(BottomJob { bvh, base, offset });
                    base += bvh.nodes().len();
                }
                None => roots.push(None),
            }
        }

        let mut nodes = Vec::with_capacity(base + top.nodes().len());
        for flat in flatten_bottoms(&jobs)? {
            nodes.extend(flat);
        }
        nodes.extend(TreeFlattener::flatten(top, base, 0)?);

        debug!(
            "flattened forest of {} bottom trees: {} nodes, top level at {}",
            jobs.len(),
            nodes.len(),
            base
        );

        self.nodes = nodes;
        self.roots = roots;
        self.root = base;
        Ok(())
    }

    /// Re-flattens only the top-level tree, keeping every bottom tree in place.
    /// The array is cut at [`root`] first, so `top` may have a different node count.
    ///
    /// [`root`]: struct.PlainBvhTranslator.html#method.root
    pub fn update_top_level(&mut self, top: &Bvh) -> Result<(), TranslateError> {
        if self.nodes.is_empty() {
            return Err(TranslateError::NoTopLevel);
        }
        let flat = TreeFlattener::flatten(top, self.root, 0)?;
        self.nodes.truncate(self.root);
        self.nodes.extend(flat);
        debug!(
            "updated top level at {}: {} nodes in total",
            self.root,
            self.nodes.len()
        );
        Ok(())
    }

    /// The flattened nodes.
    pub fn nodes(&self) -> &[PlainNode] {
        &self.nodes
    }

    /// Root position of every bottom tree of the last forest, `None` for absent trees.
    pub fn roots(&self) -> &[Option<usize>] {
        &self.roots
    }

    /// Position of the top-level root, `0` for a single tree.
    pub fn root(&self) -> usize {
        self.root
    }

    /// The nodes as raw bytes, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.nodes)
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
        self.root = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::{PlainBvhTranslator, PlainNode};
    use crate::aabb::Aabb;
    use crate::bvh::{Bvh, SplitBvh};
    use crate::config::BuildOptions;
    use crate::error::TranslateError;
    use crate::ray::Ray;
    use crate::testbase::{brute_force_hits, random_boxes, some_rays};
    use crate::Vector3;
    use std::collections::HashSet;

    /// Walks the skip links from `root`, descending into every internal node.
    fn walk_all(nodes: &[PlainNode], root: usize) -> Vec<usize> {
        let mut visited = Vec::new();
        let mut current = Some(root);
        while let Some(i) = current {
            visited.push(i);
            assert!(visited.len() <= nodes.len(), "skip links loop");
            current = if nodes[i].is_leaf() {
                nodes[i].next()
            } else {
                Some(i + 1)
            };
        }
        visited
    }

    /// Stackless traversal as the kernel runs it, returning the primitive indices
    /// whose boxes are hit.
    fn traverse(
        nodes: &[PlainNode],
        root: usize,
        indices: &[usize],
        boxes: &[Aabb],
        ray: &Ray,
    ) -> HashSet<usize> {
        let mut hits = HashSet::new();
        let mut current = Some(root);
        while let Some(i) = current {
            let node = nodes[i];
            if !ray.intersects_aabb(&node.aabb(), f32::INFINITY) {
                current = node.next();
                continue;
            }
            match node.primitives() {
                Some((start, count)) => {
                    for &index in &indices[start..start + count] {
                        if ray.intersects_aabb(&boxes[index], f32::INFINITY) {
                            hits.insert(index);
                        }
                    }
                    current = node.next();
                }
                None => current = Some(i + 1),
            }
        }
        hits
    }

    #[test]
    /// The root box is the tree's bounds and every node is visited exactly once.
    fn test_skip_links_visit_every_node() {
        let boxes = random_boxes(300, 21);
        let bvh = Bvh::build(&boxes).unwrap();
        let mut translator = PlainBvhTranslator::new();
        translator.process(&bvh).unwrap();

        let nodes = translator.nodes();
        assert_eq!(nodes.len(), bvh.nodes().len());
        assert_eq!(nodes[0].aabb(), bvh.bounds());
        assert_eq!(nodes[0].next(), None);

        let visited = walk_all(nodes, 0);
        assert_eq!(visited.len(), nodes.len());
        assert_eq!(visited, (0..nodes.len()).collect::<Vec<_>>());
    }

    #[test]
    /// Leaves carry their primitive runs, internal nodes carry none.
    fn test_leaf_encoding() {
        let boxes = random_boxes(100, 4);
        let bvh = Bvh::build(&boxes).unwrap();
        let mut translator = PlainBvhTranslator::new();
        translator.process(&bvh).unwrap();

        let mut covered = Vec::new();
        for node in translator.nodes() {
            match node.primitives() {
                Some((start, count)) => covered.extend(start..start + count),
                None => assert!(!node.is_leaf()),
            }
        }
        covered.sort_unstable();
        assert_eq!(covered, (0..boxes.len()).collect::<Vec<_>>());
        assert_eq!(translator.as_bytes().len(), 32 * translator.nodes().len());
    }

    #[test]
    /// Stackless traversal finds exactly the boxes a brute force test finds.
    fn test_traversal_matches_brute_force() {
        let boxes = random_boxes(500, 8);
        let bvh = Bvh::build_with_options(&boxes, &BuildOptions::sah()).unwrap();
        let mut translator = PlainBvhTranslator::new();
        translator.process(&bvh).unwrap();

        for ray in some_rays(100, 9) {
            let hits = traverse(translator.nodes(), 0, bvh.indices(), &boxes, &ray);
            assert_eq!(hits, brute_force_hits(&boxes, &ray));
        }
    }

    #[test]
    /// Leaves holding fragments are still found through the original primitive index.
    fn test_split_bvh_traversal() {
        let mut boxes = random_boxes(200, 30);
        for i in 0..20 {
            let min = crate::Point3::new(0.0, i as f32 * 5.0, 50.0);
            boxes.push(Aabb::with_bounds(min, min + Vector3::new(100.0, 0.5, 0.5)));
        }
        let bvh = SplitBvh::build(&boxes).unwrap();
        let mut translator = PlainBvhTranslator::new();
        translator.process(&bvh).unwrap();
        assert_eq!(walk_all(translator.nodes(), 0).len(), bvh.nodes().len());

        for ray in some_rays(100, 31) {
            let hits = traverse(translator.nodes(), 0, bvh.indices(), &boxes, &ray);
            assert_eq!(hits, brute_force_hits(&boxes, &ray));
        }
    }

    #[test]
    /// A single leaf flattens to one node without links.
    fn test_single_leaf() {
        let boxes = random_boxes(1, 2);
        let bvh = Bvh::build(&boxes).unwrap();
        let mut translator = PlainBvhTranslator::new();
        translator.process(&bvh).unwrap();
        assert_eq!(translator.nodes().len(), 1);
        assert_eq!(translator.nodes()[0].primitives(), Some((0, 1)));
        assert_eq!(translator.nodes()[0].next(), None);
    }

    #[test]
    /// Bottom trees are laid out first with shifted leaves, the top tree last.
    fn test_forest_layout() {
        let a_boxes = random_boxes(40, 1);
        let b_boxes = random_boxes(25, 2);
        let a = Bvh::build(&a_boxes).unwrap();
        let b = Bvh::build(&b_boxes).unwrap();
        let top = Bvh::build(&[a.bounds(), b.bounds()]).unwrap();

        let mut translator = PlainBvhTranslator::new();
        translator
            .process_forest(&[Some(&a), None, Some(&b)], &[0, 0, 40], &top)
            .unwrap();

        let (a_len, b_len) = (a.nodes().len(), b.nodes().len());
        assert_eq!(translator.roots(), &[Some(0), None, Some(a_len)]);
        assert_eq!(translator.root(), a_len + b_len);
        assert_eq!(translator.nodes().len(), a_len + b_len + top.nodes().len());

        let nodes = translator.nodes();
        assert_eq!(walk_all(nodes, 0), (0..a_len).collect::<Vec<_>>());
        assert_eq!(walk_all(nodes, a_len), (a_len..a_len + b_len).collect::<Vec<_>>());
        assert_eq!(
            walk_all(nodes, translator.root()).len(),
            top.nodes().len()
        );
        assert_eq!(nodes[translator.root()].aabb(), top.bounds());

        let mut b_starts: Vec<usize> = nodes[a_len..a_len + b_len]
            .iter()
            .filter_map(|n| n.primitives())
            .flat_map(|(start, count)| start..start + count)
            .collect();
        b_starts.sort_unstable();
        assert_eq!(b_starts, (40..65).collect::<Vec<_>>());
    }

    #[test]
    /// Updating the top level leaves the bottom trees untouched.
    fn test_update_top_level() {
        let a_boxes = random_boxes(30, 3);
        let a = Bvh::build(&a_boxes).unwrap();
        let top = Bvh::build(&[a.bounds()]).unwrap();

        let mut translator = PlainBvhTranslator::new();
        translator.process_forest(&[Some(&a)], &[0], &top).unwrap();
        let bottom: Vec<PlainNode> = translator.nodes()[..translator.root()].to_vec();

        let moved = Aabb::with_bounds(
            a.bounds().min + Vector3::new(10.0, 0.0, 0.0),
            a.bounds().max + Vector3::new(10.0, 0.0, 0.0),
        );
        let new_top = Bvh::build(&[a.bounds(), moved, a.bounds()]).unwrap();
        translator.update_top_level(&new_top).unwrap();

        assert_eq!(&translator.nodes()[..translator.root()], &bottom[..]);
        assert_eq!(
            translator.nodes().len(),
            translator.root() + new_top.nodes().len()
        );
        assert_eq!(
            walk_all(translator.nodes(), translator.root()).len(),
            new_top.nodes().len()
        );
    }

    #[test]
    /// Misuse of the forest interface is reported.
    fn test_forest_errors() {
        let boxes = random_boxes(10, 3);
        let bvh = Bvh::build(&boxes).unwrap();
        let mut translator = PlainBvhTranslator::new();
        assert_eq!(
            translator.process_forest(&[Some(&bvh)], &[], &bvh),
            Err(TranslateError::OffsetCountMismatch {
                trees: 1,
                offsets: 0
            })
        );
        assert_eq!(
            translator.update_top_level(&bvh),
            Err(TranslateError::NoTopLevel)
        );

        translator.process(&bvh).unwrap();
        translator.clear();
        assert!(translator.nodes().is_empty());
    }

    #[test]
    /// Leaves with more primitives than the packing holds are rejected.
    fn test_leaf_too_large() {
        let boxes = random_boxes(40, 5);
        let options = BuildOptions {
            max_depth: 1,
            ..Default::default()
        };
        let bvh = Bvh::build_with_options(&boxes, &options).unwrap();
        let mut translator = PlainBvhTranslator::new();
        assert!(matches!(
            translator.process(&bvh),
            Err(TranslateError::LeafTooLarge { .. })
        ));
    }
}
