use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;
use glam::Vec3;
use std::cmp::Ordering;

use super::node::{Node, NodeChild};

/// A static binary bounding volume tree built once over a fixed set of leaf bounds.
#[repr(C)]
pub struct Tree {
    /// Node storage; the root is node 0.
    pub nodes: Buffer<Node>,
    /// How many nodes are live in the storage.
    pub node_count: i32,
    /// How many leaves the tree indexes.
    pub leaf_count: i32,
}

/// Upper bound on the explicit stack used by traversals.
pub const TRAVERSAL_STACK_CAPACITY: usize = 256;

impl Tree {
    /// Encodes a leaf index into the negative-index form used by node children.
    #[inline(always)]
    pub fn encode(index: i32) -> i32 {
        -1 - index
    }

    /// Builds a tree over the given leaf bounds by recursive median splits along the
    /// widest centroid axis. Leaf i of the tree corresponds to bounds[i].
    pub fn create_for_bounds(bounds: &Buffer<BoundingBox>, leaf_count: i32, pool: &mut BufferPool) -> Self {
        debug_assert!(leaf_count >= 0 && leaf_count <= bounds.len());
        // A root node is allocated no matter how few leaves there are, which spares the
        // queries from null checks.
        let mut tree = Self {
            nodes: pool.take((leaf_count - 1).max(1)),
            node_count: 1,
            leaf_count,
        };
        *tree.nodes.get_mut(0) = Node {
            a: NodeChild::empty(),
            b: NodeChild::empty(),
        };
        if leaf_count == 1 {
            let leaf_bounds = bounds.get(0);
            tree.nodes.get_mut(0).a = NodeChild {
                min: leaf_bounds.min,
                index: Self::encode(0),
                max: leaf_bounds.max,
                leaf_count: 1,
            };
        } else if leaf_count > 1 {
            let mut indices: Buffer<i32> = pool.take(leaf_count);
            for i in 0..leaf_count {
                *indices.get_mut(i) = i;
            }
            tree.node_count = 0;
            tree.build_node(indices.as_slice_mut(), bounds);
            debug_assert!(tree.node_count == leaf_count - 1);
            pool.return_buffer(&mut indices);
        }
        tree
    }

    fn build_node(&mut self, indices: &mut [i32], bounds: &Buffer<BoundingBox>) -> i32 {
        debug_assert!(indices.len() >= 2);
        let node_index = self.node_count;
        self.node_count += 1;

        // Split along the axis with the widest centroid spread. Box centroids only feed a
        // comparison, so the unhalved min + max stands in for them.
        let mut centroid_min = Vec3::MAX;
        let mut centroid_max = Vec3::MIN;
        for index in indices.iter() {
            let leaf_bounds = bounds.get(*index);
            let centroid = leaf_bounds.min + leaf_bounds.max;
            centroid_min = centroid_min.min(centroid);
            centroid_max = centroid_max.max(centroid);
        }
        let span = centroid_max - centroid_min;
        let axis = if span.x >= span.y && span.x >= span.z {
            0
        } else if span.y >= span.z {
            1
        } else {
            2
        };
        indices.sort_unstable_by(|left, right| {
            let left_centroid = bounds.get(*left).min[axis] + bounds.get(*left).max[axis];
            let right_centroid = bounds.get(*right).min[axis] + bounds.get(*right).max[axis];
            left_centroid.partial_cmp(&right_centroid).unwrap_or(Ordering::Equal)
        });

        let middle = indices.len() / 2;
        let (left, right) = indices.split_at_mut(middle);
        let a = self.build_child(left, bounds);
        let b = self.build_child(right, bounds);
        *self.nodes.get_mut(node_index) = Node { a, b };
        node_index
    }

    fn build_child(&mut self, indices: &mut [i32], bounds: &Buffer<BoundingBox>) -> NodeChild {
        if indices.len() == 1 {
            let leaf_index = indices[0];
            let leaf_bounds = bounds.get(leaf_index);
            NodeChild {
                min: leaf_bounds.min,
                index: Self::encode(leaf_index),
                max: leaf_bounds.max,
                leaf_count: 1,
            }
        } else {
            let child_leaf_count = indices.len() as i32;
            let child_index = self.build_node(indices, bounds);
            let node = self.nodes.get(child_index);
            let merged = BoundingBox::create_merged(
                &BoundingBox::new(node.a.min, node.a.max),
                &BoundingBox::new(node.b.min, node.b.max),
            );
            NodeChild {
                min: merged.min,
                index: child_index,
                max: merged.max,
                leaf_count: child_leaf_count,
            }
        }
    }

    /// Hands the node storage back to the pool and empties the tree.
    pub fn dispose(&mut self, pool: &mut BufferPool) {
        if self.nodes.allocated() {
            pool.return_buffer(&mut self.nodes);
        }
        self.node_count = 0;
        self.leaf_count = 0;
    }
}
