use super::tree::{Tree, TRAVERSAL_STACK_CAPACITY};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::for_each_ref::IBreakableForEach;
use glam::Vec3;

impl Tree {
    /// Finds every leaf whose stored bounds overlap the query box and hands its index to
    /// the enumerator. Traversal ends early if the enumerator returns false.
    pub fn get_overlaps<TEnumerator: IBreakableForEach<i32>>(
        &self,
        bounding_box: BoundingBox,
        leaf_enumerator: &mut TEnumerator,
    ) {
        if self.leaf_count == 0 {
            return;
        }
        if self.leaf_count == 1 {
            // Only the root's first child is filled.
            let child = &self.nodes.get(0).a;
            debug_assert!(child.index < 0, "A single leaf tree holds it in the root's first child.");
            if unsafe { BoundingBox::intersects_unsafe(child, &bounding_box) } {
                leaf_enumerator.loop_body(Self::encode(child.index));
            }
            return;
        }
        // With two or more leaves every node child is filled, so the traversal can treat
        // the children of each popped node uniformly: overlapping leaves are reported on
        // the spot, overlapping interior children go on the stack for a later pop.
        let mut stack = [0i32; TRAVERSAL_STACK_CAPACITY];
        stack[0] = 0;
        let mut stack_count = 1usize;
        while stack_count > 0 {
            stack_count -= 1;
            let node = self.nodes.get(stack[stack_count]);
            for child in [&node.a, &node.b] {
                if unsafe { !BoundingBox::intersects_unsafe(child, &bounding_box) } {
                    continue;
                }
                if child.index < 0 {
                    if !leaf_enumerator.loop_body(Self::encode(child.index)) {
                        return;
                    }
                } else {
                    debug_assert!(stack_count < TRAVERSAL_STACK_CAPACITY, "Traversal stack overflow.");
                    stack[stack_count] = child.index;
                    stack_count += 1;
                }
            }
        }
    }

    /// Finds every leaf whose stored bounds overlap the given min/max bounds.
    #[inline(always)]
    pub fn get_overlaps_minmax<TEnumerator: IBreakableForEach<i32>>(
        &self,
        min: Vec3,
        max: Vec3,
        leaf_enumerator: &mut TEnumerator,
    ) {
        self.get_overlaps(BoundingBox::new(min, max), leaf_enumerator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::memory::buffer::Buffer;
    use crate::utilities::memory::buffer_pool::BufferPool;

    struct Collector {
        hits: Vec<i32>,
    }

    impl IBreakableForEach<i32> for Collector {
        fn loop_body(&mut self, i: i32) -> bool {
            self.hits.push(i);
            true
        }
    }

    fn query(tree: &Tree, min: Vec3, max: Vec3) -> Vec<i32> {
        let mut collector = Collector { hits: Vec::new() };
        tree.get_overlaps_minmax(min, max, &mut collector);
        collector.hits.sort_unstable();
        collector.hits
    }

    #[test]
    fn queries_match_brute_force() {
        let mut pool = BufferPool::default();
        // 8x8 grid of unit boxes spaced 2 apart.
        let count = 64;
        let mut bounds: Buffer<BoundingBox> = pool.take(count);
        for i in 0..count {
            let x = (i % 8) as f32 * 2.0;
            let z = (i / 8) as f32 * 2.0;
            *bounds.get_mut(i) = BoundingBox::new(Vec3::new(x, 0.0, z), Vec3::new(x + 1.0, 1.0, z + 1.0));
        }
        let mut tree = Tree::create_for_bounds(&bounds, count, &mut pool);

        let queries = [
            (Vec3::new(-10.0, -1.0, -10.0), Vec3::new(30.0, 2.0, 30.0)),
            (Vec3::new(0.5, 0.5, 0.5), Vec3::new(0.6, 0.6, 0.6)),
            (Vec3::new(3.0, 0.0, 3.0), Vec3::new(5.0, 1.0, 5.0)),
            (Vec3::new(100.0, 0.0, 100.0), Vec3::new(101.0, 1.0, 101.0)),
        ];
        for (min, max) in queries {
            let mut expected = Vec::new();
            let query_bounds = BoundingBox::new(min, max);
            for i in 0..count {
                if BoundingBox::intersects(*bounds.get(i), query_bounds) {
                    expected.push(i);
                }
            }
            assert_eq!(query(&tree, min, max), expected);
        }

        tree.dispose(&mut pool);
        pool.return_buffer(&mut bounds);
        pool.assert_empty();
        pool.clear();
    }

    #[test]
    fn enumerator_can_stop_traversal() {
        struct FirstHitOnly {
            hits: Vec<i32>,
        }
        impl IBreakableForEach<i32> for FirstHitOnly {
            fn loop_body(&mut self, i: i32) -> bool {
                self.hits.push(i);
                false
            }
        }

        let mut pool = BufferPool::default();
        let count = 16;
        let mut bounds: Buffer<BoundingBox> = pool.take(count);
        for i in 0..count {
            let x = i as f32 * 2.0;
            *bounds.get_mut(i) = BoundingBox::new(Vec3::new(x, 0.0, 0.0), Vec3::new(x + 1.0, 1.0, 1.0));
        }
        let mut tree = Tree::create_for_bounds(&bounds, count, &mut pool);

        let mut first = FirstHitOnly { hits: Vec::new() };
        // Every box overlaps this query; the early out must cap the visit at one.
        tree.get_overlaps_minmax(Vec3::new(-1.0, -1.0, -1.0), Vec3::new(40.0, 2.0, 2.0), &mut first);
        assert_eq!(first.hits.len(), 1);

        tree.dispose(&mut pool);
        pool.return_buffer(&mut bounds);
        pool.assert_empty();
        pool.clear();
    }

    #[test]
    fn single_and_zero_leaf_trees() {
        let mut pool = BufferPool::default();
        let mut bounds: Buffer<BoundingBox> = pool.take(1);
        *bounds.get_mut(0) = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let mut tree = Tree::create_for_bounds(&bounds, 1, &mut pool);
        assert_eq!(query(&tree, Vec3::splat(0.5), Vec3::splat(0.75)), vec![0]);
        assert_eq!(query(&tree, Vec3::splat(5.0), Vec3::splat(6.0)), Vec::<i32>::new());
        tree.dispose(&mut pool);

        let mut empty_tree = Tree::create_for_bounds(&bounds, 0, &mut pool);
        assert_eq!(query(&empty_tree, Vec3::splat(0.5), Vec3::splat(0.75)), Vec::<i32>::new());
        empty_tree.dispose(&mut pool);

        pool.return_buffer(&mut bounds);
        pool.assert_empty();
        pool.clear();
    }
}
