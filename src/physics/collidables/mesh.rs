use glam::Vec3;

use crate::physics::trees::tree::Tree;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::for_each_ref::IBreakableForEach;
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;

use super::triangle::Triangle;

/// Source of mesh-local triangles and triangle overlap queries.
///
/// Mesh storage may apply scaling or indirection, so consumers fetch triangles through
/// `get_local_child` rather than reading triangle memory directly. Implemented as a trait
/// so that non-triangle-array mesh representations can be added without touching the
/// consumers.
pub trait ITriangleMesh {
    /// Gets the mesh-local (post-scale) triangle for a given child index.
    fn get_local_child(&self, child_index: i32, triangle: &mut Triangle);

    /// Invokes the enumerator with the index of every triangle whose stored bounds overlap
    /// the given mesh-local bounds.
    fn find_local_overlaps<TEnumerator: IBreakableForEach<i32>>(
        &self,
        min: Vec3,
        max: Vec3,
        enumerator: &mut TEnumerator,
    );
}

/// Collidable built from a soup of triangles with an acceleration structure over them.
pub struct Mesh {
    /// Bounding volume tree over the unscaled local triangles.
    pub tree: Tree,
    /// The mesh's triangles in local space.
    pub triangles: Buffer<Triangle>,
    /// Runtime scale baked into every vertex handed out by `get_local_child`.
    scale: Vec3,
    /// Reciprocal of the scale, kept current by `set_scale`.
    inverse_scale: Vec3,
}

impl Mesh {
    /// Creates a mesh over the given triangle buffer, building the acceleration structure.
    /// The mesh takes ownership of the buffer and returns it to the pool on disposal.
    pub fn new(triangles: Buffer<Triangle>, scale: Vec3, pool: &mut BufferPool) -> Self {
        let count = triangles.len();
        let mut bounds: Buffer<BoundingBox> = pool.take(count);
        for i in 0..count {
            *bounds.get_mut(i) = triangles.get(i).compute_bounds();
        }
        let tree = Tree::create_for_bounds(&bounds, count, pool);
        pool.return_buffer(&mut bounds);
        let mut mesh = Self {
            tree,
            triangles,
            scale: Vec3::ONE,
            inverse_scale: Vec3::ONE,
        };
        mesh.set_scale(scale);
        mesh
    }

    /// The scale currently applied to the mesh's vertices.
    #[inline(always)]
    pub fn scale(&self) -> Vec3 {
        self.scale
    }

    /// Sets the scale of the mesh. Zero components are treated as infinitesimal to
    /// preserve invertibility.
    pub fn set_scale(&mut self, value: Vec3) {
        self.scale = value;
        self.inverse_scale = Vec3::new(
            if value.x != 0.0 { 1.0 / value.x } else { f32::MAX },
            if value.y != 0.0 { 1.0 / value.y } else { f32::MAX },
            if value.z != 0.0 { 1.0 / value.z } else { f32::MAX },
        );
    }

    /// Returns the triangle storage and the tree's nodes to the pool.
    pub fn dispose(&mut self, pool: &mut BufferPool) {
        pool.return_buffer(&mut self.triangles);
        self.tree.dispose(pool);
    }
}

impl ITriangleMesh for Mesh {
    #[inline(always)]
    fn get_local_child(&self, child_index: i32, triangle: &mut Triangle) {
        let source = self.triangles.get(child_index);
        triangle.a = source.a * self.scale;
        triangle.b = source.b * self.scale;
        triangle.c = source.c * self.scale;
    }

    #[inline(always)]
    fn find_local_overlaps<TEnumerator: IBreakableForEach<i32>>(
        &self,
        min: Vec3,
        max: Vec3,
        enumerator: &mut TEnumerator,
    ) {
        // The tree holds unscaled bounds; negative scale components swap the extremes, so
        // re-sort after applying the inverse.
        let a = min * self.inverse_scale;
        let b = max * self.inverse_scale;
        self.tree.get_overlaps_minmax(a.min(b), a.max(b), enumerator);
    }
}
