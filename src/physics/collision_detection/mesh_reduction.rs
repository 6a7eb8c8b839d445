use glam::{Quat, Vec3, Vec4};

use crate::physics::collidables::mesh::ITriangleMesh;
use crate::physics::collidables::triangle::Triangle;
use crate::physics::collision_detection::contact_manifold::ConvexContactManifold;
use crate::physics::collision_detection::nonconvex_reduction::NonconvexReductionChild;
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::collections::quick_dictionary::{PrimitiveComparer, QuickDictionary};
use crate::utilities::collections::quicklist::QuickList;
use crate::utilities::for_each_ref::IBreakableForEach;
use crate::utilities::matrix3x3::Matrix3x3;
use crate::utilities::memory::buffer::Buffer;
use crate::utilities::memory::buffer_pool::BufferPool;

/// Feature id flag marking a contact generated against the interior of a triangle's face
/// rather than an edge or vertex. Face contacts are exempt from boundary smoothing.
pub const FACE_COLLISION_FLAG: i32 = 32768;

/// Minimum dot between a contact normal and the triangle face normal for the triangle
/// testers to consider the collision a face collision.
pub const MINIMUM_DOT_FOR_FACE_COLLISION: f32 = 0.999999;

/// Child counts below this threshold use the brute force quadratic scan; the tree query
/// and hash bookkeeping of the sparse path only pay off above it.
const BRUTE_FORCE_CHILD_THRESHOLD: i32 = 16;

/// Per-triangle precomputation used by the normal blocking tests.
///
/// Plane data is laid out in four lanes: lane 0 is the triangle's face plane, lanes 1-3 the
/// outward edge planes for AB, BC, and CA. Each lane's plane passes through its anchor.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TestTriangle {
    pub anchor_x: Vec4,
    pub anchor_y: Vec4,
    pub anchor_z: Vec4,
    pub nx: Vec4,
    pub ny: Vec4,
    pub nz: Vec4,
    /// Scale aware distance epsilon; contacts farther than this from any of the four
    /// planes are not near the triangle.
    pub distance_threshold: f32,
    /// Index of the manifold this triangle is the source of, or -1 if the triangle was
    /// only pulled in as a potential blocker.
    pub child_index: i32,
    /// True if this triangle's manifold was found infringing on some other triangle.
    pub blocked: bool,
    /// False if this triangle's data was consulted as a blocker by another manifold's
    /// infringement test. Blocked manifolds whose triangle served as a blocker cannot be
    /// deleted outright.
    pub force_deletion_on_block: bool,
    /// Face normal of the first triangle found infringed by this source, in mesh space.
    pub corrected_normal: Vec3,
}

impl TestTriangle {
    pub fn new(triangle: &Triangle, source_child_index: i32) -> Self {
        let ab = triangle.b - triangle.a;
        let bc = triangle.c - triangle.b;
        let ca = triangle.a - triangle.c;
        let n = ab.cross(ca);
        let n_ab = n.cross(ab);
        let n_bc = n.cross(bc);
        let n_ca = n.cross(ca);
        let mut nx = Vec4::new(n.x, n_ab.x, n_bc.x, n_ca.x);
        let mut ny = Vec4::new(n.y, n_ab.y, n_bc.y, n_ca.y);
        let mut nz = Vec4::new(n.z, n_ab.z, n_bc.z, n_ca.z);
        let length_squared = nx * nx + ny * ny + nz * nz;
        let scale = Vec4::new(
            1.0 / length_squared.x.sqrt(),
            1.0 / length_squared.y.sqrt(),
            1.0 / length_squared.z.sqrt(),
            1.0 / length_squared.w.sqrt(),
        );
        nx *= scale;
        ny *= scale;
        nz *= scale;
        Self {
            anchor_x: Vec4::new(triangle.a.x, triangle.a.x, triangle.b.x, triangle.c.x),
            anchor_y: Vec4::new(triangle.a.y, triangle.a.y, triangle.b.y, triangle.c.y),
            anchor_z: Vec4::new(triangle.a.z, triangle.a.z, triangle.b.z, triangle.c.z),
            nx,
            ny,
            nz,
            distance_threshold: 1e-3
                * (triangle.a.length_squared() * 1e-4)
                    .max(ab.length_squared())
                    .max(ca.length_squared())
                    .sqrt(),
            child_index: source_child_index,
            blocked: false,
            force_deletion_on_block: true,
            corrected_normal: Vec3::ZERO,
        }
    }

    /// Gets the triangle's unit face normal.
    #[inline(always)]
    pub fn face_normal(&self) -> Vec3 {
        Vec3::new(self.nx.x, self.ny.x, self.nz.x)
    }
}

/// Appends tree query hits to a neighbor index list.
struct OverlapCollector<'a> {
    triangle_indices: &'a mut QuickList<i32>,
    pool: &'a mut BufferPool,
}

impl IBreakableForEach<i32> for OverlapCollector<'_> {
    #[inline(always)]
    fn loop_body(&mut self, i: i32) -> bool {
        self.triangle_indices.add(i, self.pool);
        true
    }
}

/// Smooths out the contacts generated by convex-versus-triangle tests against a mesh
/// boundary. Contacts whose normals infringe on a neighboring triangle's face region are
/// internal edge artifacts; depending on whether the infringed manifold was itself needed
/// as a blocker, it is either deleted or redirected along the infringed face's normal.
pub struct MeshReduction;

impl MeshReduction {
    /// Computes the mesh space position and normal of a child manifold's most representative
    /// contact. The deepest contact's normal is the one most likely to reflect an actual
    /// surface interaction; speculative or edge incident contacts carry less reliable data.
    fn compute_mesh_space_contacts(
        child: &NonconvexReductionChild,
        mesh_inverse_orientation: &Matrix3x3,
        requires_flip: bool,
    ) -> (Vec3, Vec3) {
        debug_assert!(child.manifold.count > 0);
        let mut deepest_index = 0;
        let mut deepest_depth = child.manifold.contact0.depth;
        for i in 1..child.manifold.count {
            let depth = unsafe { child.manifold.get_contact_ref(i) }.depth;
            if depth > deepest_depth {
                deepest_depth = depth;
                deepest_index = i;
            }
        }
        let offset = unsafe { child.manifold.get_contact_ref(deepest_index) }.offset;
        if requires_flip {
            // Contacts were generated as if the mesh were in the second slot; the offset is
            // relative to the convex shape and the normal points from the mesh toward it.
            (
                mesh_inverse_orientation.transform(offset - child.manifold.offset_b),
                mesh_inverse_orientation.transform(-child.manifold.normal),
            )
        } else {
            (
                mesh_inverse_orientation.transform(offset),
                mesh_inverse_orientation.transform(child.manifold.normal),
            )
        }
    }

    /// Determines whether a mesh space contact infringes on the triangle's face region.
    pub fn should_block_normal(
        triangle: &TestTriangle,
        mesh_space_contact: Vec3,
        mesh_space_normal: Vec3,
    ) -> bool {
        // Four signed distances at once: lane 0 from the face plane, lanes 1-3 past the
        // outward edge planes.
        let distances = (Vec4::splat(mesh_space_contact.x) - triangle.anchor_x) * triangle.nx
            + (Vec4::splat(mesh_space_contact.y) - triangle.anchor_y) * triangle.ny
            + (Vec4::splat(mesh_space_contact.z) - triangle.anchor_z) * triangle.nz;
        // Degenerate triangles have NaN lanes and fail this comparison, so they never block.
        if !distances
            .cmple(Vec4::splat(triangle.distance_threshold))
            .all()
        {
            // The contact is not near the triangle.
            return false;
        }
        let negative_threshold = -1e-2 * triangle.distance_threshold;
        let on_ab = distances.y >= negative_threshold;
        let on_bc = distances.z >= negative_threshold;
        let on_ca = distances.w >= negative_threshold;
        let normal_dot = Vec4::splat(mesh_space_normal.x) * triangle.nx
            + Vec4::splat(mesh_space_normal.y) * triangle.ny
            + Vec4::splat(mesh_space_normal.z) * triangle.nz;
        if !on_ab && !on_bc && !on_ca {
            // Strictly interior to the face. The only legitimate normal here is the face
            // normal itself; the testers stamp those as face collisions, but feature
            // disagreements can leave the flag unset, so aligned normals pass.
            return normal_dot.x < MINIMUM_DOT_FOR_FACE_COLLISION;
        }
        // Block if at least one touched edge is strictly infringed and every touched edge is
        // at least near-infringed. The lenient secondary threshold keeps vertex adjacent
        // manifolds from escaping when their normal is parallel to one edge of a fan.
        const STRICT_DOT_THRESHOLD: f32 = 1e-6;
        const LENIENT_DOT_THRESHOLD: f32 = -1e-2;
        (on_ab && normal_dot.y > STRICT_DOT_THRESHOLD
            || on_bc && normal_dot.z > STRICT_DOT_THRESHOLD
            || on_ca && normal_dot.w > STRICT_DOT_THRESHOLD)
            && (!on_ab || normal_dot.y > LENIENT_DOT_THRESHOLD)
            && (!on_bc || normal_dot.z > LENIENT_DOT_THRESHOLD)
            && (!on_ca || normal_dot.w > LENIENT_DOT_THRESHOLD)
    }

    #[inline(always)]
    fn clear_face_flags(manifold: &mut ConvexContactManifold) {
        for i in 0..manifold.count {
            unsafe {
                manifold.get_contact_mut(i).feature_id &= !FACE_COLLISION_FLAG;
            }
        }
    }

    /// Applies a source triangle's block state to its manifold: untouched if never blocked,
    /// deleted if blocked and unneeded, redirected along the infringed face if the manifold
    /// still holds a penetrating contact and its own triangle served as a blocker.
    fn try_apply_block_to_triangle(
        child: &mut NonconvexReductionChild,
        triangle: &TestTriangle,
        mesh_orientation: &Matrix3x3,
        requires_flip: bool,
    ) {
        debug_assert!(
            triangle.child_index >= 0,
            "Only triangles backing a source manifold can be resolved."
        );
        if !triangle.blocked {
            return;
        }
        if triangle.force_deletion_on_block {
            // Nothing consulted this triangle as a blocker; removing the manifold can't open
            // a hole for a neighbor's manifold to fall through.
            child.manifold.count = 0;
        } else {
            let mut any_positive_depth = false;
            for i in 0..child.manifold.count {
                if unsafe { child.manifold.get_contact_ref(i) }.depth > 0.0 {
                    any_positive_depth = true;
                    break;
                }
            }
            if any_positive_depth {
                // Deleting a penetrating manifold that other manifolds leaned on would allow
                // interpenetration; redirect it along the infringed face instead. The sign
                // mirrors the flip applied on the way into mesh space.
                let corrected_local = if requires_flip {
                    triangle.corrected_normal
                } else {
                    -triangle.corrected_normal
                };
                child.manifold.normal = mesh_orientation.transform(corrected_local);
            } else {
                child.manifold.count = 0;
            }
        }
    }

    fn reduce_dense(
        triangles: &Buffer<Triangle>,
        children: &mut Buffer<NonconvexReductionChild>,
        start: i32,
        count: i32,
        requires_flip: bool,
        mesh_orientation: &Matrix3x3,
        mesh_inverse_orientation: &Matrix3x3,
        pool: &mut BufferPool,
    ) {
        let mut test_triangles: Buffer<TestTriangle> = pool.take(count);
        for i in 0..count {
            *test_triangles.get_mut(i) = TestTriangle::new(triangles.get(start + i), i);
        }
        for i in 0..count {
            let child = children.get_mut(start + i);
            if child.manifold.count == 0 {
                continue;
            }
            if child.manifold.contact0.feature_id & FACE_COLLISION_FLAG != 0 {
                // Face contacts are trusted; just strip the flag bits before they leak into
                // the constraint accumulated impulse matching.
                Self::clear_face_flags(&mut child.manifold);
                continue;
            }
            let (mesh_space_contact, mesh_space_normal) =
                Self::compute_mesh_space_contacts(child, mesh_inverse_orientation, requires_flip);
            // Note that the source is tested against its own triangle. An interior contact
            // with a wrong normal is genuinely spurious and should block itself.
            for j in 0..count {
                let should_block = Self::should_block_normal(
                    test_triangles.get(j),
                    mesh_space_contact,
                    mesh_space_normal,
                );
                if should_block {
                    let target = test_triangles.get_mut(j);
                    let corrected_normal = target.face_normal();
                    target.force_deletion_on_block = false;
                    let source = test_triangles.get_mut(i);
                    source.blocked = true;
                    source.corrected_normal = corrected_normal;
                    break;
                }
            }
        }
        for i in 0..count {
            Self::try_apply_block_to_triangle(
                children.get_mut(start + i),
                test_triangles.get(i),
                mesh_orientation,
                requires_flip,
            );
        }
        pool.return_buffer(&mut test_triangles);
    }

    fn reduce_sparse<TMesh: ITriangleMesh>(
        triangles: &Buffer<Triangle>,
        children: &mut Buffer<NonconvexReductionChild>,
        start: i32,
        count: i32,
        requires_flip: bool,
        query_bounds: &BoundingBox,
        mesh_orientation: &Matrix3x3,
        mesh_inverse_orientation: &Matrix3x3,
        mesh: &TMesh,
        pool: &mut BufferPool,
    ) {
        let query_extent = query_bounds.max - query_bounds.min;
        let maximum_extent = query_extent.x.max(query_extent.y).max(query_extent.z);
        let expansion = Vec3::splat(maximum_extent * 1e-4);

        let mut triangle_indices: QuickList<i32> = QuickList::with_capacity(count * 2, pool);
        let mut test_triangles: QuickDictionary<i32, TestTriangle, PrimitiveComparer> =
            QuickDictionary::with_capacity(count * 2, 2, pool, PrimitiveComparer);
        // The first count slots correspond 1:1 with the sources, letting the resolution
        // pass below iterate by position.
        for i in 0..count {
            test_triangles.add_unsafely(
                children.get(start + i).child_index_b,
                TestTriangle::new(triangles.get(start + i), i),
            );
        }

        for i in 0..count {
            let child = children.get_mut(start + i);
            if child.manifold.count == 0 {
                continue;
            }
            if child.manifold.contact0.feature_id & FACE_COLLISION_FLAG != 0 {
                Self::clear_face_flags(&mut child.manifold);
                continue;
            }
            let (mesh_space_contact, mesh_space_normal) =
                Self::compute_mesh_space_contacts(child, mesh_inverse_orientation, requires_flip);
            {
                let mut collector = OverlapCollector {
                    triangle_indices: &mut triangle_indices,
                    pool: &mut *pool,
                };
                mesh.find_local_overlaps(
                    mesh_space_contact - expansion,
                    mesh_space_contact + expansion,
                    &mut collector,
                );
            }
            // Reserving up front keeps slot references valid across every insertion below.
            test_triangles.ensure_capacity(test_triangles.count + triangle_indices.count, pool);
            for j in 0..triangle_indices.count {
                let triangle_index = triangle_indices[j];
                let mut slot_index = 0;
                if !test_triangles.find_or_allocate_slot_unsafely(&triangle_index, &mut slot_index) {
                    // Unseen neighbor; pull the triangle out of the mesh. It is not a source,
                    // so resolution skips it.
                    let mut triangle = Triangle::default();
                    mesh.get_local_child(triangle_index, &mut triangle);
                    *test_triangles.values.get_mut(slot_index) = TestTriangle::new(&triangle, -1);
                }
                let should_block = Self::should_block_normal(
                    test_triangles.values.get(slot_index),
                    mesh_space_contact,
                    mesh_space_normal,
                );
                if should_block {
                    let target = test_triangles.values.get_mut(slot_index);
                    let corrected_normal = target.face_normal();
                    target.force_deletion_on_block = false;
                    let source = test_triangles.values.get_mut(i);
                    source.blocked = true;
                    source.corrected_normal = corrected_normal;
                    break;
                }
            }
            triangle_indices.clear();
        }

        for i in 0..count {
            Self::try_apply_block_to_triangle(
                children.get_mut(start + i),
                test_triangles.values.get(i),
                mesh_orientation,
                requires_flip,
            );
        }
        triangle_indices.dispose(pool);
        test_triangles.dispose(pool);
    }

    /// Analyzes the manifolds produced for a batch of triangles against their mesh and
    /// suppresses or corrects the ones whose normals would catch on internal edges.
    ///
    /// `children[start..start + count]` and `triangles[start..start + count]` are parallel;
    /// manifolds are mutated in place. Counts may drop to zero and normals may be
    /// overwritten, but contact positions and depths are never touched.
    pub fn reduce_manifolds<TMesh: ITriangleMesh>(
        triangles: &Buffer<Triangle>,
        children: &mut Buffer<NonconvexReductionChild>,
        start: i32,
        count: i32,
        requires_flip: bool,
        query_bounds: &BoundingBox,
        mesh_orientation: &Quat,
        mesh: &TMesh,
        pool: &mut BufferPool,
    ) {
        debug_assert!(start >= 0 && count > 0 && start + count <= children.len());
        debug_assert!(start + count <= triangles.len());
        let orientation = Matrix3x3::create_from_quaternion(mesh_orientation);
        let inverse_orientation = orientation.transpose();
        if count < BRUTE_FORCE_CHILD_THRESHOLD {
            Self::reduce_dense(
                triangles,
                children,
                start,
                count,
                requires_flip,
                &orientation,
                &inverse_orientation,
                pool,
            );
        } else {
            Self::reduce_sparse(
                triangles,
                children,
                start,
                count,
                requires_flip,
                query_bounds,
                &orientation,
                &inverse_orientation,
                mesh,
                pool,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor_triangle() -> Triangle {
        Triangle::new(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
        )
    }

    #[test]
    fn test_triangle_lane_layout() {
        let triangle = floor_triangle();
        let test = TestTriangle::new(&triangle, 3);
        assert_eq!(test.child_index, 3);
        assert!(!test.blocked);
        assert!(test.force_deletion_on_block);

        // Face normal for this winding points up.
        assert!((test.face_normal() - Vec3::Y).length() < 1e-6);
        // All four lanes are unit length.
        let length_squared =
            test.nx * test.nx + test.ny * test.ny + test.nz * test.nz;
        for lane in [length_squared.x, length_squared.y, length_squared.z, length_squared.w] {
            assert!((lane - 1.0).abs() < 1e-5);
        }
        // Anchors: A, A, B, C.
        assert_eq!(test.anchor_x, Vec4::new(0.0, 0.0, 1.0, 0.0));
        assert_eq!(test.anchor_z, Vec4::new(0.0, 0.0, 0.0, 1.0));
        // Edge normals point outward: AB's away from C, BC's away from A, CA's away from B.
        assert!(test.nz.y < -0.99);
        assert!((Vec3::new(test.nx.z, test.ny.z, test.nz.z)
            - Vec3::new(0.5f32.sqrt(), 0.0, 0.5f32.sqrt()))
        .length()
            < 1e-5);
        assert!(test.nx.w < -0.99);

        // Unit right triangle at the origin: threshold reduces to 1e-3.
        assert!((test.distance_threshold - 1e-3).abs() < 1e-9);
    }

    #[test]
    fn proximity_gate_rejects_distant_contacts() {
        let test = TestTriangle::new(&floor_triangle(), 0);
        // Far above the face plane.
        assert!(!MeshReduction::should_block_normal(
            &test,
            Vec3::new(0.3, 0.5, 0.3),
            Vec3::new(1.0, 0.0, 0.0),
        ));
        // Far outside an edge plane.
        assert!(!MeshReduction::should_block_normal(
            &test,
            Vec3::new(3.0, 0.0, 0.3),
            Vec3::new(1.0, 0.0, 0.0),
        ));
    }

    #[test]
    fn interior_contact_blocks_only_misaligned_normals() {
        let test = TestTriangle::new(&floor_triangle(), 0);
        let interior = Vec3::new(0.25, 0.0, 0.25);
        // The face normal itself is fine.
        assert!(!MeshReduction::should_block_normal(&test, interior, Vec3::Y));
        // A tangent normal on an interior contact is spurious.
        assert!(MeshReduction::should_block_normal(
            &test,
            interior,
            Vec3::new(1.0, 0.0, 0.0),
        ));
        assert!(MeshReduction::should_block_normal(&test, interior, -Vec3::Y));
    }

    #[test]
    fn edge_infringement_uses_asymmetric_thresholds() {
        let test = TestTriangle::new(&floor_triangle(), 0);
        // On the AB edge; its outward normal is -z.
        let on_edge = Vec3::new(0.5, 0.0, 0.0);
        // Normal leaning outward across the edge infringes.
        assert!(MeshReduction::should_block_normal(
            &test,
            on_edge,
            Vec3::new(0.0, -0.707, -0.707),
        ));
        // Normal leaning inward does not.
        assert!(!MeshReduction::should_block_normal(
            &test,
            on_edge,
            Vec3::new(0.0, -0.707, 0.707),
        ));
        // Exactly parallel to the edge plane fails the strict threshold.
        assert!(!MeshReduction::should_block_normal(
            &test,
            on_edge,
            Vec3::new(0.0, -1.0, 0.0),
        ));
    }

    #[test]
    fn corner_contact_requires_all_touched_edges_near_infringed() {
        let test = TestTriangle::new(&floor_triangle(), 0);
        // Vertex A touches both the AB edge (outward -z) and the CA edge (outward -x).
        let corner = Vec3::new(0.0, 0.0, 0.0);
        // Strictly infringing AB while pointing well inward along CA: the lenient gate on
        // the second touched edge rejects the block.
        assert!(!MeshReduction::should_block_normal(
            &test,
            corner,
            Vec3::new(0.5, -0.5, -0.707),
        ));
        // Strict on AB, near-parallel on CA: blocked.
        assert!(MeshReduction::should_block_normal(
            &test,
            corner,
            Vec3::new(0.0, -0.707, -0.707),
        ));
    }

    #[test]
    fn degenerate_triangles_never_block() {
        let degenerate = Triangle::new(Vec3::splat(1.0), Vec3::splat(1.0), Vec3::splat(1.0));
        let test = TestTriangle::new(&degenerate, 0);
        assert!(!MeshReduction::should_block_normal(
            &test,
            Vec3::splat(1.0),
            Vec3::Y,
        ));
        assert!(!MeshReduction::should_block_normal(
            &test,
            Vec3::ZERO,
            Vec3::new(1.0, 0.0, 0.0),
        ));
    }

    #[test]
    fn deepest_contact_selection_breaks_ties_by_first_occurrence() {
        let mut child = NonconvexReductionChild::default();
        child.manifold.count = 3;
        child.manifold.normal = Vec3::Y;
        child.manifold.contact0.offset = Vec3::new(1.0, 0.0, 0.0);
        child.manifold.contact0.depth = 0.5;
        child.manifold.contact1.offset = Vec3::new(2.0, 0.0, 0.0);
        child.manifold.contact1.depth = 0.5;
        child.manifold.contact2.offset = Vec3::new(3.0, 0.0, 0.0);
        child.manifold.contact2.depth = 0.1;
        let identity = Matrix3x3::identity();
        let (position, normal) =
            MeshReduction::compute_mesh_space_contacts(&child, &identity, false);
        assert_eq!(position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(normal, Vec3::Y);
    }

    #[test]
    fn flip_negates_normal_and_subtracts_offset_b() {
        let mut child = NonconvexReductionChild::default();
        child.manifold.count = 1;
        child.manifold.normal = Vec3::Y;
        child.manifold.offset_b = Vec3::new(0.5, 0.0, 0.0);
        child.manifold.contact0.offset = Vec3::new(1.5, 0.0, 0.0);
        child.manifold.contact0.depth = 0.1;
        let identity = Matrix3x3::identity();
        let (position, normal) =
            MeshReduction::compute_mesh_space_contacts(&child, &identity, true);
        assert_eq!(position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(normal, -Vec3::Y);
    }
}
