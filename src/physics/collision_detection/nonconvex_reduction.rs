use crate::physics::collision_detection::contact_manifold::ConvexContactManifold;
use glam::Vec3;

/// One convex manifold plus the metadata tying it back to the compound or mesh children
/// that produced it, as accumulated by the nonconvex reduction stage.
///
/// For convex-versus-mesh pairs there is one child per tested triangle and
/// `child_index_b` names that triangle within the mesh. Mesh boundary smoothing runs over
/// these records in place before the nonconvex reduction consumes them.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct NonconvexReductionChild {
    pub manifold: ConvexContactManifold,
    /// World space offset from the first shape's parent origin to this child.
    pub offset_a: Vec3,
    pub child_index_a: i32,
    /// World space offset from the second shape's parent origin to this child.
    pub offset_b: Vec3,
    pub child_index_b: i32,
}
