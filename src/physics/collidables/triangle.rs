use crate::utilities::bounding_box::BoundingBox;
use glam::Vec3;

/// A single triangle, stored as three mesh-local vertices.
///
/// Triangles are one-sided: contact generation only considers the winding that reads
/// clockwise in right handed coordinates.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    #[inline(always)]
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Computes the axis-aligned bounds of the triangle's vertices.
    #[inline(always)]
    pub fn compute_bounds(&self) -> BoundingBox {
        BoundingBox::new(
            self.a.min(self.b).min(self.c),
            self.a.max(self.b).max(self.c),
        )
    }
}
