use glam::Vec3;

/// Axis-aligned bounding box.
///
/// The layout matches tree node children (min, 4 bytes, max, 4 bytes), allowing
/// intersection tests to run against either without copies.
#[repr(C)]
#[derive(Default, Clone, Copy, Debug)]
pub struct BoundingBox {
    /// Corner of the box with the smallest coordinate on every axis.
    pub min: Vec3,
    _padding0: [u8; 4],
    /// Corner of the box with the largest coordinate on every axis.
    pub max: Vec3,
    _padding1: [u8; 4],
}

const _: () = {
    assert!(std::mem::size_of::<BoundingBox>() == 32);
    assert!(std::mem::offset_of!(BoundingBox, min) == 0);
    assert!(std::mem::offset_of!(BoundingBox, max) == 16);
};

impl BoundingBox {
    /// Builds a box spanning the given extremes.
    #[inline(always)]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self {
            min,
            max,
            ..Default::default()
        }
    }

    /// Tests two values for bounding box overlap through their raw layout, so tree node
    /// children can be tested without conversion. Bounds are inclusive.
    #[inline(always)]
    pub unsafe fn intersects_unsafe<TA, TB>(a: &TA, b: &TB) -> bool
    where
        TA: Sized + Copy,
        TB: Sized + Copy,
    {
        debug_assert_eq!(std::mem::size_of::<TA>(), 32);
        debug_assert_eq!(std::mem::size_of::<TB>(), 32);

        let a = (a as *const TA).cast::<f32>();
        let b = (b as *const TB).cast::<f32>();
        // Lanes 0..2 are min, 4..6 are max.
        *a.add(4) >= *b
            && *a.add(5) >= *b.add(1)
            && *a.add(6) >= *b.add(2)
            && *b.add(4) >= *a
            && *b.add(5) >= *a.add(1)
            && *b.add(6) >= *a.add(2)
    }

    /// Tests two boxes for overlap.
    #[inline(always)]
    pub fn intersects(a: Self, b: Self) -> bool {
        unsafe { Self::intersects_unsafe(&a, &b) }
    }

    /// Computes the bounding box which contains two other bounding boxes.
    #[inline(always)]
    pub fn create_merged(a: &Self, b: &Self) -> Self {
        Self::new(a.min.min(b.min), a.max.max(b.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_is_inclusive() {
        let a = BoundingBox::new(Vec3::ZERO, Vec3::ONE);
        let b = BoundingBox::new(Vec3::ONE, Vec3::splat(2.0));
        let c = BoundingBox::new(Vec3::splat(1.0001), Vec3::splat(2.0));
        assert!(BoundingBox::intersects(a, b));
        assert!(!BoundingBox::intersects(a, c));
    }

    #[test]
    fn merged_contains_both() {
        let a = BoundingBox::new(Vec3::new(-1.0, 0.0, 0.0), Vec3::new(0.5, 1.0, 1.0));
        let b = BoundingBox::new(Vec3::ZERO, Vec3::new(2.0, 0.5, 3.0));
        let merged = BoundingBox::create_merged(&a, &b);
        assert_eq!(merged.min, Vec3::new(-1.0, 0.0, 0.0));
        assert_eq!(merged.max, Vec3::new(2.0, 1.0, 3.0));
    }
}
