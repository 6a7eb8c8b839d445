use glam::Vec3;

/// One contact out of a convex pair's manifold. Convex pairs share a single surface basis
/// across the whole manifold, so the contact itself only carries position, depth, and
/// feature data.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvexContact {
    /// Position of the contact, expressed as an offset from collidable A's position.
    pub offset: Vec3,
    /// Overlap between the two collidables along the shared normal at this contact.
    /// Speculative contacts that haven't touched yet carry negative values.
    pub depth: f32,
    /// Identifies the feature pair that produced this contact. Stable ids let the solver
    /// carry accumulated impulses across frames.
    pub feature_id: i32,
}

const _: () = {
    assert!(std::mem::size_of::<ConvexContact>() == 20);
    assert!(std::mem::offset_of!(ConvexContact, offset) == 0);
    assert!(std::mem::offset_of!(ConvexContact, depth) == 12);
    assert!(std::mem::offset_of!(ConvexContact, feature_id) == 16);
};

/// Up to four contacts between a convex pair of collidables, sharing one normal.
///
/// The contact fields form a contiguous array; only the first `count` entries are
/// meaningful.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvexContactManifold {
    /// Offset from collidable A's position to collidable B's.
    pub offset_b: Vec3,
    /// Number of contacts currently present in the manifold.
    pub count: i32,
    /// Normal shared by every contact. Points from collidable B to collidable A.
    pub normal: Vec3,
    pub contact0: ConvexContact,
    pub contact1: ConvexContact,
    pub contact2: ConvexContact,
    pub contact3: ConvexContact,
}

const _: () = {
    assert!(std::mem::size_of::<ConvexContactManifold>() == 108);
    assert!(std::mem::offset_of!(ConvexContactManifold, offset_b) == 0);
    assert!(std::mem::offset_of!(ConvexContactManifold, count) == 12);
    assert!(std::mem::offset_of!(ConvexContactManifold, normal) == 16);
    assert!(std::mem::offset_of!(ConvexContactManifold, contact0) == 28);
    assert!(std::mem::offset_of!(ConvexContactManifold, contact3) == 88);
};

impl ConvexContactManifold {
    /// Largest number of contacts a convex manifold can hold.
    pub const MAXIMUM_CONTACT_COUNT: i32 = 4;

    /// Start of the manifold's contact array.
    #[inline(always)]
    fn first_contact(&self) -> *const ConvexContact {
        &self.contact0
    }

    /// Start of the manifold's contact array, mutably.
    #[inline(always)]
    fn first_contact_mut(&mut self) -> *mut ConvexContact {
        &mut self.contact0
    }

    /// Borrows the contact at the given index.
    ///
    /// # Safety
    /// Indexes the manifold's fixed contact fields directly; indices past the live count
    /// are only caught in debug builds.
    #[inline(always)]
    pub unsafe fn get_contact_ref(&self, contact_index: i32) -> &ConvexContact {
        debug_assert!(
            contact_index >= 0 && contact_index < self.count,
            "Contact index exceeds the manifold's count."
        );
        &*self.first_contact().add(contact_index as usize)
    }

    /// Mutably borrows the contact at the given index.
    ///
    /// # Safety
    /// Indexes the manifold's fixed contact fields directly; indices past the live count
    /// are only caught in debug builds.
    #[inline(always)]
    pub unsafe fn get_contact_mut(&mut self, contact_index: i32) -> &mut ConvexContact {
        debug_assert!(
            contact_index >= 0 && contact_index < self.count,
            "Contact index exceeds the manifold's count."
        );
        &mut *self.first_contact_mut().add(contact_index as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_fields_are_contiguous() {
        let mut manifold = ConvexContactManifold {
            count: 4,
            ..Default::default()
        };
        for i in 0..4 {
            unsafe {
                manifold.get_contact_mut(i).feature_id = 100 + i;
            }
        }
        assert_eq!(manifold.contact0.feature_id, 100);
        assert_eq!(manifold.contact1.feature_id, 101);
        assert_eq!(manifold.contact2.feature_id, 102);
        assert_eq!(manifold.contact3.feature_id, 103);
    }
}
