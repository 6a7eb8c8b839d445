use glam::{Quat, Vec3};

/// 3x3 matrix with rows stored as vectors.
///
/// `transform` composes the rows weighted by the input's components; for a rotation built
/// from a quaternion, that applies the quaternion's rotation, and `transform_transpose`
/// applies the inverse.
#[derive(Copy, Clone, Debug)]
#[repr(C)]
pub struct Matrix3x3 {
    pub x: Vec3,
    pub y: Vec3,
    pub z: Vec3,
}

impl Matrix3x3 {
    #[inline(always)]
    pub fn identity() -> Self {
        Self {
            x: Vec3::X,
            y: Vec3::Y,
            z: Vec3::Z,
        }
    }

    /// Creates a rotation matrix from a unit quaternion.
    #[inline(always)]
    pub fn create_from_quaternion(q: &Quat) -> Self {
        let qx2 = q.x + q.x;
        let qy2 = q.y + q.y;
        let qz2 = q.z + q.z;
        let xx = qx2 * q.x;
        let yy = qy2 * q.y;
        let zz = qz2 * q.z;
        let xy = qx2 * q.y;
        let xz = qx2 * q.z;
        let xw = qx2 * q.w;
        let yz = qy2 * q.z;
        let yw = qy2 * q.w;
        let zw = qz2 * q.w;

        Self {
            x: Vec3::new(1.0 - yy - zz, xy + zw, xz - yw),
            y: Vec3::new(xy - zw, 1.0 - xx - zz, yz + xw),
            z: Vec3::new(xz + yw, yz - xw, 1.0 - xx - yy),
        }
    }

    /// Returns the transpose of the matrix. For rotations, this is the inverse.
    #[inline(always)]
    pub fn transpose(&self) -> Self {
        Self {
            x: Vec3::new(self.x.x, self.y.x, self.z.x),
            y: Vec3::new(self.x.y, self.y.y, self.z.y),
            z: Vec3::new(self.x.z, self.y.z, self.z.z),
        }
    }

    /// Transforms a vector by the matrix.
    #[inline(always)]
    pub fn transform(&self, v: Vec3) -> Vec3 {
        self.x * v.x + self.y * v.y + self.z * v.z
    }

    /// Transforms a vector by the transpose of the matrix.
    #[inline(always)]
    pub fn transform_transpose(&self, v: Vec3) -> Vec3 {
        Vec3::new(v.dot(self.x), v.dot(self.y), v.dot(self.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quaternion_rotation_matches_quat_mul() {
        let q = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let m = Matrix3x3::create_from_quaternion(&q);
        let v = Vec3::new(1.0, 2.0, 3.0);
        let rotated = m.transform(v);
        let expected = q * v;
        assert!((rotated - expected).length() < 1e-6);
        let back = m.transform_transpose(rotated);
        assert!((back - v).length() < 1e-6);
        let back_via_transpose = m.transpose().transform(rotated);
        assert!((back_via_transpose - v).length() < 1e-6);
    }
}
