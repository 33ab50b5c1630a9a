//! Math type aliases and helper functions.
//!
//! All scene math is single precision. Vectors and matrices come from
//! nalgebra; the box types are the axis-aligned ranges ANARI uses for
//! bounds queries and value ranges.

pub use nalgebra;

/// 2D vector (f32).
pub type Vec2 = nalgebra::Vector2<f32>;

/// 3D vector (f32).
pub type Vec3 = nalgebra::Vector3<f32>;

/// 4D vector (f32).
pub type Vec4 = nalgebra::Vector4<f32>;

/// 2D unsigned vector, used for image and frame sizes.
pub type UVec2 = nalgebra::Vector2<u32>;

/// 3D unsigned vector, used for index triples.
pub type UVec3 = nalgebra::Vector3<u32>;

/// 3x3 matrix (f32).
pub type Mat3 = nalgebra::Matrix3<f32>;

/// 4x4 matrix (f32).
pub type Mat4 = nalgebra::Matrix4<f32>;

/// Quaternion (f32).
pub type Quat = nalgebra::Quaternion<f32>;

/// Closed scalar interval `[lower, upper]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box1 {
    pub lower: f32,
    pub upper: f32,
}

impl Box1 {
    pub fn new(lower: f32, upper: f32) -> Self {
        Self { lower, upper }
    }

    pub fn size(&self) -> f32 {
        self.upper - self.lower
    }
}

impl Default for Box1 {
    fn default() -> Self {
        Self::new(0.0, 1.0)
    }
}

/// Axis-aligned 3D box.
///
/// An empty box has `lower > upper` on every axis, so extending it by any
/// point yields a box containing exactly that point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Box3 {
    pub lower: Vec3,
    pub upper: Vec3,
}

impl Box3 {
    pub fn new(lower: Vec3, upper: Vec3) -> Self {
        Self { lower, upper }
    }

    /// The canonical empty box.
    pub fn empty() -> Self {
        Self {
            lower: Vec3::repeat(f32::MAX),
            upper: Vec3::repeat(-f32::MAX),
        }
    }

    /// Returns `true` if the box contains no points.
    pub fn is_empty(&self) -> bool {
        self.lower.x > self.upper.x || self.lower.y > self.upper.y || self.lower.z > self.upper.z
    }

    /// Grow the box to contain `p`.
    pub fn extend_point(&mut self, p: &Vec3) {
        self.lower = self.lower.inf(p);
        self.upper = self.upper.sup(p);
    }

    /// Grow the box to contain `other`. Empty boxes are ignored.
    pub fn extend_box(&mut self, other: &Box3) {
        if other.is_empty() {
            return;
        }
        self.extend_point(&other.lower);
        self.extend_point(&other.upper);
    }

    /// The eight corners of the box.
    pub fn corners(&self) -> [Vec3; 8] {
        let (l, u) = (self.lower, self.upper);
        [
            Vec3::new(l.x, l.y, l.z),
            Vec3::new(l.x, u.y, l.z),
            Vec3::new(u.x, u.y, l.z),
            Vec3::new(u.x, l.y, l.z),
            Vec3::new(l.x, l.y, u.z),
            Vec3::new(l.x, u.y, u.z),
            Vec3::new(u.x, u.y, u.z),
            Vec3::new(u.x, l.y, u.z),
        ]
    }

    /// Bounds of this box after an affine transform.
    pub fn transformed(&self, m: &Mat4) -> Box3 {
        let mut b = Box3::empty();
        if self.is_empty() {
            return b;
        }
        for c in self.corners() {
            b.extend_point(&transform_point(m, &c));
        }
        b
    }
}

impl Default for Box3 {
    fn default() -> Self {
        Self::empty()
    }
}

/// Degrees to radians.
pub fn radians(degrees: f32) -> f32 {
    degrees * std::f32::consts::PI / 180.0
}

/// Apply an affine transform to a point.
pub fn transform_point(m: &Mat4, p: &Vec3) -> Vec3 {
    m.transform_point(&nalgebra::Point3::from(*p)).coords
}

/// Apply the linear part of an affine transform to a direction.
pub fn transform_vector(m: &Mat4, v: &Vec3) -> Vec3 {
    m.transform_vector(v)
}

/// Build a translation-only 4x4 matrix.
pub fn mat4_from_translation(t: Vec3) -> Mat4 {
    Mat4::new_translation(&t)
}

/// Build a non-uniform scale matrix.
pub fn mat4_from_scale(s: Vec3) -> Mat4 {
    Mat4::new_nonuniform_scaling(&s)
}

/// Build a matrix from a column-major `[f32; 16]` array (ANARI layout).
pub fn mat4_from_cols_array(a: &[f32; 16]) -> Mat4 {
    Mat4::from_column_slice(a)
}

/// Build an affine matrix from three basis columns and a translation.
pub fn mat4_from_basis(x: Vec3, y: Vec3, z: Vec3, t: Vec3) -> Mat4 {
    #[rustfmt::skip]
    let result = Mat4::new(
        x.x, y.x, z.x, t.x,
        x.y, y.y, z.y, t.y,
        x.z, y.z, z.z, t.z,
        0.0, 0.0, 0.0, 1.0,
    );
    result
}

/// Rotation taking the `-Z` axis onto `target`.
pub fn rotation_from_neg_z(target: &Vec3) -> Mat4 {
    let from = Vec3::new(0.0, 0.0, -1.0);
    let to = target.normalize();
    let cos_theta = from.dot(&to);

    if (cos_theta - 1.0).abs() < 1e-6 {
        return Mat4::identity();
    }

    if (cos_theta + 1.0).abs() < 1e-6 {
        // Half turn around any axis perpendicular to -Z.
        let mut axis = from.cross(&Vec3::x());
        if axis.norm() < 1e-6 {
            axis = from.cross(&Vec3::y());
        }
        let a = axis.normalize();
        let (x, y, z) = (a.x, a.y, a.z);
        #[rustfmt::skip]
        let result = Mat4::new(
            1.0 - 2.0 * y * y - 2.0 * z * z, 2.0 * x * y,                     2.0 * x * z,                     0.0,
            2.0 * x * y,                     1.0 - 2.0 * x * x - 2.0 * z * z, 2.0 * y * z,                     0.0,
            2.0 * x * z,                     2.0 * y * z,                     1.0 - 2.0 * x * x - 2.0 * y * y, 0.0,
            0.0,                             0.0,                             0.0,                             1.0,
        );
        return result;
    }

    let axis = nalgebra::Unit::new_normalize(from.cross(&to));
    let angle = cos_theta.clamp(-1.0, 1.0).acos();
    nalgebra::Rotation3::from_axis_angle(&axis, angle).to_homogeneous()
}

/// Decompose a 4x4 matrix into (scale, rotation, translation).
///
/// Shear is discarded.
pub fn to_scale_rotation_translation(m: &Mat4) -> (Vec3, Quat, Vec3) {
    let translation = Vec3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)]);
    let col0 = Vec3::new(m[(0, 0)], m[(1, 0)], m[(2, 0)]);
    let col1 = Vec3::new(m[(0, 1)], m[(1, 1)], m[(2, 1)]);
    let col2 = Vec3::new(m[(0, 2)], m[(1, 2)], m[(2, 2)]);
    let scale = Vec3::new(col0.norm(), col1.norm(), col2.norm());
    let safe = |s: f32| if s.abs() < f32::EPSILON { 1.0 } else { s };
    let rot_mat = Mat3::from_columns(&[
        col0 / safe(scale.x),
        col1 / safe(scale.y),
        col2 / safe(scale.z),
    ]);
    let rotation = nalgebra::UnitQuaternion::from_rotation_matrix(
        &nalgebra::Rotation3::from_matrix_unchecked(rot_mat),
    )
    .into_inner();
    (scale, rotation, translation)
}

/// Returns `true` if `m` is the identity within `eps` per element.
pub fn is_identity(m: &Mat4, eps: f32) -> bool {
    (m - Mat4::identity()).iter().all(|v| v.abs() <= eps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn empty_box_is_inverted() {
        let b = Box3::empty();
        assert!(b.is_empty());
        assert!(b.lower.x > b.upper.x);
    }

    #[test]
    fn extend_empty_by_point() {
        let mut b = Box3::empty();
        b.extend_point(&Vec3::new(1.0, 2.0, 3.0));
        assert!(!b.is_empty());
        assert_eq!(b.lower, b.upper);
    }

    #[test]
    fn extend_ignores_empty_box() {
        let mut b = Box3::new(Vec3::zeros(), Vec3::repeat(1.0));
        b.extend_box(&Box3::empty());
        assert_eq!(b, Box3::new(Vec3::zeros(), Vec3::repeat(1.0)));
    }

    #[test]
    fn transformed_box_translates() {
        let b = Box3::new(Vec3::zeros(), Vec3::repeat(1.0));
        let t = b.transformed(&mat4_from_translation(Vec3::new(2.0, 0.0, 0.0)));
        assert!((t.lower - Vec3::new(2.0, 0.0, 0.0)).norm() < 1e-6);
        assert!((t.upper - Vec3::new(3.0, 1.0, 1.0)).norm() < 1e-6);
    }

    #[test]
    fn rotation_from_neg_z_hits_target() {
        for target in [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, -1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(0.0, 0.0, -1.0),
            Vec3::new(1.0, 1.0, 1.0).normalize(),
        ] {
            let m = rotation_from_neg_z(&target);
            let d = transform_vector(&m, &Vec3::new(0.0, 0.0, -1.0));
            assert!((d - target).norm() < 1e-5, "target {target:?} got {d:?}");
        }
    }

    #[test]
    fn decompose_rotation_scale() {
        let r = nalgebra::Rotation3::from_axis_angle(&Vec3::z_axis(), FRAC_PI_2).to_homogeneous();
        let m = mat4_from_translation(Vec3::new(1.0, 2.0, 3.0)) * r * mat4_from_scale(Vec3::new(2.0, 2.0, 2.0));
        let (s, q, t) = to_scale_rotation_translation(&m);
        assert!((s - Vec3::repeat(2.0)).norm() < 1e-5);
        assert!((t - Vec3::new(1.0, 2.0, 3.0)).norm() < 1e-5);
        let v = nalgebra::UnitQuaternion::new_normalize(q) * Vec3::x();
        assert!((v - Vec3::y()).norm() < 1e-5);
    }

    #[test]
    fn identity_check() {
        assert!(is_identity(&Mat4::identity(), 1e-6));
        assert!(!is_identity(&mat4_from_scale(Vec3::repeat(2.0)), 1e-6));
    }

    #[test]
    fn radians_of_180() {
        assert!((radians(180.0) - std::f32::consts::PI).abs() < 1e-6);
    }
}
