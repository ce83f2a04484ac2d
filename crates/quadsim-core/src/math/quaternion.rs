//! Quaternion operations for attitude representation
//!
//! Quaternions are stored scalar-first as `Vector4 = [w, x, y, z]` and
//! rotate body-frame vectors into the earth frame. Kinematics:
//!
//! q̇ = 1/2 Ω(ω) q = 1/2 q ⊗ [0; ω]
//!
//! with ω the body angular velocity.

use nalgebra::{Matrix4, Vector3, Vector4};

/// Identity quaternion `[1, 0, 0, 0]`
pub fn quaternion_identity() -> Vector4<f64> {
    Vector4::new(1.0, 0.0, 0.0, 0.0)
}

/// Quaternion rate operator Ω(ω)
///
/// ```text
/// Ω(ω) = [ 0   -ωx  -ωy  -ωz]
///        [ωx    0    ωz  -ωy]
///        [ωy  -ωz    0    ωx]
///        [ωz   ωy  -ωx    0 ]
/// ```
///
/// Built from the skew form: the lower-right block is `-[ω]×`.
pub fn omega_matrix(omega: &Vector3<f64>) -> Matrix4<f64> {
    let (x, y, z) = (omega.x, omega.y, omega.z);

    Matrix4::new(
        0.0, -x, -y, -z,
        x, 0.0, z, -y,
        y, -z, 0.0, x,
        z, y, -x, 0.0,
    )
}

/// Compute the quaternion derivative given body angular velocity
///
/// q̇ = 1/2 Ω(ω) q
///
/// # Arguments
/// * `q` - Current orientation `[w, x, y, z]`
/// * `omega` - Angular velocity in body frame [rad/s]
pub fn quaternion_derivative(q: &Vector4<f64>, omega: &Vector3<f64>) -> Vector4<f64> {
    0.5 * omega_matrix(omega) * q
}

/// Normalize a quaternion to unit length
///
/// A zero quaternion maps to the identity. Non-finite components are kept
/// non-finite so invariant checks can see them.
pub fn normalize_quaternion(q: &Vector4<f64>) -> Vector4<f64> {
    let norm = q.norm();
    if norm <= f64::EPSILON {
        quaternion_identity()
    } else {
        q / norm
    }
}
