//! SO(3) rotation utilities
//!
//! Skew-symmetric matrices, conversions between rotation matrices, scalar-first
//! quaternions and Euler X-Y-Z angles, and re-orthonormalization of drifted
//! rotation matrices.
//!
//! Euler angles are `[roll, pitch, yaw]` with `R = Rz(yaw)·Ry(pitch)·Rx(roll)`.

use nalgebra::{Matrix3, Vector3, Vector4, SVD};
use serde::{Deserialize, Serialize};

/// Distance of `|R[2,0]|` from one below which the Euler extraction is
/// treated as gimbal-locked.
pub const GIMBAL_LOCK_TOLERANCE: f64 = 1e-10;

/// Skew-symmetric matrix from vector (hat operator)
///
/// For v = [x, y, z]^T:
/// ```text
/// [v]× = [ 0  -z   y]
///        [ z   0  -x]
///        [-y   x   0]
/// ```
///
/// so that `skew(v) * x == v.cross(x)`.
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Rotation matrix (body to earth) from a scalar-first quaternion `[w, x, y, z]`
///
/// Uses the bilinear form directly, so a non-unit `q` yields a scaled,
/// non-orthonormal matrix. Normalize first if exactness matters.
pub fn quaternion_to_rotation_matrix(q: &Vector4<f64>) -> Matrix3<f64> {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);

    2.0 * Matrix3::new(
        w * w + x * x - 0.5, x * y - w * z, x * z + w * y,
        x * y + w * z, w * w + y * y - 0.5, y * z - w * x,
        x * z - w * y, y * z + w * x, w * w + z * z - 0.5,
    )
}

/// Scalar-first unit quaternion from a rotation matrix
///
/// Shepperd's method: pivots on the largest of the trace and diagonal
/// elements. The returned quaternion has a non-negative scalar part.
pub fn rotation_matrix_to_quaternion(r: &Matrix3<f64>) -> Vector4<f64> {
    let trace = r.trace();

    let q = if trace > r[(0, 0)] && trace > r[(1, 1)] && trace > r[(2, 2)] {
        let s = 2.0 * (1.0 + trace).sqrt();
        Vector4::new(
            0.25 * s,
            (r[(2, 1)] - r[(1, 2)]) / s,
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(1, 0)] - r[(0, 1)]) / s,
        )
    } else if r[(0, 0)] > r[(1, 1)] && r[(0, 0)] > r[(2, 2)] {
        let s = 2.0 * (1.0 + r[(0, 0)] - r[(1, 1)] - r[(2, 2)]).sqrt();
        Vector4::new(
            (r[(2, 1)] - r[(1, 2)]) / s,
            0.25 * s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
        )
    } else if r[(1, 1)] > r[(2, 2)] {
        let s = 2.0 * (1.0 + r[(1, 1)] - r[(0, 0)] - r[(2, 2)]).sqrt();
        Vector4::new(
            (r[(0, 2)] - r[(2, 0)]) / s,
            (r[(0, 1)] + r[(1, 0)]) / s,
            0.25 * s,
            (r[(1, 2)] + r[(2, 1)]) / s,
        )
    } else {
        let s = 2.0 * (1.0 + r[(2, 2)] - r[(0, 0)] - r[(1, 1)]).sqrt();
        Vector4::new(
            (r[(1, 0)] - r[(0, 1)]) / s,
            (r[(0, 2)] + r[(2, 0)]) / s,
            (r[(1, 2)] + r[(2, 1)]) / s,
            0.25 * s,
        )
    };

    let q = q.normalize();
    if q[0] < 0.0 {
        -q
    } else {
        q
    }
}

/// Which of the two non-singular Euler X-Y-Z solutions to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EulerBranch {
    /// Pitch in [-π/2, π/2] (smallest magnitude pitch)
    #[default]
    Primary,
    /// Pitch = π - primary pitch
    Secondary,
}

/// Euler X-Y-Z angles `[roll, pitch, yaw]` from a rotation matrix
///
/// Returns the smallest-magnitude-pitch branch. See
/// [`rotation_matrix_to_euler_xyz_branch`].
pub fn rotation_matrix_to_euler_xyz(r: &Matrix3<f64>) -> Vector3<f64> {
    rotation_matrix_to_euler_xyz_branch(r, EulerBranch::Primary)
}

/// Euler X-Y-Z angles `[roll, pitch, yaw]` from a rotation matrix, choosing the branch
///
/// Implements the extraction from "Computing Euler angles from a rotation
/// matrix" (G. Slabaugh). When `|R[2,0]|` is within [`GIMBAL_LOCK_TOLERANCE`]
/// of one, pitch is ±π/2, yaw is fixed to zero and roll absorbs the
/// remaining rotation; both branches then coincide.
pub fn rotation_matrix_to_euler_xyz_branch(r: &Matrix3<f64>, branch: EulerBranch) -> Vector3<f64> {
    let r20 = r[(2, 0)];

    if 1.0 - r20.abs() <= GIMBAL_LOCK_TOLERANCE {
        let yaw = 0.0;
        if r20 < 0.0 {
            let pitch = std::f64::consts::FRAC_PI_2;
            let roll = yaw + r[(0, 1)].atan2(r[(0, 2)]);
            Vector3::new(roll, pitch, yaw)
        } else {
            let pitch = -std::f64::consts::FRAC_PI_2;
            let roll = -yaw + (-r[(0, 1)]).atan2(-r[(0, 2)]);
            Vector3::new(roll, pitch, yaw)
        }
    } else {
        let pitch_primary = -r20.asin();
        let pitch = match branch {
            EulerBranch::Primary => pitch_primary,
            EulerBranch::Secondary => std::f64::consts::PI - pitch_primary,
        };
        let c = pitch.cos();
        let roll = (r[(2, 1)] / c).atan2(r[(2, 2)] / c);
        let yaw = (r[(1, 0)] / c).atan2(r[(0, 0)] / c);
        Vector3::new(roll, pitch, yaw)
    }
}

/// Rotation matrix `Rz(yaw)·Ry(pitch)·Rx(roll)` from `[roll, pitch, yaw]`
pub fn euler_xyz_to_rotation_matrix(rpy: &Vector3<f64>) -> Matrix3<f64> {
    let (sr, cr) = rpy.x.sin_cos();
    let (sp, cp) = rpy.y.sin_cos();
    let (sy, cy) = rpy.z.sin_cos();

    Matrix3::new(
        cy * cp, cy * sp * sr - sy * cr, cy * sp * cr + sy * sr,
        sy * cp, sy * sp * sr + cy * cr, sy * sp * cr - cy * sr,
        -sp, cp * sr, cp * cr,
    )
}

/// Scalar-first quaternion from `[roll, pitch, yaw]`
pub fn euler_xyz_to_quaternion(rpy: &Vector3<f64>) -> Vector4<f64> {
    let (sr, cr) = (0.5 * rpy.x).sin_cos();
    let (sp, cp) = (0.5 * rpy.y).sin_cos();
    let (sy, cy) = (0.5 * rpy.z).sin_cos();

    Vector4::new(
        cr * cp * cy + sr * sp * sy,
        sr * cp * cy - cr * sp * sy,
        cr * sp * cy + sr * cp * sy,
        cr * cp * sy - sr * sp * cy,
    )
}

/// `[roll, pitch, yaw]` directly from a scalar-first unit quaternion
pub fn quaternion_to_euler_xyz(q: &Vector4<f64>) -> Vector3<f64> {
    let (w, x, y, z) = (q[0], q[1], q[2], q[3]);

    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - x * z)).clamp(-1.0, 1.0).asin();
    let yaw = (2.0 * (w * z + x * y)).atan2(1.0 - 2.0 * (y * y + z * z));

    Vector3::new(roll, pitch, yaw)
}

/// Inverse of the Euler-rate matrix: `d(rpy)/dt = E⁻¹(rpy) · ω_body`
///
/// Singular at pitch = ±π/2.
pub fn euler_rate_matrix_inverse(rpy: &Vector3<f64>) -> Matrix3<f64> {
    let (sr, cr) = rpy.x.sin_cos();
    let (sp, cp) = rpy.y.sin_cos();

    Matrix3::new(
        cp, sr * sp, cr * sp,
        0.0, cr * cp, -sr * cp,
        0.0, sr, cr,
    ) / cp
}

/// Frobenius norm of `R·Rᵗ - I`
pub fn orthonormality_error(r: &Matrix3<f64>) -> f64 {
    (r * r.transpose() - Matrix3::identity()).norm()
}

/// Project a drifted rotation matrix back onto SO(3) with the Cayley transform
///
/// Extracts the Gibbs (Rodrigues) parameters `G = (R - Rᵗ) / (1 + tr R)` and
/// rebuilds `R = (I - G)⁻¹ (I + G)`, which is exactly orthonormal. Near a
/// half-turn `1 + tr R` vanishes and the SVD projection is used instead.
pub fn cayley_reorthonormalize(r: &Matrix3<f64>) -> Matrix3<f64> {
    let denom = 1.0 + r.trace();
    if denom.abs() < 1e-6 {
        return svd_reorthonormalize(r);
    }

    let g = (r - r.transpose()) / denom;
    let identity = Matrix3::identity();

    match (identity - g).try_inverse() {
        Some(inv) => inv * (identity + g),
        None => svd_reorthonormalize(r),
    }
}

/// Nearest rotation matrix in the Frobenius sense (symmetric Procrustes)
///
/// `R = U·Vᵗ` from the SVD, with the last singular direction flipped when
/// needed to keep `det(R) = +1`.
pub fn svd_reorthonormalize(r: &Matrix3<f64>) -> Matrix3<f64> {
    let svd = SVD::new(*r, true, true);
    match (svd.u, svd.v_t) {
        (Some(u), Some(v_t)) => {
            let rot = u * v_t;
            if rot.determinant() < 0.0 {
                let flip = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, -1.0));
                u * flip * v_t
            } else {
                rot
            }
        }
        _ => *r,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_skew_symmetric() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let s = skew(&v);

        // Skew symmetric: S^T = -S
        assert_relative_eq!(s, -s.transpose(), epsilon = 1e-12);

        let x = Vector3::new(-0.5, 4.0, 0.25);
        assert_relative_eq!(s * x, v.cross(&x), epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_to_rotation_matches_nalgebra() {
        let uq = nalgebra::UnitQuaternion::from_euler_angles(0.3, -0.2, 1.1);
        let q = Vector4::new(uq.w, uq.i, uq.j, uq.k);

        let r = quaternion_to_rotation_matrix(&q);
        assert_relative_eq!(r, *uq.to_rotation_matrix().matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_euler_matrix_matches_nalgebra() {
        // nalgebra's from_euler_angles uses the same roll-pitch-yaw composition
        let rpy = Vector3::new(0.4, 0.1, -2.0);
        let r = euler_xyz_to_rotation_matrix(&rpy);
        let expected = nalgebra::Rotation3::from_euler_angles(rpy.x, rpy.y, rpy.z);

        assert_relative_eq!(r, *expected.matrix(), epsilon = 1e-12);
    }

    #[test]
    fn test_euler_round_trip() {
        let rpy = Vector3::new(0.7, -0.4, 2.5);
        let r = euler_xyz_to_rotation_matrix(&rpy);

        assert_relative_eq!(rotation_matrix_to_euler_xyz(&r), rpy, epsilon = 1e-12);
    }

    #[test]
    fn test_secondary_branch_same_rotation() {
        let rpy = Vector3::new(0.2, 0.5, -1.0);
        let r = euler_xyz_to_rotation_matrix(&rpy);

        let alt = rotation_matrix_to_euler_xyz_branch(&r, EulerBranch::Secondary);
        assert_relative_eq!(alt.y, PI - rpy.y, epsilon = 1e-12);
        assert_relative_eq!(euler_xyz_to_rotation_matrix(&alt), r, epsilon = 1e-12);
    }

    #[test]
    fn test_gimbal_lock_positive_pitch() {
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.3, FRAC_PI_2, 0.0));
        let rpy = rotation_matrix_to_euler_xyz(&r);

        assert!(rpy.iter().all(|a| a.is_finite()));
        assert_relative_eq!(rpy.y, FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(rpy.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(euler_xyz_to_rotation_matrix(&rpy), r, epsilon = 1e-9);
    }

    #[test]
    fn test_gimbal_lock_negative_pitch() {
        // Roll and yaw collapse: only roll - yaw is observable
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.9, -FRAC_PI_2, 0.4));
        let rpy = rotation_matrix_to_euler_xyz(&r);

        assert_relative_eq!(rpy.y, -FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(rpy.z, 0.0, epsilon = 1e-12);
        assert_relative_eq!(euler_xyz_to_rotation_matrix(&rpy), r, epsilon = 1e-9);
    }

    #[test]
    fn test_near_gimbal_lock_within_tolerance() {
        // 1 - |R[2,0]| = 1 - cos(1e-6) ≈ 5e-13, inside the tolerance
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.4, FRAC_PI_2 - 1e-6, 0.7));
        assert!(r[(2, 0)].abs() < 1.0);

        let rpy = rotation_matrix_to_euler_xyz(&r);
        assert_eq!(rpy.y, FRAC_PI_2);
        assert_eq!(rpy.z, 0.0);
        assert_relative_eq!(rpy.x, 0.4 - 0.7, epsilon = 1e-9);
        assert_relative_eq!(euler_xyz_to_rotation_matrix(&rpy), r, epsilon = 1e-5);
    }

    #[test]
    fn test_near_gimbal_lock_outside_tolerance() {
        // 1 - |R[2,0]| ≈ 5e-9 takes the regular path and keeps yaw
        let expected = Vector3::new(0.4, -(FRAC_PI_2 - 1e-4), 0.7);
        let r = euler_xyz_to_rotation_matrix(&expected);

        let rpy = rotation_matrix_to_euler_xyz(&r);
        assert_relative_eq!(rpy, expected, epsilon = 1e-8);
    }

    #[test]
    fn test_drifted_matrix_past_unity() {
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.9, -FRAC_PI_2, 0.4)) * (1.0 + 1e-9);
        assert!(r[(2, 0)] > 1.0);

        let rpy = rotation_matrix_to_euler_xyz(&r);
        assert!(rpy.iter().all(|a| a.is_finite()));
        assert_relative_eq!(rpy.y, -FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(rpy.x, 0.9 + 0.4, epsilon = 1e-9);
    }

    #[test]
    fn test_quaternion_euler_round_trip() {
        let rpy = Vector3::new(-0.3, 0.8, 3.0);
        let q = euler_xyz_to_quaternion(&rpy);

        assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(quaternion_to_euler_xyz(&q), rpy, epsilon = 1e-12);
        assert_relative_eq!(
            quaternion_to_rotation_matrix(&q),
            euler_xyz_to_rotation_matrix(&rpy),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rotation_matrix_to_quaternion_branches() {
        // Exercise each pivot of Shepperd's method
        for rpy in [
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(PI - 0.1, 0.05, 0.0),
            Vector3::new(0.0, PI - 0.2, 0.1),
            Vector3::new(0.05, 0.0, PI - 0.1),
        ] {
            let r = euler_xyz_to_rotation_matrix(&rpy);
            let q = rotation_matrix_to_quaternion(&r);

            assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
            assert!(q[0] >= 0.0);
            assert_relative_eq!(quaternion_to_rotation_matrix(&q), r, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_euler_rate_identity_at_level() {
        let e_inv = euler_rate_matrix_inverse(&Vector3::zeros());
        assert_relative_eq!(e_inv, Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_cayley_restores_orthonormality() {
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.3, -0.6, 1.2));
        let drifted = r + Matrix3::new(1e-3, -2e-3, 0.0, 5e-4, 0.0, 1e-3, 0.0, 0.0, -1e-3);

        assert!(orthonormality_error(&drifted) > 1e-4);

        let fixed = cayley_reorthonormalize(&drifted);
        assert!(orthonormality_error(&fixed) < 1e-12);
        assert_relative_eq!(fixed.determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(fixed, r, epsilon = 5e-3);
    }

    #[test]
    fn test_cayley_exact_on_rotation() {
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.5, 0.2, -0.7));
        assert_relative_eq!(cayley_reorthonormalize(&r), r, epsilon = 1e-12);
    }

    #[test]
    fn test_cayley_half_turn_uses_svd() {
        // tr R = -1, so the Gibbs parameters are unbounded
        let r = Matrix3::from_diagonal(&Vector3::new(-1.0, -1.0, 1.0));
        let mut drifted = r;
        drifted[(0, 1)] = 1e-8;
        assert_eq!(1.0 + drifted.trace(), 0.0);

        let fixed = cayley_reorthonormalize(&drifted);
        assert!(fixed.iter().all(|x| x.is_finite()));
        assert!(orthonormality_error(&fixed) < 1e-12);
        assert_relative_eq!(fixed.determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(fixed, svd_reorthonormalize(&drifted), epsilon = 1e-15);
        assert_relative_eq!(fixed, r, epsilon = 1e-7);
    }

    #[test]
    fn test_svd_reorthonormalize() {
        let r = euler_xyz_to_rotation_matrix(&Vector3::new(0.0, 0.0, PI));
        let drifted = r * 1.01;

        let fixed = svd_reorthonormalize(&drifted);
        assert!(orthonormality_error(&fixed) < 1e-12);
        assert_relative_eq!(fixed.determinant(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(fixed, r, epsilon = 1e-12);
    }
}
