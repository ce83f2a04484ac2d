//! Rigid-body dynamics
//!
//! 6-DOF rigid body with body-frame velocities:
//!
//! ṗ = R v
//! Ṙ = R [ω]×                      (rotation-matrix attitude)
//! q̇ = 1/2 Ω(ω) q                  (quaternion attitude)
//! v̇ = -[ω]× v + Rᵀ g + f / m
//! ω̇ = J⁻¹ (-[ω]× J ω + τ)
//!
//! where:
//! - p: position, earth frame
//! - R / q: attitude, body to earth
//! - v: linear velocity, body frame
//! - ω: angular velocity, body frame
//! - f, τ: body-frame force and torque
//! - g: gravity, earth frame
//!
//! The state is packed into a flat vector, advanced with the configured
//! scheme (explicit Euler by default), then unpacked. The quaternion is
//! renormalized after every step; the rotation matrix is re-orthonormalized
//! according to [`IntegrationOptions`].

use log::{trace, warn};
use nalgebra::{Cholesky, Matrix3, SVector, Vector3, Vector4};
use serde::{Deserialize, Serialize};

use crate::error::DynamicsError;
use crate::math::{
    cayley_reorthonormalize, euler_xyz_to_quaternion, euler_xyz_to_rotation_matrix,
    normalize_quaternion, orthonormality_error, quaternion_derivative, quaternion_identity,
    quaternion_to_rotation_matrix, rotation_matrix_to_euler_xyz, rotation_matrix_to_quaternion,
    skew, svd_reorthonormalize, IntegrationScheme,
};
use crate::gravity_earth;

/// Maximum tolerated asymmetry of the inertia matrix
const INERTIA_SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Packed state length for the rotation-matrix attitude: p(3) + R(9) + v(3) + ω(3)
const ROTM_STATE_DIM: usize = 18;

/// Packed state length for the quaternion attitude: p(3) + q(4) + v(3) + ω(3)
const QUAT_STATE_DIM: usize = 13;

/// Internal attitude representation, selected at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttitudeRepresentation {
    #[default]
    RotationMatrix,
    Quaternion,
}

/// Attitude (body to earth) in one of the supported representations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attitude {
    /// Orthonormal 3x3 matrix
    RotationMatrix(Matrix3<f64>),
    /// Scalar-first unit quaternion `[w, x, y, z]`
    Quaternion(Vector4<f64>),
}

impl Attitude {
    /// Identity attitude in the given representation
    pub fn identity(representation: AttitudeRepresentation) -> Self {
        match representation {
            AttitudeRepresentation::RotationMatrix => Attitude::RotationMatrix(Matrix3::identity()),
            AttitudeRepresentation::Quaternion => Attitude::Quaternion(quaternion_identity()),
        }
    }

    /// Attitude from `[roll, pitch, yaw]` in the given representation
    pub fn from_euler(rpy: &Vector3<f64>, representation: AttitudeRepresentation) -> Self {
        match representation {
            AttitudeRepresentation::RotationMatrix => {
                Attitude::RotationMatrix(euler_xyz_to_rotation_matrix(rpy))
            }
            AttitudeRepresentation::Quaternion => {
                Attitude::Quaternion(euler_xyz_to_quaternion(rpy))
            }
        }
    }

    pub fn representation(&self) -> AttitudeRepresentation {
        match self {
            Attitude::RotationMatrix(_) => AttitudeRepresentation::RotationMatrix,
            Attitude::Quaternion(_) => AttitudeRepresentation::Quaternion,
        }
    }

    /// Rotation matrix body to earth
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        match self {
            Attitude::RotationMatrix(r) => *r,
            Attitude::Quaternion(q) => quaternion_to_rotation_matrix(q),
        }
    }

    /// Scalar-first quaternion body to earth
    pub fn quaternion(&self) -> Vector4<f64> {
        match self {
            Attitude::RotationMatrix(r) => rotation_matrix_to_quaternion(r),
            Attitude::Quaternion(q) => *q,
        }
    }

    /// `[roll, pitch, yaw]`, recomputed from the attitude on every call
    pub fn euler_angles(&self) -> Vector3<f64> {
        rotation_matrix_to_euler_xyz(&self.rotation_matrix())
    }

    /// The same attitude in another representation
    pub fn converted(&self, representation: AttitudeRepresentation) -> Self {
        match representation {
            AttitudeRepresentation::RotationMatrix => {
                Attitude::RotationMatrix(self.rotation_matrix())
            }
            AttitudeRepresentation::Quaternion => Attitude::Quaternion(self.quaternion()),
        }
    }

    /// Distance from the rotation group: `‖RRᵀ - I‖` or `|‖q‖ - 1|`
    pub fn drift(&self) -> f64 {
        match self {
            Attitude::RotationMatrix(r) => orthonormality_error(r),
            Attitude::Quaternion(q) => (q.norm() - 1.0).abs(),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            Attitude::RotationMatrix(r) => r.iter().all(|x| x.is_finite()),
            Attitude::Quaternion(q) => q.iter().all(|x| x.is_finite()),
        }
    }
}

/// Re-orthonormalization method for the rotation-matrix attitude
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Reorthonormalization {
    /// Never correct; the matrix drifts off SO(3) under Euler steps
    None,
    /// Cayley transform of the Gibbs parameters
    #[default]
    Cayley,
    /// Nearest rotation from the SVD (symmetric Procrustes)
    Svd,
}

/// Integration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationOptions {
    /// Step scheme
    pub scheme: IntegrationScheme,
    /// Rotation-matrix correction method
    pub reorthonormalization: Reorthonormalization,
    /// Apply the correction every this many steps (0 disables it)
    pub reorthonormalize_every: u32,
}

impl Default for IntegrationOptions {
    fn default() -> Self {
        Self {
            scheme: IntegrationScheme::Euler,
            reorthonormalization: Reorthonormalization::Cayley,
            reorthonormalize_every: 1,
        }
    }
}

impl IntegrationOptions {
    /// Options reproducing the uncorrected rotation-matrix behaviour
    pub fn without_reorthonormalization() -> Self {
        Self {
            reorthonormalization: Reorthonormalization::None,
            reorthonormalize_every: 0,
            ..Self::default()
        }
    }
}

/// Rigid body parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigidBodyParams {
    /// Mass [kg]
    pub mass: f64,
    /// Inertia tensor [kg·m²] (body frame)
    pub inertia: Matrix3<f64>,
    /// Gravity [m/s²] (earth frame)
    pub gravity: Vector3<f64>,
}

impl RigidBodyParams {
    pub fn new(mass: f64, inertia: Matrix3<f64>) -> Self {
        Self {
            mass,
            inertia,
            gravity: gravity_earth(),
        }
    }

    /// Create parameters with diagonal inertia
    pub fn from_diagonal(mass: f64, inertia_diag: Vector3<f64>) -> Self {
        Self::new(mass, Matrix3::from_diagonal(&inertia_diag))
    }

    /// Replace the gravity vector (zero for a free body)
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Thrust needed to hover [N]
    pub fn hover_thrust(&self) -> f64 {
        self.mass * self.gravity.norm()
    }
}

impl Default for RigidBodyParams {
    fn default() -> Self {
        // Crazyflie-scale vehicle in the plus configuration
        Self::from_diagonal(0.028, Vector3::new(2.3951e-5, 2.3951e-5, 3.23e-5))
    }
}

/// Initial kinematic state of a rigid body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitialState {
    /// Position [m] (earth frame)
    pub position: Vector3<f64>,
    /// Attitude (body to earth); its variant selects the internal representation
    pub attitude: Attitude,
    /// Velocity [m/s] (body frame)
    pub body_velocity: Vector3<f64>,
    /// Angular velocity [rad/s] (body frame)
    pub angular_velocity: Vector3<f64>,
}

impl InitialState {
    /// Body at rest at the origin with identity attitude
    pub fn at_rest(representation: AttitudeRepresentation) -> Self {
        Self {
            position: Vector3::zeros(),
            attitude: Attitude::identity(representation),
            body_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
        }
    }
}

/// Continuous-time state derivative
#[derive(Debug, Clone)]
pub struct RigidBodyDerivative {
    /// Position derivative = earth-frame velocity
    pub position: Vector3<f64>,
    /// Attitude derivative (Ṙ or q̇)
    pub attitude: AttitudeRate,
    /// Body velocity derivative
    pub body_velocity: Vector3<f64>,
    /// Angular velocity derivative
    pub angular_velocity: Vector3<f64>,
}

/// Attitude derivative matching the attitude representation
#[derive(Debug, Clone)]
pub enum AttitudeRate {
    RotationMatrix(Matrix3<f64>),
    Quaternion(Vector4<f64>),
}

/// Read-only per-step snapshot for loggers and plotters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RigidBodySnapshot {
    pub position: Vector3<f64>,
    pub euler_angles: Vector3<f64>,
    pub quaternion: Vector4<f64>,
    pub body_velocity: Vector3<f64>,
    pub earth_velocity: Vector3<f64>,
    pub angular_velocity: Vector3<f64>,
}

/// Rigid body state together with its immutable mass properties
#[derive(Debug, Clone)]
pub struct RigidBody {
    position: Vector3<f64>,
    attitude: Attitude,
    body_velocity: Vector3<f64>,
    angular_velocity: Vector3<f64>,
    params: RigidBodyParams,
    inertia_inv: Matrix3<f64>,
    options: IntegrationOptions,
    steps_since_correction: u32,
}

impl RigidBody {
    /// Create a rigid body, validating mass and inertia
    ///
    /// Fails if the mass is not positive, or the inertia is not a symmetric
    /// positive-definite (hence invertible) matrix.
    pub fn new(
        initial: InitialState,
        params: RigidBodyParams,
        options: IntegrationOptions,
    ) -> Result<Self, DynamicsError> {
        if !(params.mass.is_finite() && params.mass > 0.0) {
            return Err(DynamicsError::InvalidMass(params.mass));
        }

        if params.inertia.iter().any(|x| !x.is_finite()) {
            return Err(DynamicsError::SingularInertia);
        }

        let asymmetry = (params.inertia - params.inertia.transpose()).amax();
        if asymmetry > INERTIA_SYMMETRY_TOLERANCE {
            return Err(DynamicsError::AsymmetricInertia(asymmetry));
        }

        if Cholesky::new(params.inertia).is_none() {
            return Err(DynamicsError::SingularInertia);
        }
        let inertia_inv = params
            .inertia
            .try_inverse()
            .ok_or(DynamicsError::SingularInertia)?;

        let attitude = match initial.attitude {
            Attitude::Quaternion(q) => Attitude::Quaternion(normalize_quaternion(&q)),
            other => other,
        };

        Ok(Self {
            position: initial.position,
            attitude,
            body_velocity: initial.body_velocity,
            angular_velocity: initial.angular_velocity,
            params,
            inertia_inv,
            options,
            steps_since_correction: 0,
        })
    }

    /// Rigid body at rest at the origin
    pub fn at_rest(
        params: RigidBodyParams,
        representation: AttitudeRepresentation,
    ) -> Result<Self, DynamicsError> {
        Self::new(
            InitialState::at_rest(representation),
            params,
            IntegrationOptions::default(),
        )
    }

    /// Position [m] (earth frame)
    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn attitude(&self) -> &Attitude {
        &self.attitude
    }

    /// Velocity [m/s] (body frame)
    pub fn body_velocity(&self) -> &Vector3<f64> {
        &self.body_velocity
    }

    /// Velocity [m/s] (earth frame)
    pub fn earth_velocity(&self) -> Vector3<f64> {
        self.rotation_matrix() * self.body_velocity
    }

    /// Angular velocity [rad/s] (body frame)
    pub fn angular_velocity(&self) -> &Vector3<f64> {
        &self.angular_velocity
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.attitude.rotation_matrix()
    }

    pub fn quaternion(&self) -> Vector4<f64> {
        self.attitude.quaternion()
    }

    /// `[roll, pitch, yaw]` recomputed from the current attitude
    pub fn euler_angles(&self) -> Vector3<f64> {
        self.attitude.euler_angles()
    }

    pub fn params(&self) -> &RigidBodyParams {
        &self.params
    }

    pub fn mass(&self) -> f64 {
        self.params.mass
    }

    pub fn inertia(&self) -> &Matrix3<f64> {
        &self.params.inertia
    }

    /// Cached inverse inertia
    pub fn inertia_inv(&self) -> &Matrix3<f64> {
        &self.inertia_inv
    }

    pub fn options(&self) -> &IntegrationOptions {
        &self.options
    }

    /// Continuous-time derivative at the current state
    pub fn derivative(
        &self,
        force_body: &Vector3<f64>,
        torque_body: &Vector3<f64>,
    ) -> RigidBodyDerivative {
        let r = self.rotation_matrix();
        let (position, body_velocity, angular_velocity) = translational_and_rotational_rates(
            &r,
            &self.body_velocity,
            &self.angular_velocity,
            &self.params,
            &self.inertia_inv,
            force_body,
            torque_body,
        );

        let attitude = match &self.attitude {
            Attitude::RotationMatrix(r) => {
                AttitudeRate::RotationMatrix(r * skew(&self.angular_velocity))
            }
            Attitude::Quaternion(q) => {
                AttitudeRate::Quaternion(quaternion_derivative(q, &self.angular_velocity))
            }
        };

        RigidBodyDerivative {
            position,
            attitude,
            body_velocity,
            angular_velocity,
        }
    }

    /// Advance the state by `dt` under constant body force and torque
    ///
    /// Inputs are not validated; NaN/Inf propagate into the state and are
    /// reported by [`RigidBody::check_invariants`].
    pub fn integrate(&mut self, dt: f64, force_body: &Vector3<f64>, torque_body: &Vector3<f64>) {
        let scheme = self.options.scheme;

        match self.attitude {
            Attitude::RotationMatrix(r) => {
                let x = pack_rotation_matrix_state(
                    &self.position,
                    &r,
                    &self.body_velocity,
                    &self.angular_velocity,
                );
                let params = &self.params;
                let inertia_inv = &self.inertia_inv;

                let x = scheme.step(&x, 0.0, dt, |_t, s| {
                    rotation_matrix_state_derivative(
                        s,
                        params,
                        inertia_inv,
                        force_body,
                        torque_body,
                    )
                });

                self.position = x.fixed_rows::<3>(0).into_owned();
                self.attitude = Attitude::RotationMatrix(unpack_row_major(&x, 3));
                self.body_velocity = x.fixed_rows::<3>(12).into_owned();
                self.angular_velocity = x.fixed_rows::<3>(15).into_owned();

                self.apply_reorthonormalization();
            }
            Attitude::Quaternion(q) => {
                let x = pack_quaternion_state(
                    &self.position,
                    &q,
                    &self.body_velocity,
                    &self.angular_velocity,
                );
                let params = &self.params;
                let inertia_inv = &self.inertia_inv;

                let x = scheme.step(&x, 0.0, dt, |_t, s| {
                    quaternion_state_derivative(s, params, inertia_inv, force_body, torque_body)
                });

                self.position = x.fixed_rows::<3>(0).into_owned();
                let q: Vector4<f64> = x.fixed_rows::<4>(3).into_owned();
                self.attitude = Attitude::Quaternion(normalize_quaternion(&q));
                self.body_velocity = x.fixed_rows::<3>(7).into_owned();
                self.angular_velocity = x.fixed_rows::<3>(10).into_owned();
            }
        }
    }

    /// Report non-finite state or attitude drift beyond `tolerance`
    ///
    /// Detection only; the state is left as is for the caller to decide.
    pub fn check_invariants(&self, tolerance: f64) -> Result<(), DynamicsError> {
        if self.position.iter().any(|x| !x.is_finite()) {
            return Err(DynamicsError::NonFinite("position"));
        }
        if !self.attitude.is_finite() {
            return Err(DynamicsError::NonFinite("attitude"));
        }
        if self.body_velocity.iter().any(|x| !x.is_finite()) {
            return Err(DynamicsError::NonFinite("body velocity"));
        }
        if self.angular_velocity.iter().any(|x| !x.is_finite()) {
            return Err(DynamicsError::NonFinite("angular velocity"));
        }

        let error = self.attitude.drift();
        if error > tolerance {
            warn!("attitude drift {error:e} exceeds tolerance {tolerance:e}");
            return Err(DynamicsError::AttitudeDrift { error, tolerance });
        }

        Ok(())
    }

    /// Force an immediate rotation-matrix correction with the given method
    ///
    /// No-op for the quaternion representation, which is renormalized on
    /// every step anyway.
    pub fn reorthonormalize(&mut self, method: Reorthonormalization) {
        if let Attitude::RotationMatrix(r) = &self.attitude {
            let corrected = match method {
                Reorthonormalization::None => return,
                Reorthonormalization::Cayley => cayley_reorthonormalize(r),
                Reorthonormalization::Svd => svd_reorthonormalize(r),
            };
            trace!("re-orthonormalized attitude, drift was {:e}", orthonormality_error(r));
            self.attitude = Attitude::RotationMatrix(corrected);
            self.steps_since_correction = 0;
        }
    }

    /// Read-only snapshot of the observable state
    pub fn snapshot(&self) -> RigidBodySnapshot {
        RigidBodySnapshot {
            position: self.position,
            euler_angles: self.euler_angles(),
            quaternion: self.quaternion(),
            body_velocity: self.body_velocity,
            earth_velocity: self.earth_velocity(),
            angular_velocity: self.angular_velocity,
        }
    }

    fn apply_reorthonormalization(&mut self) {
        let every = self.options.reorthonormalize_every;
        if every == 0 || self.options.reorthonormalization == Reorthonormalization::None {
            return;
        }

        self.steps_since_correction += 1;
        if self.steps_since_correction >= every {
            self.reorthonormalize(self.options.reorthonormalization);
        }
    }
}

/// Position, body-velocity and angular-velocity rates shared by both representations
fn translational_and_rotational_rates(
    r: &Matrix3<f64>,
    v: &Vector3<f64>,
    omega: &Vector3<f64>,
    params: &RigidBodyParams,
    inertia_inv: &Matrix3<f64>,
    force_body: &Vector3<f64>,
    torque_body: &Vector3<f64>,
) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let omega_skew = skew(omega);

    let d_position = r * v;
    let d_velocity = -omega_skew * v + r.transpose() * params.gravity + force_body / params.mass;
    let d_omega = inertia_inv * (-omega_skew * params.inertia * omega + torque_body);

    (d_position, d_velocity, d_omega)
}

fn pack_rotation_matrix_state(
    p: &Vector3<f64>,
    r: &Matrix3<f64>,
    v: &Vector3<f64>,
    omega: &Vector3<f64>,
) -> SVector<f64, ROTM_STATE_DIM> {
    let mut x = SVector::<f64, ROTM_STATE_DIM>::zeros();
    x.fixed_rows_mut::<3>(0).copy_from(p);
    for i in 0..3 {
        for j in 0..3 {
            x[3 + 3 * i + j] = r[(i, j)];
        }
    }
    x.fixed_rows_mut::<3>(12).copy_from(v);
    x.fixed_rows_mut::<3>(15).copy_from(omega);
    x
}

fn unpack_row_major(x: &SVector<f64, ROTM_STATE_DIM>, offset: usize) -> Matrix3<f64> {
    Matrix3::from_fn(|i, j| x[offset + 3 * i + j])
}

fn rotation_matrix_state_derivative(
    x: &SVector<f64, ROTM_STATE_DIM>,
    params: &RigidBodyParams,
    inertia_inv: &Matrix3<f64>,
    force_body: &Vector3<f64>,
    torque_body: &Vector3<f64>,
) -> SVector<f64, ROTM_STATE_DIM> {
    let r = unpack_row_major(x, 3);
    let v: Vector3<f64> = x.fixed_rows::<3>(12).into_owned();
    let omega: Vector3<f64> = x.fixed_rows::<3>(15).into_owned();

    let (d_p, d_v, d_omega) = translational_and_rotational_rates(
        &r,
        &v,
        &omega,
        params,
        inertia_inv,
        force_body,
        torque_body,
    );
    let d_r = r * skew(&omega);

    pack_rotation_matrix_state(&d_p, &d_r, &d_v, &d_omega)
}

fn pack_quaternion_state(
    p: &Vector3<f64>,
    q: &Vector4<f64>,
    v: &Vector3<f64>,
    omega: &Vector3<f64>,
) -> SVector<f64, QUAT_STATE_DIM> {
    let mut x = SVector::<f64, QUAT_STATE_DIM>::zeros();
    x.fixed_rows_mut::<3>(0).copy_from(p);
    x.fixed_rows_mut::<4>(3).copy_from(q);
    x.fixed_rows_mut::<3>(7).copy_from(v);
    x.fixed_rows_mut::<3>(10).copy_from(omega);
    x
}

fn quaternion_state_derivative(
    x: &SVector<f64, QUAT_STATE_DIM>,
    params: &RigidBodyParams,
    inertia_inv: &Matrix3<f64>,
    force_body: &Vector3<f64>,
    torque_body: &Vector3<f64>,
) -> SVector<f64, QUAT_STATE_DIM> {
    // Intermediate RK stages leave the unit sphere; rotate with the normalized quaternion
    let q = normalize_quaternion(&x.fixed_rows::<4>(3).into_owned());
    let v: Vector3<f64> = x.fixed_rows::<3>(7).into_owned();
    let omega: Vector3<f64> = x.fixed_rows::<3>(10).into_owned();

    let r = quaternion_to_rotation_matrix(&q);
    let (d_p, d_v, d_omega) = translational_and_rotational_rates(
        &r,
        &v,
        &omega,
        params,
        inertia_inv,
        force_body,
        torque_body,
    );
    let d_q = quaternion_derivative(&q, &omega);

    pack_quaternion_state(&d_p, &d_q, &d_v, &d_omega)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn free_params() -> RigidBodyParams {
        RigidBodyParams::from_diagonal(1.0, Vector3::new(0.01, 0.01, 0.02))
            .with_gravity(Vector3::zeros())
    }

    fn spinning_body(
        representation: AttitudeRepresentation,
        options: IntegrationOptions,
    ) -> RigidBody {
        let initial = InitialState {
            position: Vector3::new(1.0, -2.0, 3.0),
            attitude: Attitude::from_euler(&Vector3::new(0.1, -0.2, 0.3), representation),
            body_velocity: Vector3::new(0.5, 0.0, -0.1),
            angular_velocity: Vector3::new(1.0, -2.0, 3.0),
        };
        RigidBody::new(initial, free_params(), options).unwrap()
    }

    #[test]
    fn test_rejects_invalid_mass() {
        let params = RigidBodyParams::from_diagonal(0.0, Vector3::new(1.0, 1.0, 1.0));
        let err = RigidBody::at_rest(params, AttitudeRepresentation::Quaternion).unwrap_err();
        assert_eq!(err, DynamicsError::InvalidMass(0.0));
    }

    #[test]
    fn test_rejects_singular_inertia() {
        let params = RigidBodyParams::from_diagonal(1.0, Vector3::new(0.01, 0.0, 0.02));
        let err = RigidBody::at_rest(params, AttitudeRepresentation::RotationMatrix).unwrap_err();
        assert_eq!(err, DynamicsError::SingularInertia);
        assert!(err.is_configuration());
    }

    #[test]
    fn test_rejects_asymmetric_inertia() {
        let mut inertia = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, 1.0));
        inertia[(0, 1)] = 0.1;
        let params = RigidBodyParams::new(1.0, inertia);

        let err = RigidBody::at_rest(params, AttitudeRepresentation::RotationMatrix).unwrap_err();
        assert!(matches!(err, DynamicsError::AsymmetricInertia(_)));
    }

    #[test]
    fn test_inverse_inertia_cached() {
        let mut inertia = Matrix3::from_diagonal(&Vector3::new(2.0, 3.0, 4.0));
        inertia[(0, 2)] = -0.1;
        inertia[(2, 0)] = -0.1;
        let params = RigidBodyParams::new(1.0, inertia);
        let body = RigidBody::at_rest(params, AttitudeRepresentation::Quaternion).unwrap();

        assert_relative_eq!(
            body.inertia() * body.inertia_inv(),
            Matrix3::identity(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_hover_equilibrium() {
        // Gravity on, level body, thrust equal to weight along body +z
        let params = RigidBodyParams::from_diagonal(0.5, Vector3::new(0.01, 0.01, 0.02));
        let hover = Vector3::new(0.0, 0.0, params.hover_thrust());
        let mut body = RigidBody::at_rest(params, AttitudeRepresentation::RotationMatrix).unwrap();

        for _ in 0..1000 {
            body.integrate(0.001, &hover, &Vector3::zeros());
        }

        assert_relative_eq!(*body.position(), Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(*body.body_velocity(), Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_free_fall() {
        let params = RigidBodyParams::from_diagonal(1.0, Vector3::new(0.01, 0.01, 0.02));
        let mut body = RigidBody::at_rest(params, AttitudeRepresentation::Quaternion).unwrap();

        body.integrate(0.01, &Vector3::zeros(), &Vector3::zeros());

        // Falls along -z in the earth frame
        assert_relative_eq!(body.earth_velocity().z, -crate::GRAVITY * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_derivative_components() {
        let body =
            spinning_body(AttitudeRepresentation::Quaternion, IntegrationOptions::default());
        let torque = Vector3::new(0.01, 0.0, -0.02);
        let force = Vector3::new(0.0, 1.0, 0.0);

        let d = body.derivative(&force, &torque);

        let omega = body.angular_velocity();
        let j = body.inertia();
        let expected_alpha = body.inertia_inv() * (-omega.cross(&(j * omega)) + torque);
        assert_relative_eq!(d.angular_velocity, expected_alpha, epsilon = 1e-12);

        let expected_v_dot = -omega.cross(body.body_velocity()) + force / body.mass();
        assert_relative_eq!(d.body_velocity, expected_v_dot, epsilon = 1e-12);
        assert_relative_eq!(d.position, body.earth_velocity(), epsilon = 1e-12);
        assert!(matches!(d.attitude, AttitudeRate::Quaternion(_)));
    }

    #[test]
    fn test_gyroscopic_free_spin_about_principal_axis() {
        let initial = InitialState {
            angular_velocity: Vector3::new(0.0, 0.0, 10.0),
            ..InitialState::at_rest(AttitudeRepresentation::Quaternion)
        };
        let body = RigidBody::new(initial, free_params(), IntegrationOptions::default()).unwrap();

        let d = body.derivative(&Vector3::zeros(), &Vector3::zeros());
        assert_relative_eq!(d.angular_velocity.norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_quaternion_renormalized_every_step() {
        let mut body =
            spinning_body(AttitudeRepresentation::Quaternion, IntegrationOptions::default());

        for _ in 0..2000 {
            body.integrate(0.005, &Vector3::zeros(), &Vector3::new(0.001, -0.002, 0.0));
            assert_relative_eq!(body.quaternion().norm(), 1.0, epsilon = 1e-12);
        }
        assert!(body.check_invariants(1e-9).is_ok());
    }

    #[test]
    fn test_rotation_matrix_drifts_without_correction() {
        let mut body = spinning_body(
            AttitudeRepresentation::RotationMatrix,
            IntegrationOptions::without_reorthonormalization(),
        );

        for _ in 0..1000 {
            body.integrate(0.01, &Vector3::zeros(), &Vector3::zeros());
        }

        let err = body.check_invariants(1e-6).unwrap_err();
        assert!(matches!(err, DynamicsError::AttitudeDrift { .. }));

        body.reorthonormalize(Reorthonormalization::Svd);
        assert!(body.check_invariants(1e-9).is_ok());
    }

    #[test]
    fn test_rotation_matrix_stays_orthonormal_with_cayley() {
        let mut body =
            spinning_body(AttitudeRepresentation::RotationMatrix, IntegrationOptions::default());

        for _ in 0..1000 {
            body.integrate(0.01, &Vector3::zeros(), &Vector3::zeros());
            assert!(orthonormality_error(&body.rotation_matrix()) < 1e-9);
        }
        assert_relative_eq!(body.rotation_matrix().determinant(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_periodic_correction() {
        let options = IntegrationOptions {
            reorthonormalization: Reorthonormalization::Svd,
            reorthonormalize_every: 10,
            ..IntegrationOptions::default()
        };
        let mut body = spinning_body(AttitudeRepresentation::RotationMatrix, options);

        for _ in 0..9 {
            body.integrate(0.01, &Vector3::zeros(), &Vector3::zeros());
        }
        assert!(orthonormality_error(&body.rotation_matrix()) > 1e-9);

        body.integrate(0.01, &Vector3::zeros(), &Vector3::zeros());
        assert!(orthonormality_error(&body.rotation_matrix()) < 1e-12);
    }

    #[test]
    fn test_representations_agree() {
        // Polar projection of an Euler step and the normalized quaternion step
        // differ only at third order in dt·|ω|
        let options = IntegrationOptions {
            reorthonormalization: Reorthonormalization::Svd,
            ..IntegrationOptions::default()
        };
        let mut rotm = spinning_body(AttitudeRepresentation::RotationMatrix, options);
        let mut quat =
            spinning_body(AttitudeRepresentation::Quaternion, IntegrationOptions::default());

        let force = Vector3::new(0.1, 0.0, 0.2);
        let torque = Vector3::new(0.0, 0.001, 0.0);
        for _ in 0..500 {
            rotm.integrate(0.001, &force, &torque);
            quat.integrate(0.001, &force, &torque);
        }

        assert_relative_eq!(*rotm.position(), *quat.position(), epsilon = 1e-4);
        assert_relative_eq!(rotm.rotation_matrix(), quat.rotation_matrix(), epsilon = 1e-4);
        assert_relative_eq!(*rotm.angular_velocity(), *quat.angular_velocity(), epsilon = 1e-12);
    }

    #[test]
    fn test_rk4_option() {
        let options = IntegrationOptions {
            scheme: IntegrationScheme::Rk4,
            ..IntegrationOptions::default()
        };
        let initial = InitialState::at_rest(AttitudeRepresentation::Quaternion);
        let mut body = RigidBody::new(initial, free_params(), options).unwrap();

        let force = Vector3::new(0.0, 0.0, -1.0);
        for _ in 0..100 {
            body.integrate(0.01, &force, &Vector3::zeros());
        }

        // Constant acceleration is integrated exactly by RK4
        assert_relative_eq!(body.position().z, -0.5, epsilon = 1e-12);
        assert_relative_eq!(body.body_velocity().z, -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nan_input_reported() {
        let mut body =
            RigidBody::at_rest(free_params(), AttitudeRepresentation::RotationMatrix).unwrap();
        body.integrate(0.01, &Vector3::new(f64::NAN, 0.0, 0.0), &Vector3::zeros());

        assert!(matches!(body.check_invariants(1e-6), Err(DynamicsError::NonFinite(_))));
    }

    #[test]
    fn test_nan_torque_reaches_quaternion() {
        let mut body =
            RigidBody::at_rest(free_params(), AttitudeRepresentation::Quaternion).unwrap();
        body.integrate(0.01, &Vector3::zeros(), &Vector3::new(f64::NAN, 0.0, 0.0));
        body.integrate(0.01, &Vector3::zeros(), &Vector3::zeros());

        assert!(body.quaternion().iter().any(|c| !c.is_finite()));
        assert_eq!(body.check_invariants(1e-6), Err(DynamicsError::NonFinite("attitude")));
    }

    #[test]
    fn test_snapshot() {
        let body =
            spinning_body(AttitudeRepresentation::RotationMatrix, IntegrationOptions::default());
        let snap = body.snapshot();

        assert_relative_eq!(snap.euler_angles, Vector3::new(0.1, -0.2, 0.3), epsilon = 1e-12);
        assert_relative_eq!(snap.earth_velocity, body.earth_velocity(), epsilon = 1e-12);
    }

    #[test]
    fn test_attitude_conversion() {
        let rpy = Vector3::new(0.3, -0.4, 2.0);
        let rotm = Attitude::from_euler(&rpy, AttitudeRepresentation::RotationMatrix);
        let quat = rotm.converted(AttitudeRepresentation::Quaternion);

        assert_eq!(quat.representation(), AttitudeRepresentation::Quaternion);
        assert_relative_eq!(quat.rotation_matrix(), rotm.rotation_matrix(), epsilon = 1e-12);
        assert_relative_eq!(quat.euler_angles(), rpy, epsilon = 1e-12);
        assert!(quat.drift() < 1e-12);
    }
}
