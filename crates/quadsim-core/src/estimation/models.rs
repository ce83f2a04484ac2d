//! Process and measurement models for the filters
//!
//! A [`SystemModel`] bundles the discrete process function
//! `x_next = propagate(x, dt, u)` with the measurement function `z = measure(x)`
//! and tells the filter which components are angles.
//!
//! The quadrotor models use a reduced state with Euler attitude, so sigma
//! points can be propagated without any unit-norm constraint.

use nalgebra::{DMatrix, DVector, Vector3};

use crate::error::EstimationError;
use crate::gravity_earth;
use crate::math::{euler_rate_matrix_inverse, euler_xyz_to_rotation_matrix};

/// Process/measurement strategy injected into a filter
pub trait SystemModel {
    /// Dimension of the state vector
    fn state_dim(&self) -> usize;

    /// Dimension of the measurement vector
    fn measurement_dim(&self) -> usize;

    /// Dimension of the control vector
    fn control_dim(&self) -> usize;

    /// Discrete process step
    fn propagate(&self, state: &DVector<f64>, dt: f64, control: &DVector<f64>) -> DVector<f64>;

    /// Predicted measurement for a state
    fn measure(&self, state: &DVector<f64>) -> DVector<f64>;

    /// State components that are angles and must be wrapped into (-π, π]
    fn angle_indices(&self) -> &[usize] {
        &[]
    }

    /// Measurement components that are angles
    fn measurement_angle_indices(&self) -> &[usize] {
        &[]
    }
}

impl<M: SystemModel + ?Sized> SystemModel for Box<M> {
    fn state_dim(&self) -> usize {
        (**self).state_dim()
    }

    fn measurement_dim(&self) -> usize {
        (**self).measurement_dim()
    }

    fn control_dim(&self) -> usize {
        (**self).control_dim()
    }

    fn propagate(&self, state: &DVector<f64>, dt: f64, control: &DVector<f64>) -> DVector<f64> {
        (**self).propagate(state, dt, control)
    }

    fn measure(&self, state: &DVector<f64>) -> DVector<f64> {
        (**self).measure(state)
    }

    fn angle_indices(&self) -> &[usize] {
        (**self).angle_indices()
    }

    fn measurement_angle_indices(&self) -> &[usize] {
        (**self).measurement_angle_indices()
    }
}

const EULER_INDICES: [usize; 3] = [3, 4, 5];

/// What the pose models observe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoseMeasurement {
    /// Position only (e.g. motion capture without orientation)
    #[default]
    Position,
    /// Position and roll/pitch/yaw
    PositionAttitude,
}

impl PoseMeasurement {
    fn dim(&self) -> usize {
        match self {
            PoseMeasurement::Position => 3,
            PoseMeasurement::PositionAttitude => 6,
        }
    }

    fn angle_indices(&self) -> &'static [usize] {
        match self {
            PoseMeasurement::Position => &[],
            PoseMeasurement::PositionAttitude => &EULER_INDICES,
        }
    }

    fn measure(&self, state: &DVector<f64>) -> DVector<f64> {
        state.rows(0, self.dim()).into_owned()
    }
}

fn vec3_at(v: &DVector<f64>, offset: usize) -> Vector3<f64> {
    Vector3::new(v[offset], v[offset + 1], v[offset + 2])
}

/// Position and Euler attitude driven by body velocity and body rates
///
/// State `[p, rpy]`, control `[v_body, ω_body]`:
///
/// ṗ = R(rpy) v_body
/// ṙpẏ = E⁻¹(rpy) ω_body
///
/// discretized with one explicit Euler step.
#[derive(Debug, Clone, Default)]
pub struct PoseKinematics {
    measurement: PoseMeasurement,
}

impl PoseKinematics {
    pub fn new(measurement: PoseMeasurement) -> Self {
        Self { measurement }
    }

    /// Continuous-time state derivative
    pub fn derivative(&self, state: &DVector<f64>, control: &DVector<f64>) -> DVector<f64> {
        let rpy = vec3_at(state, 3);
        let v_body = vec3_at(control, 0);
        let omega = vec3_at(control, 3);

        let d_pos = euler_xyz_to_rotation_matrix(&rpy) * v_body;
        let d_rpy = euler_rate_matrix_inverse(&rpy) * omega;

        let mut d = DVector::zeros(6);
        d.fixed_rows_mut::<3>(0).copy_from(&d_pos);
        d.fixed_rows_mut::<3>(3).copy_from(&d_rpy);
        d
    }
}

impl SystemModel for PoseKinematics {
    fn state_dim(&self) -> usize {
        6
    }

    fn measurement_dim(&self) -> usize {
        self.measurement.dim()
    }

    fn control_dim(&self) -> usize {
        6
    }

    fn propagate(&self, state: &DVector<f64>, dt: f64, control: &DVector<f64>) -> DVector<f64> {
        state + self.derivative(state, control) * dt
    }

    fn measure(&self, state: &DVector<f64>) -> DVector<f64> {
        self.measurement.measure(state)
    }

    fn angle_indices(&self) -> &[usize] {
        &EULER_INDICES
    }

    fn measurement_angle_indices(&self) -> &[usize] {
        self.measurement.angle_indices()
    }
}

/// Pose plus body velocity, driven by gyroscope and accelerometer readings
///
/// State `[p, rpy, v_body]`, control `[ω_body, a_body]` where `a_body` is the
/// specific force (accelerometer reading, gravity excluded):
///
/// ṗ = R(rpy) v_body
/// ṙpẏ = E⁻¹(rpy) ω_body
/// v̇_body = -ω × v_body + Rᵀ g + a_body
#[derive(Debug, Clone)]
pub struct PoseVelocityKinematics {
    gravity: Vector3<f64>,
    measurement: PoseMeasurement,
}

impl PoseVelocityKinematics {
    pub fn new(measurement: PoseMeasurement) -> Self {
        Self {
            gravity: gravity_earth(),
            measurement,
        }
    }

    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Continuous-time state derivative
    pub fn derivative(&self, state: &DVector<f64>, control: &DVector<f64>) -> DVector<f64> {
        let rpy = vec3_at(state, 3);
        let v_body = vec3_at(state, 6);
        let omega = vec3_at(control, 0);
        let specific_force = vec3_at(control, 3);

        let r = euler_xyz_to_rotation_matrix(&rpy);
        let d_pos = r * v_body;
        let d_rpy = euler_rate_matrix_inverse(&rpy) * omega;
        let d_vel = -omega.cross(&v_body) + r.transpose() * self.gravity + specific_force;

        let mut d = DVector::zeros(9);
        d.fixed_rows_mut::<3>(0).copy_from(&d_pos);
        d.fixed_rows_mut::<3>(3).copy_from(&d_rpy);
        d.fixed_rows_mut::<3>(6).copy_from(&d_vel);
        d
    }
}

impl Default for PoseVelocityKinematics {
    fn default() -> Self {
        Self::new(PoseMeasurement::Position)
    }
}

impl SystemModel for PoseVelocityKinematics {
    fn state_dim(&self) -> usize {
        9
    }

    fn measurement_dim(&self) -> usize {
        self.measurement.dim()
    }

    fn control_dim(&self) -> usize {
        6
    }

    fn propagate(&self, state: &DVector<f64>, dt: f64, control: &DVector<f64>) -> DVector<f64> {
        state + self.derivative(state, control) * dt
    }

    fn measure(&self, state: &DVector<f64>) -> DVector<f64> {
        self.measurement.measure(state)
    }

    fn angle_indices(&self) -> &[usize] {
        &EULER_INDICES
    }

    fn measurement_angle_indices(&self) -> &[usize] {
        self.measurement.angle_indices()
    }
}

/// Linear time-invariant system
///
/// x_next = x + dt (A x + B u)
/// z = H x
#[derive(Debug, Clone)]
pub struct LinearSystem {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    h: DMatrix<f64>,
}

impl LinearSystem {
    /// Create a linear system, checking the matrix shapes agree
    pub fn new(a: DMatrix<f64>, b: DMatrix<f64>, h: DMatrix<f64>) -> Result<Self, EstimationError> {
        let n = a.nrows();
        if a.ncols() != n {
            return Err(EstimationError::DimensionMismatch {
                what: "A columns",
                expected: n,
                got: a.ncols(),
            });
        }
        if b.nrows() != n {
            return Err(EstimationError::DimensionMismatch {
                what: "B rows",
                expected: n,
                got: b.nrows(),
            });
        }
        if h.ncols() != n {
            return Err(EstimationError::DimensionMismatch {
                what: "H columns",
                expected: n,
                got: h.ncols(),
            });
        }
        Ok(Self { a, b, h })
    }

    /// Discrete transition matrix `I + dt A`
    pub fn transition(&self, dt: f64) -> DMatrix<f64> {
        DMatrix::identity(self.a.nrows(), self.a.ncols()) + &self.a * dt
    }

    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn h(&self) -> &DMatrix<f64> {
        &self.h
    }
}

impl SystemModel for LinearSystem {
    fn state_dim(&self) -> usize {
        self.a.nrows()
    }

    fn measurement_dim(&self) -> usize {
        self.h.nrows()
    }

    fn control_dim(&self) -> usize {
        self.b.ncols()
    }

    fn propagate(&self, state: &DVector<f64>, dt: f64, control: &DVector<f64>) -> DVector<f64> {
        state + (&self.a * state + &self.b * control) * dt
    }

    fn measure(&self, state: &DVector<f64>) -> DVector<f64> {
        &self.h * state
    }
}
