//! Extended Kalman Filter (EKF) implementation
//!
//! Discrete-time EKF over a continuous model ẋ = f(x, u), discretized with
//! one explicit Euler step:
//!
//! x⁺ = x + f(x, u)·dt
//! A  = I + ∂f/∂x·dt
//! P⁺ = A P Aᵀ + dt·G Q Gᵀ
//!
//! An optional linear equality constraint `M x = b` can be projected onto
//! the estimate after an update.

use log::warn;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::ukf::CovarianceUpdate;
use crate::error::EstimationError;

/// EKF state container
#[derive(Debug, Clone)]
pub struct EkfState {
    /// State estimate
    pub x: DVector<f64>,
    /// Covariance matrix
    pub p: DMatrix<f64>,
}

impl EkfState {
    pub fn new(state_dim: usize) -> Self {
        Self {
            x: DVector::zeros(state_dim),
            p: DMatrix::identity(state_dim, state_dim),
        }
    }

    pub fn with_initial(x: DVector<f64>, p: DMatrix<f64>) -> Result<Self, EstimationError> {
        if p.nrows() != x.len() || p.ncols() != x.len() {
            return Err(EstimationError::DimensionMismatch {
                what: "initial covariance",
                expected: x.len(),
                got: p.nrows(),
            });
        }
        Ok(Self { x, p })
    }
}

/// EKF noise parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EkfNoiseParams {
    /// Process noise covariance diagonal
    pub q_diag: Vec<f64>,
    /// Measurement noise covariance diagonal
    pub r_diag: Vec<f64>,
}

/// Linear equality constraint `M x = b`
#[derive(Debug, Clone)]
pub struct EqualityConstraint {
    pub m: DMatrix<f64>,
    pub b: DVector<f64>,
}

/// Generic Extended Kalman Filter
#[derive(Debug, Clone)]
pub struct ExtendedKalmanFilter {
    /// Current state estimate and covariance
    pub state: EkfState,
    /// Process noise input matrix (G)
    pub g: DMatrix<f64>,
    /// Process noise covariance (Q)
    pub q: DMatrix<f64>,
    /// Measurement noise covariance (R)
    pub r: DMatrix<f64>,
    /// Covariance correction used in the update step
    pub covariance_update: CovarianceUpdate,
    constraint: Option<EqualityConstraint>,
}

impl ExtendedKalmanFilter {
    /// Create a new EKF
    pub fn new(state_dim: usize, meas_dim: usize) -> Self {
        Self {
            state: EkfState::new(state_dim),
            g: DMatrix::identity(state_dim, state_dim),
            q: DMatrix::identity(state_dim, state_dim) * 0.01,
            r: DMatrix::identity(meas_dim, meas_dim) * 0.1,
            covariance_update: CovarianceUpdate::Simple,
            constraint: None,
        }
    }

    /// Set process noise covariance
    pub fn set_process_noise(&mut self, q_diag: &[f64]) {
        for (i, &val) in q_diag.iter().enumerate() {
            if i < self.q.nrows() {
                self.q[(i, i)] = val;
            }
        }
    }

    /// Set measurement noise covariance
    pub fn set_measurement_noise(&mut self, r_diag: &[f64]) {
        for (i, &val) in r_diag.iter().enumerate() {
            if i < self.r.nrows() {
                self.r[(i, i)] = val;
            }
        }
    }

    /// Apply both noise diagonals
    pub fn set_noise(&mut self, noise: &EkfNoiseParams) {
        self.set_process_noise(&noise.q_diag);
        self.set_measurement_noise(&noise.r_diag);
    }

    /// Enforce `M x = b` after every update
    pub fn set_equality_constraint(
        &mut self,
        m: DMatrix<f64>,
        b: DVector<f64>,
    ) -> Result<(), EstimationError> {
        if m.ncols() != self.state_dim() {
            return Err(EstimationError::DimensionMismatch {
                what: "constraint matrix columns",
                expected: self.state_dim(),
                got: m.ncols(),
            });
        }
        if b.len() != m.nrows() {
            return Err(EstimationError::DimensionMismatch {
                what: "constraint vector",
                expected: m.nrows(),
                got: b.len(),
            });
        }
        self.constraint = Some(EqualityConstraint { m, b });
        Ok(())
    }

    /// Prediction step
    ///
    /// # Arguments
    /// * `u` - Control input
    /// * `dt` - Time step
    /// * `f` - Continuous dynamics: ẋ = f(x, u)
    /// * `f_jacobian` - ∂f/∂x evaluated at the prior state
    pub fn predict<F, J>(&mut self, u: &DVector<f64>, dt: f64, f: F, f_jacobian: J)
    where
        F: Fn(&DVector<f64>, &DVector<f64>) -> DVector<f64>,
        J: Fn(&DVector<f64>, &DVector<f64>) -> DMatrix<f64>,
    {
        let n = self.state_dim();
        let a = DMatrix::identity(n, n) + f_jacobian(&self.state.x, u) * dt;

        // State prediction (first-order hold)
        self.state.x = &self.state.x + f(&self.state.x, u) * dt;

        // Covariance prediction: P = A P A' + dt G Q G'
        let process = &self.g * &self.q * self.g.transpose();
        self.state.p = &a * &self.state.p * a.transpose() + process * dt;
    }

    /// Update step with measurement
    ///
    /// Returns the innovation. A singular innovation covariance leaves the
    /// estimate unchanged.
    ///
    /// # Arguments
    /// * `z` - Measurement vector
    /// * `h` - Measurement function: z = h(x)
    /// * `h_jacobian` - Jacobian of h at current state
    pub fn update<H, J>(
        &mut self,
        z: &DVector<f64>,
        h: H,
        h_jacobian: J,
    ) -> Result<DVector<f64>, EstimationError>
    where
        H: Fn(&DVector<f64>) -> DVector<f64>,
        J: Fn(&DVector<f64>) -> DMatrix<f64>,
    {
        if z.len() != self.r.nrows() {
            return Err(EstimationError::DimensionMismatch {
                what: "measurement",
                expected: self.r.nrows(),
                got: z.len(),
            });
        }

        // Innovation
        let y = z - h(&self.state.x);

        // Jacobian
        let h_mat = h_jacobian(&self.state.x);

        // Innovation covariance: S = H * P * H' + R
        let s = &h_mat * &self.state.p * h_mat.transpose() + &self.r;

        // Kalman gain: K = P * H' * S^(-1)
        let s_inv = s.clone().try_inverse().ok_or_else(|| {
            warn!("EKF innovation covariance is singular");
            EstimationError::SingularInnovation
        })?;
        let k = &self.state.p * h_mat.transpose() * s_inv;

        // State update
        self.state.x = &self.state.x + &k * &y;

        self.state.p = match self.covariance_update {
            CovarianceUpdate::Simple => &self.state.p - &k * &s * k.transpose(),
            CovarianceUpdate::Joseph => {
                let n = self.state_dim();
                let i_kh = DMatrix::identity(n, n) - &k * &h_mat;
                &i_kh * &self.state.p * i_kh.transpose() + &k * &self.r * k.transpose()
            }
        };

        if self.constraint.is_some() {
            self.apply_equality_constraint()?;
        }

        Ok(y)
    }

    /// Project the estimate onto `M x = b` (unit weighting)
    pub fn apply_equality_constraint(&mut self) -> Result<(), EstimationError> {
        let Some(constraint) = &self.constraint else {
            return Ok(());
        };

        let n = self.state_dim();
        let m = &constraint.m;
        let a = (m * m.transpose())
            .try_inverse()
            .ok_or(EstimationError::SingularInnovation)?;
        let lambda = m.transpose() * a;

        let residual = m * &self.state.x - &constraint.b;
        self.state.x -= &lambda * residual;
        self.state.p = (DMatrix::identity(n, n) - &lambda * m) * &self.state.p;
        Ok(())
    }

    /// Get current state estimate
    pub fn state_estimate(&self) -> &DVector<f64> {
        &self.state.x
    }

    /// Get current covariance
    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.state.p
    }

    /// Get state dimension
    pub fn state_dim(&self) -> usize {
        self.state.x.len()
    }
}
